use crate::config::{Dataset, RuleSet};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ghcn-harvester")]
#[command(about = "Concurrent harvester for NOAA station archives")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Hide progress bars")]
    pub quiet: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,

    #[arg(
        short,
        long,
        global = true,
        help = "Configuration file (TOML, JSON or YAML) layered under the command-line flags"
    )]
    pub config: Option<PathBuf>,
}

/// Flags shared by every command that reads the station catalog.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    #[arg(long, help = "Catalog URL or local path [default: dataset inventory]")]
    pub catalog: Option<String>,

    #[arg(
        long,
        value_delimiter = ',',
        help = "Required measurement codes, comma separated (e.g. TMIN,TMAX)"
    )]
    pub elements: Option<Vec<String>>,

    #[arg(long, help = "Stations must report through this year [default: current year]")]
    pub min_year: Option<i32>,

    #[arg(
        long,
        help = "Stations must have reported within this many days, 0 to use --min-year [default: 30 for gsod, 0 for ghcn]"
    )]
    pub recent_days: Option<u32>,
}

/// Flags shared by every command that fetches station records.
#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    #[arg(long, help = "Per-station resource template containing {station}")]
    pub template: Option<String>,

    #[arg(long, help = "Workers per CPU core [default: 4]")]
    pub parallelism: Option<usize>,

    #[arg(long, help = "Per-fetch timeout in seconds [default: 60]")]
    pub timeout_secs: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch every selected GHCN-Daily station into one canonical CSV file
    Consolidate {
        #[arg(short, long, help = "Output CSV file")]
        output_file: PathBuf,

        #[arg(long, help = "Drop observations before this date [default: 2015-01-01]")]
        cutoff: Option<NaiveDate>,

        #[command(flatten)]
        selection: SelectionArgs,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Fetch every selected station into its own file
    Mirror {
        #[arg(short, long, help = "Output directory")]
        output_dir: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Dataset::Ghcn)]
        dataset: Dataset,

        #[arg(long, value_enum, help = "Processing rules [default: tail for ghcn, raw for gsod]")]
        rules: Option<RuleSet>,

        #[arg(long, help = "Lines kept per station with tail rules [default: 700]")]
        keep: Option<usize>,

        #[arg(long, help = "Drop observations before this date with canonical rules")]
        cutoff: Option<NaiveDate>,

        #[arg(long, help = "Do not save a copy of the station catalog")]
        no_catalog_copy: bool,

        #[command(flatten)]
        selection: SelectionArgs,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// List the stations that would be fetched, without fetching them
    Stations {
        #[arg(short, long, value_enum, default_value_t = Dataset::Ghcn)]
        dataset: Dataset,

        #[arg(long, default_value = "20", help = "Stations to print (0 = all)")]
        limit: usize,

        #[command(flatten)]
        selection: SelectionArgs,
    },
}
