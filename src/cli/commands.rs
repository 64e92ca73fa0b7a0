use crate::cli::args::{Cli, Commands, FetchArgs, SelectionArgs};
use crate::config::{Dataset, HarvestConfig, OutputMode};
use crate::processors::HarvestPipeline;
use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Install the global `tracing` subscriber: stderr by default, or a log file.
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let (writer, ansi) = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create log file {}", path.display()))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("cannot initialize logging")
}

pub async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    let config_file = cli.config.as_deref();
    let quiet = cli.quiet;

    match cli.command {
        Commands::Consolidate {
            output_file,
            cutoff,
            selection,
            fetch,
        } => {
            let mut config = load_config(
                Dataset::Ghcn,
                OutputMode::Consolidated,
                output_file,
                config_file,
            )?;
            if let Some(cutoff) = cutoff {
                config.cutoff = cutoff;
            }
            apply_selection(&mut config, selection);
            apply_fetch(&mut config, fetch);

            harvest(config, quiet).await?;
        }

        Commands::Mirror {
            output_dir,
            dataset,
            rules,
            keep,
            cutoff,
            no_catalog_copy,
            selection,
            fetch,
        } => {
            let mut config =
                load_config(dataset, OutputMode::PerStation, output_dir, config_file)?;
            if let Some(rules) = rules {
                config.rules = rules;
            }
            if let Some(keep) = keep {
                config.keep_lines = keep;
            }
            if let Some(cutoff) = cutoff {
                config.cutoff = cutoff;
            }
            if no_catalog_copy {
                config.save_catalog = false;
            }
            apply_selection(&mut config, selection);
            apply_fetch(&mut config, fetch);

            harvest(config, quiet).await?;
        }

        Commands::Stations {
            dataset,
            limit,
            selection,
        } => {
            let mut config =
                load_config(dataset, OutputMode::Consolidated, PathBuf::new(), config_file)?;
            config.save_catalog = false;
            apply_selection(&mut config, selection);
            config.revalidate()?;

            let pipeline = HarvestPipeline::new(config).with_silent(quiet);
            let (entries, stations) = pipeline.select_stations().await?;

            println!(
                "{} stations selected from {} catalog entries",
                stations.len(),
                entries
            );
            let shown = if limit == 0 { stations.len() } else { limit };
            for station in stations.iter().take(shown) {
                println!(
                    "{:<12} {:>9.4} {:>10.4} {:>6} {}-{} {}",
                    station.identifier,
                    station.latitude,
                    station.longitude,
                    station
                        .elevation
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    station.first_year.map(|y| y.to_string()).unwrap_or_default(),
                    station.last_year.map(|y| y.to_string()).unwrap_or_default(),
                    station.elements_label()
                );
            }
            if stations.len() > shown {
                println!("... and {} more", stations.len() - shown);
            }
        }
    }

    Ok(())
}

fn load_config(
    dataset: Dataset,
    mode: OutputMode,
    output: PathBuf,
    config_file: Option<&Path>,
) -> Result<HarvestConfig> {
    HarvestConfig::load(dataset, mode, output, config_file).context("cannot load configuration")
}

fn apply_selection(config: &mut HarvestConfig, selection: SelectionArgs) {
    if let Some(catalog) = selection.catalog {
        config.catalog_source = catalog;
    }
    if let Some(elements) = selection.elements {
        config.required_elements = elements
            .into_iter()
            .map(|e| e.trim().to_uppercase())
            .filter(|e| !e.is_empty())
            .collect();
    }
    if let Some(year) = selection.min_year {
        config.min_last_year = year;
    }
    if let Some(days) = selection.recent_days {
        config.recent_days = days;
    }
}

fn apply_fetch(config: &mut HarvestConfig, fetch: FetchArgs) {
    if let Some(template) = fetch.template {
        config.resource_template = template;
    }
    if let Some(parallelism) = fetch.parallelism {
        config.parallelism_factor = parallelism;
    }
    if let Some(timeout) = fetch.timeout_secs {
        config.fetch_timeout_secs = timeout;
    }
}

async fn harvest(config: HarvestConfig, quiet: bool) -> Result<()> {
    config.revalidate().context("invalid configuration")?;

    println!("Harvesting {:?} station data...", config.dataset);
    println!("Catalog: {}", config.catalog_source);
    println!("Output: {}", config.output.display());

    let pipeline = HarvestPipeline::new(config).with_silent(quiet);
    let summary = pipeline.run().await?;

    println!("\n{}", summary.summary());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_over_defaults() {
        let mut config =
            HarvestConfig::defaults(Dataset::Ghcn, OutputMode::Consolidated, "weather.csv");

        apply_selection(
            &mut config,
            SelectionArgs {
                catalog: Some("inventory.txt".to_string()),
                elements: Some(vec![" tmax".to_string(), "".to_string()]),
                min_year: Some(2019),
                recent_days: None,
            },
        );
        apply_fetch(
            &mut config,
            FetchArgs {
                template: Some("mirror/{station}.csv".to_string()),
                parallelism: Some(2),
                timeout_secs: None,
            },
        );

        assert_eq!(config.catalog_source, "inventory.txt");
        assert_eq!(config.required_elements, vec!["TMAX"]);
        assert_eq!(config.min_last_year, 2019);
        assert_eq!(config.resource_template, "mirror/{station}.csv");
        assert_eq!(config.parallelism_factor, 2);
        assert_eq!(config.fetch_timeout_secs, 60);
        assert!(config.revalidate().is_ok());
    }
}
