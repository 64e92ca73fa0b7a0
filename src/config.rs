use crate::error::Result;
use crate::processors::record_transformer::{ProcessingRules, RecordTransformer};
use crate::processors::SelectionCriteria;
use crate::readers::{CatalogLayout, ResourceTemplate};
use crate::utils::constants::*;
use chrono::{Datelike, Days, Local, NaiveDate};
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Archive a run harvests from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    /// GHCN-Daily station files
    Ghcn,
    /// Global Summary of the Day, current year
    Gsod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// All stations appended to one CSV file
    Consolidated,
    /// One CSV file per station in a directory
    PerStation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RuleSet {
    Canonical,
    Tail,
    Raw,
}

/// Everything that differs between archives.
#[derive(Debug, Clone)]
pub struct DatasetProfile {
    pub layout: CatalogLayout,
    pub catalog_source: &'static str,
    pub catalog_file_name: &'static str,
    pub resource_template: String,
    pub required_elements: Vec<String>,
    pub mirror_rules: RuleSet,
    /// Date-granular recency window in days; 0 means year-granular.
    pub recent_days: u32,
}

impl Dataset {
    pub fn profile(self) -> DatasetProfile {
        let year = Local::now().year();
        match self {
            Dataset::Ghcn => DatasetProfile {
                layout: CatalogLayout::ghcn_inventory(),
                catalog_source: GHCN_INVENTORY_URL,
                catalog_file_name: GHCN_INVENTORY_FILE,
                resource_template: GHCN_ACCESS_TEMPLATE.to_string(),
                required_elements: GHCN_REQUIRED_ELEMENTS.iter().map(|e| e.to_string()).collect(),
                mirror_rules: RuleSet::Tail,
                recent_days: 0,
            },
            Dataset::Gsod => DatasetProfile {
                layout: CatalogLayout::isd_history(),
                catalog_source: ISD_HISTORY_URL,
                catalog_file_name: ISD_HISTORY_FILE,
                resource_template: GSOD_ACCESS_TEMPLATE.replace("{year}", &year.to_string()),
                required_elements: Vec::new(),
                mirror_rules: RuleSet::Raw,
                recent_days: GSOD_RECENT_DAYS,
            },
        }
    }
}

/// Parameters of one harvest run.
///
/// Built from dataset defaults, then an optional config file, then
/// `HARVEST_*` environment variables; the CLI applies its flags last.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_mode"))]
pub struct HarvestConfig {
    pub dataset: Dataset,

    pub mode: OutputMode,

    /// Output file (consolidated) or directory (per-station)
    pub output: PathBuf,

    #[validate(length(min = 1))]
    pub catalog_source: String,

    #[validate(length(min = 1))]
    pub resource_template: String,

    pub rules: RuleSet,

    pub required_elements: Vec<String>,

    pub min_last_year: i32,

    /// Coverage must end within this many days of today; 0 checks `min_last_year` instead
    #[validate(range(max = 36500))]
    pub recent_days: u32,

    pub cutoff: NaiveDate,

    #[validate(range(min = 1, max = 64))]
    pub parallelism_factor: usize,

    #[validate(range(min = 1))]
    pub keep_lines: usize,

    #[validate(range(min = 1, max = 3600))]
    pub fetch_timeout_secs: u64,

    /// Save the fetched inventory next to per-station output
    pub save_catalog: bool,
}

fn validate_mode(config: &HarvestConfig) -> std::result::Result<(), ValidationError> {
    if config.mode == OutputMode::Consolidated && config.rules != RuleSet::Canonical {
        return Err(ValidationError::new("consolidated_requires_canonical"));
    }
    Ok(())
}

impl HarvestConfig {
    pub fn defaults(dataset: Dataset, mode: OutputMode, output: impl Into<PathBuf>) -> Self {
        let profile = dataset.profile();
        let rules = match mode {
            OutputMode::Consolidated => RuleSet::Canonical,
            OutputMode::PerStation => profile.mirror_rules,
        };

        Self {
            dataset,
            mode,
            output: output.into(),
            catalog_source: profile.catalog_source.to_string(),
            resource_template: profile.resource_template,
            rules,
            required_elements: profile.required_elements,
            min_last_year: Local::now().year(),
            recent_days: profile.recent_days,
            cutoff: default_cutoff(),
            parallelism_factor: DEFAULT_PARALLELISM_FACTOR,
            keep_lines: DEFAULT_KEEP_LINES,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            save_catalog: mode == OutputMode::PerStation,
        }
    }

    /// Layer an optional config file and the environment over the dataset defaults.
    pub fn load(
        dataset: Dataset,
        mode: OutputMode,
        output: impl Into<PathBuf>,
        file: Option<&Path>,
    ) -> Result<Self> {
        let defaults = Self::defaults(dataset, mode, output);
        let mut builder = Config::builder().add_source(Config::try_from(&defaults)?);

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("required_elements"),
        );

        let config: HarvestConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn profile(&self) -> DatasetProfile {
        self.dataset.profile()
    }

    pub fn criteria(&self) -> SelectionCriteria {
        let criteria =
            SelectionCriteria::new(self.min_last_year, self.required_elements.iter().cloned());
        match self.recency_cutoff(Local::now().date_naive()) {
            Some(date) => criteria.with_min_last_date(date),
            None => criteria,
        }
    }

    /// The date coverage must end after, counted back from `today`.
    pub fn recency_cutoff(&self, today: NaiveDate) -> Option<NaiveDate> {
        if self.recent_days == 0 {
            return None;
        }
        today.checked_sub_days(Days::new(u64::from(self.recent_days)))
    }

    pub fn processing_rules(&self) -> ProcessingRules {
        match self.rules {
            RuleSet::Canonical => ProcessingRules::Canonical(RecordTransformer::new(self.cutoff)),
            RuleSet::Tail => ProcessingRules::Tail {
                keep: self.keep_lines,
            },
            RuleSet::Raw => ProcessingRules::Raw,
        }
    }

    pub fn template(&self) -> Result<ResourceTemplate> {
        ResourceTemplate::new(self.resource_template.clone())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Where the inventory copy goes, if one should be kept.
    pub fn catalog_copy_path(&self) -> Option<PathBuf> {
        (self.save_catalog && self.mode == OutputMode::PerStation)
            .then(|| self.output.join(self.profile().catalog_file_name))
    }

    /// Re-check after command-line overrides have been applied.
    pub fn revalidate(&self) -> Result<()> {
        self.validate()?;
        self.template()?;
        Ok(())
    }
}

fn default_cutoff() -> NaiveDate {
    NaiveDate::parse_from_str(DEFAULT_CUTOFF, "%Y-%m-%d").unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_ghcn_consolidated_defaults() {
        let config = HarvestConfig::defaults(Dataset::Ghcn, OutputMode::Consolidated, "weather.csv");

        assert!(config.validate().is_ok());
        assert_eq!(config.rules, RuleSet::Canonical);
        assert_eq!(config.required_elements, vec!["TMIN", "TMAX"]);
        assert_eq!(config.cutoff, NaiveDate::from_ymd_opt(2015, 1, 1).unwrap());
        assert_eq!(config.parallelism_factor, 4);
        assert_eq!(config.catalog_copy_path(), None);
        assert!(config.processing_rules().is_canonical());
    }

    #[test]
    fn test_gsod_mirror_defaults() {
        let config = HarvestConfig::defaults(Dataset::Gsod, OutputMode::PerStation, "output/gsod");

        assert_eq!(config.rules, RuleSet::Raw);
        assert!(config.required_elements.is_empty());
        assert!(!config.resource_template.contains("{year}"));
        assert!(config.template().is_ok());
        assert_eq!(
            config.catalog_copy_path(),
            Some(PathBuf::from("output/gsod").join(ISD_HISTORY_FILE))
        );
    }

    #[test]
    fn test_gsod_recency_is_date_granular() {
        let config = HarvestConfig::defaults(Dataset::Gsod, OutputMode::PerStation, "output/gsod");
        let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(config.recent_days, 30);
        assert_eq!(config.recency_cutoff(today), NaiveDate::from_ymd_opt(2026, 9, 18));

        let expected = Local::now().date_naive().checked_sub_days(Days::new(30));
        assert_eq!(config.criteria().min_last_date, expected);

        let ghcn = HarvestConfig::defaults(Dataset::Ghcn, OutputMode::Consolidated, "weather.csv");
        assert_eq!(ghcn.recency_cutoff(today), None);
        assert_eq!(ghcn.criteria().min_last_date, None);
    }

    #[test]
    fn test_consolidated_requires_canonical_rules() {
        let mut config = HarvestConfig::defaults(Dataset::Ghcn, OutputMode::Consolidated, "weather.csv");
        config.rules = RuleSet::Tail;
        assert!(config.validate().is_err());

        config.rules = RuleSet::Canonical;
        config.parallelism_factor = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() -> Result<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(file, "min_last_year = 2020")?;
        writeln!(file, "cutoff = \"2018-06-01\"")?;
        writeln!(file, "required_elements = [\"TMAX\"]")?;
        writeln!(file, "parallelism_factor = 8")?;

        let config = HarvestConfig::load(
            Dataset::Ghcn,
            OutputMode::Consolidated,
            "weather.csv",
            Some(file.path()),
        )?;

        assert_eq!(config.min_last_year, 2020);
        assert_eq!(config.cutoff, NaiveDate::from_ymd_opt(2018, 6, 1).unwrap());
        assert_eq!(config.required_elements, vec!["TMAX"]);
        assert_eq!(config.parallelism_factor, 8);
        assert_eq!(config.catalog_source, GHCN_INVENTORY_URL);
        Ok(())
    }
}
