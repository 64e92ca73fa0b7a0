use crate::config::{HarvestConfig, OutputMode};
use crate::error::Result;
use crate::models::StationRecord;
use crate::processors::{ConcurrentFetcher, FetchSummary, StationSelector};
use crate::readers::catalog_reader::is_remote;
use crate::readers::{CatalogLoader, HttpSource, LocalSource, StationSource};
use crate::utils::progress::ProgressReporter;
use crate::writers::OutputSink;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct HarvestSummary {
    pub catalog_entries: usize,
    pub stations_selected: usize,
    pub output: PathBuf,
    pub fetch: FetchSummary,
}

impl HarvestSummary {
    pub fn summary(&self) -> String {
        let mut text = format!(
            "Harvest Summary:\n  Catalog entries: {}\n  Stations selected: {}\n  Stations fetched: {}\n  Stations failed: {}\n  Rows written: {}\n  Output: {}\n",
            self.catalog_entries,
            self.stations_selected,
            self.fetch.succeeded,
            self.fetch.failed(),
            self.fetch.rows_written,
            self.output.display()
        );

        for failure in self.fetch.failures.iter().take(10) {
            text.push_str(&format!("    {}: {}\n", failure.station, failure.reason));
        }
        if self.fetch.failed() > 10 {
            text.push_str(&format!("    ... and {} more\n", self.fetch.failed() - 10));
        }

        text
    }
}

/// Catalog -> selection -> concurrent fetch, driven by one [`HarvestConfig`].
pub struct HarvestPipeline {
    config: HarvestConfig,
    silent: bool,
}

impl HarvestPipeline {
    pub fn new(config: HarvestConfig) -> Self {
        Self {
            config,
            silent: false,
        }
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Load the catalog and select stations. Any error here is fatal for the run.
    pub async fn select_stations(&self) -> Result<(usize, Vec<StationRecord>)> {
        let progress = ProgressReporter::new_spinner("Loading station catalog...", self.silent);

        let copy_path = self.config.catalog_copy_path();
        if let Some(parent) = copy_path.as_deref().and_then(|p| p.parent()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let loader = CatalogLoader::new(self.config.profile().layout, self.config.fetch_timeout())?;
        let entries = loader
            .load_with_copy(&self.config.catalog_source, copy_path.as_deref())
            .await?;

        progress.set_message("Selecting stations...");
        let selector = StationSelector::new(self.config.criteria());
        let stations = selector.select(&entries);

        progress.finish_with_message(&format!(
            "Selected {} stations from {} catalog entries",
            stations.len(),
            entries.len()
        ));

        Ok((entries.len(), stations))
    }

    /// Run against the archive the resource template points at: an
    /// `http(s)://` template is downloaded, anything else is read from disk.
    pub async fn run(&self) -> Result<HarvestSummary> {
        let template = self.config.template()?;
        if is_remote(template.as_str()) {
            let source = HttpSource::new(template, self.config.fetch_timeout())?;
            self.run_with_source(source).await
        } else {
            self.run_with_source(LocalSource::new(PathBuf::new(), template)).await
        }
    }

    pub async fn run_with_source<S: StationSource>(&self, source: S) -> Result<HarvestSummary> {
        self.config.revalidate()?;

        let (catalog_entries, stations) = self.select_stations().await?;
        let stations_selected = stations.len();

        let sink = match self.config.mode {
            OutputMode::Consolidated => OutputSink::shared(&self.config.output).await?,
            OutputMode::PerStation => OutputSink::per_station(&self.config.output).await?,
        };

        let fetcher = ConcurrentFetcher::with_parallelism_factor(self.config.parallelism_factor)
            .with_silent(self.silent);
        let fetch = fetcher
            .run(
                Arc::from(stations),
                Arc::new(source),
                Arc::new(self.config.processing_rules()),
                Arc::new(sink),
            )
            .await?;

        info!(
            "Harvest complete: {} of {} stations written, {} failed",
            fetch.succeeded,
            stations_selected,
            fetch.failed()
        );

        Ok(HarvestSummary {
            catalog_entries,
            stations_selected,
            output: self.config.output.clone(),
            fetch,
        })
    }
}
