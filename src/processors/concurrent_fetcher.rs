use crate::error::{HarvestError, Result};
use crate::models::StationRecord;
use crate::processors::record_transformer::ProcessingRules;
use crate::readers::StationSource;
use crate::utils::progress::ProgressReporter;
use crate::writers::OutputSink;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// A station whose task was skipped for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationFailure {
    pub station: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub rows_written: usize,
    pub failures: Vec<StationFailure>,
}

impl FetchSummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Runs one fetch -> process -> write task per station with bounded parallelism.
pub struct ConcurrentFetcher {
    max_workers: usize,
    silent: bool,
}

impl ConcurrentFetcher {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            silent: false,
        }
    }

    /// Size the pool as a multiple of the available cores; fetches are
    /// network-bound, so oversubscribing helps.
    pub fn with_parallelism_factor(factor: usize) -> Self {
        Self::new(factor.max(1) * num_cpus::get())
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Process every station. Station-scoped failures are logged and
    /// collected in the summary; they never stop the other tasks.
    pub async fn run<S: StationSource>(
        &self,
        stations: Arc<[StationRecord]>,
        source: Arc<S>,
        rules: Arc<ProcessingRules>,
        sink: Arc<OutputSink>,
    ) -> Result<FetchSummary> {
        let total = stations.len();
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let completed = Arc::new(AtomicUsize::new(0));
        let progress = Arc::new(ProgressReporter::new(
            total as u64,
            &format!("Fetching {} stations with {} workers...", total, self.max_workers),
            self.silent,
        ));

        info!("Fetching {} stations with {} workers", total, self.max_workers);

        let mut join_set = JoinSet::new();
        for index in 0..total {
            let stations = Arc::clone(&stations);
            let source = Arc::clone(&source);
            let rules = Arc::clone(&rules);
            let sink = Arc::clone(&sink);
            let semaphore = Arc::clone(&semaphore);
            let completed = Arc::clone(&completed);
            let progress = Arc::clone(&progress);

            join_set.spawn(async move {
                let station = stations[index].identifier.clone();

                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => process_station(&station, source.as_ref(), rules, &sink).await,
                    Err(e) => Err(HarvestError::InvalidConfig(format!("worker pool closed: {}", e))),
                };

                match &outcome {
                    Ok(rows) => debug!(station = %station, rows = *rows, "Station complete"),
                    Err(e) => error!(station = %station, "Station skipped: {}", e),
                }

                let count = completed.fetch_add(1, Ordering::Relaxed) + 1;
                progress.update(count as u64);

                (station, outcome)
            });
        }

        let mut summary = FetchSummary {
            total,
            ..FetchSummary::default()
        };

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((_, Ok(rows))) => {
                    summary.succeeded += 1;
                    summary.rows_written += rows;
                }
                Ok((station, Err(e))) => summary.failures.push(StationFailure {
                    station,
                    reason: e.to_string(),
                }),
                Err(e) => {
                    error!("Station task aborted: {}", e);
                    summary.failures.push(StationFailure {
                        station: "unknown".to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        progress.finish_with_message(&format!(
            "Fetched {} of {} stations ({} failed)",
            summary.succeeded,
            total,
            summary.failed()
        ));

        Ok(summary)
    }
}

impl Default for ConcurrentFetcher {
    fn default() -> Self {
        Self::with_parallelism_factor(crate::utils::constants::DEFAULT_PARALLELISM_FACTOR)
    }
}

/// One station's task: fetch, process off the async workers, write.
async fn process_station<S: StationSource>(
    station: &str,
    source: &S,
    rules: Arc<ProcessingRules>,
    sink: &OutputSink,
) -> Result<usize> {
    let raw = source.fetch(station).await?;

    let include_header = sink.wants_station_header();
    let owned_station = station.to_string();
    let block = tokio::task::spawn_blocking(move || {
        rules.process(&owned_station, raw, include_header)
    })
    .await??;

    sink.write_station(station, &block).await?;
    Ok(block.rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchFailure;
    use crate::processors::record_transformer::RecordTransformer;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::future::Future;
    use tempfile::TempDir;

    /// Serves canned payloads; unknown stations answer 404.
    struct CannedSource {
        payloads: HashMap<String, String>,
    }

    impl StationSource for CannedSource {
        fn locate(&self, station: &str) -> String {
            format!("memory://{}.csv", station)
        }

        fn fetch(&self, station: &str) -> impl Future<Output = Result<Vec<u8>>> + Send {
            let result = match self.payloads.get(station) {
                Some(body) => Ok(body.clone().into_bytes()),
                None => Err(HarvestError::StationFetchFailed {
                    station: station.to_string(),
                    url: self.locate(station),
                    reason: FetchFailure::Status(404),
                }),
            };
            async move {
                tokio::task::yield_now().await;
                result
            }
        }
    }

    fn stations(ids: &[&str]) -> Arc<[StationRecord]> {
        ids.iter()
            .map(|id| StationRecord::new(*id, 10.0, 20.0))
            .collect::<Vec<_>>()
            .into()
    }

    fn canonical_rules() -> Arc<ProcessingRules> {
        Arc::new(ProcessingRules::Canonical(RecordTransformer::new(
            NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
        )))
    }

    #[tokio::test]
    async fn test_failed_station_is_isolated() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("weather.csv");
        let sink = Arc::new(OutputSink::shared(&path).await?);

        let mut payloads = HashMap::new();
        payloads.insert(
            "B".to_string(),
            "DATE,STATION,TMIN,TMAX\n2015-06-01,B,100,200\n".to_string(),
        );
        let source = Arc::new(CannedSource { payloads });

        let fetcher = ConcurrentFetcher::new(2).with_silent(true);
        let summary = fetcher
            .run(stations(&["A", "B"]), source, canonical_rules(), sink)
            .await?;

        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.rows_written, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].station, "A");
        assert!(summary.failures[0].reason.contains("404"));

        let contents = std::fs::read_to_string(&path)?;
        assert!(contents.contains("2015-06-01,B,,,,10.0,20.0,,"));
        assert!(!contents.lines().skip(1).any(|l| l.split(',').nth(1) == Some("A")));
        Ok(())
    }

    #[tokio::test]
    async fn test_parse_failure_is_isolated() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let sink = Arc::new(OutputSink::per_station(temp_dir.path()).await?);

        let mut payloads = HashMap::new();
        payloads.insert("BAD".to_string(), "<html>maintenance</html>".to_string());
        payloads.insert("GOOD".to_string(), "DATE,PRCP\n2020-01-01,4\n".to_string());
        let source = Arc::new(CannedSource { payloads });

        let summary = ConcurrentFetcher::new(4)
            .with_silent(true)
            .run(stations(&["BAD", "GOOD"]), source, canonical_rules(), sink)
            .await?;

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failures[0].station, "BAD");
        assert!(temp_dir.path().join("GOOD.csv").exists());
        assert!(!temp_dir.path().join("BAD.csv").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_every_station_completes_with_single_worker() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let sink = Arc::new(OutputSink::shared(&temp_dir.path().join("out.csv")).await?);

        let ids: Vec<String> = (0..25).map(|i| format!("S{:02}", i)).collect();
        let payloads = ids
            .iter()
            .map(|id| (id.clone(), format!("DATE,TMAX\n2020-01-01,{}\n", id.len())))
            .collect();
        let source = Arc::new(CannedSource { payloads });
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();

        let summary = ConcurrentFetcher::new(1)
            .with_silent(true)
            .run(stations(&refs), source, canonical_rules(), sink)
            .await?;

        assert_eq!(summary.succeeded, 25);
        assert_eq!(summary.rows_written, 25);
        assert!(summary.failures.is_empty());
        Ok(())
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(ConcurrentFetcher::new(0).max_workers(), 1);
        assert_eq!(
            ConcurrentFetcher::with_parallelism_factor(4).max_workers(),
            4 * num_cpus::get()
        );
    }
}
