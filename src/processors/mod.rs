pub mod concurrent_fetcher;
pub mod harvest_pipeline;
pub mod record_transformer;
pub mod station_selector;

pub use concurrent_fetcher::{ConcurrentFetcher, FetchSummary, StationFailure};
pub use harvest_pipeline::{HarvestPipeline, HarvestSummary};
pub use record_transformer::{ProcessedBlock, ProcessingRules, RecordTransformer};
pub use station_selector::{SelectionCriteria, StationSelector};
