pub mod observation;
pub mod station;

pub use observation::{ObservationRow, OUTPUT_COLUMNS};
pub use station::{CatalogEntry, StationRecord};
