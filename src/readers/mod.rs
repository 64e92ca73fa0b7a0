pub mod catalog_reader;
pub mod station_source;

pub use catalog_reader::{CatalogLayout, CatalogLoader, Delimiter, HeaderMode, IdentifierPart};
pub use station_source::{http_client, HttpSource, LocalSource, ResourceTemplate, StationSource};
