use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarvestError>;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Station catalog unavailable at {source_location}: {reason}")]
    CatalogUnavailable {
        source_location: String,
        reason: String,
    },

    #[error("Station catalog is missing required column '{column}'")]
    CatalogMalformed { column: String },

    #[error("Fetch failed for station {station} ({url}): {reason}")]
    StationFetchFailed {
        station: String,
        url: String,
        reason: FetchFailure,
    },

    #[error("Could not parse records for station {station}: {reason}")]
    StationParseFailed { station: String, reason: String },

    #[error("Could not write records for station {station}: {source}")]
    StationWriteFailed {
        station: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Why a single station's resource could not be retrieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The server answered with a non-success status.
    Status(u16),
    /// The request never produced a usable response (DNS, timeout, reset, missing file).
    Transport(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Status(code) => write!(f, "unexpected status code {}", code),
            FetchFailure::Transport(message) => write!(f, "{}", message),
        }
    }
}

impl HarvestError {
    /// Station id for errors that are scoped to a single fetch task.
    pub fn station(&self) -> Option<&str> {
        match self {
            HarvestError::StationFetchFailed { station, .. }
            | HarvestError::StationParseFailed { station, .. }
            | HarvestError::StationWriteFailed { station, .. } => Some(station),
            _ => None,
        }
    }

    pub fn is_station_scoped(&self) -> bool {
        self.station().is_some()
    }
}
