/// Station inventories
pub const GHCN_INVENTORY_URL: &str = "https://www.ncei.noaa.gov/pub/data/ghcn/daily/ghcnd-inventory.txt";
pub const ISD_HISTORY_URL: &str = "https://www.ncei.noaa.gov/pub/data/noaa/isd-history.csv";

/// File names used when saving a copy of the inventory
pub const GHCN_INVENTORY_FILE: &str = "ghcnd-inventory.txt";
pub const ISD_HISTORY_FILE: &str = "isd-history.csv";

/// Per-station resources; `{station}` is replaced by the identifier
pub const GHCN_ACCESS_TEMPLATE: &str =
    "https://www.ncei.noaa.gov/data/global-historical-climatology-network-daily/access/{station}.csv";
/// `{year}` is filled in when the profile is built
pub const GSOD_ACCESS_TEMPLATE: &str =
    "https://www.ncei.noaa.gov/data/global-summary-of-the-day/access/{year}/{station}.csv";

/// Measurement codes a GHCN station must offer
pub const GHCN_REQUIRED_ELEMENTS: [&str; 2] = ["TMIN", "TMAX"];

/// GSOD stations must have reported within this many days
pub const GSOD_RECENT_DAYS: u32 = 30;

/// Processing defaults
pub const DEFAULT_CUTOFF: &str = "2015-01-01";
pub const DEFAULT_PARALLELISM_FACTOR: usize = 4;
pub const DEFAULT_KEEP_LINES: usize = 700;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "HARVEST";
