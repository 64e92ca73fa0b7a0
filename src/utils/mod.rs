pub mod constants;
pub mod numeric;
pub mod progress;

pub use constants::*;
pub use numeric::{format_significant, format_tenths, parse_date, parse_lenient_int};
pub use progress::ProgressReporter;
