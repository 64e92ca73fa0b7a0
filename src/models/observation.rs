use crate::utils::numeric::{format_significant, format_tenths};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical output columns, in the order they are written.
pub const OUTPUT_COLUMNS: [&str; 9] = [
    "date",
    "station",
    "latitude",
    "longitude",
    "elevation",
    "minimum_temperature",
    "maximum_temperature",
    "rainfall",
    "snowfall",
];

/// One dated measurement for one station in the canonical schema.
///
/// Every value except the date is optional; `None` means unknown and is
/// written as an empty cell, never as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub date: NaiveDate,
    pub station: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<i64>,
    /// Tenths of a degree Celsius.
    pub minimum_temperature: Option<i64>,
    /// Tenths of a degree Celsius.
    pub maximum_temperature: Option<i64>,
    pub rainfall: Option<i64>,
    pub snowfall: Option<i64>,
}

impl ObservationRow {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            station: None,
            latitude: None,
            longitude: None,
            elevation: None,
            minimum_temperature: None,
            maximum_temperature: None,
            rainfall: None,
            snowfall: None,
        }
    }

    pub fn has_measurement(&self) -> bool {
        self.minimum_temperature.is_some()
            || self.maximum_temperature.is_some()
            || self.rainfall.is_some()
            || self.snowfall.is_some()
    }

    /// Cells in `OUTPUT_COLUMNS` order.
    pub fn to_fields(&self) -> [String; 9] {
        [
            self.date.format("%Y-%m-%d").to_string(),
            self.station.clone().unwrap_or_default(),
            self.latitude.map(|v| format_significant(v, 6)).unwrap_or_default(),
            self.longitude.map(|v| format_significant(v, 6)).unwrap_or_default(),
            optional_cell(self.elevation),
            self.minimum_temperature.map(format_tenths).unwrap_or_default(),
            self.maximum_temperature.map(format_tenths).unwrap_or_default(),
            optional_cell(self.rainfall),
            optional_cell(self.snowfall),
        ]
    }
}

fn optional_cell(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_fields_render_empty() {
        let date = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
        let mut row = ObservationRow::new(date);
        assert!(!row.has_measurement());

        row.snowfall = Some(0);
        assert!(row.has_measurement());

        let fields = row.to_fields();
        assert_eq!(fields[0], "2015-01-01");
        assert_eq!(fields[1], "");
        assert_eq!(fields[5], "");
        assert_eq!(fields[8], "0");
    }

    #[test]
    fn test_formatted_fields() {
        let date = NaiveDate::from_ymd_opt(2020, 6, 30).unwrap();
        let row = ObservationRow {
            date,
            station: Some("USW00094728".to_string()),
            latitude: Some(40.77898),
            longitude: Some(-73.96921),
            elevation: Some(42),
            minimum_temperature: Some(-56),
            maximum_temperature: Some(123),
            rainfall: Some(5),
            snowfall: None,
        };

        assert_eq!(
            row.to_fields().join(","),
            "2020-06-30,USW00094728,40.779,-73.9692,42,-5.6,12.3,5,"
        );
    }
}
