use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use validator::{Validate, ValidationError};

/// One raw row of the station inventory, exactly as the catalog reported it.
///
/// Numeric cells that could not be parsed are `None`; the selector decides
/// whether such a row can still contribute to a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub identifier: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<i32>,
    pub element: Option<String>,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
    /// Full coverage-end date, when the catalog records one (ISD `END`).
    pub last_date: Option<NaiveDate>,
}

impl CatalogEntry {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            latitude: None,
            longitude: None,
            elevation: None,
            element: None,
            first_year: None,
            last_year: None,
            last_date: None,
        }
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }

    pub fn with_years(mut self, first_year: i32, last_year: i32) -> Self {
        self.first_year = Some(first_year);
        self.last_year = Some(last_year);
        self
    }

    pub fn with_elevation(mut self, elevation: i32) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_last_date(mut self, last_date: NaiveDate) -> Self {
        self.last_year = Some(last_date.year());
        self.last_date = Some(last_date);
        self
    }

    /// Last day of coverage; a bare year counts through December 31st.
    pub fn coverage_end(&self) -> Option<NaiveDate> {
        self.last_date
            .or_else(|| self.last_year.and_then(|year| NaiveDate::from_ymd_opt(year, 12, 31)))
    }
}

/// A deduplicated station that passed selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_coverage"))]
pub struct StationRecord {
    #[validate(length(min = 1))]
    pub identifier: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,

    pub elevation: Option<i32>,

    pub elements: BTreeSet<String>,

    pub first_year: Option<i32>,

    pub last_year: Option<i32>,
}

fn validate_coverage(station: &StationRecord) -> Result<(), ValidationError> {
    match (station.first_year, station.last_year) {
        (Some(start), Some(end)) if start > end => Err(ValidationError::new("coverage_range")),
        _ => Ok(()),
    }
}

impl StationRecord {
    pub fn new(identifier: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            identifier: identifier.into(),
            latitude,
            longitude,
            elevation: None,
            elements: BTreeSet::new(),
            first_year: None,
            last_year: None,
        }
    }

    pub fn offers(&self, element: &str) -> bool {
        self.elements.contains(element)
    }

    pub fn offers_all<'a, I>(&self, required: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        required.into_iter().all(|code| self.offers(code))
    }

    /// Elements joined the way the inventory summary prints them, e.g. `PRCP|TMAX|TMIN`.
    pub fn elements_label(&self) -> String {
        self.elements
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("|")
    }
}
