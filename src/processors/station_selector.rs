use crate::models::{CatalogEntry, StationRecord};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionCriteria {
    /// Catalog rows must report through at least this year to count.
    pub min_last_year: i32,
    /// When set, replaces the year check: coverage must end strictly after this date.
    pub min_last_date: Option<NaiveDate>,
    /// Every code here must be offered by a selected station; may be empty.
    pub required_elements: BTreeSet<String>,
}

impl SelectionCriteria {
    pub fn new<I, S>(min_last_year: i32, required_elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            min_last_year,
            min_last_date: None,
            required_elements: required_elements.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_min_last_date(mut self, date: NaiveDate) -> Self {
        self.min_last_date = Some(date);
        self
    }

    fn is_recent(&self, entry: &CatalogEntry) -> bool {
        match self.min_last_date {
            Some(min_date) => entry.coverage_end().is_some_and(|end| end > min_date),
            None => entry
                .last_year
                .is_some_and(|year| year >= self.min_last_year),
        }
    }
}

pub struct StationSelector {
    criteria: SelectionCriteria,
}

impl StationSelector {
    pub fn new(criteria: SelectionCriteria) -> Self {
        Self { criteria }
    }

    pub fn criteria(&self) -> &SelectionCriteria {
        &self.criteria
    }

    /// Group catalog rows per station and keep the stations meeting the criteria.
    ///
    /// Only recent rows contribute codes (see [`SelectionCriteria`]). The first
    /// contributing row of a station fixes its coordinates. Output follows
    /// first-seen catalog order.
    pub fn select(&self, entries: &[CatalogEntry]) -> Vec<StationRecord> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<StationRecord> = Vec::new();

        for entry in entries {
            if !self.contributes(entry) {
                continue;
            }
            let (latitude, longitude) = match (entry.latitude, entry.longitude) {
                (Some(latitude), Some(longitude)) => (latitude, longitude),
                _ => continue,
            };

            let slot = *index.entry(entry.identifier.as_str()).or_insert_with(|| {
                groups.push(StationRecord::new(entry.identifier.clone(), latitude, longitude));
                groups.len() - 1
            });

            let group = &mut groups[slot];
            if let Some(element) = &entry.element {
                group.elements.insert(element.clone());
            }
            if group.elevation.is_none() {
                group.elevation = entry.elevation;
            }
            group.first_year = earliest(group.first_year, entry.first_year);
            group.last_year = group.last_year.max(entry.last_year);
        }

        let grouped = groups.len();
        let selected: Vec<StationRecord> = groups
            .into_iter()
            .filter(|station| {
                if !station.offers_all(&self.criteria.required_elements) {
                    return false;
                }
                match station.validate() {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(station = %station.identifier, "Rejected station: {}", e);
                        false
                    }
                }
            })
            .collect();

        info!(
            "Selected {} of {} active stations from {} catalog entries",
            selected.len(),
            grouped,
            entries.len()
        );

        selected
    }

    fn contributes(&self, entry: &CatalogEntry) -> bool {
        !entry.identifier.is_empty() && self.criteria.is_recent(entry)
    }
}

fn earliest(current: Option<i32>, candidate: Option<i32>) -> Option<i32> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
