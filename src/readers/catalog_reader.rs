use crate::error::{HarvestError, Result};
use crate::models::CatalogEntry;
use crate::readers::station_source::http_client;
use crate::utils::numeric::{parse_coordinate, parse_date, parse_lenient_int, parse_year};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    Whitespace,
    Comma,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderMode {
    /// The source has no header; columns carry these names in this order.
    Named(Vec<String>),
    /// The first non-blank line of the source names the columns.
    FromSource,
}

/// One column contributing to the station identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierPart {
    pub column: String,
    /// Numeric cells are left-padded with zeros to this width.
    pub pad_width: Option<usize>,
}

impl IdentifierPart {
    pub fn column(column: &str) -> Self {
        Self {
            column: column.to_string(),
            pad_width: None,
        }
    }

    pub fn padded(column: &str, width: usize) -> Self {
        Self {
            column: column.to_string(),
            pad_width: Some(width),
        }
    }

    fn render(&self, cell: &str) -> String {
        match self.pad_width {
            Some(width) if !cell.is_empty() && cell.bytes().all(|b| b.is_ascii_digit()) => {
                format!("{:0>width$}", cell, width = width)
            }
            _ => cell.to_string(),
        }
    }
}

/// Where each semantic field lives in a station inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogLayout {
    pub delimiter: Delimiter,
    pub header: HeaderMode,
    pub identifier: Vec<IdentifierPart>,
    pub latitude: String,
    pub longitude: String,
    pub elevation: Option<String>,
    pub element: Option<String>,
    pub first_year: String,
    pub last_year: String,
}

impl CatalogLayout {
    /// `ghcnd-inventory.txt`: `ID LATITUDE LONGITUDE ELEMENT FIRSTYEAR LASTYEAR`.
    pub fn ghcn_inventory() -> Self {
        let names = ["station", "latitude", "longitude", "measurement", "year_start", "year_end"];
        Self {
            delimiter: Delimiter::Whitespace,
            header: HeaderMode::Named(names.iter().map(|n| n.to_string()).collect()),
            identifier: vec![IdentifierPart::column("station")],
            latitude: "latitude".to_string(),
            longitude: "longitude".to_string(),
            elevation: None,
            element: Some("measurement".to_string()),
            first_year: "year_start".to_string(),
            last_year: "year_end".to_string(),
        }
    }

    /// `isd-history.csv`, keyed by `USAF` + zero-padded `WBAN`.
    pub fn isd_history() -> Self {
        Self {
            delimiter: Delimiter::Comma,
            header: HeaderMode::FromSource,
            identifier: vec![
                IdentifierPart::column("USAF"),
                IdentifierPart::padded("WBAN", 5),
            ],
            latitude: "LAT".to_string(),
            longitude: "LON".to_string(),
            elevation: Some("ELEV(M)".to_string()),
            element: None,
            first_year: "BEGIN".to_string(),
            last_year: "END".to_string(),
        }
    }

    fn required_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self.identifier.iter().map(|p| p.column.as_str()).collect();
        columns.push(&self.latitude);
        columns.push(&self.longitude);
        if let Some(element) = &self.element {
            columns.push(element);
        }
        columns.push(&self.first_year);
        columns.push(&self.last_year);
        columns
    }
}

pub struct CatalogLoader {
    layout: CatalogLayout,
    client: Client,
}

impl CatalogLoader {
    /// Remote catalogs are downloaded with a client bounded by `timeout`.
    pub fn new(layout: CatalogLayout, timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(layout, http_client(timeout)?))
    }

    pub fn with_client(layout: CatalogLayout, client: Client) -> Self {
        Self { layout, client }
    }

    pub fn layout(&self) -> &CatalogLayout {
        &self.layout
    }

    /// Fetch and parse the full inventory from a URL or local path.
    pub async fn load(&self, source: &str) -> Result<Vec<CatalogEntry>> {
        self.load_with_copy(source, None).await
    }

    /// Like [`load`](Self::load), additionally saving the raw inventory to `copy_to`.
    pub async fn load_with_copy(
        &self,
        source: &str,
        copy_to: Option<&Path>,
    ) -> Result<Vec<CatalogEntry>> {
        let raw = self.fetch_raw(source).await?;

        if let Some(path) = copy_to {
            tokio::fs::write(path, &raw).await?;
            info!("Saved catalog copy to {}", path.display());
        }

        let entries = self.parse(source, &raw)?;
        info!("Loaded {} catalog entries from {}", entries.len(), source);
        Ok(entries)
    }

    async fn fetch_raw(&self, source: &str) -> Result<Vec<u8>> {
        let unavailable = |reason: String| HarvestError::CatalogUnavailable {
            source_location: source.to_string(),
            reason,
        };

        if is_remote(source) {
            debug!("Downloading catalog from {}", source);
            let response = self
                .client
                .get(source)
                .send()
                .await
                .map_err(|e| unavailable(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(unavailable(format!("unexpected status code {}", status.as_u16())));
            }
            let body = response.bytes().await.map_err(|e| unavailable(e.to_string()))?;
            Ok(body.to_vec())
        } else {
            tokio::fs::read(source)
                .await
                .map_err(|e| unavailable(e.to_string()))
        }
    }

    /// Parse a raw inventory read from `source` into entries. Rows are not validated here.
    pub fn parse(&self, source: &str, raw: &[u8]) -> Result<Vec<CatalogEntry>> {
        let mut rows = self.split_rows(source, raw)?;

        let header = match &self.layout.header {
            HeaderMode::Named(names) => names.clone(),
            HeaderMode::FromSource => {
                if rows.is_empty() {
                    let column = self.layout.required_columns().first().copied().unwrap_or("");
                    return Err(HarvestError::CatalogMalformed {
                        column: column.to_string(),
                    });
                }
                rows.remove(0)
            }
        };

        let index: HashMap<&str, usize> = header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        for column in self.layout.required_columns() {
            if !index.contains_key(column) {
                return Err(HarvestError::CatalogMalformed {
                    column: column.to_string(),
                });
            }
        }

        let column_of = |name: &str| index.get(name).copied();
        let id_columns: Vec<(usize, &IdentifierPart)> = self
            .layout
            .identifier
            .iter()
            .filter_map(|part| column_of(&part.column).map(|i| (i, part)))
            .collect();
        let lat = column_of(&self.layout.latitude);
        let lon = column_of(&self.layout.longitude);
        let elevation = self.layout.elevation.as_deref().and_then(column_of);
        let element = self.layout.element.as_deref().and_then(column_of);
        let first_year = column_of(&self.layout.first_year);
        let last_year = column_of(&self.layout.last_year);

        let entries = rows
            .iter()
            .map(|row| {
                let cell = |i: Option<usize>| i.and_then(|i| row.get(i)).map(String::as_str).unwrap_or("");

                let identifier: String = id_columns
                    .iter()
                    .map(|(i, part)| part.render(cell(Some(*i))))
                    .collect();

                CatalogEntry {
                    identifier,
                    latitude: parse_coordinate(cell(lat)),
                    longitude: parse_coordinate(cell(lon)),
                    elevation: parse_lenient_int(cell(elevation)).and_then(|v| i32::try_from(v).ok()),
                    element: Some(cell(element).to_string()).filter(|e| !e.is_empty()),
                    first_year: parse_year(cell(first_year)),
                    last_year: parse_year(cell(last_year)),
                    last_date: parse_date(cell(last_year)),
                }
            })
            .collect();

        Ok(entries)
    }

    fn split_rows(&self, source: &str, raw: &[u8]) -> Result<Vec<Vec<String>>> {
        match self.layout.delimiter {
            Delimiter::Whitespace => Ok(String::from_utf8_lossy(raw)
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| line.split_whitespace().map(str::to_string).collect())
                .collect()),
            Delimiter::Comma => {
                let mut reader = csv::ReaderBuilder::new()
                    .has_headers(false)
                    .flexible(true)
                    .trim(csv::Trim::All)
                    .from_reader(raw);

                let mut rows = Vec::new();
                for record in reader.records() {
                    let record = record.map_err(|e| HarvestError::CatalogUnavailable {
                        source_location: source.to_string(),
                        reason: format!("unreadable CSV: {}", e),
                    })?;
                    if record.iter().all(|cell| cell.is_empty()) {
                        continue;
                    }
                    rows.push(record.iter().map(str::to_string).collect());
                }
                Ok(rows)
            }
        }
    }
}

pub(crate) fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}
