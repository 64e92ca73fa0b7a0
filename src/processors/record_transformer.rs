use crate::error::{HarvestError, Result};
use crate::models::{ObservationRow, OUTPUT_COLUMNS};
use crate::utils::numeric::{parse_coordinate, parse_lenient_int};
use chrono::NaiveDate;
use csv::StringRecord;

/// Remote column name -> canonical column name.
pub const COLUMN_MAPPING: [(&str, &str); 9] = [
    ("DATE", "date"),
    ("STATION", "station"),
    ("LATITUDE", "latitude"),
    ("LONGITUDE", "longitude"),
    ("ELEVATION", "elevation"),
    ("TMIN", "minimum_temperature"),
    ("TMAX", "maximum_temperature"),
    ("PRCP", "rainfall"),
    ("SNOW", "snowfall"),
];

/// Positions of the consumed remote columns; absent columns stay `None`.
#[derive(Debug, Default)]
struct RemoteColumns {
    date: Option<usize>,
    station: Option<usize>,
    latitude: Option<usize>,
    longitude: Option<usize>,
    elevation: Option<usize>,
    minimum_temperature: Option<usize>,
    maximum_temperature: Option<usize>,
    rainfall: Option<usize>,
    snowfall: Option<usize>,
}

impl RemoteColumns {
    fn locate(headers: &StringRecord) -> Self {
        let find = |canonical: &str| {
            COLUMN_MAPPING
                .iter()
                .find(|(_, name)| *name == canonical)
                .and_then(|(remote, _)| headers.iter().position(|h| h == *remote))
        };
        Self {
            date: find("date"),
            station: find("station"),
            latitude: find("latitude"),
            longitude: find("longitude"),
            elevation: find("elevation"),
            minimum_temperature: find("minimum_temperature"),
            maximum_temperature: find("maximum_temperature"),
            rainfall: find("rainfall"),
            snowfall: find("snowfall"),
        }
    }
}

/// Maps a station's raw GHCN-Daily table onto the canonical schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTransformer {
    cutoff: NaiveDate,
}

impl RecordTransformer {
    pub fn new(cutoff: NaiveDate) -> Self {
        Self { cutoff }
    }

    pub fn cutoff(&self) -> NaiveDate {
        self.cutoff
    }

    /// Convert a raw table into canonical rows, sorted by date.
    ///
    /// Only a missing header or `DATE` column is an error. Individual cells
    /// that fail to convert become unknown.
    pub fn transform(&self, station: &str, raw: &str) -> Result<Vec<ObservationRow>> {
        let parse_failed = |reason: String| HarvestError::StationParseFailed {
            station: station.to_string(),
            reason,
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(raw.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| parse_failed(e.to_string()))?
            .clone();
        let columns = RemoteColumns::locate(&headers);
        let date_column = columns
            .date
            .ok_or_else(|| parse_failed("no DATE column in payload".to_string()))?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| parse_failed(e.to_string()))?;
            let cell = |i: Option<usize>| i.and_then(|i| record.get(i)).unwrap_or("");

            let date = match NaiveDate::parse_from_str(cell(Some(date_column)), "%Y-%m-%d") {
                Ok(date) if date >= self.cutoff => date,
                _ => continue,
            };

            let row = ObservationRow {
                date,
                station: Some(cell(columns.station).to_string()).filter(|s| !s.is_empty()),
                latitude: parse_coordinate(cell(columns.latitude)),
                longitude: parse_coordinate(cell(columns.longitude)),
                elevation: parse_lenient_int(cell(columns.elevation)),
                minimum_temperature: parse_lenient_int(cell(columns.minimum_temperature)),
                maximum_temperature: parse_lenient_int(cell(columns.maximum_temperature)),
                rainfall: parse_lenient_int(cell(columns.rainfall)),
                snowfall: parse_lenient_int(cell(columns.snowfall)),
            };

            if row.has_measurement() {
                rows.push(row);
            }
        }

        rows.sort_by_key(|row| row.date);
        Ok(rows)
    }

    /// Render rows as canonical CSV, optionally preceded by the header line.
    pub fn render(&self, rows: &[ObservationRow], include_header: bool) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if include_header {
            writer.write_record(OUTPUT_COLUMNS)?;
        }
        for row in rows {
            writer.write_record(row.to_fields())?;
        }
        writer
            .into_inner()
            .map_err(|e| HarvestError::Io(e.into_error()))
    }
}

/// The canonical header line, including its newline.
pub fn canonical_header() -> String {
    format!("{}\n", OUTPUT_COLUMNS.join(","))
}

/// What happens to a fetched payload before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingRules {
    /// Normalize into the canonical schema.
    Canonical(RecordTransformer),
    /// Keep the payload's header line and its last `keep` lines.
    Tail { keep: usize },
    /// Persist the payload verbatim.
    Raw,
}

/// A station's output, ready to be written in one piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedBlock {
    pub rows: usize,
    pub bytes: Vec<u8>,
}

impl ProcessingRules {
    pub fn is_canonical(&self) -> bool {
        matches!(self, ProcessingRules::Canonical(_))
    }

    /// `include_header` only applies to canonical output; tail and raw
    /// payloads always keep their own header line.
    ///
    /// Raw payloads are persisted byte for byte; the other rule sets decode
    /// the payload as UTF-8, replacing invalid sequences.
    pub fn process(&self, station: &str, raw: Vec<u8>, include_header: bool) -> Result<ProcessedBlock> {
        match self {
            ProcessingRules::Canonical(transformer) => {
                let text = String::from_utf8_lossy(&raw);
                let rows = transformer.transform(station, &text)?;
                let bytes = transformer.render(&rows, include_header)?;
                Ok(ProcessedBlock {
                    rows: rows.len(),
                    bytes,
                })
            }
            ProcessingRules::Tail { keep } => Ok(tail_lines(&String::from_utf8_lossy(&raw), *keep)),
            ProcessingRules::Raw => Ok(ProcessedBlock {
                rows: raw
                    .split(|b| *b == b'\n')
                    .filter(|line| !line.is_empty())
                    .count()
                    .saturating_sub(1),
                bytes: raw,
            }),
        }
    }
}

fn tail_lines(raw: &str, keep: usize) -> ProcessedBlock {
    let mut lines = raw.lines();
    let header = match lines.next() {
        Some(header) => header,
        None => {
            return ProcessedBlock {
                rows: 0,
                bytes: Vec::new(),
            }
        }
    };

    let data: Vec<&str> = lines.filter(|line| !line.trim().is_empty()).collect();
    let kept = &data[data.len().saturating_sub(keep)..];

    let mut output = String::with_capacity(raw.len().min(64 * (kept.len() + 1)));
    output.push_str(header);
    output.push('\n');
    for line in kept {
        output.push_str(line);
        output.push('\n');
    }

    ProcessedBlock {
        rows: kept.len(),
        bytes: output.into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RAW: &str = "\
\"STATION\",\"DATE\",\"LATITUDE\",\"LONGITUDE\",\"ELEVATION\",\"NAME\",\"PRCP\",\"PRCP_ATTRIBUTES\",\"SNOW\",\"TMAX\",\"TMIN\"
\"USW00094728\",\"2014-12-31\",\"40.77898\",\"-73.96921\",\"42.7\",\"NY CITY CENTRAL PARK, NY US\",\"0\",\",,W,2400\",\"0\",\"11\",\"-38\"
\"USW00094728\",\"2015-01-02\",\"40.77898\",\"-73.96921\",\"42.7\",\"NY CITY CENTRAL PARK, NY US\",\"\",\"\",\"\",\"\",\"\"
\"USW00094728\",\"2015-01-01\",\"40.77898\",\"-73.96921\",\"42.7\",\"NY CITY CENTRAL PARK, NY US\",\"3\",\",,W,2400\",\"\",\"123\",\"-56\"
\"USW00094728\",\"2015-01-03\",\"40.77898\",\"-73.96921\",\"42.7\",\"NY CITY CENTRAL PARK, NY US\",\"\",\"\",\"5\",\"T\",\"\"
";

    fn transformer() -> RecordTransformer {
        RecordTransformer::new(NaiveDate::from_ymd_opt(2015, 1, 1).unwrap())
    }

    #[test]
    fn test_transform_canonical_rows() -> Result<()> {
        let transformer = transformer();
        let rows = transformer.transform("USW00094728", RAW)?;

        // 2014-12-31 is before the cutoff, 2015-01-02 has no measurements
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2015, 1, 1).unwrap());
        assert_eq!(rows[0].minimum_temperature, Some(-56));
        assert_eq!(rows[0].maximum_temperature, Some(123));
        assert_eq!(rows[0].rainfall, Some(3));
        assert_eq!(rows[0].snowfall, None);
        assert_eq!(rows[0].elevation, Some(42));
        assert_eq!(rows[1].maximum_temperature, None);
        assert_eq!(rows[1].snowfall, Some(5));

        let rendered = String::from_utf8(transformer.render(&rows, true)?).unwrap();
        assert_eq!(
            rendered,
            "date,station,latitude,longitude,elevation,minimum_temperature,maximum_temperature,rainfall,snowfall\n\
             2015-01-01,USW00094728,40.779,-73.9692,42,-5.6,12.3,3,\n\
             2015-01-03,USW00094728,40.779,-73.9692,42,,,,5\n"
        );

        Ok(())
    }

    #[test]
    fn test_row_and_date_invariants() -> Result<()> {
        let transformer = transformer();
        let rows = transformer.transform("USW00094728", RAW)?;

        assert!(rows.iter().all(ObservationRow::has_measurement));
        assert!(rows.iter().all(|r| r.date >= transformer.cutoff()));
        assert!(rows.windows(2).all(|w| w[0].date <= w[1].date));

        Ok(())
    }

    #[test]
    fn test_transform_is_idempotent() -> Result<()> {
        let transformer = transformer();
        let first = transformer.render(&transformer.transform("S", RAW)?, false)?;
        let second = transformer.render(&transformer.transform("S", RAW)?, false)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_missing_columns_are_synthesized() -> Result<()> {
        let raw = "DATE,TMAX\n2016-03-01,250\n2016-02-29,\n";
        let transformer = transformer();
        let rows = transformer.transform("S1", raw)?;

        assert_eq!(rows.len(), 1);
        let fields = rows[0].to_fields();
        assert_eq!(fields.join(","), "2016-03-01,,,,,,25.0,,");
        Ok(())
    }

    #[test]
    fn test_stable_sort_keeps_original_order_for_ties() -> Result<()> {
        let raw = "DATE,STATION,TMIN\n2020-01-02,A,1\n2020-01-01,B,2\n2020-01-02,C,3\n";
        let rows = transformer().transform("S1", raw)?;

        let stations: Vec<_> = rows.iter().map(|r| r.station.clone().unwrap()).collect();
        assert_eq!(stations, vec!["B", "A", "C"]);
        Ok(())
    }

    #[test]
    fn test_payload_without_date_column() {
        let transformer = transformer();

        for raw in ["", "STATION,TMIN\nS1,10\n", "<html>Not Found</html>"] {
            match transformer.transform("S1", raw) {
                Err(HarvestError::StationParseFailed { station, .. }) => assert_eq!(station, "S1"),
                other => panic!("expected StationParseFailed, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_tail_rules() -> Result<()> {
        let raw = "H1,H2\na,1\nb,2\nc,3\n";
        let rules = ProcessingRules::Tail { keep: 2 };
        let block = rules.process("S1", raw.as_bytes().to_vec(), true)?;

        assert_eq!(block.rows, 2);
        assert_eq!(String::from_utf8(block.bytes).unwrap(), "H1,H2\nb,2\nc,3\n");

        let block = ProcessingRules::Tail { keep: 700 }.process("S1", raw.as_bytes().to_vec(), true)?;
        assert_eq!(block.rows, 3);
        assert_eq!(String::from_utf8(block.bytes).unwrap(), raw);
        Ok(())
    }

    #[test]
    fn test_raw_rules() -> Result<()> {
        let raw = "\"STATION\",\"DATE\"\n\"01001099999\",\"2020-01-01\"\n";
        let block = ProcessingRules::Raw.process("01001099999", raw.as_bytes().to_vec(), true)?;

        assert_eq!(block.rows, 1);
        assert_eq!(block.bytes, raw.as_bytes());
        assert!(!ProcessingRules::Raw.is_canonical());
        Ok(())
    }

    #[test]
    fn test_raw_rules_keep_undecodable_bytes() -> Result<()> {
        let raw = b"\"STATION\",\"NAME\"\r\n\"01001099999\",\"J\xC4N MAYEN\"\r\n".to_vec();
        let block = ProcessingRules::Raw.process("01001099999", raw.clone(), true)?;

        assert_eq!(block.rows, 1);
        assert_eq!(block.bytes, raw);
        Ok(())
    }

    #[test]
    fn test_canonical_rules_decode_lossily() -> Result<()> {
        let raw = b"DATE,STATION,TMAX\n2020-01-01,J\xC4N,15\n".to_vec();
        let rules = ProcessingRules::Canonical(transformer());
        let block = rules.process("S1", raw, false)?;

        assert_eq!(block.rows, 1);
        assert_eq!(
            String::from_utf8(block.bytes).unwrap(),
            "2020-01-01,J\u{FFFD}N,,,,,1.5,,\n"
        );
        Ok(())
    }

    #[test]
    fn test_canonical_header() {
        assert_eq!(
            canonical_header(),
            "date,station,latitude,longitude,elevation,minimum_temperature,maximum_temperature,rainfall,snowfall\n"
        );
    }
}
