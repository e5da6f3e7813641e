//! Extraction of project/voltage entries from the input sheet
//!
//! The sheet must carry a `Project Name` and a `POI Voltage (KV)` column. The
//! header row does not have to be the first one: title rows above it are
//! tolerated as long as the header appears within [`HEADER_SCAN_ROWS`] rows.

use crate::error::{ImportError, Result};
use crate::streaming_reader::StreamingReader;
use crate::types::{CellValue, Row};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

pub const PROJECT_NAME_HEADER: &str = "Project Name";
pub const VOLTAGE_HEADER: &str = "POI Voltage (KV)";

/// How many leading rows may be searched for the header row
pub const HEADER_SCAN_ROWS: usize = 5;

/// Upper bound accepted for a POI voltage; the dashboard rejects anything above it
pub const MAX_POI_VOLTAGE_KV: f64 = 1500.0;

/// Why a voltage cell was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidVoltage {
    NotNumeric,
    OutOfRange,
}

/// Classified content of the voltage cell of one row
#[derive(Debug, Clone, PartialEq)]
pub enum VoltageCell {
    /// Empty cell (or a literal NaN); the row is skipped without comment
    Blank,
    /// Usable voltage in kV
    Value(f64),
    /// Something was there but it is not a usable voltage
    Invalid { raw: String, reason: InvalidVoltage },
}

impl VoltageCell {
    pub fn classify(cell: Option<&CellValue>) -> Self {
        let cell = match cell {
            Some(cell) if !cell.is_empty() => cell,
            _ => return VoltageCell::Blank,
        };

        let invalid = |reason| VoltageCell::Invalid {
            raw: cell.as_string().trim().to_string(),
            reason,
        };

        match cell.as_f64() {
            Some(kv) if kv.is_nan() => VoltageCell::Blank,
            Some(kv) if (0.0..=MAX_POI_VOLTAGE_KV).contains(&kv) => VoltageCell::Value(kv),
            Some(_) => invalid(InvalidVoltage::OutOfRange),
            None => invalid(InvalidVoltage::NotNumeric),
        }
    }
}

/// One usable data row of the sheet
#[derive(Debug, Clone, PartialEq)]
pub struct SheetEntry {
    /// Row number as shown in Excel
    pub row_number: u32,
    pub project_name: String,
    pub voltage: VoltageCell,
}

impl fmt::Display for SheetEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.voltage {
            VoltageCell::Blank => write!(f, "{} -> (blank)", self.project_name),
            VoltageCell::Value(kv) => write!(f, "{} -> {} KV", self.project_name, kv),
            VoltageCell::Invalid { raw, .. } => write!(f, "{} -> '{}'", self.project_name, raw),
        }
    }
}

/// Column positions found in the header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnLayout {
    name_col: usize,
    voltage_col: usize,
}

// Positions of the name and voltage headers within a candidate header row
fn header_positions(row: &Row) -> (Option<usize>, Option<usize>) {
    let position = |wanted: &str| {
        let wanted = normalize_header(wanted);
        row.cells
            .iter()
            .position(|cell| normalize_header(&cell.as_string()) == wanted)
    };

    (position(PROJECT_NAME_HEADER), position(VOLTAGE_HEADER))
}

fn normalize_header(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Turn worksheet rows into entries, locating the header row first
pub fn extract_entries<I>(rows: I) -> Result<Vec<SheetEntry>>
where
    I: IntoIterator<Item = Result<Row>>,
{
    let mut rows = rows.into_iter();
    let mut scanned = 0;
    let mut seen_name = false;
    let mut seen_voltage = false;

    let layout = loop {
        if scanned >= HEADER_SCAN_ROWS {
            break None;
        }
        let Some(row) = rows.next() else {
            break None;
        };
        let row = row?;
        scanned += 1;

        match header_positions(&row) {
            (Some(name_col), Some(voltage_col)) => {
                debug!(row = row.number(), name_col, voltage_col, "located header row");
                break Some(ColumnLayout {
                    name_col,
                    voltage_col,
                });
            }
            (name, voltage) => {
                seen_name |= name.is_some();
                seen_voltage |= voltage.is_some();
            }
        }
    };

    let layout = layout.ok_or_else(|| {
        let mut missing = Vec::new();
        if !seen_name || seen_voltage {
            missing.push(PROJECT_NAME_HEADER.to_string());
        }
        if !seen_voltage || seen_name {
            missing.push(VOLTAGE_HEADER.to_string());
        }
        ImportError::MissingColumns { missing, scanned }
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let row = row?;
        if row.is_empty() {
            continue;
        }

        let project_name = row
            .get(layout.name_col)
            .map(|cell| cell.as_string().trim().to_string())
            .unwrap_or_default();
        if project_name.is_empty() {
            debug!(row = row.number(), "skipping row without a project name");
            continue;
        }

        entries.push(SheetEntry {
            row_number: row.number(),
            project_name,
            voltage: VoltageCell::classify(row.get(layout.voltage_col)),
        });
    }

    Ok(entries)
}

/// Open the workbook and extract entries from `sheet`, or the first sheet if `None`
pub fn load_entries(path: &Path, sheet: Option<&str>) -> Result<Vec<SheetEntry>> {
    let mut reader = StreamingReader::open(path)?;
    info!(path = %path.display(), sheets = ?reader.sheet_names(), "opened workbook");

    let rows = match sheet {
        Some(name) => reader.rows(name)?,
        None => reader.rows_by_index(0)?,
    };
    let entries = extract_entries(rows)?;

    info!(entries = entries.len(), "read projects from sheet");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(index: u32, cells: &[&str]) -> Result<Row> {
        Ok(Row::new(
            index,
            cells
                .iter()
                .map(|c| CellValue::from_raw(c.to_string()))
                .collect(),
        ))
    }

    #[test]
    fn test_classify_voltage() {
        let classify = |c: CellValue| VoltageCell::classify(Some(&c));

        assert_eq!(VoltageCell::classify(None), VoltageCell::Blank);
        assert_eq!(classify(CellValue::Empty), VoltageCell::Blank);
        assert_eq!(classify("  ".into()), VoltageCell::Blank);
        assert_eq!(classify("NaN".into()), VoltageCell::Blank);
        assert_eq!(classify(CellValue::Float(230.0)), VoltageCell::Value(230.0));
        assert_eq!(classify(" 34.5 ".into()), VoltageCell::Value(34.5));
        assert_eq!(
            classify("n/a".into()),
            VoltageCell::Invalid {
                raw: "n/a".to_string(),
                reason: InvalidVoltage::NotNumeric
            }
        );
        assert_eq!(
            classify(CellValue::Float(-5.0)),
            VoltageCell::Invalid {
                raw: "-5".to_string(),
                reason: InvalidVoltage::OutOfRange
            }
        );
        assert!(matches!(
            classify("inf".into()),
            VoltageCell::Invalid {
                reason: InvalidVoltage::OutOfRange,
                ..
            }
        ));
    }

    #[test]
    fn test_extract_with_title_rows_above_header() {
        let rows = vec![
            row(0, &["kV list - Q3"]),
            row(1, &[]),
            row(2, &["", " project name ", "POI VOLTAGE (KV)"]),
            row(3, &["", "Alpha Solar", "230"]),
            row(4, &["", "", "115"]),
            row(5, &["", "Gamma Hydro", "n/a"]),
            row(6, &["", "Delta Storage"]),
        ];

        let entries = extract_entries(rows).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].row_number, 4);
        assert_eq!(entries[0].project_name, "Alpha Solar");
        assert_eq!(entries[0].voltage, VoltageCell::Value(230.0));
        assert!(matches!(entries[1].voltage, VoltageCell::Invalid { .. }));
        assert_eq!(entries[2].voltage, VoltageCell::Blank);
    }

    #[test]
    fn test_missing_voltage_column() {
        let rows = vec![row(0, &["Project Name", "Voltage"]), row(1, &["Alpha", "1"])];

        match extract_entries(rows) {
            Err(ImportError::MissingColumns { missing, scanned }) => {
                assert_eq!(missing, vec![VOLTAGE_HEADER.to_string()]);
                assert_eq!(scanned, 2);
            }
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_header_beyond_scan_window() {
        let mut rows: Vec<Result<Row>> = (0..HEADER_SCAN_ROWS as u32)
            .map(|i| row(i, &["notes"]))
            .collect();
        rows.push(row(HEADER_SCAN_ROWS as u32, &["Project Name", "POI Voltage (KV)"]));

        match extract_entries(rows) {
            Err(ImportError::MissingColumns { missing, scanned }) => {
                assert_eq!(missing.len(), 2);
                assert_eq!(scanned, HEADER_SCAN_ROWS);
            }
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }
}
