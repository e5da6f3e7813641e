//! Reconciliation of sheet entries against the projects table
//!
//! Every entry with a usable voltage is classified as exactly one of:
//!
//! - **not found**: no project has that name, nothing is written
//! - **already set**: a matching project has a voltage, nothing is written
//! - **updated**: all matching projects receive the voltage and a provenance stamp
//!
//! The whole run shares one transaction. If anything fails before the commit,
//! the transaction is rolled back and no update survives.

use crate::error::{ImportError, Result};
use crate::sheet::{InvalidVoltage, SheetEntry, VoltageCell, MAX_POI_VOLTAGE_KV};
use crate::store::{ProjectStore, Provenance, VoltageCoverage};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Projects shown in the verification sample
pub const VERIFICATION_SAMPLE: i64 = 5;

/// Per-run knobs
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub provenance: Provenance,
    /// Roll back at the end instead of committing
    pub dry_run: bool,
}

/// A project that received a voltage
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedProject {
    pub project_name: String,
    pub voltage_kv: f64,
    /// Records changed; more than one when names repeat case-insensitively
    pub records: u64,
}

/// A project left alone because it already had a voltage
#[derive(Debug, Clone, PartialEq)]
pub struct AlreadySet {
    pub project_name: String,
    pub existing_kv: f64,
}

impl fmt::Display for AlreadySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (has: {} KV)", self.project_name, self.existing_kv)
    }
}

/// A sheet row whose voltage could not be used
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub row_number: u32,
    pub project_name: String,
    pub raw: String,
    pub reason: InvalidVoltage,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            InvalidVoltage::NotNumeric => write!(
                f,
                "{}: Invalid voltage value '{}' (row {})",
                self.project_name, self.raw, self.row_number
            ),
            InvalidVoltage::OutOfRange => write!(
                f,
                "{}: Voltage '{}' outside 0-{} KV (row {})",
                self.project_name, self.raw, MAX_POI_VOLTAGE_KV, self.row_number
            ),
        }
    }
}

/// Everything the reporter needs about one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub entries_read: usize,
    /// Rows skipped because the voltage cell was blank
    pub blank_skipped: usize,
    pub updated: Vec<UpdatedProject>,
    pub not_found: Vec<String>,
    pub already_set: Vec<AlreadySet>,
    pub errors: Vec<RowError>,
    pub coverage_before: VoltageCoverage,
    pub coverage_after: VoltageCoverage,
    pub sample: Vec<(String, f64)>,
    /// False when the run was a dry run and everything was rolled back
    pub committed: bool,
}

impl ImportReport {
    /// Records changed across all updated projects
    pub fn records_updated(&self) -> u64 {
        self.updated.iter().map(|u| u.records).sum()
    }
}

/// Reconcile `entries`, then commit (or roll back for a dry run)
///
/// Any failure rolls the transaction back and comes back as
/// [`ImportError::RolledBack`].
pub fn run_import<S: ProjectStore>(
    mut store: S,
    entries: &[SheetEntry],
    options: &ImportOptions,
) -> Result<ImportReport> {
    let mut report = ImportReport {
        entries_read: entries.len(),
        ..ImportReport::default()
    };

    if let Err(err) = reconcile(&mut store, entries, options, &mut report) {
        let pending = report.updated.len();
        error!(error = %err, pending, "import failed, rolling back");
        if let Err(rollback_err) = store.rollback() {
            warn!(error = %rollback_err, "rollback failed, transaction is discarded with the connection");
        }
        return Err(ImportError::RolledBack {
            pending,
            source: Box::new(err),
        });
    }

    if options.dry_run {
        store.rollback()?;
        info!(updated = report.updated.len(), "dry run, changes rolled back");
    } else {
        store.commit()?;
        report.committed = true;
        info!(updated = report.updated.len(), "changes committed");
    }

    Ok(report)
}

fn reconcile<S: ProjectStore>(
    store: &mut S,
    entries: &[SheetEntry],
    options: &ImportOptions,
    report: &mut ImportReport,
) -> Result<()> {
    report.coverage_before = store.coverage()?;

    for entry in entries {
        let kv = match &entry.voltage {
            VoltageCell::Blank => {
                report.blank_skipped += 1;
                continue;
            }
            VoltageCell::Invalid { raw, reason } => {
                report.errors.push(RowError {
                    row_number: entry.row_number,
                    project_name: entry.project_name.clone(),
                    raw: raw.clone(),
                    reason: *reason,
                });
                continue;
            }
            VoltageCell::Value(kv) => *kv,
        };

        debug!(row = entry.row_number, project = %entry.project_name, kv, "processing");
        let found = store.find_matches(&entry.project_name)?;

        if found.count == 0 {
            report.not_found.push(entry.project_name.clone());
        } else if let Some(existing_kv) = found.existing_kv {
            report.already_set.push(AlreadySet {
                project_name: entry.project_name.clone(),
                existing_kv,
            });
        } else {
            let records = store.apply_voltage(&entry.project_name, kv, &options.provenance)?;
            if records > 0 {
                info!(project = %entry.project_name, kv, records, "updated");
                report.updated.push(UpdatedProject {
                    project_name: entry.project_name.clone(),
                    voltage_kv: kv,
                    records,
                });
            }
        }
    }

    report.sample = store.sample_with_voltage(VERIFICATION_SAMPLE)?;
    report.coverage_after = store.coverage()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_error_messages() {
        let not_numeric = RowError {
            row_number: 7,
            project_name: "Gamma Hydro".to_string(),
            raw: "n/a".to_string(),
            reason: InvalidVoltage::NotNumeric,
        };
        assert_eq!(
            not_numeric.to_string(),
            "Gamma Hydro: Invalid voltage value 'n/a' (row 7)"
        );

        let out_of_range = RowError {
            raw: "2000".to_string(),
            reason: InvalidVoltage::OutOfRange,
            ..not_numeric
        };
        assert_eq!(
            out_of_range.to_string(),
            "Gamma Hydro: Voltage '2000' outside 0-1500 KV (row 7)"
        );
    }

    #[test]
    fn test_already_set_display_and_record_total() {
        let already = AlreadySet {
            project_name: "Beta Wind".to_string(),
            existing_kv: 110.0,
        };
        assert_eq!(already.to_string(), "Beta Wind (has: 110 KV)");

        let report = ImportReport {
            updated: vec![
                UpdatedProject {
                    project_name: "Alpha Solar".to_string(),
                    voltage_kv: 230.0,
                    records: 2,
                },
                UpdatedProject {
                    project_name: "Delta Storage".to_string(),
                    voltage_kv: 69.0,
                    records: 1,
                },
            ],
            ..ImportReport::default()
        };
        assert_eq!(report.records_updated(), 3);
    }
}
