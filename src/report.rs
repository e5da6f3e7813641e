//! Console summary of an import run

use crate::reconcile::ImportReport;
use crate::sheet::SheetEntry;
use crate::store::VoltageCoverage;
use std::fmt;

pub const PREVIEW_ROWS: usize = 5;
pub const SHOW_UPDATED: usize = 10;
pub const SHOW_NOT_FOUND: usize = 10;
pub const SHOW_ALREADY_SET: usize = 5;
pub const SHOW_ERRORS: usize = 5;

const RULE_WIDTH: usize = 60;

fn rule(out: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))
}

fn section<T: fmt::Display>(
    out: &mut fmt::Formatter<'_>,
    title: &str,
    items: &[T],
    limit: usize,
) -> fmt::Result {
    if items.is_empty() {
        return Ok(());
    }

    writeln!(out)?;
    writeln!(out, "{} ({} projects):", title, items.len())?;
    for item in items.iter().take(limit) {
        writeln!(out, "  - {}", item)?;
    }
    if items.len() > limit {
        writeln!(out, "  ... and {} more", items.len() - limit)?;
    }
    Ok(())
}

fn coverage_line(
    out: &mut fmt::Formatter<'_>,
    label: &str,
    coverage: &VoltageCoverage,
) -> fmt::Result {
    writeln!(
        out,
        "  {:<7} {}/{} projects have POI Voltage ({} without)",
        label,
        coverage.with_voltage,
        coverage.total,
        coverage.without_voltage()
    )
}

/// First few parsed sheet entries, shown before touching the database
pub fn render_preview(entries: &[SheetEntry]) -> String {
    Preview(entries).to_string()
}

struct Preview<'a>(&'a [SheetEntry]);

impl fmt::Display for Preview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_preview(f, self.0)
    }
}

fn write_preview(out: &mut fmt::Formatter<'_>, entries: &[SheetEntry]) -> fmt::Result {
    writeln!(out, "✅ Found {} projects in sheet", entries.len())?;
    if entries.is_empty() {
        return Ok(());
    }

    writeln!(out)?;
    writeln!(out, "📋 Sample data from sheet:")?;
    for entry in entries.iter().take(PREVIEW_ROWS) {
        writeln!(out, "  row {:>4}: {}", entry.row_number, entry)?;
    }
    Ok(())
}

/// Full summary: buckets, verification sample and coverage
pub fn render(report: &ImportReport) -> String {
    Summary(report).to_string()
}

struct Summary<'a>(&'a ImportReport);

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_report(f, self.0)
    }
}

fn write_report(out: &mut fmt::Formatter<'_>, report: &ImportReport) -> fmt::Result {
    writeln!(out)?;
    rule(out)?;
    writeln!(out, "📊 IMPORT SUMMARY")?;
    rule(out)?;
    if !report.committed {
        writeln!(out, "🧪 DRY RUN: all changes were rolled back")?;
    }
    writeln!(out, "Rows read: {}", report.entries_read)?;
    if report.blank_skipped > 0 {
        writeln!(out, "Skipped (no voltage): {}", report.blank_skipped)?;
    }
    writeln!(
        out,
        "✅ Successfully updated: {} projects ({} records)",
        report.updated.len(),
        report.records_updated()
    )?;
    for updated in report.updated.iter().take(SHOW_UPDATED) {
        writeln!(
            out,
            "  ✓ {} -> {} KV",
            updated.project_name, updated.voltage_kv
        )?;
    }
    if report.updated.len() > SHOW_UPDATED {
        writeln!(out, "  ... and {} more", report.updated.len() - SHOW_UPDATED)?;
    }

    section(out, "❌ Not found in database", &report.not_found, SHOW_NOT_FOUND)?;
    section(out, "⚠️  Already have POI Voltage", &report.already_set, SHOW_ALREADY_SET)?;
    section(out, "❗ Errors", &report.errors, SHOW_ERRORS)?;

    writeln!(out)?;
    rule(out)?;
    writeln!(out, "🧪 VERIFICATION - Sample data from database:")?;
    rule(out)?;
    if report.sample.is_empty() {
        writeln!(out, "  No projects with POI Voltage found in database")?;
    }
    for (project, kv) in &report.sample {
        writeln!(out, "  {}: {} KV", project, kv)?;
    }

    writeln!(out)?;
    writeln!(out, "📈 Database stats:")?;
    coverage_line(out, "before:", &report.coverage_before)?;
    coverage_line(out, "after:", &report.coverage_after)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{AlreadySet, UpdatedProject};
    use crate::sheet::VoltageCell;

    fn sample_report() -> ImportReport {
        ImportReport {
            entries_read: 16,
            blank_skipped: 1,
            updated: vec![UpdatedProject {
                project_name: "Alpha Solar".to_string(),
                voltage_kv: 230.0,
                records: 1,
            }],
            not_found: (1..=12).map(|i| format!("Missing {}", i)).collect(),
            already_set: vec![AlreadySet {
                project_name: "Beta Wind".to_string(),
                existing_kv: 110.0,
            }],
            errors: Vec::new(),
            coverage_before: VoltageCoverage {
                total: 20,
                with_voltage: 4,
            },
            coverage_after: VoltageCoverage {
                total: 20,
                with_voltage: 5,
            },
            sample: vec![("Alpha Solar".to_string(), 230.0)],
            committed: true,
        }
    }

    #[test]
    fn test_render_counts_and_truncation() {
        let text = render(&sample_report());

        assert!(text.contains("✅ Successfully updated: 1 projects (1 records)"));
        assert!(text.contains("  ✓ Alpha Solar -> 230 KV"));
        assert!(text.contains("❌ Not found in database (12 projects):"));
        assert!(text.contains("  - Missing 10\n"));
        assert!(!text.contains("  - Missing 11\n"));
        assert!(text.contains("  ... and 2 more"));
        assert!(text.contains("  - Beta Wind (has: 110 KV)"));
        assert!(!text.contains("Errors"));
        assert!(text.contains("before: 4/20 projects have POI Voltage (16 without)"));
        assert!(text.contains("after:  5/20 projects have POI Voltage (15 without)"));
        assert!(!text.contains("DRY RUN"));
    }

    #[test]
    fn test_render_dry_run_and_empty_sample() {
        let report = ImportReport {
            sample: Vec::new(),
            committed: false,
            ..sample_report()
        };
        let text = render(&report);

        assert!(text.contains("DRY RUN"));
        assert!(text.contains("No projects with POI Voltage found in database"));
    }

    #[test]
    fn test_preview_shows_first_rows() {
        let entries: Vec<SheetEntry> = (0..8)
            .map(|i| SheetEntry {
                row_number: i + 2,
                project_name: format!("Project {}", i),
                voltage: VoltageCell::Value(69.0),
            })
            .collect();
        let text = render_preview(&entries);

        assert!(text.starts_with("✅ Found 8 projects in sheet"));
        assert!(text.contains("Project 4 -> 69 KV"));
        assert!(!text.contains("Project 5"));
    }
}
