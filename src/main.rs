//! Command-line entry point for the POI voltage import

use anyhow::Context;
use clap::Parser;
use poi_import::config::Settings;
use poi_import::store::{connect, PgProjectStore, Provenance};
use poi_import::{load_entries, logging, report, run_import, ImportOptions};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "poi-import")]
#[command(version, about = "Backfill POI voltages from an Excel sheet into the projects table", long_about = None)]
struct Cli {
    /// Workbook to read (overrides POI_IMPORT_FILE)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Sheet to read; defaults to the first sheet (overrides POI_IMPORT_SHEET)
    #[arg(short, long)]
    sheet: Option<String>,

    /// Run everything, then roll back instead of committing
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    println!("🚀 POI Voltage Import");
    println!("{}", "=".repeat(60));

    let mut settings = Settings::load().context("Failed to load settings")?;
    if let Some(file) = cli.file {
        settings.import.file = file;
    }
    if let Some(sheet) = cli.sheet {
        settings.import.sheet = Some(sheet);
    }

    println!("📖 Reading {}...", settings.import.file.display());
    let entries = load_entries(&settings.import.file, settings.import.sheet.as_deref())
        .with_context(|| format!("Failed to load {}", settings.import.file.display()))?;
    print!("{}", report::render_preview(&entries));

    println!();
    println!("🔗 Connecting to {}...", settings.database.describe());
    let mut client = connect(&settings.database).context("Failed to connect to database")?;

    let options = ImportOptions {
        provenance: Provenance::now(settings.import.updated_by.clone()),
        dry_run: cli.dry_run,
    };

    let outcome = PgProjectStore::begin(&mut client, &settings.import)
        .and_then(|store| run_import(store, &entries, &options));

    drop(client);

    let summary = match outcome {
        Ok(summary) => summary,
        Err(err) => {
            println!("\n🔌 Database connection closed");
            let headline = if err.is_rollback() {
                "Import failed; no changes were saved"
            } else {
                "Import failed"
            };
            return Err(anyhow::Error::new(err).context(headline));
        }
    };

    print!("{}", report::render(&summary));
    info!(
        updated = summary.updated.len(),
        not_found = summary.not_found.len(),
        already_set = summary.already_set.len(),
        errors = summary.errors.len(),
        "import finished"
    );

    println!("\n🔌 Database connection closed");
    println!("\n✨ Import process completed!");
    Ok(())
}
