//! # poi-import
//!
//! Backfills point-of-interconnection (POI) voltages from an Excel sheet into
//! the pipeline dashboard's `projects` table.
//!
//! The sheet needs a `Project Name` and a `POI Voltage (KV)` column. Each row
//! with a usable voltage is matched to projects by name (exact, ignoring case)
//! and only fills in voltages that are still empty; existing values are never
//! overwritten. All changes go through a single transaction.
//!
//! ```no_run
//! use poi_import::config::Settings;
//! use poi_import::reconcile::{run_import, ImportOptions};
//! use poi_import::store::{connect, PgProjectStore, Provenance};
//!
//! let settings = Settings::load()?;
//! let entries = poi_import::sheet::load_entries(&settings.import.file, None)?;
//!
//! let mut client = connect(&settings.database)?;
//! let store = PgProjectStore::begin(&mut client, &settings.import)?;
//! let options = ImportOptions {
//!     provenance: Provenance::now(settings.import.updated_by.clone()),
//!     dry_run: false,
//! };
//! let report = run_import(store, &entries, &options)?;
//! print!("{}", poi_import::report::render(&report));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod reconcile;
pub mod report;
pub mod sheet;
pub mod store;
pub mod streaming_reader;
pub mod types;

pub use error::{ImportError, Result};
pub use reconcile::{run_import, ImportOptions, ImportReport};
pub use sheet::{load_entries, SheetEntry, VoltageCell};
pub use store::{PgProjectStore, ProjectStore, Provenance};
