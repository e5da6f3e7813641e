//! Access to the projects table
//!
//! [`ProjectStore`] is everything reconciliation needs from the database. The
//! PostgreSQL implementation runs every statement inside one transaction;
//! nothing is visible to other sessions until [`ProjectStore::commit`].

use crate::config::{DatabaseSettings, ImportSettings};
use crate::error::Result;
use chrono::{DateTime, Utc};
use postgres::{Client, NoTls, Transaction};
use tracing::{debug, info};

/// What a case-insensitive name lookup found
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProjectMatch {
    /// Number of records with that name
    pub count: i64,
    /// Highest voltage stored across those records, if any has one
    pub existing_kv: Option<f64>,
}

/// How many projects carry a POI voltage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoltageCoverage {
    pub total: i64,
    pub with_voltage: i64,
}

impl VoltageCoverage {
    pub fn without_voltage(&self) -> i64 {
        self.total - self.with_voltage
    }
}

/// Metadata stamped on every record this import modifies
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl Provenance {
    pub fn now(updated_by: impl Into<String>) -> Self {
        Provenance {
            updated_by: updated_by.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Transactional view of the projects table
pub trait ProjectStore {
    /// Count records matching `project_name` and report the highest stored voltage
    fn find_matches(&mut self, project_name: &str) -> Result<ProjectMatch>;

    /// Set the voltage on every matching record that has none yet
    ///
    /// Returns the number of records changed.
    fn apply_voltage(&mut self, project_name: &str, kv: f64, stamp: &Provenance) -> Result<u64>;

    /// Up to `limit` projects that have a voltage, ordered by name
    fn sample_with_voltage(&mut self, limit: i64) -> Result<Vec<(String, f64)>>;

    fn coverage(&mut self) -> Result<VoltageCoverage>;

    fn commit(self) -> Result<()>
    where
        Self: Sized;

    fn rollback(self) -> Result<()>
    where
        Self: Sized;
}

/// Open the single connection used for the run
pub fn connect(settings: &DatabaseSettings) -> Result<Client> {
    info!(target_db = %settings.describe(), "connecting to database");
    let client = settings.pg_config().connect(NoTls)?;
    Ok(client)
}

/// SQL for one projects table, built once per run
#[derive(Debug, Clone)]
struct Statements {
    find: String,
    update: String,
    sample: String,
    coverage: String,
}

impl Statements {
    fn for_table(table: &str) -> Self {
        // Exact match ignoring case and stray whitespace around stored names
        let name_match = "lower(btrim(project_name)) = lower($1::text)";

        Statements {
            find: format!(
                "SELECT COUNT(*), MAX(poi_voltage_kv)::float8 FROM {} WHERE {}",
                table, name_match
            ),
            update: format!(
                "UPDATE {} \
                 SET poi_voltage_kv = $2::float8, updated_at = $3::timestamptz, updated_by = $4::text \
                 WHERE {} AND poi_voltage_kv IS NULL",
                table, name_match
            ),
            sample: format!(
                "SELECT project_name::text, poi_voltage_kv::float8 FROM {} \
                 WHERE poi_voltage_kv IS NOT NULL ORDER BY project_name LIMIT $1",
                table
            ),
            coverage: format!(
                "SELECT COUNT(*), COUNT(poi_voltage_kv) FROM {}",
                table
            ),
        }
    }
}

/// [`ProjectStore`] over an open PostgreSQL transaction
pub struct PgProjectStore<'a> {
    tx: Transaction<'a>,
    statements: Statements,
}

impl<'a> PgProjectStore<'a> {
    /// Begin the run's transaction on `client`
    pub fn begin(client: &'a mut Client, settings: &ImportSettings) -> Result<Self> {
        let tx = client.transaction()?;
        let table = settings.qualified_table();
        debug!(%table, "transaction started");

        Ok(PgProjectStore {
            tx,
            statements: Statements::for_table(&table),
        })
    }
}

impl ProjectStore for PgProjectStore<'_> {
    fn find_matches(&mut self, project_name: &str) -> Result<ProjectMatch> {
        let row = self.tx.query_one(self.statements.find.as_str(), &[&project_name])?;
        Ok(ProjectMatch {
            count: row.get(0),
            existing_kv: row.get(1),
        })
    }

    fn apply_voltage(&mut self, project_name: &str, kv: f64, stamp: &Provenance) -> Result<u64> {
        let changed = self.tx.execute(
            self.statements.update.as_str(),
            &[&project_name, &kv, &stamp.updated_at, &stamp.updated_by],
        )?;
        Ok(changed)
    }

    fn sample_with_voltage(&mut self, limit: i64) -> Result<Vec<(String, f64)>> {
        let rows = self.tx.query(self.statements.sample.as_str(), &[&limit])?;
        Ok(rows.iter().map(|row| (row.get(0), row.get(1))).collect())
    }

    fn coverage(&mut self) -> Result<VoltageCoverage> {
        let row = self.tx.query_one(self.statements.coverage.as_str(), &[])?;
        Ok(VoltageCoverage {
            total: row.get(0),
            with_voltage: row.get(1),
        })
    }

    fn commit(self) -> Result<()> {
        self.tx.commit()?;
        debug!("transaction committed");
        Ok(())
    }

    fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        debug!("transaction rolled back");
        Ok(())
    }
}
