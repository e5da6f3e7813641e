//! Runtime configuration
//!
//! Settings come from the environment (optionally seeded from a `.env` file).
//! Database settings use the `POI_DB_` prefix, import settings `POI_IMPORT_`:
//!
//! ```text
//! POI_DB_HOST=localhost
//! POI_DB_PORT=5432
//! POI_DB_NAME=pipeline_dashboard
//! POI_DB_USER=dashboard_admin
//! POI_DB_PASSWORD=...
//! POI_IMPORT_FILE=kV_list.xlsx
//! POI_IMPORT_SHEET=Sheet1
//! ```

use crate::error::{ImportError, Result};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::path::PathBuf;
use validator::Validate;

pub const DB_ENV_PREFIX: &str = "POI_DB_";
pub const IMPORT_ENV_PREFIX: &str = "POI_IMPORT_";

#[derive(Debug, Validate)]
pub struct Settings {
    #[validate]
    pub database: DatabaseSettings,
    #[validate]
    pub import: ImportSettings,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DatabaseSettings {
    #[serde(default = "default_host")]
    #[validate(length(min = 1))]
    pub host: String,
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,
    #[serde(default = "default_database_name")]
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default = "default_user")]
    #[validate(length(min = 1))]
    pub user: String,
    pub password: Secret<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ImportSettings {
    #[serde(default = "default_file")]
    pub file: PathBuf,
    pub sheet: Option<String>,
    #[serde(default = "default_schema")]
    #[validate(custom = "validate_identifier")]
    pub schema: String,
    #[serde(default = "default_table")]
    #[validate(custom = "validate_identifier")]
    pub table: String,
    #[serde(default = "default_updated_by")]
    #[validate(length(min = 1, max = 100))]
    pub updated_by: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_database_name() -> String {
    "pipeline_dashboard".to_string()
}

fn default_user() -> String {
    "dashboard_admin".to_string()
}

fn default_file() -> PathBuf {
    PathBuf::from("kV_list.xlsx")
}

fn default_schema() -> String {
    "pipeline_dashboard".to_string()
}

fn default_table() -> String {
    "projects".to_string()
}

fn default_updated_by() -> String {
    "import_script".to_string()
}

impl Settings {
    /// Load settings from `.env` (if present) and the process environment
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Build settings from an explicit set of variables
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();

        let database = envy::prefixed(DB_ENV_PREFIX)
            .from_iter::<_, DatabaseSettings>(vars.iter().cloned())
            .map_err(|e| ImportError::Config(format!("{}*: {}", DB_ENV_PREFIX, e)))?;
        let import = envy::prefixed(IMPORT_ENV_PREFIX)
            .from_iter::<_, ImportSettings>(vars)
            .map_err(|e| ImportError::Config(format!("{}*: {}", IMPORT_ENV_PREFIX, e)))?;

        let settings = Settings { database, import };
        settings
            .validate()
            .map_err(|e| ImportError::Config(e.to_string()))?;

        Ok(settings)
    }
}

impl DatabaseSettings {
    /// Connection parameters for the blocking PostgreSQL client
    pub fn pg_config(&self) -> postgres::Config {
        let mut config = postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.name)
            .user(&self.user)
            .password(self.password.expose_secret())
            .application_name("poi-import");
        config
    }

    /// Human-readable target without the password
    pub fn describe(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.name)
    }
}

impl ImportSettings {
    /// Fully qualified, quoted name of the projects table
    pub fn qualified_table(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.table)
    }
}

// Schema and table names are spliced into SQL, so only plain identifiers pass
fn validate_identifier(ident: &str) -> std::result::Result<(), validator::ValidationError> {
    let mut chars = ident.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && ident.len() <= 63;

    if valid {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_identifier"))
    }
}
