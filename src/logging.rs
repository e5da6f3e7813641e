//! Diagnostic logging setup

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "poi_import=info";

/// Load `.env` and install the stderr subscriber
///
/// `.env` is read first so a `RUST_LOG` kept there takes effect.
pub fn init() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// `RUST_LOG` from the environment, or [`DEFAULT_FILTER`]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_rust_log_from_dotenv_file_drives_filter() {
        std::env::remove_var("RUST_LOG");
        assert_eq!(env_filter().to_string(), DEFAULT_FILTER);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "RUST_LOG=poi_import=debug").unwrap();

        dotenv::from_path(&path).unwrap();
        assert_eq!(env_filter().to_string(), "poi_import=debug");

        std::env::remove_var("RUST_LOG");
    }
}
