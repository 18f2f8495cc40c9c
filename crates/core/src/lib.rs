pub mod domain;
pub mod engine;
pub mod error;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    const DEFAULT_EXPORT_DIR: &str = "data/exports";
    const DEFAULT_DB_INSERT_BATCH: usize = 200;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum StorageBackend {
        Csv,
        Postgres,
    }

    impl std::str::FromStr for StorageBackend {
        type Err = anyhow::Error;

        fn from_str(s: &str) -> anyhow::Result<Self> {
            match s.trim().to_ascii_lowercase().as_str() {
                "csv" | "file" => Ok(Self::Csv),
                "postgres" | "pg" => Ok(Self::Postgres),
                other => anyhow::bail!("unknown storage backend: {other} (expected csv or postgres)"),
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub storage_backend: StorageBackend,
        pub export_dir: PathBuf,
        pub ledger_path: PathBuf,
        pub snapshot_path: PathBuf,
        pub db_insert_batch: usize,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let storage_backend = match std::env::var("THEME_STORAGE_BACKEND") {
                Ok(s) if !s.trim().is_empty() => s.parse()?,
                _ => StorageBackend::Csv,
            };

            let export_dir = std::env::var("THEME_EXPORT_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIR));

            let ledger_path = std::env::var("THEME_LEDGER_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| export_dir.join("themes_history.csv"));

            let snapshot_path = std::env::var("THEME_SNAPSHOT_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| export_dir.join("themes_strength.csv"));

            let db_insert_batch = std::env::var("THEME_DB_INSERT_BATCH")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(DEFAULT_DB_INSERT_BATCH);
            anyhow::ensure!(db_insert_batch >= 1, "THEME_DB_INSERT_BATCH must be >= 1");

            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                storage_backend,
                export_dir,
                ledger_path,
                snapshot_path,
                db_insert_batch,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parses_backend_aliases() {
            assert_eq!("CSV".parse::<StorageBackend>().unwrap(), StorageBackend::Csv);
            assert_eq!(" pg ".parse::<StorageBackend>().unwrap(), StorageBackend::Postgres);
            assert!("sqlite".parse::<StorageBackend>().is_err());
        }
    }
}
