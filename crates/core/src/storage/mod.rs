pub mod codec;
pub mod file;
pub mod ledger;
pub mod lock;
pub mod pg_ledger;
pub mod pg_snapshot;
pub mod snapshot;

use crate::config::{Settings, StorageBackend};
use crate::error::EngineError;
use anyhow::Context;
use std::sync::Arc;

pub use ledger::{HistoryStore, UpsertOutcome};
pub use snapshot::{LoadedSnapshot, SnapshotStore};

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// The ledger and snapshot stores for one backend. `pool` is set for Postgres only.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn HistoryStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub pool: Option<sqlx::PgPool>,
}

impl Stores {
    pub fn csv(settings: &Settings) -> Self {
        Self {
            ledger: Arc::new(file::CsvLedgerStore::new(&settings.ledger_path)),
            snapshots: Arc::new(file::CsvSnapshotStore::new(&settings.snapshot_path)),
            pool: None,
        }
    }

    pub fn postgres(pool: sqlx::PgPool, settings: &Settings) -> Self {
        Self {
            ledger: Arc::new(pg_ledger::PgLedgerStore::new(
                pool.clone(),
                settings.db_insert_batch,
            )),
            snapshots: Arc::new(pg_snapshot::PgSnapshotStore::new(
                pool.clone(),
                settings.db_insert_batch,
            )),
            pool: Some(pool),
        }
    }

    /// Connects (and migrates, for Postgres) according to `backend`.
    pub async fn open(settings: &Settings, backend: StorageBackend) -> anyhow::Result<Self> {
        match backend {
            StorageBackend::Csv => Ok(Self::csv(settings)),
            StorageBackend::Postgres => {
                let db_url = settings.require_database_url()?;
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(5)
                    .connect(db_url)
                    .await
                    .context(EngineError::storage("connect DATABASE_URL failed"))?;
                migrate(&pool)
                    .await
                    .context(EngineError::storage("schema migration failed"))?;
                Ok(Self::postgres(pool, settings))
            }
        }
    }
}
