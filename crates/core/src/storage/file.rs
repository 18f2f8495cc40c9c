use crate::domain::record::ClassificationRecord;
use crate::domain::strength::StrengthSnapshot;
use crate::error::EngineError;
use crate::storage::codec;
use crate::storage::ledger::{ensure_partition, replace_partition, HistoryStore, UpsertOutcome};
use crate::storage::snapshot::{infer_as_of_date, LoadedSnapshot, SnapshotStore};
use anyhow::Context;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Writes `bytes` to a sibling temp file, syncs it, then renames it over `path`. Readers see
/// either the old file or the new one, never a partial write.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| EngineError::storage(format!("create dir {} failed", parent.display())))?;
    }

    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    if let Err(err) = write_and_sync(&tmp_path, bytes).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(err);
    }

    if let Err(err) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(anyhow::Error::new(err)
            .context(EngineError::storage(format!("replace {} failed", path.display()))));
    }
    Ok(())
}

async fn write_and_sync(tmp_path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let mut file = tokio::fs::File::create(tmp_path)
        .await
        .with_context(|| EngineError::storage(format!("create {} failed", tmp_path.display())))?;
    file.write_all(bytes)
        .await
        .with_context(|| EngineError::storage(format!("write {} failed", tmp_path.display())))?;
    file.sync_all()
        .await
        .with_context(|| EngineError::storage(format!("sync {} failed", tmp_path.display())))?;
    Ok(())
}

async fn read_optional(path: &Path) -> anyhow::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(anyhow::Error::new(err)
            .context(EngineError::storage(format!("read {} failed", path.display())))),
    }
}

/// Ledger kept as a single CSV file, rewritten whole on every upsert.
#[derive(Debug, Clone)]
pub struct CsvLedgerStore {
    path: PathBuf,
}

impl CsvLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl HistoryStore for CsvLedgerStore {
    fn backend_name(&self) -> &'static str {
        "csv"
    }

    async fn upsert(
        &self,
        date: NaiveDate,
        records: &[ClassificationRecord],
    ) -> anyhow::Result<UpsertOutcome> {
        ensure_partition(date, records)?;

        let mut ledger = self.read_all().await?;
        let outcome = replace_partition(&mut ledger, date, records);
        let bytes = codec::encode_ledger(&ledger)?;
        write_atomic(&self.path, &bytes).await?;

        tracing::debug!(
            %date,
            path = %self.path.display(),
            replaced = outcome.replaced,
            inserted = outcome.inserted,
            ledger_rows = ledger.len(),
            "ledger file rewritten"
        );
        Ok(outcome)
    }

    async fn read_all(&self) -> anyhow::Result<Vec<ClassificationRecord>> {
        match read_optional(&self.path).await? {
            Some(bytes) => codec::decode_ledger(&bytes)
                .with_context(|| format!("decode {} failed", self.path.display())),
            None => Ok(Vec::new()),
        }
    }
}

/// Snapshot kept as a single CSV file, fully replaced on every write.
#[derive(Debug, Clone)]
pub struct CsvSnapshotStore {
    path: PathBuf,
}

impl CsvSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl SnapshotStore for CsvSnapshotStore {
    fn backend_name(&self) -> &'static str {
        "csv"
    }

    async fn write(&self, snapshot: &StrengthSnapshot, run_id: Uuid) -> anyhow::Result<()> {
        let bytes = codec::encode_snapshot(&snapshot.rows)?;
        write_atomic(&self.path, &bytes).await?;
        tracing::debug!(
            as_of_date = %snapshot.as_of_date,
            %run_id,
            path = %self.path.display(),
            rows = snapshot.rows.len(),
            "snapshot file rewritten"
        );
        Ok(())
    }

    async fn read_latest(&self) -> anyhow::Result<Option<LoadedSnapshot>> {
        let Some(bytes) = read_optional(&self.path).await? else {
            return Ok(None);
        };
        let rows = codec::decode_snapshot(&bytes)
            .with_context(|| format!("decode {} failed", self.path.display()))?;
        Ok(Some(LoadedSnapshot {
            as_of_date: infer_as_of_date(&rows),
            rows,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::test_support::{day, record};
    use crate::engine::snapshot::build_snapshot;
    use crate::error::{kind_of, ErrorKind};

    #[tokio::test]
    async fn missing_ledger_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvLedgerStore::new(dir.path().join("themes_history.csv"));
        assert!(store.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_overwrites_only_its_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvLedgerStore::new(dir.path().join("exports").join("themes_history.csv"));
        let d1 = day(2026, 2, 10);
        let d2 = day(2026, 2, 11);

        store.upsert(d1, &[record(d1, "HBM메모리", "000660", 2)]).await.unwrap();
        store.upsert(d2, &[record(d2, "HBM메모리", "000660", 5)]).await.unwrap();
        let outcome = store
            .upsert(d2, &[record(d2, "방산", "012450", 1)])
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome { replaced: 1, inserted: 1 });

        let all = store.read_all().await.unwrap();
        assert_eq!(all, vec![record(d1, "HBM메모리", "000660", 2), record(d2, "방산", "012450", 1)]);
        assert_eq!(store.read_date(d1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repeated_upsert_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("themes_history.csv");
        let store = CsvLedgerStore::new(&path);
        let d = day(2026, 2, 11);
        let batch = vec![record(d, "HBM메모리", "000660", 2), record(d, "방산", "012450", 1)];

        store.upsert(d, &batch).await.unwrap();
        let first = std::fs::read(&path).unwrap();
        store.upsert(d, &batch).await.unwrap();
        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);
        assert!(!dir.path().join("themes_history.csv.tmp").exists());
    }

    #[tokio::test]
    async fn mismatched_record_date_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("themes_history.csv");
        let store = CsvLedgerStore::new(&path);
        let d = day(2026, 2, 11);
        store.upsert(d, &[record(d, "HBM메모리", "000660", 2)]).await.unwrap();
        let before = std::fs::read(&path).unwrap();

        let err = store
            .upsert(d, &[record(day(2026, 2, 12), "방산", "012450", 1)])
            .await
            .unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::InvalidInput));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn unwritable_target_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        // The target path is an existing directory, so the final rename must fail.
        let target = dir.path().join("themes_history.csv");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"x").unwrap();

        let err = write_atomic(&target, b"data").await.unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::Storage));
    }

    #[tokio::test]
    async fn snapshot_round_trips_and_infers_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvSnapshotStore::new(dir.path().join("themes_strength.csv"));
        assert!(store.read_latest().await.unwrap().is_none());

        let d = day(2026, 2, 11);
        let ledger = vec![
            record(day(2026, 2, 10), "HBM메모리", "000660", 2),
            record(d, "HBM메모리", "000660", 1),
            record(day(2026, 2, 1), "방산", "012450", 3),
        ];
        let snapshot = build_snapshot(&ledger, d).unwrap();
        store.write(&snapshot, Uuid::new_v4()).await.unwrap();

        let loaded = store.read_latest().await.unwrap().unwrap();
        assert_eq!(loaded.as_of_date, Some(d));
        assert_eq!(loaded.rows, snapshot.rows);
    }
}
