use crate::domain::strength::{StrengthRecord, StrengthSnapshot, Trend};
use chrono::NaiveDate;
use uuid::Uuid;

/// A snapshot as read back. The file format has no reference-date column, so the date is only
/// known when some row was seen on it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSnapshot {
    pub as_of_date: Option<NaiveDate>,
    pub rows: Vec<StrengthRecord>,
}

#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Fully replaces the previous snapshot.
    async fn write(&self, snapshot: &StrengthSnapshot, run_id: Uuid) -> anyhow::Result<()>;

    async fn read_latest(&self) -> anyhow::Result<Option<LoadedSnapshot>>;
}

/// NEW and ACTIVE rows have `last_seen == reference date`.
pub fn infer_as_of_date(rows: &[StrengthRecord]) -> Option<NaiveDate> {
    rows.iter()
        .filter(|r| matches!(r.trend, Trend::New | Trend::Active))
        .map(|r| r.last_seen)
        .max()
}
