use crate::domain::record::ClassificationRecord;
use crate::error::EngineError;
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Rows previously stored for the date and now discarded.
    pub replaced: usize,
    pub inserted: usize,
}

/// Append-growing ledger of daily classification records, partitioned by date.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Replaces every stored record for `date` with `records`, all-or-nothing. Other dates are
    /// untouched. An empty `records` clears the date.
    async fn upsert(
        &self,
        date: NaiveDate,
        records: &[ClassificationRecord],
    ) -> anyhow::Result<UpsertOutcome>;

    /// Full ledger, date ascending, submission order within a date.
    async fn read_all(&self) -> anyhow::Result<Vec<ClassificationRecord>>;

    async fn read_date(&self, date: NaiveDate) -> anyhow::Result<Vec<ClassificationRecord>> {
        let mut all = self.read_all().await?;
        all.retain(|r| r.date == date);
        Ok(all)
    }
}

pub fn ensure_partition(
    date: NaiveDate,
    records: &[ClassificationRecord],
) -> Result<(), EngineError> {
    match records.iter().find(|r| r.date != date) {
        Some(r) => Err(EngineError::invalid_input(format!(
            "record {} dated {} cannot be stored under {date}",
            r.key(),
            r.date
        ))),
        None => Ok(()),
    }
}

/// Drops the `date` partition from `ledger`, appends `records`, and restores date order.
/// The sort is stable so submission order survives within each date.
pub fn replace_partition(
    ledger: &mut Vec<ClassificationRecord>,
    date: NaiveDate,
    records: &[ClassificationRecord],
) -> UpsertOutcome {
    let before = ledger.len();
    ledger.retain(|r| r.date != date);
    let replaced = before - ledger.len();

    ledger.extend_from_slice(records);
    ledger.sort_by_key(|r| r.date);

    UpsertOutcome {
        replaced,
        inserted: records.len(),
    }
}
