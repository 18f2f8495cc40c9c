pub mod decay;
pub mod digest;
pub mod snapshot;
pub mod trend;

use crate::domain::record::{validate_batch, ClassificationRecord};
use crate::domain::strength::StrengthSnapshot;
use crate::error::EngineError;
use crate::storage::ledger::replace_partition;
use crate::storage::{HistoryStore, SnapshotStore};
use chrono::NaiveDate;
use digest::DailyDigest;
use serde::Serialize;
use snapshot::TrendCounts;
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum DayInput {
    /// The complete classification output for the reference date. Empty means "nothing observed".
    Records(Vec<ClassificationRecord>),
    /// Leave the ledger alone and only rebuild the snapshot.
    RecomputeOnly,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub as_of_date: NaiveDate,
    pub dry_run: bool,
    pub dates_upserted: Vec<NaiveDate>,
    pub records_in: usize,
    pub replaced: usize,
    pub ledger_rows: usize,
    pub ledger_dates: usize,
    pub snapshot_rows: usize,
    pub trends: TrendCounts,
    pub digest: DailyDigest,
}

/// One daily run: validate → upsert → read ledger → aggregate/classify → replace snapshot.
///
/// The snapshot is computed from the would-be ledger before anything is written, so input and
/// integrity failures leave both artifacts untouched. Re-running with the same input is
/// idempotent; a storage failure mid-way is fixed by re-running.
pub async fn run_daily(
    ledger: &dyn HistoryStore,
    snapshots: &dyn SnapshotStore,
    as_of_date: NaiveDate,
    input: DayInput,
    dry_run: bool,
) -> anyhow::Result<RunSummary> {
    let batches = match input {
        DayInput::Records(records) => vec![(as_of_date, records)],
        DayInput::RecomputeOnly => Vec::new(),
    };

    let existing = ledger.read_all().await?;
    if let Some(latest) = existing.iter().map(|r| r.date).max() {
        if latest > as_of_date {
            return Err(EngineError::invalid_input(format!(
                "ledger already holds records for {latest}, after the reference date {as_of_date}; \
                 use a backfill run to fill earlier dates"
            ))
            .into());
        }
    }

    execute(ledger, snapshots, existing, batches, as_of_date, dry_run).await
}

/// Fills several dates in one run. Batches are applied in ascending date order and the snapshot
/// is rebuilt once, as of the latest date in either the input or the ledger.
///
/// `not_after` is the run's own reference date; batches dated after it are rejected.
pub async fn run_backfill(
    ledger: &dyn HistoryStore,
    snapshots: &dyn SnapshotStore,
    not_after: NaiveDate,
    mut batches: Vec<(NaiveDate, Vec<ClassificationRecord>)>,
    dry_run: bool,
) -> anyhow::Result<RunSummary> {
    if batches.is_empty() {
        return Err(EngineError::invalid_input("backfill needs at least one dated batch").into());
    }

    batches.sort_by_key(|(date, _)| *date);
    let mut dates = BTreeSet::new();
    for (date, _) in &batches {
        if !dates.insert(*date) {
            return Err(EngineError::invalid_input(format!(
                "backfill input has more than one batch for {date}"
            ))
            .into());
        }
    }

    if let Some((latest, _)) = batches.last() {
        if *latest > not_after {
            return Err(EngineError::invalid_input(format!(
                "backfill input is dated {latest}, after the reference date {not_after}"
            ))
            .into());
        }
    }

    let existing = ledger.read_all().await?;
    if let Some(latest) = existing.iter().map(|r| r.date).max() {
        if latest > not_after {
            return Err(EngineError::invalid_input(format!(
                "ledger already holds records for {latest}, after the reference date {not_after}"
            ))
            .into());
        }
    }

    let reference_date = batches
        .iter()
        .map(|(d, _)| *d)
        .chain(existing.iter().map(|r| r.date))
        .max()
        .unwrap_or(batches[0].0);

    execute(ledger, snapshots, existing, batches, reference_date, dry_run).await
}

async fn execute(
    ledger: &dyn HistoryStore,
    snapshots: &dyn SnapshotStore,
    existing: Vec<ClassificationRecord>,
    batches: Vec<(NaiveDate, Vec<ClassificationRecord>)>,
    reference_date: NaiveDate,
    dry_run: bool,
) -> anyhow::Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let t0 = std::time::Instant::now();

    for (date, records) in &batches {
        validate_batch(*date, records)?;
    }

    // Preview the ledger as it will be after the upserts; nothing is written if this fails.
    let mut expected = existing;
    let mut replaced = 0;
    for (date, records) in &batches {
        replaced += replace_partition(&mut expected, *date, records).replaced;
    }
    let preview = snapshot::build_snapshot(&expected, reference_date)?;
    let records_in: usize = batches.iter().map(|(_, r)| r.len()).sum();
    let dates_upserted: Vec<NaiveDate> = batches.iter().map(|(d, _)| *d).collect();

    tracing::info!(
        %run_id,
        %reference_date,
        dry_run,
        ledger_backend = ledger.backend_name(),
        snapshot_backend = snapshots.backend_name(),
        dates = dates_upserted.len(),
        records_in,
        "theme strength run started"
    );

    let (ledger_rows, snapshot) = if dry_run {
        (expected, preview)
    } else {
        for (date, records) in &batches {
            let outcome = ledger.upsert(*date, records).await?;
            tracing::info!(
                %run_id,
                %date,
                replaced = outcome.replaced,
                inserted = outcome.inserted,
                "ledger partition replaced"
            );
        }

        let persisted = ledger.read_all().await?;
        if persisted != expected {
            return Err(EngineError::integrity(format!(
                "ledger read back after upsert differs from the expected contents \
                 ({} rows stored, {} expected); was another run writing concurrently?",
                persisted.len(),
                expected.len()
            ))
            .into());
        }

        let snapshot = snapshot::build_snapshot(&persisted, reference_date)?;
        snapshots.write(&snapshot, run_id).await?;
        (persisted, snapshot)
    };

    let summary = summarize(
        run_id,
        reference_date,
        dry_run,
        dates_upserted,
        records_in,
        replaced,
        &ledger_rows,
        &snapshot,
    );

    tracing::info!(
        %run_id,
        %reference_date,
        dry_run,
        ledger_rows = summary.ledger_rows,
        ledger_dates = summary.ledger_dates,
        snapshot_rows = summary.snapshot_rows,
        new = summary.trends.new,
        active = summary.trends.active,
        inactive = summary.trends.inactive,
        new_themes = summary.digest.new_themes.len(),
        new_entries = summary.digest.new_entry_count(),
        elapsed_ms = t0.elapsed().as_millis(),
        "theme strength run finished"
    );

    Ok(summary)
}

#[allow(clippy::too_many_arguments)]
fn summarize(
    run_id: Uuid,
    as_of_date: NaiveDate,
    dry_run: bool,
    dates_upserted: Vec<NaiveDate>,
    records_in: usize,
    replaced: usize,
    ledger: &[ClassificationRecord],
    snapshot: &StrengthSnapshot,
) -> RunSummary {
    let ledger_dates = ledger.iter().map(|r| r.date).collect::<BTreeSet<_>>().len();
    RunSummary {
        run_id,
        as_of_date,
        dry_run,
        dates_upserted,
        records_in,
        replaced,
        ledger_rows: ledger.len(),
        ledger_dates,
        snapshot_rows: snapshot.rows.len(),
        trends: TrendCounts::of(&snapshot.rows),
        digest: digest::daily_digest(ledger, as_of_date),
    }
}
