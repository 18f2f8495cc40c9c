//! Exponential recency decay over the ledger.
//!
//! `strength_score = Σ mention_count × DECAY_RATE^days_ago` per tuple. Same-day mentions weigh
//! 1.0, a week-old mention ≈0.32 and a month-old mention ≈0.008.

use crate::domain::record::{ClassificationRecord, TupleKey};
use crate::error::EngineError;
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub const DECAY_RATE: f64 = 0.85;

/// Mentions older than this many days weigh exactly 0.0. `0.85^4000` is already below 1e-280.
pub const DECAY_HORIZON_DAYS: u32 = 4000;

/// Per-tuple fold of the ledger as of a reference date.
#[derive(Debug, Clone, PartialEq)]
pub struct TupleAggregate {
    /// Unrounded.
    pub strength_score: f64,
    pub mention_total: u64,
    pub last_mention_count: u64,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    pub days_count: u32,
    /// From the most recent record of the tuple.
    pub stock_name: String,
    pub last_reason: String,
}

/// Weights `DECAY_RATE^k` for `k in 0..=min(max_days, DECAY_HORIZON_DAYS)`, built by repeated
/// multiplication so the values do not depend on the platform's `pow` implementation.
#[derive(Debug, Clone)]
pub struct DecayTable {
    weights: Vec<f64>,
}

impl DecayTable {
    pub fn up_to(max_days: u32) -> Self {
        let max_days = max_days.min(DECAY_HORIZON_DAYS);
        let mut weights = Vec::with_capacity(max_days as usize + 1);
        let mut w = 1.0_f64;
        weights.push(w);
        for _ in 0..max_days {
            w *= DECAY_RATE;
            weights.push(w);
        }
        Self { weights }
    }

    pub fn weight(&self, days_ago: u32) -> f64 {
        // Repeated multiplication bottoms out at the smallest subnormal, never 0.0, so the
        // cut-off is explicit.
        self.weights.get(days_ago as usize).copied().unwrap_or(0.0)
    }
}

pub fn decay_weight(days_ago: u32) -> f64 {
    DecayTable::up_to(days_ago).weight(days_ago)
}

fn days_ago(reference_date: NaiveDate, date: NaiveDate) -> Result<u32, EngineError> {
    let days = (reference_date - date).num_days();
    if days < 0 {
        return Err(EngineError::invalid_input(format!(
            "ledger record dated {date} is after the reference date {reference_date}"
        )));
    }
    u32::try_from(days)
        .map_err(|_| EngineError::invalid_input(format!("record date {date} is too old")))
}

/// Folds the full ledger into one aggregate per tuple.
///
/// Records dated after `reference_date` are rejected. Within a tuple, contributions are summed
/// in (date, mention_count) order so the result does not depend on ledger row order.
pub fn aggregate(
    ledger: &[ClassificationRecord],
    reference_date: NaiveDate,
) -> anyhow::Result<BTreeMap<TupleKey, TupleAggregate>> {
    let mut groups: BTreeMap<TupleKey, Vec<&ClassificationRecord>> = BTreeMap::new();
    let mut max_days: u32 = 0;
    for record in ledger {
        max_days = max_days.max(days_ago(reference_date, record.date)?);
        groups.entry(record.key()).or_default().push(record);
    }

    let table = DecayTable::up_to(max_days);
    let mut out = BTreeMap::new();
    for (key, mut records) in groups {
        // Stable: same-date records keep ledger order, so the last one is the latest submission.
        records.sort_by_key(|r| r.date);

        let mut terms: Vec<(NaiveDate, u32)> =
            records.iter().map(|r| (r.date, r.mention_count)).collect();
        terms.sort_unstable();

        let mut strength_score = 0.0_f64;
        for (date, count) in &terms {
            strength_score += f64::from(*count) * table.weight(days_ago(reference_date, *date)?);
        }

        let mention_total: u64 = terms.iter().map(|(_, c)| u64::from(*c)).sum();
        let last_mention_count: u64 = terms
            .iter()
            .filter(|(d, _)| *d == reference_date)
            .map(|(_, c)| u64::from(*c))
            .sum();

        let mut dates: Vec<NaiveDate> = terms.iter().map(|(d, _)| *d).collect();
        dates.dedup();

        let (Some(first), Some(latest)) = (records.first(), records.last()) else {
            continue;
        };

        out.insert(
            key,
            TupleAggregate {
                strength_score,
                mention_total,
                last_mention_count,
                first_seen: first.date,
                last_seen: latest.date,
                days_count: dates.len() as u32,
                stock_name: latest.stock_name.clone(),
                last_reason: latest.reason.clone(),
            },
        );
    }

    Ok(out)
}
