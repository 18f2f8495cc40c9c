use crate::domain::record::ClassificationRecord;
use crate::domain::strength::{StrengthRecord, StrengthSnapshot, Trend};
use crate::engine::{decay, trend};
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;

/// Published precision of `strength_score`.
pub fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

/// Recomputes the whole strength table from the ledger. One row per tuple ever seen, ordered by
/// descending score then tuple key so identical input gives identical output.
pub fn build_snapshot(
    ledger: &[ClassificationRecord],
    reference_date: NaiveDate,
) -> anyhow::Result<StrengthSnapshot> {
    let aggregates = decay::aggregate(ledger, reference_date)?;

    let mut rows = Vec::with_capacity(aggregates.len());
    for (key, agg) in aggregates {
        let trend = trend::classify(agg.first_seen, agg.last_seen, reference_date)
            .map_err(|e| anyhow::Error::new(e).context(format!("tuple {key}")))?;

        rows.push(StrengthRecord {
            market: key.market,
            sector: key.sector,
            theme: key.theme,
            ticker: key.ticker,
            stock_name: agg.stock_name,
            strength_score: round_score(agg.strength_score),
            mention_total: agg.mention_total,
            last_mention_count: agg.last_mention_count,
            first_seen: agg.first_seen,
            last_seen: agg.last_seen,
            days_count: agg.days_count,
            trend,
            last_reason: agg.last_reason,
        });
    }

    sort_rows(&mut rows);

    Ok(StrengthSnapshot {
        as_of_date: reference_date,
        rows,
    })
}

pub fn sort_rows(rows: &mut [StrengthRecord]) {
    rows.sort_by(|a, b| {
        b.strength_score
            .total_cmp(&a.strength_score)
            .then_with(|| cmp_key(a, b))
    });
}

fn cmp_key(a: &StrengthRecord, b: &StrengthRecord) -> Ordering {
    (a.market, a.sector, &a.theme, &a.ticker).cmp(&(b.market, b.sector, &b.theme, &b.ticker))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrendCounts {
    pub new: usize,
    pub active: usize,
    pub inactive: usize,
}

impl TrendCounts {
    pub fn of(rows: &[StrengthRecord]) -> Self {
        let mut out = Self::default();
        for row in rows {
            match row.trend {
                Trend::New => out.new += 1,
                Trend::Active => out.active += 1,
                Trend::Inactive => out.inactive += 1,
            }
        }
        out
    }
}
