use crate::domain::record::Market;
use crate::domain::sector::Sector;
use crate::domain::strength::{StrengthRecord, StrengthSnapshot, Trend};
use crate::error::EngineError;
use crate::storage::snapshot::{LoadedSnapshot, SnapshotStore};
use anyhow::Context;
use chrono::NaiveDate;
use uuid::Uuid;

type StrengthRow = (
    String,
    String,
    String,
    String,
    String,
    f64,
    i64,
    i64,
    NaiveDate,
    NaiveDate,
    i32,
    String,
    String,
);

/// `theme_strength` holds exactly one snapshot; `theme_strength_meta` is its single header row.
#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: sqlx::PgPool,
    batch_size: usize,
}

impl PgSnapshotStore {
    pub fn new(pool: sqlx::PgPool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
        }
    }
}

fn row_to_record(row: StrengthRow) -> anyhow::Result<StrengthRecord> {
    let (
        market,
        sector,
        theme,
        ticker,
        stock_name,
        strength_score,
        mention_total,
        last_mention_count,
        first_seen,
        last_seen,
        days_count,
        trend,
        last_reason,
    ) = row;

    Ok(StrengthRecord {
        market: market.parse::<Market>().map_err(anyhow::Error::msg)?,
        sector: sector.parse::<Sector>().map_err(anyhow::Error::msg)?,
        theme,
        ticker,
        stock_name,
        strength_score,
        mention_total: u64::try_from(mention_total).context("negative mention_total")?,
        last_mention_count: u64::try_from(last_mention_count)
            .context("negative last_mention_count")?,
        first_seen,
        last_seen,
        days_count: u32::try_from(days_count).context("negative days_count")?,
        trend: trend.parse::<Trend>().map_err(anyhow::Error::msg)?,
        last_reason,
    })
}

#[async_trait::async_trait]
impl SnapshotStore for PgSnapshotStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn write(&self, snapshot: &StrengthSnapshot, run_id: Uuid) -> anyhow::Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context(EngineError::storage("begin transaction failed"))?;

        sqlx::query("DELETE FROM theme_strength")
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context(EngineError::storage("clear theme_strength failed"))?;

        for (chunk_idx, chunk) in snapshot.rows.chunks(self.batch_size).enumerate() {
            let offset = chunk_idx * self.batch_size;
            let mut qb = sqlx::QueryBuilder::new(
                "INSERT INTO theme_strength \
                 (position, market, sector, theme, ticker, stock_name, strength_score, mention_total, \
                  last_mention_count, first_seen, last_seen, days_count, trend, last_reason) ",
            );
            qb.push_values(chunk.iter().enumerate(), |mut b, (i, r)| {
                b.push_bind((offset + i) as i32)
                    .push_bind(r.market.code())
                    .push_bind(r.sector.code())
                    .push_bind(r.theme.as_str())
                    .push_bind(r.ticker.as_str())
                    .push_bind(r.stock_name.as_str())
                    .push_bind(r.strength_score)
                    .push_bind(r.mention_total as i64)
                    .push_bind(r.last_mention_count as i64)
                    .push_bind(r.first_seen)
                    .push_bind(r.last_seen)
                    .push_bind(r.days_count as i32)
                    .push_bind(r.trend.as_str())
                    .push_bind(r.last_reason.as_str());
            });
            qb.build()
                .persistent(false)
                .execute(&mut *tx)
                .await
                .context(EngineError::storage("batch insert theme_strength failed"))?;
        }

        sqlx::query(
            "INSERT INTO theme_strength_meta (id, as_of_date, run_id, row_count) \
             VALUES (1, $1, $2, $3) \
             ON CONFLICT (id) DO UPDATE \
               SET as_of_date = EXCLUDED.as_of_date, run_id = EXCLUDED.run_id, row_count = EXCLUDED.row_count",
        )
        .persistent(false)
        .bind(snapshot.as_of_date)
        .bind(run_id)
        .bind(snapshot.rows.len() as i64)
        .execute(&mut *tx)
        .await
        .context(EngineError::storage("upsert theme_strength_meta failed"))?;

        tx.commit()
            .await
            .context(EngineError::storage("commit transaction failed"))?;
        Ok(())
    }

    async fn read_latest(&self) -> anyhow::Result<Option<LoadedSnapshot>> {
        let meta: Option<(NaiveDate,)> =
            sqlx::query_as("SELECT as_of_date FROM theme_strength_meta WHERE id = 1")
                .persistent(false)
                .fetch_optional(&self.pool)
                .await
                .context(EngineError::storage("select theme_strength_meta failed"))?;

        let Some((as_of_date,)) = meta else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, StrengthRow>(
            "SELECT market, sector, theme, ticker, stock_name, strength_score, mention_total, \
                    last_mention_count, first_seen, last_seen, days_count, trend, last_reason \
             FROM theme_strength \
             ORDER BY position ASC",
        )
        .persistent(false)
        .fetch_all(&self.pool)
        .await
        .context(EngineError::storage("select theme_strength failed"))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let ticker = row.3.clone();
            out.push(row_to_record(row).with_context(|| {
                EngineError::storage(format!("malformed theme_strength row for {ticker}"))
            })?);
        }

        Ok(Some(LoadedSnapshot {
            as_of_date: Some(as_of_date),
            rows: out,
        }))
    }
}
