use crate::domain::record::{ClassificationRecord, Market};
use crate::domain::sector::Sector;
use crate::error::EngineError;
use crate::storage::ledger::{ensure_partition, HistoryStore, UpsertOutcome};
use anyhow::Context;
use chrono::NaiveDate;

type LedgerRow = (NaiveDate, String, String, String, String, String, i64, String, String);

const SELECT_COLUMNS: &str = "SELECT as_of_date, market, sector, theme, ticker, stock_name, \
                              mention_count, sentiment, reason FROM theme_ledger";

#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: sqlx::PgPool,
    batch_size: usize,
}

impl PgLedgerStore {
    pub fn new(pool: sqlx::PgPool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
        }
    }
}

fn row_to_record(row: LedgerRow) -> anyhow::Result<ClassificationRecord> {
    let (date, market, sector, theme, ticker, stock_name, mention_count, sentiment, reason) = row;
    let market = market.parse::<Market>().map_err(anyhow::Error::msg)?;
    let sector = sector.parse::<Sector>().map_err(anyhow::Error::msg)?;
    let mention_count = u32::try_from(mention_count)
        .with_context(|| format!("mention_count {mention_count} out of range"))?;
    Ok(ClassificationRecord {
        date,
        market,
        sector,
        theme,
        ticker,
        stock_name,
        mention_count,
        sentiment,
        reason,
    })
}

fn rows_to_records(rows: Vec<LedgerRow>) -> anyhow::Result<Vec<ClassificationRecord>> {
    rows.into_iter()
        .map(|row| {
            let date = row.0;
            row_to_record(row).with_context(|| {
                EngineError::storage(format!("malformed theme_ledger row for {date}"))
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl HistoryStore for PgLedgerStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn upsert(
        &self,
        date: NaiveDate,
        records: &[ClassificationRecord],
    ) -> anyhow::Result<UpsertOutcome> {
        ensure_partition(date, records)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .context(EngineError::storage("begin transaction failed"))?;

        let deleted = sqlx::query("DELETE FROM theme_ledger WHERE as_of_date = $1")
            .persistent(false)
            .bind(date)
            .execute(&mut *tx)
            .await
            .context(EngineError::storage("delete theme_ledger partition failed"))?;

        let mut batch_idx: usize = 0;
        for (chunk_idx, chunk) in records.chunks(self.batch_size).enumerate() {
            batch_idx += 1;
            let t0 = std::time::Instant::now();
            let offset = chunk_idx * self.batch_size;

            let mut qb = sqlx::QueryBuilder::new(
                "INSERT INTO theme_ledger \
                 (as_of_date, seq, market, sector, theme, ticker, stock_name, mention_count, sentiment, reason) ",
            );
            qb.push_values(chunk.iter().enumerate(), |mut b, (i, r)| {
                b.push_bind(date)
                    .push_bind((offset + i) as i32)
                    .push_bind(r.market.code())
                    .push_bind(r.sector.code())
                    .push_bind(r.theme.as_str())
                    .push_bind(r.ticker.as_str())
                    .push_bind(r.stock_name.as_str())
                    .push_bind(i64::from(r.mention_count))
                    .push_bind(r.sentiment.as_str())
                    .push_bind(r.reason.as_str());
            });

            qb.build()
                .persistent(false)
                .execute(&mut *tx)
                .await
                .context(EngineError::storage("batch insert theme_ledger failed"))?;

            tracing::debug!(
                %date,
                batch_idx,
                batch_size = chunk.len(),
                elapsed_ms = t0.elapsed().as_millis(),
                "theme_ledger batch insert"
            );
        }

        tx.commit()
            .await
            .context(EngineError::storage("commit transaction failed"))?;

        Ok(UpsertOutcome {
            replaced: deleted.rows_affected() as usize,
            inserted: records.len(),
        })
    }

    async fn read_all(&self) -> anyhow::Result<Vec<ClassificationRecord>> {
        let rows = sqlx::query_as::<_, LedgerRow>(&format!(
            "{SELECT_COLUMNS} ORDER BY as_of_date ASC, seq ASC"
        ))
        .persistent(false)
        .fetch_all(&self.pool)
        .await
        .context(EngineError::storage("select theme_ledger failed"))?;

        rows_to_records(rows)
    }

    async fn read_date(&self, date: NaiveDate) -> anyhow::Result<Vec<ClassificationRecord>> {
        let rows = sqlx::query_as::<_, LedgerRow>(&format!(
            "{SELECT_COLUMNS} WHERE as_of_date = $1 ORDER BY seq ASC"
        ))
        .persistent(false)
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .context(EngineError::storage("select theme_ledger partition failed"))?;

        rows_to_records(rows)
    }
}
