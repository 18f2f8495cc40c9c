use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks are scoped to the Postgres session, so the guard owns the connection the lock was
// taken on and unlocks on that same connection. Dropping it without `release` keeps the lock until
// the pooled connection closes.
const LEDGER_LOCK_KEY: i64 = 0x5448_454D_454C_4447; // "THEMELDG"

pub struct LedgerLock {
    conn: PoolConnection<Postgres>,
}

/// Guards the ledger against a second concurrent run. Returns `None` when another run holds it.
pub async fn try_acquire_ledger_lock(pool: &sqlx::PgPool) -> anyhow::Result<Option<LedgerLock>> {
    let mut conn = pool
        .acquire()
        .await
        .context("acquire connection for ledger lock failed")?;

    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(LEDGER_LOCK_KEY)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={LEDGER_LOCK_KEY})"))?;

    Ok(acquired.0.then_some(LedgerLock { conn }))
}

impl LedgerLock {
    pub async fn release(mut self) -> anyhow::Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(LEDGER_LOCK_KEY)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("failed to release advisory lock (key={LEDGER_LOCK_KEY})"))?;
        Ok(())
    }
}
