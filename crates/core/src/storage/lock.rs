use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks are scoped to the Postgres session, so the lock keeps the
// connection that took it until `release`.
const PIPELINE_LOCK_KEY: i64 = 0x5441_5249_4646; // "TARIFF"

#[derive(Debug)]
pub struct RunLock {
    conn: Option<PoolConnection<Postgres>>,
}

/// Takes the pipeline run lock without waiting. `None` means another run holds it.
pub async fn try_acquire_run_lock(pool: &sqlx::PgPool) -> anyhow::Result<Option<RunLock>> {
    let mut conn = pool.acquire().await.context("acquire lock connection failed")?;
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(PIPELINE_LOCK_KEY)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={PIPELINE_LOCK_KEY})"))?;

    Ok(acquired.0.then(|| RunLock { conn: Some(conn) }))
}

impl RunLock {
    pub async fn release(mut self) -> anyhow::Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let res = sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(PIPELINE_LOCK_KEY)
            .execute(&mut *conn)
            .await;
        if res.is_err() {
            drop(conn.detach());
        }
        res.with_context(|| format!("failed to release advisory lock (key={PIPELINE_LOCK_KEY})"))?;
        Ok(())
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // Not released: close the session instead of returning a locked connection to the pool.
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}
