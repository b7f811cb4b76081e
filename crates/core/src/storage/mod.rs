use crate::domain::tariff::{TariffPayload, UpsertOutcome, WarehouseTariff};
use crate::error::StoreError;
use chrono::NaiveDate;

pub mod lock;
pub mod snapshots;
pub mod targets;

pub async fn migrate(pool: &sqlx::PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Persistence seam for the pipeline: daily snapshots plus the publish target set.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn upsert_daily_snapshot(
        &self,
        date: NaiveDate,
        payload: &TariffPayload,
    ) -> Result<UpsertOutcome, StoreError>;

    async fn latest_snapshot(&self) -> Result<Vec<WarehouseTariff>, StoreError>;

    async fn list_publish_targets(&self) -> Result<Vec<String>, StoreError>;

    /// Returns `false` when the target was already registered.
    async fn add_publish_target(&self, spreadsheet_id: &str) -> Result<bool, StoreError>;

    /// Returns `false` when the target was not registered.
    async fn remove_publish_target(&self, spreadsheet_id: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: sqlx::PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn upsert_daily_snapshot(
        &self,
        date: NaiveDate,
        payload: &TariffPayload,
    ) -> Result<UpsertOutcome, StoreError> {
        snapshots::upsert_daily_snapshot(&self.pool, date, payload).await
    }

    async fn latest_snapshot(&self) -> Result<Vec<WarehouseTariff>, StoreError> {
        snapshots::latest_snapshot(&self.pool).await
    }

    async fn list_publish_targets(&self) -> Result<Vec<String>, StoreError> {
        targets::list_publish_targets(&self.pool).await
    }

    async fn add_publish_target(&self, spreadsheet_id: &str) -> Result<bool, StoreError> {
        targets::add_publish_target(&self.pool, spreadsheet_id).await
    }

    async fn remove_publish_target(&self, spreadsheet_id: &str) -> Result<bool, StoreError> {
        targets::remove_publish_target(&self.pool, spreadsheet_id).await
    }
}
