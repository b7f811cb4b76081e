use crate::config::Settings;
use crate::domain::tariff::UpsertOutcome;
use crate::error::PipelineError;
use crate::ingest::provider::{HttpTariffProvider, TariffProvider};
use crate::publish::google::GoogleSheetsClient;
use crate::publish::{publish_all, PublishReport, SheetsApi};
use crate::storage::SnapshotStore;
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

/// The sync components, built once at start-up and shared by every run.
#[derive(Clone)]
pub struct Pipeline {
    provider: Arc<dyn TariffProvider>,
    store: Arc<dyn SnapshotStore>,
    sheets: Arc<dyn SheetsApi>,
    sheet_name: String,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub date: NaiveDate,
    pub upsert: UpsertOutcome,
    pub published_rows: usize,
    pub publish: PublishReport,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn TariffProvider>,
        store: Arc<dyn SnapshotStore>,
        sheets: Arc<dyn SheetsApi>,
        sheet_name: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            sheets,
            sheet_name: sheet_name.into(),
        }
    }

    /// Production wiring: HTTP tariff provider and Google Sheets publisher.
    pub fn from_settings(settings: &Settings, store: Arc<dyn SnapshotStore>) -> anyhow::Result<Self> {
        let provider = HttpTariffProvider::from_settings(settings)?;
        let sheets = GoogleSheetsClient::from_settings(settings)?;
        Ok(Self::new(
            Arc::new(provider),
            store,
            Arc::new(sheets),
            settings.sheet_name.clone(),
        ))
    }

    /// fetch → upsert → read back latest → publish to every target.
    ///
    /// Provider and store failures abort the run before anything is published;
    /// publish failures are per-target and land in the report.
    pub async fn run(&self, date: NaiveDate) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, %date, provider = self.provider.provider_name(), "tariff sync started");

        let payload = self.provider.fetch_tariffs(date).await?;
        tracing::info!(%run_id, warehouses = payload.warehouse_list.len(), "fetched tariffs");

        let upsert = self.store.upsert_daily_snapshot(date, &payload).await?;
        tracing::info!(
            %run_id,
            snapshot_id = upsert.snapshot_id,
            replaced = upsert.replaced,
            warehouses = upsert.warehouses,
            "upserted daily snapshot"
        );

        let latest = self.store.latest_snapshot().await?;
        let targets = self.store.list_publish_targets().await?;
        tracing::info!(%run_id, rows = latest.len(), targets = targets.len(), "publishing latest snapshot");

        let publish = publish_all(self.sheets.as_ref(), &self.sheet_name, &targets, &latest).await;

        tracing::info!(
            %run_id,
            succeeded = publish.succeeded.len(),
            failed = publish.failed.len(),
            "tariff sync finished"
        );

        Ok(RunReport {
            run_id,
            date,
            upsert,
            published_rows: latest.len(),
            publish,
        })
    }

    /// Top-level boundary for triggers: errors are logged and reported, never propagated.
    pub async fn run_logged(&self, date: NaiveDate) -> Option<RunReport> {
        match self.run(date).await {
            Ok(report) => Some(report),
            Err(err) => {
                let err = anyhow::Error::new(err);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(%date, error = %format!("{err:#}"), "tariff sync failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::normalize::normalize_warehouse;
    use crate::domain::tariff::{RawWarehouseTariff, TariffPayload, TariffValue, WarehouseTariff};
    use crate::error::{ProviderError, StoreError};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct FakeProvider {
        result: Result<TariffPayload, ProviderError>,
    }

    impl FakeProvider {
        fn ok(payload: TariffPayload) -> Self {
            Self { result: Ok(payload) }
        }

        fn failing(err: ProviderError) -> Self {
            Self { result: Err(err) }
        }
    }

    #[async_trait::async_trait]
    impl TariffProvider for FakeProvider {
        fn provider_name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_tariffs(&self, _date: NaiveDate) -> Result<TariffPayload, ProviderError> {
            self.result.clone()
        }
    }

    /// Mirrors the store's contract in memory: one snapshot per date, children replaced.
    #[derive(Default)]
    struct MemoryStore {
        snapshots: Mutex<BTreeMap<NaiveDate, Vec<WarehouseTariff>>>,
        targets: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl SnapshotStore for MemoryStore {
        async fn upsert_daily_snapshot(
            &self,
            date: NaiveDate,
            payload: &TariffPayload,
        ) -> Result<UpsertOutcome, StoreError> {
            let rows = payload
                .warehouse_list
                .iter()
                .map(normalize_warehouse)
                .collect::<Result<Vec<_>, _>>()?;
            let mut snapshots = self.snapshots.lock().unwrap();
            let warehouses = rows.len();
            let replaced = snapshots.insert(date, rows).is_some();
            let snapshot_id = snapshots.keys().position(|d| *d == date).unwrap_or_default() as i32 + 1;
            Ok(UpsertOutcome {
                snapshot_id,
                replaced,
                warehouses,
            })
        }

        async fn latest_snapshot(&self) -> Result<Vec<WarehouseTariff>, StoreError> {
            let snapshots = self.snapshots.lock().unwrap();
            let mut rows = snapshots.values().next_back().cloned().unwrap_or_default();
            // Stable sort keeps insertion order for ties; `None` goes last.
            rows.sort_by(|a, b| match (a.box_delivery_base, b.box_delivery_base) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });
            Ok(rows)
        }

        async fn list_publish_targets(&self) -> Result<Vec<String>, StoreError> {
            Ok(self.targets.lock().unwrap().clone())
        }

        async fn add_publish_target(&self, spreadsheet_id: &str) -> Result<bool, StoreError> {
            let mut targets = self.targets.lock().unwrap();
            if targets.iter().any(|t| t == spreadsheet_id) {
                return Ok(false);
            }
            targets.push(spreadsheet_id.to_string());
            Ok(true)
        }

        async fn remove_publish_target(&self, spreadsheet_id: &str) -> Result<bool, StoreError> {
            let mut targets = self.targets.lock().unwrap();
            let before = targets.len();
            targets.retain(|t| t != spreadsheet_id);
            Ok(targets.len() != before)
        }
    }

    #[derive(Default)]
    struct RecordingSheets {
        writes: Mutex<Vec<(String, Vec<Vec<String>>)>>,
        clears: Mutex<Vec<String>>,
        failing: Vec<&'static str>,
    }

    #[async_trait::async_trait]
    impl SheetsApi for RecordingSheets {
        async fn clear_range(&self, spreadsheet_id: &str, _range: &str) -> anyhow::Result<()> {
            self.clears.lock().unwrap().push(spreadsheet_id.to_string());
            if self.failing.contains(&spreadsheet_id) {
                anyhow::bail!("HTTP 404: Requested entity was not found");
            }
            Ok(())
        }

        async fn update_range(
            &self,
            spreadsheet_id: &str,
            _range: &str,
            values: Vec<Vec<String>>,
        ) -> anyhow::Result<()> {
            self.writes
                .lock()
                .unwrap()
                .push((spreadsheet_id.to_string(), values));
            Ok(())
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn warehouse(name: &str, delivery: &str, storage: &str) -> RawWarehouseTariff {
        RawWarehouseTariff {
            warehouse_name: name.to_string(),
            geo_name: "G".to_string(),
            box_delivery_base: Some(TariffValue::from(delivery)),
            box_storage_base: Some(TariffValue::from(storage)),
            ..Default::default()
        }
    }

    fn payload(list: Vec<RawWarehouseTariff>) -> TariffPayload {
        TariffPayload {
            next_box_date: None,
            till_max_date: Some("2025-01-02".to_string()),
            warehouse_list: list,
        }
    }

    async fn store_with_targets(ids: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        for id in ids {
            store.add_publish_target(id).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn run_stores_and_publishes_normalized_values() {
        let store = store_with_targets(&["sheet_a"]).await;
        let sheets = Arc::new(RecordingSheets::default());
        let pipeline = Pipeline::new(
            Arc::new(FakeProvider::ok(payload(vec![warehouse("A", "1,5", "-")]))),
            store.clone(),
            sheets.clone(),
            "stocks_coefs",
        );

        let report = pipeline.run(date()).await.unwrap();
        assert!(!report.upsert.replaced);
        assert_eq!(report.published_rows, 1);
        assert_eq!(report.publish.succeeded, vec!["sheet_a".to_string()]);

        let latest = store.latest_snapshot().await.unwrap();
        assert_eq!(latest[0].box_delivery_base, Some(rust_decimal::Decimal::new(15, 1)));
        assert_eq!(latest[0].box_storage_base, None);

        let writes = sheets.writes.lock().unwrap();
        let row = &writes[0].1[1];
        assert_eq!(row[2], "1.5");
        assert_eq!(row[8], "-");
    }

    #[tokio::test]
    async fn second_ingest_of_same_day_replaces_warehouses() {
        let store = store_with_targets(&[]).await;
        let sheets = Arc::new(RecordingSheets::default());

        let first = Pipeline::new(
            Arc::new(FakeProvider::ok(payload(vec![warehouse("A", "1", "1"), warehouse("B", "2", "2")]))),
            store.clone(),
            sheets.clone(),
            "stocks_coefs",
        );
        first.run(date()).await.unwrap();

        let second = Pipeline::new(
            Arc::new(FakeProvider::ok(payload(vec![warehouse("C", "3", "3")]))),
            store.clone(),
            sheets.clone(),
            "stocks_coefs",
        );
        let report = second.run(date()).await.unwrap();
        assert!(report.upsert.replaced);

        let latest = store.latest_snapshot().await.unwrap();
        let names: Vec<_> = latest.iter().map(|w| w.warehouse_name.as_str()).collect();
        assert_eq!(names, vec!["C"]);
    }

    #[tokio::test]
    async fn provider_failure_aborts_before_store_and_publish() {
        let store = store_with_targets(&["sheet_a"]).await;
        let sheets = Arc::new(RecordingSheets::default());
        let pipeline = Pipeline::new(
            Arc::new(FakeProvider::failing(ProviderError::http(401, r#"{"detail":"bad token"}"#))),
            store.clone(),
            sheets.clone(),
            "stocks_coefs",
        );

        match pipeline.run(date()).await {
            Err(PipelineError::Provider(err)) => assert_eq!(err.status, Some(401)),
            other => panic!("expected provider error, got {other:?}"),
        }
        assert!(store.latest_snapshot().await.unwrap().is_empty());
        assert!(sheets.clears.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_numeric_aborts_run_without_publishing() {
        let store = store_with_targets(&["sheet_a"]).await;
        let sheets = Arc::new(RecordingSheets::default());
        let pipeline = Pipeline::new(
            Arc::new(FakeProvider::ok(payload(vec![warehouse("A", "abc", "-")]))),
            store.clone(),
            sheets.clone(),
            "stocks_coefs",
        );

        assert!(matches!(
            pipeline.run(date()).await,
            Err(PipelineError::Store(StoreError::InvalidNumeric { .. }))
        ));
        assert!(pipeline.run_logged(date()).await.is_none());
        assert!(sheets.clears.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_target_is_reported_and_others_still_published() {
        let store = store_with_targets(&["one", "two", "three"]).await;
        let sheets = Arc::new(RecordingSheets {
            failing: vec!["two"],
            ..Default::default()
        });
        let pipeline = Pipeline::new(
            Arc::new(FakeProvider::ok(payload(vec![warehouse("A", "1", "1")]))),
            store,
            sheets.clone(),
            "stocks_coefs",
        );

        let report = pipeline.run_logged(date()).await.expect("run succeeds");
        assert_eq!(report.publish.succeeded, vec!["one".to_string(), "three".to_string()]);
        assert_eq!(report.publish.failed.len(), 1);
        assert_eq!(report.publish.failed[0].target, "two");
        assert_eq!(*sheets.clears.lock().unwrap(), vec!["one", "two", "three"]);
        assert_eq!(sheets.writes.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_payload_clears_targets_without_writing() {
        let store = store_with_targets(&["one"]).await;
        let sheets = Arc::new(RecordingSheets::default());
        let pipeline = Pipeline::new(
            Arc::new(FakeProvider::ok(payload(vec![]))),
            store,
            sheets.clone(),
            "stocks_coefs",
        );

        let report = pipeline.run(date()).await.unwrap();
        assert_eq!(report.published_rows, 0);
        assert_eq!(*sheets.clears.lock().unwrap(), vec!["one"]);
        assert!(sheets.writes.lock().unwrap().is_empty());
    }
}
