use std::sync::Arc;
use tariffsync_core::config::Settings;
use tariffsync_core::pipeline::Pipeline;
use tariffsync_core::storage::lock;
use tariffsync_core::storage::PgSnapshotStore;

pub fn build_pipeline(settings: &Settings, store: Arc<PgSnapshotStore>) -> anyhow::Result<Pipeline> {
    Pipeline::from_settings(settings, store)
}

/// One pipeline run under the shared advisory lock. A run already in flight
/// (here or in the API) makes this a logged no-op. Pipeline failures are
/// logged by the pipeline; only lock errors are returned.
pub async fn run_guarded(
    pool: &sqlx::PgPool,
    pipeline: &Pipeline,
    date_arg: Option<&str>,
) -> anyhow::Result<()> {
    let date = tariffsync_core::time::run_date::resolve_run_date(date_arg, chrono::Utc::now())?;

    let Some(run_lock) = lock::try_acquire_run_lock(pool).await? else {
        tracing::warn!(%date, "run lock not acquired; another run in progress");
        return Ok(());
    };

    if let Some(report) = pipeline.run_logged(date).await {
        for failure in &report.publish.failed {
            tracing::warn!(spreadsheet_id = %failure.target, error = %failure.message, "publish target failed");
        }
        tracing::info!(
            run_id = %report.run_id,
            %date,
            rows = report.published_rows,
            published = report.publish.succeeded.len(),
            failed = report.publish.failed.len(),
            "run complete"
        );
    }

    if let Err(err) = run_lock.release().await {
        tracing::warn!(error = %err, "failed to release run lock");
    }
    Ok(())
}
