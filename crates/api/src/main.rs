use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tariffsync_core::config::Settings;
use tariffsync_core::domain::tariff::WarehouseTariff;
use tariffsync_core::error::StoreError;
use tariffsync_core::pipeline::Pipeline;
use tariffsync_core::storage::{self, PgSnapshotStore, SnapshotStore};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool = connect_and_migrate(&settings).await;
    let store = pool
        .clone()
        .map(|pool| Arc::new(PgSnapshotStore::new(pool)));

    let pipeline = match &store {
        Some(store) => match Pipeline::from_settings(&settings, store.clone()) {
            Ok(p) => Some(p),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %format!("{e:#}"), "pipeline not configured; /run disabled");
                None
            }
        },
        None => None,
    };

    let state = AppState {
        pool,
        store,
        pipeline,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/run", post(trigger_run))
        .route("/tariffs/latest", get(get_latest_tariffs))
        .route("/spreadsheets", get(list_spreadsheets).post(add_spreadsheet))
        .route("/spreadsheets/:spreadsheet_id", delete(remove_spreadsheet))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn connect_and_migrate(settings: &Settings) -> Option<PgPool> {
    let db_url = match settings.require_database_url() {
        Ok(url) => url,
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            return None;
        }
    };

    let pool = match sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
            return None;
        }
    };

    if let Err(e) = storage::migrate(&pool).await {
        let err = anyhow::Error::new(e);
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "db migrations failed; starting API in degraded mode");
        return None;
    }

    match storage::targets::seed_publish_targets(&pool, &settings.seed_spreadsheet_ids).await {
        Ok(seeded) if seeded > 0 => tracing::info!(seeded, "registered seed spreadsheets"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "seeding spreadsheets failed"),
    }

    Some(pool)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    pool: Option<PgPool>,
    store: Option<Arc<PgSnapshotStore>>,
    pipeline: Option<Pipeline>,
}

impl AppState {
    fn store(&self) -> Result<&PgSnapshotStore, StatusCode> {
        self.store.as_deref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }
}

fn store_error_status(err: StoreError) -> StatusCode {
    match err {
        StoreError::InvalidTarget(_) | StoreError::InvalidNumeric { .. } => StatusCode::BAD_REQUEST,
        other => {
            let err = anyhow::Error::new(other);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "store operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Debug, Deserialize)]
struct RunParams {
    date: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunAccepted {
    date: NaiveDate,
    status: &'static str,
}

/// Starts a background run unless one is already holding the run lock.
async fn trigger_run(
    State(state): State<AppState>,
    Query(params): Query<RunParams>,
) -> Result<(StatusCode, Json<RunAccepted>), StatusCode> {
    let (Some(pool), Some(pipeline)) = (state.pool.clone(), state.pipeline.clone()) else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let date = tariffsync_core::time::run_date::resolve_run_date(
        params.date.as_deref(),
        chrono::Utc::now(),
    )
    .map_err(|_| StatusCode::BAD_REQUEST)?;

    let run_lock = storage::lock::try_acquire_run_lock(&pool)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::CONFLICT)?;

    tokio::spawn(async move {
        pipeline.run_logged(date).await;
        if let Err(err) = run_lock.release().await {
            tracing::warn!(error = %err, "failed to release run lock");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            date,
            status: "started",
        }),
    ))
}

#[derive(Debug, Serialize)]
struct LatestTariffs {
    date: Option<NaiveDate>,
    warehouses: Vec<WarehouseTariff>,
}

async fn get_latest_tariffs(
    State(state): State<AppState>,
) -> Result<Json<LatestTariffs>, StatusCode> {
    let store = state.store()?;

    let date = storage::snapshots::latest_snapshot_date(store.pool())
        .await
        .map_err(store_error_status)?;
    let warehouses = store.latest_snapshot().await.map_err(store_error_status)?;

    Ok(Json(LatestTariffs { date, warehouses }))
}

async fn list_spreadsheets(State(state): State<AppState>) -> Result<Json<Vec<String>>, StatusCode> {
    let ids = state
        .store()?
        .list_publish_targets()
        .await
        .map_err(store_error_status)?;
    Ok(Json(ids))
}

#[derive(Debug, Deserialize)]
struct AddSpreadsheet {
    spreadsheet_id: String,
}

async fn add_spreadsheet(
    State(state): State<AppState>,
    Json(body): Json<AddSpreadsheet>,
) -> Result<StatusCode, StatusCode> {
    let added = state
        .store()?
        .add_publish_target(&body.spreadsheet_id)
        .await
        .map_err(store_error_status)?;
    Ok(if added {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    })
}

async fn remove_spreadsheet(
    State(state): State<AppState>,
    Path(spreadsheet_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let removed = state
        .store()?
        .remove_publish_target(&spreadsheet_id)
        .await
        .map_err(store_error_status)?;
    Ok(if removed {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
