use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tariffsync_core::config::Settings;
use tariffsync_core::pipeline::Pipeline;
use tariffsync_core::storage::{PgSnapshotStore, SnapshotStore};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod sync;

#[derive(Debug, Parser)]
#[command(name = "tariffsync_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch, store and publish once.
    Run {
        /// Snapshot date (YYYY-MM-DD). Defaults to today's UTC date.
        #[arg(long)]
        date: Option<String>,
    },

    /// Run now, then every N minutes until interrupted.
    Schedule {
        #[arg(long, env = "RUN_INTERVAL_MINS", default_value_t = 60)]
        every_mins: u64,
    },

    /// Manage the spreadsheets the latest snapshot is published to.
    Targets {
        #[command(subcommand)]
        action: TargetAction,
    },
}

#[derive(Debug, Subcommand)]
enum TargetAction {
    List,
    Add { spreadsheet_id: String },
    Remove { spreadsheet_id: String },
}

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

    let args = Args::parse();

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    tariffsync_core::storage::migrate(&pool)
        .await
        .context("sqlx migrations failed")?;
    let seeded =
        tariffsync_core::storage::targets::seed_publish_targets(&pool, &settings.seed_spreadsheet_ids)
            .await?;
    if seeded > 0 {
        tracing::info!(seeded, "registered seed spreadsheets");
    }

    let store = Arc::new(PgSnapshotStore::new(pool.clone()));

    match args.command {
        Command::Run { date } => {
            let pipeline = sync::build_pipeline(&settings, store)?;
            sync::run_guarded(&pool, &pipeline, date.as_deref()).await?;
        }
        Command::Schedule { every_mins } => {
            anyhow::ensure!(every_mins >= 1, "--every-mins must be >= 1");
            let pipeline = sync::build_pipeline(&settings, store)?;
            schedule(&pool, &pipeline, Duration::from_secs(every_mins * 60)).await;
        }
        Command::Targets { action } => targets(store.as_ref(), action).await?,
    }

    Ok(())
}

async fn schedule(pool: &sqlx::PgPool, pipeline: &Pipeline, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tracing::info!(every_secs = every.as_secs(), "tariff sync scheduled");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = sync::run_guarded(pool, pipeline, None).await {
                    sentry_anyhow::capture_anyhow(&err);
                    tracing::error!(error = %format!("{err:#}"), "scheduled run could not start");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested; stopping scheduler");
                break;
            }
        }
    }
}

async fn targets(store: &dyn SnapshotStore, action: TargetAction) -> anyhow::Result<()> {
    match action {
        TargetAction::List => {
            for id in store.list_publish_targets().await? {
                println!("{id}");
            }
        }
        TargetAction::Add { spreadsheet_id } => {
            if store.add_publish_target(&spreadsheet_id).await? {
                println!("added {spreadsheet_id}");
            } else {
                println!("{spreadsheet_id} already registered");
            }
        }
        TargetAction::Remove { spreadsheet_id } => {
            if store.remove_publish_target(&spreadsheet_id).await? {
                println!("removed {spreadsheet_id}");
            } else {
                println!("{spreadsheet_id} was not registered");
            }
        }
    }
    Ok(())
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
