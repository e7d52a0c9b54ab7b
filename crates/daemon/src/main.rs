//! Skywatch station engine - one processing and export cycle
//!
//! Meant to be re-invoked periodically by an external scheduler (cron,
//! systemd timer). Each invocation:
//! 1. runs every task group's pending jobs under the deadline
//! 2. marks matching entities for every enabled export configuration
//! 3. delivers pending exports until idle or out of time

mod settings;
mod telemetry;

use anyhow::{Context, Result};
use settings::Settings;
use std::sync::Arc;
use tracing::{error, info, warn};

use skywatch_core::application::{
    shutdown_channel, Discoverer, DiscoverySettings, ExportDispatcher, ExportMarker, RunContext,
    Runner,
};
use skywatch_core::port::time_provider::SystemTimeProvider;
use skywatch_core::port::TimeProvider;
use skywatch_infra_http::HttpExportTransport;
use skywatch_infra_sqlite::{create_pool, run_migrations, SqliteExportStore};
use skywatch_infra_system::{FileWatermarkStore, LocalStationFs, SubprocessExecutor};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let settings = Settings::load()?;
    let _log_guard = telemetry::init_logging(&settings)?;

    info!("Skywatch v{} starting...", VERSION);

    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let started_at_ms = time_provider.now_millis();
    let ctx = RunContext::new(settings.deadline_ms(started_at_ms), time_provider.clone());
    if let Some(deadline_ms) = ctx.deadline_ms() {
        info!(deadline_ms, remaining_ms = ?ctx.remaining_ms(), "Run deadline set");
    }

    // 2. Run the cycle, abandoning it on Ctrl+C
    let result = tokio::select! {
        res = run_cycle(&settings, &ctx, time_provider.clone()) => res,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; completed batches keep their watermarks");
            Ok(())
        }
    };

    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "Cycle failed");
    }
    telemetry::shutdown();
    info!("Shutdown complete.");
    result
}

async fn run_cycle(
    settings: &Settings,
    ctx: &RunContext,
    time_provider: Arc<dyn TimeProvider>,
) -> Result<()> {
    // Processing
    let fs = Arc::new(LocalStationFs::new());
    let executor = Arc::new(SubprocessExecutor::new(
        time_provider.clone(),
        settings.env_allowlist.clone(),
    ));
    let watermark_store = Arc::new(FileWatermarkStore::new(&settings.watermark_path));
    let discoverer = Discoverer::new(
        fs.clone(),
        DiscoverySettings {
            binary_path: settings.binary_path.clone().into(),
            camera_id: settings.camera_id.clone(),
            ..DiscoverySettings::default()
        },
    );
    let runner = Runner::new(
        discoverer,
        executor,
        fs,
        watermark_store,
        settings.runner_settings(),
    );

    info!(task_groups = settings.task_groups.len(), "Running task groups...");
    let report = runner
        .run(&settings.task_groups, ctx)
        .await
        .context("job runner failed")?;
    info!(
        jobs = report.jobs_run(),
        deadline_hit = report.deadline_hit,
        "Task groups finished"
    );

    if !settings.export.enabled {
        return Ok(());
    }
    if ctx.is_expired() {
        info!("No time left for exports");
        return Ok(());
    }

    // Export
    if let Some(db_file) = settings.database_file() {
        if let Some(parent) = db_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
    }
    info!(database_url = %settings.database_url, "Opening database...");
    let pool = create_pool(&settings.database_url)
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    let store = Arc::new(SqliteExportStore::new(pool));
    let transport = Arc::new(HttpExportTransport::new(settings.export.request_timeout())?);

    let marker = ExportMarker::new(store.clone(), time_provider.clone());
    let marked = marker.mark_all().await.context("export marking failed")?;
    info!(marked, "Export tracking rows created");

    let dispatcher = ExportDispatcher::new(
        store,
        transport,
        time_provider,
        settings.export.dispatcher_settings(),
    );

    if ctx.is_expired() {
        info!("No time left for delivery");
        return Ok(());
    }
    let dispatched = dispatcher
        .run_until_idle(ctx)
        .await
        .context("export dispatch failed")?;
    info!(
        delivered = dispatched.delivered,
        deferred = dispatched.deferred,
        failed = dispatched.failed,
        "Exports dispatched"
    );

    if settings.export.follow && !dispatched.deadline_hit {
        info!("Following export queue, press Ctrl+C to stop");
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let stop = async {
            match ctx.remaining_ms() {
                Some(ms) => tokio::time::sleep(std::time::Duration::from_millis(ms as u64)).await,
                None => std::future::pending::<()>().await,
            }
            shutdown_tx.shutdown();
        };
        let (res, _) = tokio::join!(dispatcher.run(shutdown_rx), stop);
        res?;
    }

    Ok(())
}
