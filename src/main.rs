use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use funnelpost::config::Config;
use funnelpost::db;
use funnelpost::followup::scheduler::FollowUpScheduler;
use funnelpost::imap::watch::ImapConnector;
use funnelpost::render::DbTemplateRenderer;
use funnelpost::services::sync_supervisor::{RetryPolicy, SyncSupervisor};
use funnelpost::smtp::SmtpMailer;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,funnelpost=debug")),
        )
        .init();

    let config = Config::from_env();
    let db_url = db::normalize_sqlite_url(&config.database_url);

    // Ensure the sqlite file exists before the pool opens it.
    if let Some(path) = db::db_file_path(&db_url) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        if !path.exists() {
            std::fs::File::create(&path).ok();
        }
    }

    let pool = db::connect(&db_url).await?;
    if std::path::Path::new("migrations").exists() {
        db::run_migrations(&pool).await?;
    } else {
        db::apply_schema(&pool).await?;
    }

    let scheduler = Arc::new(FollowUpScheduler::new(
        pool.clone(),
        Arc::new(SmtpMailer),
        Arc::new(DbTemplateRenderer::new(pool.clone())),
    ));
    let scheduler_task = scheduler.start(config.tick_interval);

    let supervisor = Arc::new(SyncSupervisor::new(
        pool.clone(),
        Arc::new(ImapConnector),
        config.poll_interval,
        config.keepalive_interval,
        RetryPolicy {
            max_attempts: config.sync_retry_max,
            delay: config.sync_retry_delay,
        },
    ));
    match supervisor.start_all().await {
        Ok(n) => tracing::info!(monitors = n, "real-time sync started"),
        Err(e) => tracing::warn!(error = %e, "real-time sync startup failed"),
    }

    shutdown_signal().await;
    tracing::info!("shutting down");
    scheduler_task.abort();
    supervisor.stop_all().await;

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let term = async {
        if let Ok(mut s) = signal::unix::signal(signal::unix::SignalKind::terminate()) {
            s.recv().await;
        }
    };
    #[cfg(not(unix))]
    let term = std::future::pending::<()>();
    tokio::select! { _ = ctrl_c => {}, _ = term => {} }
}
