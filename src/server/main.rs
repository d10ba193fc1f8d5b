//! Warden server binary.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use warden::config::init_config;
use warden::server::{build_router, AppState, Database};
use warden::session::SessionKeyStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = init_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting Warden server");

    let db = Database::new().await?;
    let sessions = Arc::new(SessionKeyStore::with_ttl(Duration::from_secs(
        config.session.ttl_secs,
    )));

    #[cfg(feature = "background-jobs")]
    let _scheduler = {
        let jobs_config = warden::jobs::JobConfig {
            session_sweep_cron: config.session.sweep_cron.clone(),
        };
        let scheduler = warden::jobs::start_scheduler(jobs_config, sessions.clone()).await?;
        info!("Background job scheduler started");
        scheduler
    };

    let state = AppState {
        db,
        sessions,
        shared_secret: config.encryption.shared_secret.clone(),
        machine_limit: config.machines.max_per_user,
    };

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}
