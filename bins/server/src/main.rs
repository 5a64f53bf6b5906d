//! Ledgerbridge API Server
//!
//! Wires the Postgres repositories, provider adapters and sync engine
//! together and serves the HTTP API until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledgerbridge_api::{AppState, create_router};
use ledgerbridge_core::integration::CredentialStore;
use ledgerbridge_core::mapping::CategoryMapper;
use ledgerbridge_core::sync::{SyncOrchestrator, SyncSettings};
use ledgerbridge_db::{
    PgCredentialRepository, PgDocumentRepository, PgMappingRepository, PgSyncLedger, connect,
};
use ledgerbridge_providers::build_registry;
use ledgerbridge_shared::{AppConfig, JwtConfig, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgerbridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    let db = connect(&config.database).await?;
    info!(
        max_connections = config.database.max_connections,
        "Connected to database"
    );

    let adapters = build_registry(&config)?;
    let credentials = Arc::new(
        CredentialStore::new(
            Arc::new(PgCredentialRepository::new(db.clone())),
            adapters.clone(),
        )
        .with_refresh_window(chrono::Duration::seconds(config.sync.refresh_window_secs)),
    );
    let mapper = CategoryMapper::new(Arc::new(PgMappingRepository::new(db.clone())));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        credentials,
        mapper.clone(),
        adapters,
        Arc::new(PgSyncLedger::new(db.clone())),
        Arc::new(PgDocumentRepository::new(db)),
        SyncSettings::from_config(&config.sync),
    ));

    let jwt_service = JwtService::new(JwtConfig {
        secret: config.jwt.secret.clone(),
        leeway_secs: config.jwt.leeway_secs,
    });

    let shutdown = CancellationToken::new();
    let state = AppState::new(
        orchestrator,
        mapper,
        Arc::new(jwt_service),
        config.sync.clone(),
        shutdown.clone(),
    );
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C, cancelling in-flight syncs so their attempts are
/// recorded before the process exits.
async fn shutdown_signal(shutdown: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        // Without a signal handler, wait for an external cancel instead.
        shutdown.cancelled().await;
        return;
    }

    info!("Shutdown requested, cancelling in-flight syncs");
    shutdown.cancel();
    // Gives cancelled attempts a moment to reach the ledger.
    tokio::time::sleep(Duration::from_millis(250)).await;
}
