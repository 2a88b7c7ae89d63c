use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use studiobook::auth::AdminToken;
use studiobook::calendar::{CalendarClient, GoogleCalendar, Unconfigured};
use studiobook::catalog::Catalog;
use studiobook::checkout::{Checkout, PaymentGateway, SandboxGateway, StripeGateway};
use studiobook::config::Config;
use studiobook::engine::{Engine, SlotPolicy};
use studiobook::http::{create_router, AppState};
use studiobook::maintenance;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    studiobook::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let policy = SlotPolicy {
        hours: config.hours,
        horizon_days: config.horizon_days,
    };
    let engine = Arc::new(Engine::new(config.wal_path(), policy)?);

    let catalog = Arc::new(Catalog::load(config.catalog_path.as_deref())?);
    for studio in &catalog.studios {
        engine.register_studio(studio.clone()).await?;
    }

    let gateway: Arc<dyn PaymentGateway> = match &config.stripe {
        Some(stripe) => Arc::new(StripeGateway::new(stripe)),
        None => {
            tracing::warn!("no payment processor configured, using sandbox checkout");
            Arc::new(SandboxGateway::new(&config.public_url, config.sandbox_auto_complete))
        }
    };
    let calendar: Arc<dyn CalendarClient> = match config.calendar.clone() {
        Some(calendar) => Arc::new(GoogleCalendar::new(calendar)),
        None => Arc::new(Unconfigured),
    };
    let checkout = Arc::new(Checkout::new(
        engine.clone(),
        catalog.clone(),
        gateway,
        &config.public_url,
        &config.currency,
    ));

    let shutdown = CancellationToken::new();
    let scheduler = tokio::spawn(maintenance::run_scheduler(
        engine.clone(),
        config.maintenance_interval,
        shutdown.clone(),
    ));
    let compactor = tokio::spawn(maintenance::run_compactor(
        engine.clone(),
        config.compact_threshold,
        shutdown.clone(),
    ));

    let state = AppState::new(
        engine,
        catalog.clone(),
        checkout,
        calendar,
        AdminToken::new(config.admin_token.clone()),
    );
    let app = create_router(state);

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("studiobook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  studios: {}", catalog.studios.len());
    info!("  payments: {}", if config.stripe.is_some() { "stripe" } else { "sandbox" });
    info!("  admin: {}", if config.admin_token.is_some() { "enabled" } else { "disabled" });
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    let _ = tokio::join!(scheduler, compactor);
    info!("studiobook stopped");
    Ok(())
}

/// Resolve on SIGTERM or ctrl-c, then cancel the background tasks.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to register SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, draining requests");
    token.cancel();
}
