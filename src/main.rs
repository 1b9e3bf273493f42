// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Admission Gate Service
//!
//! Sits in front of a metered generation backend and decides, per request,
//! whether it may proceed:
//!
//! - Per-role token buckets (admin 300 rpm, analyst 120 rpm, viewer 60 rpm)
//! - Short-term burst window per client IP and identity
//! - Payload length and prompt-injection screening
//! - Escalation of repeat offenders to an IP block
//!
//! ## Configuration
//!
//! Defaults are built in. `ADMISSION_CONFIG` names an optional config file;
//! `ADMISSION__`-prefixed environment variables override individual keys,
//! e.g. `ADMISSION__BIND_ADDR=0.0.0.0:9090` or
//! `ADMISSION__ROLES__VIEWER__REQUESTS_PER_MINUTE=30`. A `.env` file is
//! honoured.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use admission_gate::{
    config::Config,
    controller::AdmissionController,
    handlers::{router, AppState},
    janitor::StateJanitor,
    metrics::DecisionMetrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::load()?;
    info!(
        bind_addr = %config.bind_addr,
        strategies = ?config.limiter.strategies,
        block_threshold = config.abuse.block_threshold,
        failure_policy = ?config.failure_policy,
        "Starting admission gate"
    );

    let controller = Arc::new(AdmissionController::from_config(&config)?);
    let metrics = Arc::new(DecisionMetrics::new()?);
    let collector = Arc::clone(&metrics).spawn_collector(controller.subscribe());

    let janitor = StateJanitor::new(Arc::clone(&controller), config.janitor.idle_ttl())
        .spawn(config.janitor.interval());

    let addr: SocketAddr = config.bind_addr.parse()?;
    let app = router(Arc::new(AppState {
        controller,
        metrics,
        config,
    }));

    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    janitor.abort();
    collector.abort();
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
