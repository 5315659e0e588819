// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pidp_server::api::router;
use pidp_server::auth::{KeyError, KeyManager};
use pidp_server::config::{ConfigError, Settings, LOG_FORMAT_ENV};
use pidp_server::identity::{ProviderError, ProviderRegistry};
use pidp_server::state::AppState;
use pidp_server::storage::{IdentityDatabase, StorageError};

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("signing key: {0}")]
    Keys(#[from] KeyError),

    #[error("database: {0}")]
    Storage(#[from] StorageError),

    #[error("OAuth providers: {0}")]
    Providers(#[from] ProviderError),

    #[error("invalid bind address {0}")]
    BindAddress(String),

    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    PartialTls,

    #[error("server: {0}")]
    Io(#[from] std::io::Error),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(e) = run().await {
        error!(error = %e, "Server failed to start");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let settings = Settings::from_env()?;
    info!(app = %settings.app_name, algorithm = ?settings.token.algorithm, "Configuration loaded");

    // Resolved once; issuer, verifier and JWKS share this instance
    let keys = KeyManager::resolve(&settings.token)?;
    let db = IdentityDatabase::open(&settings.database_path())?;
    let providers = ProviderRegistry::from_settings(&settings)?;

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port)
        .parse()
        .map_err(|_| StartupError::BindAddress(format!("{}:{}", settings.host, settings.port)))?;
    let tls = tls_paths(&settings)?;

    let state = AppState::new(settings, keys, db, providers);
    let app = router(state);

    let handle: Handle<SocketAddr> = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    match tls {
        Some((cert, key)) => {
            // Must happen before any TLS operation
            if rustls::crypto::ring::default_provider()
                .install_default()
                .is_err()
            {
                warn!("A rustls crypto provider was already installed");
            }
            let tls_config = RustlsConfig::from_pem_file(cert, key).await?;
            info!(%addr, "PIdP listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!(%addr, "PIdP listening on http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
    }

    info!("Server stopped");
    Ok(())
}

fn tls_paths(settings: &Settings) -> Result<Option<(PathBuf, PathBuf)>, StartupError> {
    match (&settings.tls_cert_path, &settings.tls_key_path) {
        (Some(cert), Some(key)) => Ok(Some((cert.clone(), key.clone()))),
        (None, None) => Ok(None),
        _ => Err(StartupError::PartialTls),
    }
}

async fn shutdown_on_signal(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE_PERIOD));
}
