// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of otaserve.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use otaserve_core::DirectoryStore;
use tracing::info;

use crate::config::ServerConfig;
use crate::handler::{self, UpdateState};
use crate::tls;

/// Shared handler state for a configuration.
pub fn update_state(config: &ServerConfig) -> UpdateState {
    UpdateState {
        store: Arc::new(DirectoryStore::new(config.firmware.directory.clone())),
        resend_same_version: config.server.resend_same_version,
        policy: config.server.upgrade_policy,
    }
}

/// Every GET path is an update query, the flavor is its final segment.
pub fn router(state: UpdateState) -> Router {
    Router::new()
        .route("/", get(handler::update_handler))
        .route("/{*path}", get(handler::update_handler))
        .with_state(state)
}

/// Bind and serve until Ctrl-C or SIGTERM.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    config.check_firmware_directory()?;

    // Certificate problems are fatal before anything is bound
    let tls_config = config
        .tls
        .as_ref()
        .map(tls::load_server_config)
        .transpose()?;

    let app = router(update_state(&config));
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        "Started {} server on {addr}, firmware directory: {}, policy: {}",
        if tls_config.is_some() { "https" } else { "http" },
        config.firmware.directory.display(),
        config.server.upgrade_policy
    );

    match tls_config {
        Some(tls_config) => tls::serve(listener, app, tls_config, shutdown_signal()).await?,
        None => {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        }
    }

    info!("Shutting down server");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        () = ctrl_c => info!("Ctrl-C received"),
        () = terminate => info!("SIGTERM received"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    fn test_router(dir: &std::path::Path) -> Router {
        let mut config = ServerConfig::default();
        config.firmware.directory = dir.to_path_buf();
        router(update_state(&config)).layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 7], 5555))))
    }

    #[tokio::test]
    async fn test_nested_paths_use_final_segment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sensor-1.0.bin"), b"fw").unwrap();

        let response = test_router(dir.path())
            .oneshot(
                Request::builder()
                    .uri("/ota/esp/sensor.bin")
                    .header("x-ESP8266-version", "0.9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=sensor-1.0.bin"
        );
    }

    #[tokio::test]
    async fn test_root_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let response = test_router(dir.path())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_only_get_is_routed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sensor-1.0.bin"), b"fw").unwrap();
        let response = test_router(dir.path())
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/sensor")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_run_fails_without_firmware_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.firmware.directory = dir.path().join("missing");
        config.server.bind_address = "127.0.0.1".to_owned();
        config.server.port = 0;
        assert!(run(config).await.is_err());
    }
}
