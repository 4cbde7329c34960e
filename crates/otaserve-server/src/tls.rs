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

//! HTTPS transport
//!
//! axum only serves plain TCP, so TLS connections are accepted here and each
//! one is driven by hyper with the same router. The peer address is injected
//! as [`ConnectInfo`] so handlers log the client IP exactly as over HTTP.

use std::future::Future;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use axum::Router;
use axum::extract::ConnectInfo;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::Service;
use tracing::{debug, info, warn};

use crate::config::TlsSettings;

/// Build the rustls server configuration from PEM files.
///
/// The key is looked up in `key_path`, falling back to the certificate
/// file, which may contain both.
pub fn load_server_config(settings: &TlsSettings) -> Result<Arc<rustls::ServerConfig>> {
    let cert_path = &settings.cert_path;
    let cert_pem = std::fs::read(cert_path)
        .with_context(|| format!("Failed to read certificate: {}", cert_path.display()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_pem.as_slice()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse certificate: {}", cert_path.display()))?;
    if certs.is_empty() {
        bail!("No certificates found in {}", cert_path.display());
    }

    let key_path = settings.key_path();
    let key_pem = std::fs::read(key_path)
        .with_context(|| format!("Failed to read private key: {}", key_path.display()))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_pem.as_slice()))
        .with_context(|| format!("Failed to parse private key: {}", key_path.display()))?
        .ok_or_else(|| anyhow!("No private key found in {}", key_path.display()))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("Failed to select TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("Failed to build TLS server config")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    info!(cert = %cert_path.display(), "TLS server config loaded");
    Ok(Arc::new(config))
}

/// Accept TLS connections until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    config: Arc<rustls::ServerConfig>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let acceptor = TlsAcceptor::from(config);
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            },
            () = &mut shutdown => {
                info!("Stopped accepting HTTPS connections");
                return Ok(());
            }
        };

        let acceptor = acceptor.clone();
        let router = router.clone();
        tokio::spawn(async move {
            serve_connection(acceptor, router, stream, peer).await;
        });
    }
}

async fn serve_connection(
    acceptor: TlsAcceptor,
    router: Router,
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
) {
    let tls_stream = match acceptor.accept(stream).await {
        Ok(tls_stream) => tls_stream,
        Err(e) => {
            debug!(ip = %peer.ip(), error = %e, "TLS handshake failed");
            return;
        }
    };

    let service = hyper::service::service_fn(move |mut request: hyper::Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        router.clone().call(request)
    });

    if let Err(e) = Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(tls_stream), service)
        .await
    {
        debug!(ip = %peer.ip(), error = %e, "Connection closed with error");
    }
}
