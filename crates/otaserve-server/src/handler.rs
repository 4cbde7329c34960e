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

//! Update protocol
//!
//! Devices poll `GET /<flavor>` (or `/<flavor>.bin`) and announce their
//! installed firmware in the `x-ESP8266-version` header. Every request is
//! resolved from the current store contents into a [`Decision`], which is
//! then rendered as 200 (binary), 304 (nothing to do) or 400.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::Response;
use otaserve_core::catalog::strip_firmware_extension;
use otaserve_core::{
    DESCRIPTOR_NAME, FirmwareCatalog, FirmwareEntry, FirmwareStore, UpgradePolicy, Version,
};
use tracing::{debug, error, info};

use crate::error::{RequestError, Result};
use crate::response;

/// Header carrying the firmware version installed on the device
pub const VERSION_HEADER: &str = "x-esp8266-version";

#[derive(Debug, Clone)]
pub struct UpdateState {
    pub store: Arc<dyn FirmwareStore>,
    pub resend_same_version: bool,
    pub policy: UpgradePolicy,
}

/// Everything the protocol looks at in an incoming request
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub path: String,
    pub headers: HeaderMap,
}

impl UpdateRequest {
    pub fn new(path: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            path: path.into(),
            headers,
        }
    }

    /// Final path segment
    pub fn flavor(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Raw value of the version header, `Ok(None)` when absent.
    pub fn declared_version(&self) -> Result<Option<&str>> {
        match self.headers.get(VERSION_HEADER) {
            Some(value) => value
                .to_str()
                .map(Some)
                .map_err(|_| RequestError::invalid(self.flavor(), "version header is not ASCII")),
            None => Ok(None),
        }
    }
}

/// Outcome of a valid request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Serve an unversioned artifact as-is
    Direct { file_name: String },
    /// Stream a versioned binary
    Update {
        flavor: String,
        from: Version,
        to: Version,
        file_name: String,
    },
    /// Device already holds the best eligible version
    NoUpdate {
        flavor: String,
        current: Version,
        offered: Option<Version>,
    },
}

/// Resolve a request against the current store contents.
pub async fn decide(state: &UpdateState, request: &UpdateRequest) -> Result<Decision> {
    let catalog = FirmwareCatalog::new(state.store.as_ref(), state.policy);

    let requested = request.flavor();
    if requested.is_empty() {
        return Err(RequestError::invalid(requested, "no flavor in path"));
    }
    if requested == DESCRIPTOR_NAME {
        return Err(RequestError::DescriptorRequested);
    }
    if catalog.has_direct_artifact(requested).await? {
        return Ok(Decision::Direct {
            file_name: requested.to_owned(),
        });
    }

    let flavor = strip_firmware_extension(requested);
    if flavor.is_empty() {
        return Err(RequestError::invalid(requested, "no flavor in path"));
    }
    if flavor == DESCRIPTOR_NAME {
        return Err(RequestError::DescriptorRequested);
    }
    if !catalog.has_any(flavor).await? {
        return Err(RequestError::invalid(flavor, "unknown flavor"));
    }

    let Some(raw_version) = request.declared_version()? else {
        if catalog.has_direct_artifact(flavor).await? {
            return Ok(Decision::Direct {
                file_name: flavor.to_owned(),
            });
        }
        return Err(RequestError::invalid(flavor, "missing version header"));
    };

    let current = Version::parse(raw_version)?;
    let offered = catalog.latest_eligible(flavor, &current).await?;

    let send = match &offered {
        Some(to) if current < *to => true,
        Some(to) if current == *to => state.resend_same_version,
        _ => false,
    };

    match offered {
        Some(to) if send => Ok(Decision::Update {
            flavor: flavor.to_owned(),
            file_name: FirmwareEntry::file_name_for(flavor, &to),
            from: current,
            to,
        }),
        offered => Ok(Decision::NoUpdate {
            flavor: flavor.to_owned(),
            current,
            offered,
        }),
    }
}

/// Resolve and render a request, logging the outcome with the client IP.
pub async fn respond(state: &UpdateState, request: &UpdateRequest, client: SocketAddr) -> Response {
    let ip = client.ip();
    debug!(ip = %ip, path = %request.path, headers = ?request.headers, "Request received");

    let decision = match decide(state, request).await {
        Ok(decision) => decision,
        Err(e) if e.is_server_fault() => {
            error!(ip = %ip, path = %request.path, error = %e, "Request failed");
            return response::empty_html(e.status());
        }
        Err(e) => {
            error!(ip = %ip, path = %request.path, error = %e, "Invalid request");
            return response::empty_html(e.status());
        }
    };

    let file_name = match &decision {
        Decision::Direct { file_name } => {
            info!(ip = %ip, file = %file_name, "Sending unversioned firmware");
            file_name
        }
        Decision::Update {
            flavor,
            from,
            to,
            file_name,
        } => {
            info!(
                ip = %ip,
                "Sending firmware update for {flavor} from {from} to {to}."
            );
            file_name
        }
        Decision::NoUpdate {
            flavor,
            current,
            offered,
        } => {
            debug!(
                ip = %ip,
                flavor = %flavor,
                current = %current,
                offered = ?offered.as_ref().map(Version::as_str),
                "No update available"
            );
            return response::empty_html(StatusCode::NOT_MODIFIED);
        }
    };

    match response::firmware(state.store.as_ref(), file_name).await {
        Ok(response) => response,
        Err(e) => {
            error!(ip = %ip, file = %file_name, error = %e, "Failed to send firmware");
            response::empty_html(e.status())
        }
    }
}

pub async fn update_handler(
    State(state): State<UpdateState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request = UpdateRequest::new(uri.path(), headers);
    respond(&state, &request, client).await
}
