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

//! Request level errors and their HTTP status

use axum::http::StatusCode;
use otaserve_core::CatalogError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("the override descriptor is not downloadable")]
    DescriptorRequested,

    #[error("invalid request for {flavor:?}: {reason}")]
    Invalid { flavor: String, reason: &'static str },

    #[error("malformed client version: {0}")]
    BadVersion(#[source] CatalogError),

    #[error("firmware store failure: {0}")]
    Store(#[source] CatalogError),

    #[error("failed to build response: {0}")]
    Response(#[from] axum::http::Error),
}

impl RequestError {
    pub fn invalid(flavor: &str, reason: &'static str) -> Self {
        Self::Invalid {
            flavor: flavor.to_owned(),
            reason,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::DescriptorRequested | Self::Invalid { .. } | Self::BadVersion(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Store(_) | Self::Response(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Failure on our side rather than a bad request from the device
    pub fn is_server_fault(&self) -> bool {
        self.status().is_server_error()
    }
}

impl From<CatalogError> for RequestError {
    fn from(err: CatalogError) -> Self {
        if err.is_malformed_version() {
            Self::BadVersion(err)
        } else {
            Self::Store(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, RequestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            RequestError::DescriptorRequested.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RequestError::invalid("sensor", "missing version header").status(),
            StatusCode::BAD_REQUEST
        );

        let bad_version: RequestError = otaserve_core::version::parse_segments("1.x")
            .unwrap_err()
            .into();
        assert!(matches!(bad_version, RequestError::BadVersion(_)));
        assert_eq!(bad_version.status(), StatusCode::BAD_REQUEST);

        let io: RequestError = CatalogError::from(std::io::Error::other("disk gone")).into();
        assert!(matches!(io, RequestError::Store(_)));
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let descriptor: RequestError = CatalogError::MalformedDescriptor {
            line: 3,
            content: "oops".to_owned(),
        }
        .into();
        assert_eq!(descriptor.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_server_faults_are_told_apart() {
        assert!(!RequestError::DescriptorRequested.is_server_fault());
        assert!(!RequestError::invalid("sensor", "unknown flavor").is_server_fault());

        let io: RequestError = CatalogError::from(std::io::Error::other("disk gone")).into();
        assert!(io.is_server_fault());
    }
}
