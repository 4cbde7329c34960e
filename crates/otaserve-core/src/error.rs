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

//! Error types for the catalog crate

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("malformed version {version:?}: segment {segment:?} is not a non-negative integer")]
    MalformedVersion { version: String, segment: String },

    #[error("malformed descriptor line {line}: {content:?}")]
    MalformedDescriptor { line: usize, content: String },

    #[error("firmware store error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// True when the error was caused by a version string the client sent
    /// rather than by the store or its contents.
    pub fn is_malformed_version(&self) -> bool {
        matches!(self, Self::MalformedVersion { .. })
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
