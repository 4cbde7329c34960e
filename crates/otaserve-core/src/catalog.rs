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

//! Firmware catalog and candidate selection
//!
//! Versioned binaries are named `<flavor>-<version>.bin`. The flavor is
//! everything before the last `-`, so flavors may themselves contain dashes
//! (`garden-sensor-1.2.bin` belongs to `garden-sensor`). A bare file named
//! after the flavor is an unversioned artifact served as-is.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::overrides::{CompatibilityOverrideTable, DESCRIPTOR_NAME};
use crate::store::FirmwareStore;
use crate::version::Version;

const FIRMWARE_EXTENSION: &str = ".bin";

/// How a release is chosen among the eligible candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradePolicy {
    /// Next release above the installed one, walking through every release
    #[default]
    Stepwise,
    /// Newest release the device may install
    Latest,
}

impl UpgradePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stepwise => "stepwise",
            Self::Latest => "latest",
        }
    }
}

impl fmt::Display for UpgradePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpgradePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stepwise" => Ok(Self::Stepwise),
            "latest" => Ok(Self::Latest),
            other => Err(format!(
                "unknown upgrade policy {other:?}, expected \"stepwise\" or \"latest\""
            )),
        }
    }
}

/// One versioned firmware binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareEntry {
    pub flavor: String,
    pub version: Version,
    pub file_name: String,
}

impl FirmwareEntry {
    /// Parse `<flavor>-<version>.bin`, `None` for anything else.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(FIRMWARE_EXTENSION)?;
        let (flavor, version) = stem.rsplit_once('-')?;
        if flavor.is_empty() {
            return None;
        }
        let version = Version::parse(version).ok()?;
        Some(Self {
            flavor: flavor.to_owned(),
            version,
            file_name: file_name.to_owned(),
        })
    }

    pub fn file_name_for(flavor: &str, version: &Version) -> String {
        format!("{flavor}-{version}{FIRMWARE_EXTENSION}")
    }
}

/// Strip a trailing `.bin` from a requested flavor.
pub fn strip_firmware_extension(flavor: &str) -> &str {
    flavor.strip_suffix(FIRMWARE_EXTENSION).unwrap_or(flavor)
}

/// View over the firmware store for a single request
#[derive(Debug, Clone, Copy)]
pub struct FirmwareCatalog<'a> {
    store: &'a dyn FirmwareStore,
    policy: UpgradePolicy,
}

impl<'a> FirmwareCatalog<'a> {
    pub fn new(store: &'a dyn FirmwareStore, policy: UpgradePolicy) -> Self {
        Self { store, policy }
    }

    /// Store names starting with `flavor`, sorted, descriptor excluded.
    pub async fn names_for(&self, flavor: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|name| name != DESCRIPTOR_NAME && name.starts_with(flavor))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Versioned binaries of exactly this flavor.
    pub async fn entries(&self, flavor: &str) -> Result<Vec<FirmwareEntry>> {
        let entries = self
            .names_for(flavor)
            .await?
            .into_iter()
            .filter(|name| name != flavor)
            .filter_map(|name| match FirmwareEntry::parse(&name) {
                Some(entry) if entry.flavor == flavor => Some(entry),
                Some(_) => None,
                None => {
                    debug!(file = %name, "Ignoring file without a parseable version");
                    None
                }
            })
            .collect();
        Ok(entries)
    }

    /// Whether any file at all starts with `flavor`.
    pub async fn has_any(&self, flavor: &str) -> Result<bool> {
        Ok(!self.names_for(flavor).await?.is_empty())
    }

    /// Whether an unversioned file named exactly `flavor` exists.
    pub async fn has_direct_artifact(&self, flavor: &str) -> Result<bool> {
        if flavor == DESCRIPTOR_NAME {
            return Ok(false);
        }
        self.store.contains(flavor).await
    }

    /// Version to offer a device of `flavor` currently running `actual`.
    ///
    /// Only candidates at or above `actual` are considered. Among those the
    /// policy picks one, and compatibility overrides are checked lazily for
    /// candidates that would actually improve the current pick. `None` when
    /// nothing qualifies.
    pub async fn latest_eligible(&self, flavor: &str, actual: &Version) -> Result<Option<Version>> {
        let overrides = CompatibilityOverrideTable::new(self.store);
        let mut best: Option<Version> = None;
        // Stepwise falls back to re-offering the installed version
        let mut installed: Option<Version> = None;

        for entry in self.entries(flavor).await? {
            let candidate = entry.version;
            if candidate < *actual {
                continue;
            }

            match self.policy {
                UpgradePolicy::Latest => {
                    if best.as_ref().is_some_and(|b| candidate <= *b) {
                        continue;
                    }
                }
                UpgradePolicy::Stepwise => {
                    if candidate == *actual {
                        if installed.is_none()
                            && overrides.is_compatible(actual, &candidate).await?
                        {
                            installed = Some(candidate);
                        }
                        continue;
                    }
                    if best.as_ref().is_some_and(|b| candidate >= *b) {
                        continue;
                    }
                }
            }

            if overrides.is_compatible(actual, &candidate).await? {
                best = Some(candidate);
            }
        }

        let selected = match self.policy {
            UpgradePolicy::Latest => best,
            UpgradePolicy::Stepwise => best.or(installed),
        };
        debug!(
            flavor,
            actual = %actual,
            policy = %self.policy,
            selected = ?selected.as_ref().map(Version::as_str),
            "Selected firmware candidate"
        );
        Ok(selected)
    }
}
