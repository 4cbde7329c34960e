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

//! Version compatibility overrides
//!
//! The firmware directory may contain a `.updateinfo` descriptor with one
//! `boundary=required` rule per line. A candidate at or above `boundary`
//! may only be installed on devices already running at least `required`.
//! When several boundaries apply, the highest one below the candidate wins.
//!
//! The descriptor is read again on every check, so edits take effect on the
//! next request.

use tracing::debug;

use crate::error::{CatalogError, Result};
use crate::store::FirmwareStore;
use crate::version::Version;

/// Name of the descriptor inside the firmware store
pub const DESCRIPTOR_NAME: &str = ".updateinfo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideRule {
    /// Candidates at or above this version are governed by the rule
    pub boundary: Version,
    /// Minimum version the device must already run
    pub required: Version,
}

/// Parse descriptor content.
///
/// Blank lines and `#` comments are ignored. Any other line without a
/// `key=value` pair of valid versions fails the whole descriptor. A repeated
/// key replaces the earlier rule.
pub fn parse_descriptor(content: &str) -> Result<Vec<OverrideRule>> {
    let mut rules: Vec<OverrideRule> = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let malformed = || CatalogError::MalformedDescriptor {
            line: index + 1,
            content: line.to_owned(),
        };
        let (key, value) = trimmed.split_once('=').ok_or_else(malformed)?;
        let boundary = Version::parse(key.trim()).map_err(|_| malformed())?;
        let required = Version::parse(value.trim()).map_err(|_| malformed())?;

        match rules
            .iter_mut()
            .find(|rule| rule.boundary.as_str() == boundary.as_str())
        {
            Some(existing) => existing.required = required,
            None => rules.push(OverrideRule { boundary, required }),
        }
    }

    Ok(rules)
}

/// Pick the rule with the highest boundary not above `candidate`.
pub fn governing_rule<'a>(rules: &'a [OverrideRule], candidate: &Version) -> Option<&'a OverrideRule> {
    let mut best: Option<&OverrideRule> = None;
    for rule in rules {
        if *candidate >= rule.boundary && best.is_none_or(|b| b.boundary < rule.boundary) {
            best = Some(rule);
        }
    }
    best
}

/// Evaluate already loaded rules for a single upgrade step.
pub fn rules_allow(rules: &[OverrideRule], actual: &Version, candidate: &Version) -> bool {
    if actual.as_str() == candidate.as_str() {
        return true;
    }
    governing_rule(rules, candidate).is_none_or(|rule| *actual >= rule.required)
}

/// Compatibility checks against the descriptor of a firmware store
#[derive(Debug, Clone, Copy)]
pub struct CompatibilityOverrideTable<'a> {
    store: &'a dyn FirmwareStore,
}

impl<'a> CompatibilityOverrideTable<'a> {
    pub fn new(store: &'a dyn FirmwareStore) -> Self {
        Self { store }
    }

    /// Load the current rules, `None` if no descriptor is present.
    pub async fn load(&self) -> Result<Option<Vec<OverrideRule>>> {
        match self.store.read_to_string(DESCRIPTOR_NAME).await? {
            Some(content) => parse_descriptor(&content).map(Some),
            None => Ok(None),
        }
    }

    /// Whether a device on `actual` may receive `candidate`.
    pub async fn is_compatible(&self, actual: &Version, candidate: &Version) -> Result<bool> {
        if actual.as_str() == candidate.as_str() {
            return Ok(true);
        }

        let Some(rules) = self.load().await? else {
            return Ok(true);
        };

        let allowed = rules_allow(&rules, actual, candidate);
        if !allowed {
            debug!(
                actual = %actual,
                candidate = %candidate,
                "Candidate blocked by compatibility override"
            );
        }
        Ok(allowed)
    }
}
