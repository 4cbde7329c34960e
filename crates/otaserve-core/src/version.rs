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

//! Dotted firmware version parsing and comparison
//!
//! Firmware versions are plain dot-separated integer sequences ("1.4.12").
//! Unlike semver there is no fixed segment count, so versions of different
//! length are ordered by walking the longer one: an extra trailing segment
//! makes a version greater only when it is positive.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{CatalogError, Result};

/// Parsed firmware version.
///
/// Equality and ordering go through [`compare_segments`], so `1.2` and
/// `1.2.0` are equal even though their segment lists differ.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    segments: Vec<u64>,
}

impl Version {
    pub fn parse(s: &str) -> Result<Self> {
        Ok(Self {
            raw: s.to_owned(),
            segments: parse_segments(s)?,
        })
    }

    /// The string this version was parsed from, exactly as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }
}

impl FromStr for Version {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_segments(&self.segments, &other.segments)
    }
}

/// Split a dotted version into its integer segments.
pub fn parse_segments(s: &str) -> Result<Vec<u64>> {
    s.split('.')
        .map(|segment| {
            let malformed = || CatalogError::MalformedVersion {
                version: s.to_owned(),
                segment: segment.to_owned(),
            };
            if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            segment.parse::<u64>().map_err(|_| malformed())
        })
        .collect()
}

/// Three-way comparison of two segment lists.
///
/// The shorter operand is always handled by swapping and reversing, so the
/// loop only ever walks the longer (or equal length) side.
pub fn compare_segments(a: &[u64], b: &[u64]) -> Ordering {
    if a.len() < b.len() {
        return compare_segments(b, a).reverse();
    }

    for (i, &segment) in a.iter().enumerate() {
        let step = match b.get(i) {
            Some(&other) => segment.cmp(&other),
            None if segment > 0 => Ordering::Greater,
            None => Ordering::Equal,
        };
        if step != Ordering::Equal {
            return step;
        }
    }

    Ordering::Equal
}

/// Compare two version strings.
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    Ok(compare_segments(&parse_segments(a)?, &parse_segments(b)?))
}
