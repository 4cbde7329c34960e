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

//! otaserve core - firmware selection for OTA updates
//!
//! Everything needed to decide which binary a polling device should get:
//! dotted version comparison, the `.updateinfo` compatibility overrides and
//! the per-flavor firmware catalog on top of a read-only store.

pub mod catalog;
pub mod error;
pub mod overrides;
pub mod store;
pub mod version;

pub use catalog::{FirmwareCatalog, FirmwareEntry, UpgradePolicy};
pub use error::CatalogError;
pub use overrides::{CompatibilityOverrideTable, DESCRIPTOR_NAME};
pub use store::{DirectoryStore, FirmwareStore, MemoryStore};
pub use version::{Version, compare};
