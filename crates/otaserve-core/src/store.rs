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

//! Read-only firmware storage
//!
//! The catalog never touches the filesystem directly. It sees a flat store
//! of named entries, which is either a real directory ([`DirectoryStore`])
//! or an in-memory map ([`MemoryStore`]). Nothing is cached: every call
//! reflects the current contents.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncSeek};

use crate::error::Result;

/// Seekable byte stream of a single store entry.
pub trait EntryRead: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> EntryRead for T {}

pub type EntryReader = Box<dyn EntryRead>;

/// Flat, read-only store of firmware files keyed by file name
#[async_trait]
pub trait FirmwareStore: Send + Sync + fmt::Debug {
    /// Names of all regular entries
    async fn list(&self) -> Result<Vec<String>>;

    /// Whether an entry with exactly this name exists
    async fn contains(&self, name: &str) -> Result<bool>;

    /// Read a text entry, `None` if it does not exist
    async fn read_to_string(&self, name: &str) -> Result<Option<String>>;

    /// Open an entry for streaming
    async fn open(&self, name: &str) -> Result<EntryReader>;
}

/// Entry names are single path components; anything else never resolves.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

fn not_found(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such firmware entry: {name}"))
}

/// Store backed by a directory on disk
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_path(&self, name: &str) -> Option<PathBuf> {
        is_plain_name(name).then(|| self.root.join(name))
    }
}

#[async_trait]
impl FirmwareStore for DirectoryStore {
    async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            // Follows symlinks, a dangling link is simply not listed
            match tokio::fs::metadata(entry.path()).await {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => tracing::debug!(name = ?raw, "Skipping non UTF-8 file name"),
            }
        }
        Ok(names)
    }

    async fn contains(&self, name: &str) -> Result<bool> {
        let Some(path) = self.entry_path(name) else {
            return Ok(false);
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_to_string(&self, name: &str) -> Result<Option<String>> {
        let Some(path) = self.entry_path(name) else {
            return Ok(None);
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn open(&self, name: &str) -> Result<EntryReader> {
        let path = self.entry_path(name).ok_or_else(|| not_found(name))?;
        let file = tokio::fs::File::open(&path).await?;
        Ok(Box::new(file))
    }
}

/// In-memory store, mostly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entry(mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(name, content);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.entries.insert(name.into(), content.into());
    }
}

#[async_trait]
impl FirmwareStore for MemoryStore {
    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }

    async fn contains(&self, name: &str) -> Result<bool> {
        Ok(is_plain_name(name) && self.entries.contains_key(name))
    }

    async fn read_to_string(&self, name: &str) -> Result<Option<String>> {
        match self.entries.get(name) {
            Some(bytes) => String::from_utf8(bytes.clone())
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into()),
            None => Ok(None),
        }
    }

    async fn open(&self, name: &str) -> Result<EntryReader> {
        let bytes = self.entries.get(name).ok_or_else(|| not_found(name))?;
        Ok(Box::new(io::Cursor::new(bytes.clone())))
    }
}
