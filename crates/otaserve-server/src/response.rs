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

//! Response builders for the update protocol
//!
//! Firmware responses are produced in two passes over one open handle: the
//! first computes length and MD5, then the handle is rewound and the bytes
//! are streamed in chunks. A file renamed over the entry after it was opened
//! does not leak into the transfer.

use axum::body::Body;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use md5::{Digest, Md5};
use otaserve_core::{CatalogError, FirmwareStore};
use otaserve_core::store::EntryReader;
use std::io::SeekFrom;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::Result;

/// Integrity header checked by the ESP8266 updater
pub const MD5_HEADER: &str = "x-md5";

const READ_CHUNK: usize = 64 * 1024;

/// Length and MD5 hex digest of a store entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub len: u64,
    pub md5: String,
}

pub async fn fingerprint(store: &dyn FirmwareStore, name: &str) -> Result<Fingerprint> {
    let mut reader = store.open(name).await?;
    fingerprint_reader(&mut reader).await
}

async fn fingerprint_reader(reader: &mut EntryReader) -> Result<Fingerprint> {
    let mut hasher = Md5::new();
    let mut buf = vec![0_u8; READ_CHUNK];
    let mut len = 0_u64;

    loop {
        let n = reader.read(&mut buf).await.map_err(CatalogError::from)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        len += n as u64;
    }

    Ok(Fingerprint {
        len,
        md5: format!("{:x}", hasher.finalize()),
    })
}

fn chunks(
    reader: EntryReader,
) -> impl futures_util::Stream<Item = std::io::Result<Vec<u8>>> + Send + 'static {
    futures_util::stream::try_unfold(reader, |mut reader| async move {
        let mut buf = vec![0_u8; READ_CHUNK];
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok::<_, std::io::Error>(Some((buf, reader)))
    })
}

/// Empty HTML response used for 304 and 400.
pub fn empty_html(status: StatusCode) -> Response {
    (status, [(CONTENT_TYPE, "text/html; charset=utf-8")]).into_response()
}

/// Stream `name` as an attachment with length and MD5 headers.
pub async fn firmware(store: &dyn FirmwareStore, name: &str) -> Result<Response> {
    let mut reader = store.open(name).await?;
    let fingerprint = fingerprint_reader(&mut reader).await?;
    reader
        .seek(SeekFrom::Start(0))
        .await
        .map_err(CatalogError::from)?;
    let body = Body::from_stream(chunks(reader));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(CONTENT_DISPOSITION, format!("attachment; filename={name}"))
        .header(CONTENT_LENGTH, fingerprint.len)
        .header(MD5_HEADER, fingerprint.md5)
        .body(body)?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use otaserve_core::MemoryStore;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_fingerprint() {
        let store = MemoryStore::new().with_entry("sensor-1.0.bin", b"hello world".to_vec());
        let fp = fingerprint(&store, "sensor-1.0.bin").await.unwrap();
        assert_eq!(fp.len, 11);
        assert_eq!(fp.md5, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[tokio::test]
    async fn test_fingerprint_empty_and_large() {
        let store = MemoryStore::new()
            .with_entry("empty", Vec::new())
            .with_entry("large", vec![0xA5_u8; READ_CHUNK * 3 + 17]);

        let empty = fingerprint(&store, "empty").await.unwrap();
        assert_eq!(empty.len, 0);
        assert_eq!(empty.md5, "d41d8cd98f00b204e9800998ecf8427e");

        let large = fingerprint(&store, "large").await.unwrap();
        assert_eq!(large.len, (READ_CHUNK * 3 + 17) as u64);
        let expected = format!("{:x}", Md5::digest(vec![0xA5_u8; READ_CHUNK * 3 + 17]));
        assert_eq!(large.md5, expected);
    }

    #[tokio::test]
    async fn test_firmware_response_headers_and_body() {
        let payload = b"\x7fELF firmware bytes".to_vec();
        let store = MemoryStore::new().with_entry("sensor-1.2.0.bin", payload.clone());

        let response = firmware(&store, "sensor-1.2.0.bin").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers().clone();
        assert_eq!(headers[CONTENT_TYPE], "application/octet-stream");
        assert_eq!(
            headers[CONTENT_DISPOSITION],
            "attachment; filename=sensor-1.2.0.bin"
        );
        assert_eq!(headers[CONTENT_LENGTH], payload.len().to_string().as_str());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.as_ref(), payload.as_slice());
        assert_eq!(
            headers[MD5_HEADER].to_str().unwrap(),
            format!("{:x}", Md5::digest(&body))
        );
    }

    /// Hands out the next image on every open, as if the file were
    /// replaced on disk between opens.
    #[derive(Debug)]
    struct ReplacedStore {
        images: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl FirmwareStore for ReplacedStore {
        async fn list(&self) -> otaserve_core::error::Result<Vec<String>> {
            Ok(vec!["sensor-1.2.0.bin".to_owned()])
        }

        async fn contains(&self, name: &str) -> otaserve_core::error::Result<bool> {
            Ok(name == "sensor-1.2.0.bin")
        }

        async fn read_to_string(&self, _name: &str) -> otaserve_core::error::Result<Option<String>> {
            Ok(None)
        }

        async fn open(&self, _name: &str) -> otaserve_core::error::Result<EntryReader> {
            let mut images = self.images.lock().unwrap();
            let image = if images.len() > 1 {
                images.remove(0)
            } else {
                images[0].clone()
            };
            Ok(Box::new(std::io::Cursor::new(image)))
        }
    }

    #[tokio::test]
    async fn test_firmware_headers_and_body_come_from_one_open() {
        let store = ReplacedStore {
            images: Mutex::new(vec![b"old image".to_vec(), b"replacement image".to_vec()]),
        };

        let response = firmware(&store, "sensor-1.2.0.bin").await.unwrap();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        assert_eq!(body.as_ref(), b"old image");
        assert_eq!(headers[CONTENT_LENGTH], body.len().to_string().as_str());
        assert_eq!(
            headers[MD5_HEADER].to_str().unwrap(),
            format!("{:x}", Md5::digest(&body))
        );
    }

    #[tokio::test]
    async fn test_firmware_missing_entry() {
        let store = MemoryStore::new();
        let err = firmware(&store, "sensor-9.9.bin").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_empty_html() {
        let response = empty_html(StatusCode::NOT_MODIFIED);
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
    }
}
