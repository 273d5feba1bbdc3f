//! In-memory mirror and archive fixtures shared by the unit tests.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures_util::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use super::download::{cancellable, join_url, Fetched, Transport};
use super::error::FetchError;

pub const TEST_MIRROR: &str = "https://mirror.test/node";

#[derive(Debug, Clone)]
pub enum Route {
    Body(Vec<u8>),
    Status(u16),
    Connect,
    /// Sends the given prefix, then never produces another byte.
    Stall(Vec<u8>),
}

pub struct MemoryTransport {
    mirror: String,
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            mirror: TEST_MIRROR.to_string(),
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn route(self, path: &str, route: Route) -> Self {
        self.set(path, route);
        self
    }

    pub fn set(&self, path: &str, route: Route) {
        self.routes.lock().unwrap().insert(path.to_string(), route);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn chunked(content: Vec<u8>) -> Vec<Result<Bytes, FetchError>> {
    content
        .chunks(1024)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect()
}

#[async_trait]
impl Transport for MemoryTransport {
    fn mirror(&self) -> &str {
        &self.mirror
    }

    async fn fetch(&self, path: &str, cancel: &CancellationToken) -> Result<Fetched, FetchError> {
        let path = path.trim_start_matches('/').to_string();
        self.requests.lock().unwrap().push(path.clone());
        let url = join_url(&self.mirror, &path)?.to_string();

        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let route = self.routes.lock().unwrap().get(&path).cloned();
        match route {
            None => Err(FetchError::from_status(&url, 404)),
            Some(Route::Status(status)) => Err(FetchError::from_status(&url, status)),
            Some(Route::Connect) => Err(FetchError::Connect {
                mirror: self.mirror.clone(),
            }),
            Some(Route::Body(content)) => Ok(Fetched {
                url,
                total: Some(content.len() as u64),
                body: cancellable(stream::iter(chunked(content)), cancel.clone()),
            }),
            Some(Route::Stall(prefix)) => {
                let total = Some(prefix.len() as u64 * 10 + 1);
                let body = stream::iter(chunked(prefix)).chain(stream::pending::<Result<Bytes, FetchError>>());
                Ok(Fetched {
                    url,
                    total,
                    body: cancellable(body, cancel.clone()),
                })
            }
        }
    }
}

pub fn sha256_hex(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

pub fn shasums(entries: &[(&str, &[u8])]) -> Vec<u8> {
    entries
        .iter()
        .map(|(name, content)| format!("{}  {}\n", sha256_hex(content), name))
        .collect::<String>()
        .into_bytes()
}

/// A gzipped tarball shaped like an official Unix release.
pub fn tarball(root: &str) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let files: [(&str, &[u8], u32); 3] = [
        ("bin/node", b"#!/bin/sh\necho node\n", 0o755),
        ("lib/node_modules/npm/package.json", b"{\"name\":\"npm\"}", 0o644),
        ("README.md", b"Node.js\n", 0o644),
    ];

    for (path, content, mode) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/{}", root, path), content)
            .unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}

/// A zip shaped like an official Windows release.
pub fn zip_archive(root: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default();

    writer
        .start_file(format!("{}/node.exe", root), options)
        .unwrap();
    writer.write_all(b"MZ fake node").unwrap();
    writer
        .start_file(format!("{}/npm.cmd", root), options)
        .unwrap();
    writer.write_all(b"@echo off").unwrap();

    writer.finish().unwrap().into_inner()
}
