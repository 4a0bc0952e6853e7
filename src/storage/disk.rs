//! Persistent cache storage on the local filesystem.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/
//!   stores.json                 store names in creation order
//!   <hex(store name)>/
//!     <sha256(key)>.json        one entry: key, status, headers, body
//! ```
//!
//! Entry files are written to a temporary name and renamed into place, so
//! a reader never sees a half-written entry and concurrent writers to the
//! same key resolve as last-write-wins.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;
use url::Url;

use super::ensure_storable;
use super::traits::{CacheStorage, CacheStore};
use crate::types::{RequestKey, Response};
use crate::{Result, ShellCacheError};

const MANIFEST_FILE: &str = "stores.json";

/// Filesystem-backed [`CacheStorage`].
pub struct DiskCacheStorage {
    root: PathBuf,
    // Serialises read-modify-write of the store manifest.
    manifest_lock: Mutex<()>,
}

impl DiskCacheStorage {
    /// Use `root` as the storage directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            manifest_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_dir(&self, name: &str) -> PathBuf {
        self.root.join(hex::encode(name.as_bytes()))
    }

    async fn read_manifest(&self) -> Result<Vec<String>> {
        match fs::read(self.root.join(MANIFEST_FILE)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_manifest(&self, names: &[String]) -> Result<()> {
        write_atomic(&self.root.join(MANIFEST_FILE), &serde_json::to_vec(names)?).await
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>> {
        let _guard = self.manifest_lock.lock().await;
        let dir = self.store_dir(name);
        fs::create_dir_all(&dir).await?;

        let mut names = self.read_manifest().await?;
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
            self.write_manifest(&names).await?;
        }

        Ok(Arc::new(DiskCacheStore {
            name: name.to_string(),
            dir,
        }))
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.read_manifest().await?.iter().any(|n| n == name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let _guard = self.manifest_lock.lock().await;
        let mut names = self.read_manifest().await?;
        let before = names.len();
        names.retain(|n| n != name);
        let existed = names.len() != before;

        match fs::remove_dir_all(self.store_dir(name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if existed {
            self.write_manifest(&names).await?;
        }
        Ok(existed)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.read_manifest().await
    }
}

/// One store directory.
pub struct DiskCacheStore {
    name: String,
    dir: PathBuf,
}

impl DiskCacheStore {
    fn entry_path(&self, key: &RequestKey) -> PathBuf {
        let digest = Sha256::digest(key.to_string().as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &RequestKey) -> Result<Option<Response>> {
        let bytes = match fs::read(self.entry_path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: StoredEntry = serde_json::from_slice(&bytes)?;
        let (stored_key, response) = entry.decode()?;
        if stored_key != *key {
            // Digest collision: treat as a miss rather than serve another URL.
            warn!(cache = %self.name, %key, other = %stored_key, "entry key mismatch");
            return Ok(None);
        }
        Ok(Some(response))
    }

    async fn put(&self, key: RequestKey, response: Response) -> Result<()> {
        ensure_storable(&key, &response)?;
        let path = self.entry_path(&key);
        let entry = StoredEntry::encode(&key, &response);
        write_atomic(&path, &serde_json::to_vec(&entry)?).await
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        let mut keys = Vec::new();
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            let entry: StoredEntry = serde_json::from_slice(&bytes)?;
            keys.push(entry.decode()?.0);
        }
        Ok(keys)
    }
}

/// On-disk form of one cached entry.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    method: String,
    url: String,
    status: u16,
    /// Header names with base64-encoded values; values may hold any
    /// non-control byte, not only UTF-8.
    headers: Vec<(String, String)>,
    /// Base64-encoded body.
    body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response_url: Option<String>,
}

impl StoredEntry {
    fn encode(key: &RequestKey, response: &Response) -> Self {
        Self {
            method: key.method().to_string(),
            url: key.url().to_string(),
            status: response.status().as_u16(),
            headers: response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        BASE64.encode(value.as_bytes()),
                    )
                })
                .collect(),
            body: BASE64.encode(response.body()),
            response_url: response.url().map(|u| u.to_string()),
        }
    }

    fn decode(self) -> Result<(RequestKey, Response)> {
        let method = Method::from_bytes(self.method.as_bytes())
            .map_err(|e| ShellCacheError::Storage(format!("bad method {:?}: {e}", self.method)))?;
        let key = RequestKey::new(method, &Url::parse(&self.url)?);

        let status = StatusCode::from_u16(self.status)
            .map_err(|e| ShellCacheError::Storage(format!("bad status {}: {e}", self.status)))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let parsed = BASE64.decode(value).ok().and_then(|bytes| {
                Some((
                    HeaderName::from_bytes(name.as_bytes()).ok()?,
                    HeaderValue::from_bytes(&bytes).ok()?,
                ))
            });
            let Some((name, value)) = parsed else {
                warn!(url = %self.url, header = %name, "skipping unreadable stored header");
                continue;
            };
            headers.append(name, value);
        }

        let body = BASE64
            .decode(&self.body)
            .map_err(|e| ShellCacheError::Storage(format!("bad body for {}: {e}", self.url)))?;

        let mut response = Response::new(status, body).with_headers(headers);
        if let Some(url) = &self.response_url {
            response = response.with_url(Url::parse(url)?);
        }
        Ok((key, response))
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ShellCacheError::Storage(format!("invalid entry path {path:?}")))?;
    // Unique per write so concurrent writers never share a temp file.
    let tmp = path.with_file_name(format!(
        ".{file_name}.{}.{}.tmp",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    ));
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

static TMP_COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
