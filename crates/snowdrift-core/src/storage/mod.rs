//! Multi-cloud storage abstraction.
//!
//! Provides one interface for listing and reading source objects in S3, GCS,
//! Azure Blob Storage and the local filesystem. Cloud providers list below
//! `bucket/prefix` but report full object keys, prefix included, because that
//! is what a stage pattern is matched against. Local providers are rooted at
//! the source folder and report folder-relative paths.

mod azure;
mod gcs;
mod local;
mod s3;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use object_store::ObjectStore;
use object_store::path::Path;
use serde::{Deserialize, Deserializer};
use snafu::prelude::*;
use tracing::debug;

use crate::emit;
use crate::error::{ObjectStoreSnafu, StorageError};
use crate::metrics::events::{RequestStatus, StorageOperation, StorageRequest};

pub use azure::{AzureConfig, parse_connection_string};
pub use gcs::GcsConfig;
pub use local::LocalConfig;
pub use s3::S3Config;

/// Where source files live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Local,
    S3,
    Gcs,
    Azure,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Local => "LOCAL",
            SourceKind::S3 => "S3",
            SourceKind::Gcs => "GCS",
            SourceKind::Azure => "AZURE",
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, SourceKind::Local)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOCAL" => Ok(SourceKind::Local),
            "S3" => Ok(SourceKind::S3),
            "GCS" => Ok(SourceKind::Gcs),
            "AZURE" => Ok(SourceKind::Azure),
            other => Err(format!(
                "unknown source kind '{other}' (expected LOCAL, S3, GCS or AZURE)"
            )),
        }
    }
}

impl<'de> Deserialize<'de> for SourceKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Gcs(GcsConfig),
    Azure(AzureConfig),
    Local(LocalConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> SourceKind {
        match self {
            BackendConfig::S3(_) => SourceKind::S3,
            BackendConfig::Gcs(_) => SourceKind::Gcs,
            BackendConfig::Azure(_) => SourceKind::Azure,
            BackendConfig::Local(_) => SourceKind::Local,
        }
    }

    /// Human-readable root, e.g. `s3://bucket/prefix`.
    pub fn root_url(&self) -> String {
        let (base, key) = match self {
            BackendConfig::S3(s3) => (format!("s3://{}", s3.bucket), s3.key.as_ref()),
            BackendConfig::Gcs(gcs) => (format!("gs://{}", gcs.bucket), gcs.key.as_ref()),
            BackendConfig::Azure(azure) => (
                format!(
                    "https://{}.blob.core.windows.net/{}",
                    azure.account, azure.container
                ),
                azure.key.as_ref(),
            ),
            BackendConfig::Local(local) => (format!("file://{}", local.path), None),
        };
        match key {
            Some(key) => format!("{base}/{key}"),
            None => base,
        }
    }

    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Gcs(gcs) => gcs.key.as_ref(),
            BackendConfig::Azure(azure) => azure.key.as_ref(),
            BackendConfig::Local(_) => None,
        }
    }
}

/// Turn an optional prefix into an object-store key, ignoring empty prefixes.
pub(crate) fn key_from_prefix(prefix: &str) -> Option<Path> {
    let trimmed = prefix.trim_matches('/');
    (!trimmed.is_empty()).then(|| Path::from(trimmed))
}

/// Storage provider that abstracts over different cloud storage backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

impl StorageProvider {
    /// Wrap an already built object store for `config`.
    pub fn from_store(config: BackendConfig, object_store: Arc<dyn ObjectStore>) -> Self {
        Self {
            canonical_url: config.root_url(),
            config,
            object_store,
        }
    }

    /// Build a provider for the given backend.
    pub fn new(config: BackendConfig) -> Result<Self, StorageError> {
        match config {
            BackendConfig::S3(config) => Self::construct_s3(config),
            BackendConfig::Gcs(config) => Self::construct_gcs(config),
            BackendConfig::Azure(config) => Self::construct_azure(config),
            BackendConfig::Local(config) => Self::construct_local(config),
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.config.kind()
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Human-readable root of this provider, e.g. `s3://bucket/prefix`.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// List every object below the root.
    ///
    /// Paths are object keys as the store names them: the full key within the
    /// bucket or container for cloud backends, the folder-relative path for
    /// local ones. The result is sorted so callers probing "the first" object
    /// get the same answer on every run. A missing root lists as empty.
    pub async fn list(&self) -> Result<Vec<String>, StorageError> {
        let start = Instant::now();

        let result: Result<Vec<String>, object_store::Error> = self
            .object_store
            .list(self.config.key())
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await;

        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: if result.is_ok() {
                RequestStatus::Success
            } else {
                RequestStatus::Error
            },
            duration: start.elapsed(),
        });

        let mut paths = match result.context(ObjectStoreSnafu) {
            Ok(paths) => paths,
            Err(e) if e.is_not_found() => {
                debug!(root = %self.canonical_url, "Storage root does not exist, nothing to list");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        paths.sort();
        Ok(paths)
    }

    /// Read at most `limit` bytes from the start of the object at `path`, a
    /// key as returned by [`StorageProvider::list`].
    ///
    /// The object is streamed and the stream dropped once enough bytes have
    /// arrived, so probing a multi-gigabyte file costs one chunk or two.
    pub async fn read_head(&self, path: &str, limit: usize) -> Result<Bytes, StorageError> {
        let start = Instant::now();
        let path = Path::from(path);
        let result = self.read_head_inner(&path, limit).await;

        emit!(StorageRequest {
            operation: StorageOperation::Get,
            status: if result.is_ok() {
                RequestStatus::Success
            } else {
                RequestStatus::Error
            },
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)
    }

    async fn read_head_inner(&self, path: &Path, limit: usize) -> Result<Bytes, object_store::Error> {
        let mut stream = self.object_store.get(path).await?.into_stream();
        let mut buffer = BytesMut::new();

        while buffer.len() < limit {
            match stream.try_next().await? {
                Some(chunk) => buffer.extend_from_slice(&chunk),
                None => break,
            }
        }

        buffer.truncate(limit);
        Ok(buffer.freeze())
    }
}
