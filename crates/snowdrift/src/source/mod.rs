//! Source storage capability.
//!
//! Each source kind provides one [`SourceStorage`] implementation; the loader
//! never branches on the kind itself.

mod cloud;
mod local;
mod probe;

use std::sync::Arc;

use async_trait::async_trait;
use snowdrift_core::{BackendConfig, SourceKind, StorageError, StorageProvider};
use tracing::info;

use crate::config::{ControlObjects, SourceConfig};
use crate::error::ProbeError;

pub use cloud::CloudSource;
pub use local::LocalSource;
pub use probe::{Prober, SourceFile, anchored_pattern, header_line, split_header};

/// A reference-counted source.
pub type SourceStorageRef = Arc<dyn SourceStorage>;

/// What the loader needs from wherever the files live.
#[async_trait]
pub trait SourceStorage: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Keys matching `pattern` (anchored at the start), in lexicographic order.
    ///
    /// Cloud keys include the configured prefix; local keys are relative to
    /// the source folder.
    async fn list_matching(&self, pattern: &str) -> Result<Vec<String>, ProbeError>;

    /// The first matching object with content, with its header row.
    async fn first_non_empty(&self, pattern: &str) -> Result<Option<SourceFile>, ProbeError>;

    /// First non-blank line of `path`.
    async fn header_line(&self, path: &str) -> Result<Option<String>, ProbeError>;

    /// Statement uploading local files of `file_type` to the stage, if this
    /// source needs one.
    fn push_files_statement(&self, control: &ControlObjects, file_type: &str) -> Option<String>;
}

/// Open the configured source.
pub fn open_source(config: &SourceConfig, probe_bytes: usize) -> Result<SourceStorageRef, StorageError> {
    let storage = StorageProvider::new(config.backend_config()?)?;
    info!("Reading source files from {}", storage.canonical_url());
    Ok(match storage.config() {
        BackendConfig::Local(local) => {
            let folder = local.path.clone();
            Arc::new(LocalSource::new(Prober::new(storage, probe_bytes), folder))
        }
        _ => Arc::new(CloudSource::new(Prober::new(storage, probe_bytes))),
    })
}
