//! Local filesystem source: files are pushed into an internal stage.

use async_trait::async_trait;
use snowdrift_core::SourceKind;

use super::{Prober, SourceFile, SourceStorage};
use crate::config::ControlObjects;
use crate::error::ProbeError;
use crate::statements;

/// Files in a local folder.
#[derive(Debug, Clone)]
pub struct LocalSource {
    prober: Prober,
    folder: String,
}

impl LocalSource {
    pub fn new(prober: Prober, folder: impl Into<String>) -> Self {
        Self {
            prober,
            folder: folder.into(),
        }
    }
}

#[async_trait]
impl SourceStorage for LocalSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    async fn list_matching(&self, pattern: &str) -> Result<Vec<String>, ProbeError> {
        self.prober.list_matching(pattern).await
    }

    async fn first_non_empty(&self, pattern: &str) -> Result<Option<SourceFile>, ProbeError> {
        self.prober.first_non_empty(pattern).await
    }

    async fn header_line(&self, path: &str) -> Result<Option<String>, ProbeError> {
        self.prober.header_line(path).await
    }

    fn push_files_statement(&self, control: &ControlObjects, file_type: &str) -> Option<String> {
        Some(statements::put_files(control, &self.folder, file_type))
    }
}
