//! Object-store sources (S3, GCS, Azure): the stage reads the bucket directly.

use async_trait::async_trait;
use snowdrift_core::SourceKind;

use super::{Prober, SourceFile, SourceStorage};
use crate::config::ControlObjects;
use crate::error::ProbeError;

/// Files in a cloud bucket, reached through an external stage.
#[derive(Debug, Clone)]
pub struct CloudSource {
    prober: Prober,
}

impl CloudSource {
    pub fn new(prober: Prober) -> Self {
        Self { prober }
    }
}

#[async_trait]
impl SourceStorage for CloudSource {
    fn kind(&self) -> SourceKind {
        self.prober.storage().kind()
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

    fn push_files_statement(&self, _control: &ControlObjects, _file_type: &str) -> Option<String> {
        None
    }
}
