//! Local filesystem storage backend implementation.

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use snafu::prelude::*;
use std::sync::Arc;

use crate::error::{InvalidLocationSnafu, ObjectStoreSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// Local filesystem configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    /// Absolute directory holding the source files.
    pub path: String,
}

impl LocalConfig {
    /// Join a base folder and a prefix the way the source config expresses them.
    pub fn new(folder: &str, prefix: &str) -> Self {
        let folder = folder.trim_end_matches('/');
        let prefix = prefix.trim_matches('/');
        let path = if prefix.is_empty() {
            folder.to_string()
        } else {
            format!("{folder}/{prefix}")
        };
        Self { path }
    }
}

impl StorageProvider {
    pub(super) fn construct_local(config: LocalConfig) -> Result<Self, StorageError> {
        ensure!(
            std::path::Path::new(&config.path).is_absolute(),
            InvalidLocationSnafu {
                message: format!("local source path '{}' must be absolute", config.path),
            }
        );

        // The source root is never created; a missing folder simply lists empty.
        let object_store: Arc<dyn ObjectStore> = if std::path::Path::new(&config.path).is_dir() {
            Arc::new(LocalFileSystem::new_with_prefix(&config.path).context(ObjectStoreSnafu)?)
        } else {
            Arc::new(object_store::memory::InMemory::new())
        };

        Ok(Self::from_store(BackendConfig::Local(config), object_store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_and_prefix_join() {
        assert_eq!(LocalConfig::new("/data/", "landing/").path, "/data/landing");
        assert_eq!(LocalConfig::new("/data", "").path, "/data");
    }

    #[test]
    fn test_relative_path_rejected() {
        let result = StorageProvider::new(BackendConfig::Local(LocalConfig::new("data", "")));
        assert!(matches!(result, Err(StorageError::InvalidLocation { .. })));
    }

    #[tokio::test]
    async fn test_missing_folder_lists_empty() {
        let storage =
            StorageProvider::new(BackendConfig::Local(LocalConfig::new("/nonexistent/snowdrift", "")))
                .unwrap();
        assert!(storage.list().await.unwrap().is_empty());
    }
}
