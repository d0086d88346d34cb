//! Azure Blob Storage backend implementation.

use std::collections::HashMap;
use std::sync::Arc;

use object_store::azure::MicrosoftAzureBuilder;
use object_store::path::Path;
use object_store::{ObjectStore, RetryConfig};
use snafu::prelude::*;

use crate::error::{AzureConfigSnafu, InvalidLocationSnafu, StorageError};

use super::{BackendConfig, StorageProvider, key_from_prefix};

/// Azure Blob Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureConfig {
    pub account: String,
    pub container: String,
    pub key: Option<Path>,
    pub access_key: Option<String>,
    pub tenant_id: Option<String>,
}

impl AzureConfig {
    /// The storage account is the configured bucket; the first prefix segment
    /// names the container and the rest is the key within it.
    pub fn new(account: &str, prefix: &str) -> Result<Self, StorageError> {
        let trimmed = prefix.trim_matches('/');
        let (container, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));
        ensure!(
            !container.is_empty(),
            InvalidLocationSnafu {
                message: "azure prefix must start with a container name".to_string(),
            }
        );

        Ok(Self {
            account: account.to_string(),
            container: container.to_string(),
            key: key_from_prefix(rest),
            access_key: None,
            tenant_id: None,
        })
    }

    /// Take the account key (and the account, if none was configured) from an
    /// Azure storage connection string.
    pub fn with_connection_string(mut self, connection_string: &str) -> Self {
        let parts = parse_connection_string(connection_string);
        if self.account.is_empty()
            && let Some(account) = parts.get("AccountName")
        {
            self.account = account.clone();
        }
        self.access_key = parts.get("AccountKey").cloned();
        self
    }
}

/// Split `Key1=Value1;Key2=Value2` into a map. Values may contain `=`.
pub fn parse_connection_string(connection_string: &str) -> HashMap<String, String> {
    connection_string
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

impl StorageProvider {
    pub(super) fn construct_azure(config: AzureConfig) -> Result<Self, StorageError> {
        let mut builder = MicrosoftAzureBuilder::from_env()
            .with_account(&config.account)
            .with_container_name(&config.container)
            .with_retry(RetryConfig::default());

        if let Some(access_key) = &config.access_key {
            builder = builder.with_access_key(access_key);
        }
        if let Some(tenant_id) = &config.tenant_id {
            builder = builder.with_tenant_id(tenant_id);
        }

        let object_store: Arc<dyn ObjectStore> =
            Arc::new(builder.build().context(AzureConfigSnafu)?);

        Ok(Self::from_store(BackendConfig::Azure(config), object_store))
    }
}
