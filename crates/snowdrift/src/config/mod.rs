//! Configuration for the snowdrift loader.
//!
//! A run is described by four sections spread over one or more YAML files:
//! `source` (where files live), `warehouse` (how to reach the warehouse),
//! `entities` (what to load where) and the optional `loader` tuning section.

mod control;

use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use snafu::prelude::*;

use snowdrift_core::config::{ConfigPath, Mergeable, load_from_paths};
use snowdrift_core::error::{MissingSectionSnafu, YamlParseSnafu};
use snowdrift_core::storage::{AzureConfig, BackendConfig, GcsConfig, LocalConfig, S3Config};
use snowdrift_core::{SourceKind, StorageError};

use crate::entity::{TableKey, parse_cluster_columns};
use crate::error::ConfigError;

pub use control::{ControlObjects, LoaderSettings};
pub use snowdrift_core::config::{CliArgs, interpolate};

/// A credential that must never show up in logs or debug output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Where the source files live.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Bucket, storage account, or local base folder.
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub aws_access_key_id: Option<String>,
    #[serde(default)]
    pub aws_secret_access_key: Option<Secret>,
    #[serde(default)]
    pub aws_region: Option<String>,
    #[serde(default)]
    pub gcs_service_account_path: Option<String>,
    #[serde(default)]
    pub azure_connection_string: Option<Secret>,
    #[serde(default)]
    pub azure_tenant_id: Option<String>,
}

impl SourceConfig {
    fn normalize(&mut self) {
        let bucket = self.bucket.trim_end_matches('/');
        // A bare "/" is the filesystem root for local sources.
        if !bucket.is_empty() || self.bucket.is_empty() {
            self.bucket = bucket.to_string();
        }
        self.prefix = self.prefix.trim_end_matches('/').to_string();
    }

    /// Storage backend configuration for this source.
    pub fn backend_config(&self) -> Result<BackendConfig, StorageError> {
        Ok(match self.kind {
            SourceKind::Local => BackendConfig::Local(LocalConfig::new(&self.bucket, &self.prefix)),
            SourceKind::S3 => {
                let mut config = S3Config::new(&self.bucket, &self.prefix);
                config.region = self.aws_region.clone();
                config.access_key_id = self.aws_access_key_id.clone();
                config.secret_access_key =
                    self.aws_secret_access_key.as_ref().map(|s| s.expose().to_string());
                BackendConfig::S3(config)
            }
            SourceKind::Gcs => {
                let mut config = GcsConfig::new(&self.bucket, &self.prefix);
                config.service_account_path = self.gcs_service_account_path.clone();
                BackendConfig::Gcs(config)
            }
            SourceKind::Azure => {
                let mut config = AzureConfig::new(&self.bucket, &self.prefix)?;
                if let Some(connection_string) = &self.azure_connection_string {
                    config = config.with_connection_string(connection_string.expose());
                }
                config.tenant_id = self.azure_tenant_id.clone();
                BackendConfig::Azure(config)
            }
        })
    }
}

/// How the SQL API authenticates the bearer token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    #[default]
    Oauth,
    KeypairJwt,
    ProgrammaticAccessToken,
}

impl TokenType {
    /// Value of the `X-Snowflake-Authorization-Token-Type` header.
    pub fn header_value(&self) -> &'static str {
        match self {
            TokenType::Oauth => "OAUTH",
            TokenType::KeypairJwt => "KEYPAIR_JWT",
            TokenType::ProgrammaticAccessToken => "PROGRAMMATIC_ACCESS_TOKEN",
        }
    }
}

/// Warehouse connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarehouseConfig {
    pub account: String,
    #[serde(default)]
    pub user: Option<String>,
    pub token: Secret,
    #[serde(default)]
    pub token_type: TokenType,
    /// Compute to switch back to once the run is over.
    pub warehouse: String,
    #[serde(default)]
    pub role: Option<String>,
    /// Storage integration used by external stages.
    #[serde(default)]
    pub integration: Option<String>,
    /// Override of `https://{account}.snowflakecomputing.com`.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl WarehouseConfig {
    pub fn base_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.snowflakecomputing.com", self.account),
        }
    }
}

/// One row of load configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityConfig {
    pub file_pattern: String,
    pub file_type: String,
    pub delimiter: String,
    #[serde(deserialize_with = "deserialize_flag")]
    pub has_header: bool,
    pub database: String,
    pub schema: String,
    pub table: String,
    #[serde(default, deserialize_with = "deserialize_columns")]
    pub cluster_by: Vec<String>,
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Text(text) => match text.trim().to_ascii_uppercase().as_str() {
            "Y" | "YES" | "TRUE" => Ok(true),
            "N" | "NO" | "FALSE" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean or Y/N, got '{other}'"
            ))),
        },
    }
}

fn deserialize_columns<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Columns {
        Text(String),
        List(Vec<String>),
    }

    Ok(match Option::<Columns>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Columns::Text(text)) => vec![text],
        Some(Columns::List(list)) => list,
    })
}

/// One YAML document before merging; every section optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialConfig {
    #[serde(default)]
    source: Option<SourceConfig>,
    #[serde(default)]
    warehouse: Option<WarehouseConfig>,
    #[serde(default)]
    loader: Option<LoaderSettings>,
    #[serde(default)]
    entities: Vec<EntityConfig>,
}

fn merge_section<T>(slot: &mut Option<T>, other: Option<T>, section: &str) -> Result<(), ConfigError> {
    if let Some(value) = other {
        if slot.is_some() {
            return Err(ConfigError::DuplicateSection {
                section: section.to_string(),
            });
        }
        *slot = Some(value);
    }
    Ok(())
}

impl Mergeable for PartialConfig {
    fn parse_yaml(contents: &str) -> Result<Self, ConfigError> {
        // An empty document is a valid, empty partial config.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).context(YamlParseSnafu)
    }

    fn merge(&mut self, other: Self) -> Result<(), ConfigError> {
        merge_section(&mut self.source, other.source, "source")?;
        merge_section(&mut self.warehouse, other.warehouse, "warehouse")?;
        merge_section(&mut self.loader, other.loader, "loader")?;
        self.entities.extend(other.entities);
        Ok(())
    }
}

/// Main configuration for snowdrift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub source: SourceConfig,
    pub warehouse: WarehouseConfig,
    pub loader: LoaderSettings,
    pub entities: Vec<EntityConfig>,
}

impl Config {
    /// Load and merge configuration from files and directories.
    pub fn from_paths(paths: &[ConfigPath]) -> Result<Self, ConfigError> {
        Self::from_partial(load_from_paths::<PartialConfig>(paths)?)
    }

    /// Parse configuration from a single YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let partial = PartialConfig::parse_yaml(&interpolate(contents)?)?;
        Self::from_partial(partial)
    }

    fn from_partial(partial: PartialConfig) -> Result<Self, ConfigError> {
        let mut source = partial.source.context(MissingSectionSnafu {
            section: "source",
        })?;
        let warehouse = partial.warehouse.context(MissingSectionSnafu {
            section: "warehouse",
        })?;
        source.normalize();

        let config = Self {
            source,
            warehouse,
            loader: partial.loader.unwrap_or_default(),
            entities: partial.entities,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, reporting every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let required = [
            ("source.bucket", self.source.bucket.as_str()),
            ("warehouse.account", self.warehouse.account.as_str()),
            ("warehouse.token", self.warehouse.token.expose()),
            ("warehouse.warehouse", self.warehouse.warehouse.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                errors.push(ConfigError::EmptyValue {
                    field: field.to_string(),
                });
            }
        }

        if !self.source.kind.is_local()
            && self
                .warehouse
                .integration
                .as_deref()
                .is_none_or(|integration| integration.trim().is_empty())
        {
            errors.push(ConfigError::InvalidValue {
                field: "warehouse.integration".to_string(),
                message: format!("a storage integration is required for {} sources", self.source.kind),
            });
        }

        if self.loader.poll_interval_ms == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "loader.poll_interval_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.loader.probe_bytes == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "loader.probe_bytes".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.entities.is_empty() {
            errors.push(ConfigError::InvalidValue {
                field: "entities".to_string(),
                message: "at least one entity is required".to_string(),
            });
        }

        for (index, entity) in self.entities.iter().enumerate() {
            errors.extend(validate_entity(index, entity));
        }
        errors.extend(cluster_conflicts(&self.entities));

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleErrors {
                errors: errors.iter().map(ToString::to_string).collect(),
            }),
        }
    }

    /// Build the storage backend configuration for the source section.
    pub fn backend_config(&self) -> Result<BackendConfig, StorageError> {
        self.source.backend_config()
    }
}

fn validate_entity(index: usize, entity: &EntityConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();
    let fields = [
        ("file_pattern", entity.file_pattern.as_str()),
        ("file_type", entity.file_type.as_str()),
        ("delimiter", entity.delimiter.as_str()),
        ("database", entity.database.as_str()),
        ("schema", entity.schema.as_str()),
        ("table", entity.table.as_str()),
    ];
    for (field, value) in fields {
        if value.trim().is_empty() {
            errors.push(ConfigError::EmptyValue {
                field: format!("entities[{index}].{field}"),
            });
        }
    }

    if let Err(e) = Regex::new(&entity.file_pattern) {
        errors.push(ConfigError::InvalidValue {
            field: format!("entities[{index}].file_pattern"),
            message: e.to_string(),
        });
    }
    errors
}

/// Entities targeting one table must not ask for different clustering keys.
fn cluster_conflicts(entities: &[EntityConfig]) -> Vec<ConfigError> {
    let mut seen: HashMap<TableKey, Vec<String>> = HashMap::new();
    let mut errors = Vec::new();

    for entity in entities {
        let columns = parse_cluster_columns(&entity.cluster_by);
        if columns.is_empty() {
            continue;
        }
        let key = TableKey::new(&entity.database, &entity.schema, &entity.table);
        match seen.get(&key) {
            Some(existing) if *existing != columns => errors.push(ConfigError::InvalidValue {
                field: format!("entities.cluster_by ({key})"),
                message: format!(
                    "conflicting clustering keys [{}] and [{}]",
                    existing.join(", "),
                    columns.join(", ")
                ),
            }),
            Some(_) => {}
            None => {
                seen.insert(key, columns);
            }
        }
    }
    errors
}
