//! snowdrift: batch loader that plans warehouse objects from a declarative
//! entity list, stages source files and bulk-loads them into tables.
//!
//! - `config/` - YAML configuration, merging and validation
//! - `entity` - normalized file-pattern-to-table mappings
//! - `planner` - databases, schemas and file formats a run needs
//! - `statements` - SQL text builders
//! - `engine/` - SQL engine trait and the Snowflake SQL API client
//! - `source/` - per-kind source storage (local, S3, GCS, Azure)
//! - `loader` - the run loop

pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod loader;
pub mod planner;
pub mod source;
pub mod statements;

pub use config::{CliArgs, Config};
pub use engine::{JobId, JobStatus, SnowflakeEngine, SqlEngine};
pub use entity::{Entity, TableKey};
pub use error::{EngineError, LoaderError, ProbeError};
pub use loader::{Loader, RunSummary};
pub use source::{SourceStorage, SourceStorageRef, open_source};
pub use snowdrift_core::init_tracing;
