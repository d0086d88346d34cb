//! snowdrift-core: shared components for the snowdrift loader.
//!
//! - `storage/` - Multi-cloud storage abstraction (S3, GCS, Azure, local)
//! - `config/` - CLI paths, multi-file merging and environment interpolation
//! - `compression` - Extension-driven decoding of probed objects
//! - `polling` - Fixed-interval polling with a timeout bound
//! - `metrics/` - Metric events behind the `emit!` macro
//! - `error` - Common error types

pub mod compression;
pub mod config;
pub mod error;
pub mod metrics;
pub mod polling;
pub mod storage;
pub mod tracing;

pub use compression::Compression;
pub use config::{CliArgs, ConfigPath, KB, MB, Mergeable, load_from_paths};
pub use error::{ConfigError, PollTimeout, StorageError};
pub use polling::{PollOutcome, PollPolicy, poll_until};
pub use storage::{BackendConfig, SourceKind, StorageProvider};
pub use crate::tracing::init_tracing;
