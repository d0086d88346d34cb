//! SQL engine abstraction.
//!
//! The loader issues statements strictly one after another over a single
//! session. Long-running work (bulk copies, table rewrites) is submitted
//! asynchronously and awaited in groups with [`wait_for_jobs`].

mod snowflake;
mod wait;

use std::fmt;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::statements;

pub use snowflake::SnowflakeEngine;
pub use wait::wait_for_jobs;

/// Engine-assigned identifier of an asynchronously submitted statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last observed state of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed { message: String },
}

/// A session against the warehouse.
#[async_trait]
pub trait SqlEngine: Send + Sync {
    /// Run a statement to completion.
    async fn execute(&self, sql: &str) -> Result<(), EngineError>;

    /// Start a statement without waiting for it.
    async fn submit(&self, sql: &str) -> Result<JobId, EngineError>;

    /// Check on a previously submitted statement.
    async fn status(&self, job: &JobId) -> Result<JobStatus, EngineError>;

    /// Whether `PUT` of client-side files can run through this engine.
    fn supports_file_push(&self) -> bool {
        true
    }

    /// Make `warehouse` the compute for subsequent statements.
    async fn use_warehouse(&self, warehouse: &str) -> Result<(), EngineError> {
        self.execute(&statements::use_warehouse(warehouse)).await
    }
}
