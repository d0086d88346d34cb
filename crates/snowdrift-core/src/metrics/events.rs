//! Internal events for snowdrift metrics emission.
//!
//! Each event struct is one measurable occurrence during a run and knows how
//! to record itself.

use std::time::Duration;

use metrics::{counter, histogram};
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    fn emit(self);
}

/// How a statement was handed to the SQL engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sync,
    Async,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sync => "sync",
            ExecutionMode::Async => "async",
        }
    }
}

/// Emitted once per statement sent to the engine.
pub struct StatementExecuted {
    pub mode: ExecutionMode,
}

impl InternalEvent for StatementExecuted {
    fn emit(self) {
        trace!(mode = self.mode.as_str(), "Statement executed");
        counter!("snowdrift_statements_total", "mode" => self.mode.as_str()).increment(1);
    }
}

/// Emitted when a wait group has settled.
pub struct JobsAwaited {
    /// Wait group label ("load" or "reorder").
    pub group: &'static str,
    pub count: u64,
    pub duration: Duration,
}

impl InternalEvent for JobsAwaited {
    fn emit(self) {
        trace!(group = self.group, count = self.count, duration = ?self.duration, "Jobs awaited");
        counter!("snowdrift_jobs_awaited_total", "group" => self.group).increment(self.count);
        histogram!("snowdrift_job_wait_seconds", "group" => self.group)
            .record(self.duration.as_secs_f64());
    }
}

/// Outcome of checking one source object for content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Empty,
    NonEmpty,
    Unreadable,
}

impl ProbeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::Empty => "empty",
            ProbeOutcome::NonEmpty => "non_empty",
            ProbeOutcome::Unreadable => "unreadable",
        }
    }
}

/// Emitted for every object inspected while looking for a header.
pub struct ObjectProbed {
    pub outcome: ProbeOutcome,
}

impl InternalEvent for ObjectProbed {
    fn emit(self) {
        trace!(outcome = self.outcome.as_str(), "Object probed");
        counter!("snowdrift_objects_probed_total", "outcome" => self.outcome.as_str())
            .increment(1);
    }
}

/// Storage operation type for metrics labeling.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    List,
    Get,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::List => "list",
            StorageOperation::Get => "get",
        }
    }
}

/// Request status for metrics labeling.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Emitted per storage request.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
    pub duration: Duration,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "snowdrift_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
        histogram!("snowdrift_storage_request_seconds", "operation" => self.operation.as_str())
            .record(self.duration.as_secs_f64());
    }
}
