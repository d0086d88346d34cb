//! Names of the warehouse objects the loader owns, plus run tuning knobs.

use serde::Deserialize;
use snowdrift_core::{MB, PollPolicy};

use crate::entity::normalize_identifier;

/// Fixed-name objects created and used by every run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ControlObjects {
    /// Scratch compute created for the run and dropped at the end.
    pub worker_warehouse: String,
    pub worker_warehouse_size: String,
    /// Holds the stage and the run log tables; never created by the loader.
    pub control_database: String,
    pub control_schema: String,
    pub stage: String,
    /// File formats are named `{prefix}_{n}`.
    pub file_format_prefix: String,
    pub load_log: String,
    pub failed_load_log: String,
}

impl Default for ControlObjects {
    fn default() -> Self {
        Self {
            worker_warehouse: "FILE_LOADER_WH".to_string(),
            worker_warehouse_size: "X-LARGE".to_string(),
            control_database: "FILE_LOADER_MASTER_DB".to_string(),
            control_schema: "ELT".to_string(),
            stage: "FL_STG".to_string(),
            file_format_prefix: "FL_FF".to_string(),
            load_log: "FL_LOG".to_string(),
            failed_load_log: "FL_FAILED_LOAD".to_string(),
        }
    }
}

impl ControlObjects {
    fn qualify(&self, name: &str) -> String {
        format!(
            "{}.{}.{}",
            normalize_identifier(&self.control_database),
            normalize_identifier(&self.control_schema),
            normalize_identifier(name)
        )
    }

    pub fn worker_warehouse_name(&self) -> String {
        normalize_identifier(&self.worker_warehouse)
    }

    pub fn control_database_name(&self) -> String {
        normalize_identifier(&self.control_database)
    }

    /// Fully qualified stage name.
    pub fn stage_name(&self) -> String {
        self.qualify(&self.stage)
    }

    /// Fully qualified run log table.
    pub fn load_log_table(&self) -> String {
        self.qualify(&self.load_log)
    }

    /// Fully qualified failed-load report table.
    pub fn failed_load_table(&self) -> String {
        self.qualify(&self.failed_load_log)
    }

    /// Unqualified name of the `id`-th file format.
    pub fn file_format_name(&self, id: u32) -> String {
        format!("{}_{id}", normalize_identifier(&self.file_format_prefix))
    }
}

/// The `loader` config section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    #[serde(flatten)]
    pub objects: ControlObjects,
    /// Delay between job status checks.
    pub poll_interval_ms: u64,
    /// Upper bound on each wait for a group of jobs; 0 waits forever.
    pub job_timeout_secs: u64,
    /// How much of each source object is read when probing.
    pub probe_bytes: usize,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            objects: ControlObjects::default(),
            poll_interval_ms: 1000,
            job_timeout_secs: 6 * 60 * 60,
            probe_bytes: MB,
        }
    }
}

impl LoaderSettings {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::from_millis_and_secs(self.poll_interval_ms, self.job_timeout_secs)
    }
}
