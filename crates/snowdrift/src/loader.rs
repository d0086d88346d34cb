//! The run loop: plan objects, create them, stage and load files, cluster.
//!
//! Statements go out one at a time over a single engine session. Each phase
//! and each per-table load or cluster action first writes a row to the run
//! log, so a failed run shows how far it got.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use snafu::prelude::*;
use snowdrift_core::PollPolicy;
use tracing::{debug, info};

use crate::config::{Config, ControlObjects};
use crate::engine::{JobId, SqlEngine, wait_for_jobs};
use crate::entity::{Entity, TableKey, positional_columns};
use crate::error::{FilePushUnsupportedSnafu, LoaderError};
use crate::planner::ObjectPlan;
use crate::source::{SourceStorageRef, split_header};
use crate::statements;

/// Where the stage points.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StageTarget {
    bucket: String,
    prefix: String,
    integration: Option<String>,
}

/// What a completed run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub tables_created: Vec<TableKey>,
    pub load_jobs: Vec<JobId>,
    pub clustered_tables: Vec<TableKey>,
}

/// Drives one load run.
pub struct Loader {
    control: ControlObjects,
    policy: PollPolicy,
    default_warehouse: String,
    stage: StageTarget,
    entities: Vec<Entity>,
    plan: ObjectPlan,
    engine: Arc<dyn SqlEngine>,
    source: SourceStorageRef,
}

impl Loader {
    pub fn new(config: &Config, engine: Arc<dyn SqlEngine>, source: SourceStorageRef) -> Self {
        let control = config.loader.objects.clone();
        let mut entities: Vec<Entity> = config.entities.iter().map(Entity::from).collect();
        let plan = ObjectPlan::build(&mut entities, &control);

        Self {
            control,
            policy: config.loader.poll_policy(),
            default_warehouse: config.warehouse.warehouse.clone(),
            stage: StageTarget {
                bucket: config.source.bucket.clone(),
                prefix: config.source.prefix.clone(),
                integration: config.warehouse.integration.clone(),
            },
            entities,
            plan,
            engine,
            source,
        }
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Log the run setup, one line per entity. Credentials are not logged.
    pub fn log_startup_info(&self) {
        info!(
            "Source: {} (bucket: {}, prefix: {})",
            self.source.kind(),
            self.stage.bucket,
            if self.stage.prefix.is_empty() { "<none>" } else { &self.stage.prefix }
        );
        info!(
            "Warehouse: {} (worker: {}), integration: {}",
            self.default_warehouse,
            self.control.worker_warehouse_name(),
            self.stage.integration.as_deref().unwrap_or("<none>")
        );
        info!(
            "Planned {} database(s), {} schema(s), {} file format(s) for {} entit(ies)",
            self.plan.databases.len(),
            self.plan.schemas.len(),
            self.plan.file_formats.len(),
            self.entities.len()
        );
        for entity in &self.entities {
            info!(
                "  Entity: '{}' ({}, delimiter '{}', header: {}) -> {} [format: {}, cluster by: {}]",
                entity.file_pattern,
                entity.file_type,
                entity.delimiter,
                entity.has_header,
                entity.target,
                entity.file_format_name.as_deref().unwrap_or("-"),
                if entity.cluster_by.is_empty() {
                    "-".to_string()
                } else {
                    entity.cluster_by.join(", ")
                }
            );
        }
    }

    /// Execute the whole run.
    ///
    /// Any failed statement or job stops the run where it is; objects created
    /// so far are left in place.
    pub async fn run(&mut self) -> Result<RunSummary, LoaderError> {
        self.check_file_push()?;
        let mut summary = RunSummary::default();

        self.execute(&statements::truncate_log(&self.control)).await?;
        info!("STARTED");
        self.log_step("START", "").await?;

        info!("Creating DB Objects");
        self.provision_warehouse().await?;
        self.create_databases().await?;
        self.create_schemas().await?;
        self.create_file_formats().await?;
        summary.tables_created = self.create_tables().await?;
        self.create_stage().await?;

        info!("Putting Files");
        self.put_files().await?;

        info!("Loading Tables");
        summary.load_jobs = self.load_tables().await?;

        info!("Clustering");
        summary.clustered_tables = self.cluster_tables().await?;

        info!("Cleanup");
        self.cleanup().await?;

        info!(
            tables = summary.tables_created.len(),
            loads = summary.load_jobs.len(),
            clustered = summary.clustered_tables.len(),
            "COMPLETED"
        );
        Ok(summary)
    }

    /// Refuse a run whose files cannot reach the stage, before anything is
    /// created or replaced.
    fn check_file_push(&self) -> Result<(), LoaderError> {
        let needs_push = self.entities.iter().any(|entity| {
            self.source
                .push_files_statement(&self.control, &entity.file_type)
                .is_some()
        });
        ensure!(
            !needs_push || self.engine.supports_file_push(),
            FilePushUnsupportedSnafu {
                kind: self.source.kind()
            }
        );
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<(), LoaderError> {
        self.engine.execute(sql).await?;
        Ok(())
    }

    async fn log_step(&self, group: &str, step: &str) -> Result<(), LoaderError> {
        self.execute(&statements::log_step(&self.control, group, step))
            .await
    }

    async fn provision_warehouse(&self) -> Result<(), LoaderError> {
        self.log_step("Creating DB Objects", "Warehouse").await?;
        self.execute(&statements::create_warehouse(&self.control)).await?;
        self.engine
            .use_warehouse(&self.control.worker_warehouse_name())
            .await?;
        Ok(())
    }

    async fn create_databases(&self) -> Result<(), LoaderError> {
        self.log_step("Creating DB Objects", "Databases").await?;
        for database in &self.plan.databases {
            self.execute(&statements::create_database(database)).await?;
        }
        Ok(())
    }

    async fn create_schemas(&self) -> Result<(), LoaderError> {
        self.log_step("Creating DB Objects", "Schemas").await?;
        for key in &self.plan.schemas {
            self.execute(&statements::create_schema(&key.database, &key.schema))
                .await?;
        }
        Ok(())
    }

    async fn create_file_formats(&self) -> Result<(), LoaderError> {
        self.log_step("Creating DB Objects", "File Formats").await?;
        for (key, name) in self.plan.named_file_formats(&self.control) {
            self.execute(&statements::create_file_format(key, &name))
                .await?;
        }
        Ok(())
    }

    /// Create each target table once, from the first non-empty matching file.
    ///
    /// Header-bearing entities go first so they define the columns of a
    /// shared table. Entities whose table already exists are not probed.
    async fn create_tables(&mut self) -> Result<Vec<TableKey>, LoaderError> {
        self.log_step("Creating DB Objects", "Tables").await?;

        let mut order: Vec<usize> = (0..self.entities.len()).collect();
        order.sort_by_key(|&i| !self.entities[i].has_header);

        let mut created = IndexSet::new();
        for i in order {
            let entity = &self.entities[i];
            if created.contains(&entity.target) {
                continue;
            }

            let Some(file) = self.source.first_non_empty(&entity.file_pattern).await? else {
                info!(
                    "No non-empty file matches '{}', skipping {}",
                    entity.file_pattern, entity.target
                );
                continue;
            };

            let columns = resolve_columns(entity, &file.header);
            debug!(path = %file.path, columns = columns.len(), "Creating {}", entity.target);
            self.execute(&statements::create_table(&entity.target, &columns))
                .await?;

            let target = entity.target.clone();
            self.entities[i].has_non_empty_file = true;
            created.insert(target);
        }
        Ok(created.into_iter().collect())
    }

    async fn create_stage(&self) -> Result<(), LoaderError> {
        self.log_step("Creating DB Objects", "Stage").await?;
        self.execute(&statements::create_stage(
            &self.control,
            self.source.kind(),
            self.stage.integration.as_deref(),
            &self.stage.bucket,
            &self.stage.prefix,
        ))
        .await
    }

    /// Push local files into the stage, once per distinct file type.
    async fn put_files(&self) -> Result<(), LoaderError> {
        self.log_step("Putting Files", "").await?;

        let mut pushed = HashSet::new();
        for entity in &self.entities {
            if !pushed.insert(entity.file_type.as_str()) {
                continue;
            }
            if let Some(sql) = self
                .source
                .push_files_statement(&self.control, &entity.file_type)
            {
                self.execute(&sql).await?;
            }
        }
        Ok(())
    }

    /// Submit one copy job per discovered entity, wait for all of them, then
    /// collect rejected files into the failed-load table.
    async fn load_tables(&self) -> Result<Vec<JobId>, LoaderError> {
        let mut jobs = Vec::new();
        for entity in self.entities.iter().filter(|e| e.has_non_empty_file) {
            let Some(file_format) = entity.file_format_name.as_deref() else {
                continue;
            };
            self.log_step(
                "Loading Tables",
                &format!("{} ({})", entity.target, entity.file_pattern),
            )
            .await?;
            let job = self
                .engine
                .submit(&statements::copy_into(
                    &self.control,
                    &entity.target,
                    &entity.file_pattern,
                    file_format,
                ))
                .await?;
            debug!(job = %job, "Submitted load of {}", entity.target);
            jobs.push(job);
        }

        wait_for_jobs(self.engine.as_ref(), &jobs, &self.policy, "load").await?;

        if let Some(sql) = statements::create_failed_load_table(&self.control, &jobs) {
            self.execute(&sql).await?;
        }
        Ok(jobs)
    }

    /// Rewrite each clustered table in key order, then set its clustering key.
    async fn cluster_tables(&self) -> Result<Vec<TableKey>, LoaderError> {
        let mut tables: IndexMap<&TableKey, &[String]> = IndexMap::new();
        for entity in self.entities.iter().filter(|e| e.wants_clustering()) {
            tables.insert(&entity.target, &entity.cluster_by);
        }

        let mut jobs = Vec::with_capacity(tables.len());
        for (table, columns) in &tables {
            self.log_step("Cluster", &format!("{table} (reordering table)"))
                .await?;
            jobs.push(
                self.engine
                    .submit(&statements::reorder_table(table, columns))
                    .await?,
            );
        }

        wait_for_jobs(self.engine.as_ref(), &jobs, &self.policy, "reorder").await?;

        for (table, columns) in &tables {
            self.log_step("Cluster", &format!("{table} (clustering)"))
                .await?;
            self.execute(&statements::cluster_by(table, columns)).await?;
        }
        Ok(tables.into_keys().cloned().collect())
    }

    async fn cleanup(&self) -> Result<(), LoaderError> {
        self.engine.use_warehouse(&self.default_warehouse).await?;
        self.log_step("Cleanup", "Dropping Warehouse").await?;
        self.execute(&statements::drop_warehouse(
            &self.control.worker_warehouse_name(),
        ))
        .await?;
        self.log_step("END", "").await
    }
}

/// Column names for `entity`'s table given the first line of its file.
///
/// Without a header the line only fixes the column count. Blank header cells
/// get a positional name.
fn resolve_columns(entity: &Entity, line: &str) -> Vec<String> {
    let cells = split_header(line, &entity.delimiter);
    if !entity.has_header {
        return positional_columns(cells.len());
    }
    cells
        .into_iter()
        .enumerate()
        .map(|(i, cell)| {
            if cell.is_empty() {
                format!("col {}", i + 1)
            } else {
                cell
            }
        })
        .collect()
}
