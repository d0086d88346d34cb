//! Integration tests for snowdrift
//!
//! The loader runs end to end against a local-folder source and an in-memory
//! engine that records every statement it is handed.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use snowdrift::{Config, EngineError, JobId, JobStatus, SqlEngine};

/// One statement as the engine saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Execute(String),
    Submit(String),
}

impl Call {
    fn sql(&self) -> &str {
        match self {
            Call::Execute(sql) | Call::Submit(sql) => sql,
        }
    }
}

/// Records statements; every job succeeds unless listed in `failing`.
#[derive(Default)]
struct RecordingEngine {
    calls: Mutex<Vec<Call>>,
    failing: HashSet<String>,
    next_id: AtomicUsize,
    /// Mirrors an engine that rejects `PUT`.
    without_file_push: bool,
}

impl RecordingEngine {
    fn without_file_push() -> Self {
        Self {
            without_file_push: true,
            ..Self::default()
        }
    }

    fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn statements(&self) -> Vec<String> {
        self.calls().iter().map(|call| call.sql().to_string()).collect()
    }

    fn matching(&self, prefix: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|sql| sql.starts_with(prefix))
            .collect()
    }

    /// Data tables created, excluding reorders and the failed-load report.
    fn created_tables(&self) -> Vec<String> {
        self.matching("CREATE OR REPLACE TABLE ")
            .into_iter()
            .filter(|sql| !sql.contains(" AS (") && !sql.contains("FL_FAILED_LOAD"))
            .collect()
    }

    /// `(group, step)` of every run-log row, in order.
    fn log_rows(&self) -> Vec<(String, String)> {
        self.matching("INSERT INTO FILE_LOADER_MASTER_DB.ELT.FL_LOG VALUES (")
            .iter()
            .map(|sql| {
                let values = sql
                    .trim_start_matches("INSERT INTO FILE_LOADER_MASTER_DB.ELT.FL_LOG VALUES ('")
                    .trim_end_matches("', CURRENT_TIMESTAMP())");
                let (group, step) = values.split_once("', '").unwrap();
                (group.to_string(), step.to_string())
            })
            .collect()
    }
}

#[async_trait]
impl SqlEngine for RecordingEngine {
    async fn execute(&self, sql: &str) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(Call::Execute(sql.to_string()));
        Ok(())
    }

    async fn submit(&self, sql: &str) -> Result<JobId, EngineError> {
        self.calls.lock().unwrap().push(Call::Submit(sql.to_string()));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(JobId::new(format!("job-{id}")))
    }

    async fn status(&self, job: &JobId) -> Result<JobStatus, EngineError> {
        if self.failing.contains(job.as_str()) {
            return Ok(JobStatus::Failed {
                message: "Number of columns in file does not match".to_string(),
            });
        }
        Ok(JobStatus::Succeeded)
    }

    fn supports_file_push(&self) -> bool {
        !self.without_file_push
    }
}

fn entity(pattern: &str, file_type: &str, has_header: bool, table: &str, cluster_by: &str) -> String {
    entity_in(pattern, file_type, "COMMA", has_header, "raw", "sales", table, cluster_by)
}

#[allow(clippy::too_many_arguments)]
fn entity_in(
    pattern: &str,
    file_type: &str,
    delimiter: &str,
    has_header: bool,
    database: &str,
    schema: &str,
    table: &str,
    cluster_by: &str,
) -> String {
    format!(
        "  - file_pattern: '{pattern}'\n    file_type: {file_type}\n    delimiter: {delimiter}\n    has_header: {}\n    database: {database}\n    schema: {schema}\n    table: {table}\n    cluster_by: '{cluster_by}'\n",
        if has_header { "Y" } else { "N" }
    )
}

fn config(dir: &Path, entities: &[String]) -> Config {
    let yaml = format!(
        r#"
source:
  kind: local
  bucket: {}
warehouse:
  account: test-account
  token: test-token
  warehouse: compute_wh
loader:
  poll_interval_ms: 1
  job_timeout_secs: 5
entities:
{}"#,
        dir.display(),
        entities.concat()
    );
    Config::parse(&yaml).unwrap()
}

mod run_tests {
    use super::*;
    use std::sync::Arc;

    use snowdrift::{Loader, LoaderError, RunSummary, open_source};
    use snowdrift_core::SourceKind;
    use tempfile::TempDir;

    async fn run(
        dir: &TempDir,
        entities: &[String],
        engine: Arc<RecordingEngine>,
    ) -> Result<RunSummary, LoaderError> {
        let config = config(dir.path(), entities);
        let source = open_source(&config.source, config.loader.probe_bytes).unwrap();
        let mut loader = Loader::new(&config, engine, source);
        loader.run().await
    }

    fn write(dir: &TempDir, name: &str, contents: &str) {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }

    #[tokio::test]
    async fn test_shared_objects_created_once() {
        let dir = TempDir::new().unwrap();
        write(&dir, "orders_1.csv", "id,total\n1,10\n");
        write(&dir, "returns_1.csv", "id,reason\n1,damaged\n");

        let engine = Arc::new(RecordingEngine::default());
        run(
            &dir,
            &[
                entity("orders_.*", "csv", true, "orders", ""),
                entity("returns_.*", "csv", true, "returns", ""),
            ],
            engine.clone(),
        )
        .await
        .unwrap();

        assert_eq!(engine.matching("CREATE OR REPLACE DATABASE "), vec!["CREATE OR REPLACE DATABASE RAW"]);
        assert_eq!(engine.matching("CREATE OR REPLACE SCHEMA "), vec!["CREATE OR REPLACE SCHEMA RAW.SALES"]);

        let formats = engine.matching("CREATE OR REPLACE FILE FORMAT ");
        assert_eq!(formats.len(), 1);
        assert!(formats[0].starts_with("CREATE OR REPLACE FILE FORMAT RAW.SALES.FL_FF_1"));

        let copies = engine.matching("COPY INTO ");
        assert_eq!(copies.len(), 2);
        assert!(copies.iter().all(|sql| sql.contains("FILE_FORMAT = RAW.SALES.FL_FF_1")));
    }

    #[tokio::test]
    async fn test_statement_order_for_single_entity() {
        let dir = TempDir::new().unwrap();
        write(&dir, "orders_1.csv", "id,region\n1,eu\n");

        let engine = Arc::new(RecordingEngine::default());
        let summary = run(
            &dir,
            &[entity("orders_.*", "csv", true, "orders", "region")],
            engine.clone(),
        )
        .await
        .unwrap();

        let put = format!("PUT 'FILE://{}/*.csv'", dir.path().display());
        let non_log: Vec<String> = engine
            .statements()
            .into_iter()
            .filter(|sql| !sql.starts_with("INSERT INTO"))
            .map(|sql| sql.lines().next().unwrap().to_string())
            .collect();
        assert_eq!(
            non_log,
            vec![
                "TRUNCATE TABLE FILE_LOADER_MASTER_DB.ELT.FL_LOG",
                "CREATE OR REPLACE WAREHOUSE FILE_LOADER_WH",
                "USE WAREHOUSE FILE_LOADER_WH",
                "CREATE OR REPLACE DATABASE RAW",
                "CREATE OR REPLACE SCHEMA RAW.SALES",
                "CREATE OR REPLACE FILE FORMAT RAW.SALES.FL_FF_1",
                "CREATE OR REPLACE TABLE RAW.SALES.ORDERS (",
                "CREATE OR REPLACE STAGE FILE_LOADER_MASTER_DB.ELT.FL_STG",
                put.as_str(),
                "COPY INTO RAW.SALES.ORDERS",
                "CREATE OR REPLACE TABLE FILE_LOADER_MASTER_DB.ELT.FL_FAILED_LOAD AS (",
                "CREATE OR REPLACE TABLE RAW.SALES.ORDERS AS (",
                "ALTER TABLE RAW.SALES.ORDERS CLUSTER BY (REGION)",
                "USE WAREHOUSE COMPUTE_WH",
                "DROP WAREHOUSE IF EXISTS FILE_LOADER_WH",
            ]
        );

        assert_eq!(
            engine.log_rows(),
            vec![
                ("START".to_string(), String::new()),
                ("Creating DB Objects".to_string(), "Warehouse".to_string()),
                ("Creating DB Objects".to_string(), "Databases".to_string()),
                ("Creating DB Objects".to_string(), "Schemas".to_string()),
                ("Creating DB Objects".to_string(), "File Formats".to_string()),
                ("Creating DB Objects".to_string(), "Tables".to_string()),
                ("Creating DB Objects".to_string(), "Stage".to_string()),
                ("Putting Files".to_string(), String::new()),
                ("Loading Tables".to_string(), "RAW.SALES.ORDERS (orders_.*)".to_string()),
                ("Cluster".to_string(), "RAW.SALES.ORDERS (reordering table)".to_string()),
                ("Cluster".to_string(), "RAW.SALES.ORDERS (clustering)".to_string()),
                ("Cleanup".to_string(), "Dropping Warehouse".to_string()),
                ("END".to_string(), String::new()),
            ]
        );

        // Loads and reorders are submitted, everything else executed.
        let submitted: Vec<_> = engine
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Submit(_)))
            .collect();
        assert_eq!(submitted.len(), 2);

        assert_eq!(summary.load_jobs, vec![JobId::new("job-1")]);
        assert_eq!(summary.tables_created.len(), 1);
        assert_eq!(summary.clustered_tables.len(), 1);
    }

    #[tokio::test]
    async fn test_local_source_without_files_loads_nothing() {
        let dir = TempDir::new().unwrap();
        write(&dir, "unrelated.txt", "hello\n");
        write(&dir, "orders_empty.csv", "   \n\n");

        let engine = Arc::new(RecordingEngine::default());
        let summary = run(
            &dir,
            &[entity("orders_.*", "csv", true, "orders", "id")],
            engine.clone(),
        )
        .await
        .unwrap();

        assert!(engine.created_tables().is_empty());
        assert!(engine.matching("COPY INTO").is_empty());
        assert!(engine.matching("ALTER TABLE").is_empty());
        assert!(engine.matching("CREATE OR REPLACE TABLE FILE_LOADER_MASTER_DB.ELT.FL_FAILED_LOAD").is_empty());
        assert_eq!(summary, RunSummary::default());

        // The run still completes its bookkeeping.
        assert_eq!(engine.matching("DROP WAREHOUSE").len(), 1);
        assert_eq!(engine.log_rows().last().unwrap().0, "END");
    }

    #[tokio::test]
    async fn test_failure_report_covers_every_load_job() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a_1.csv", "x\n1\n");
        write(&dir, "b_1.csv", "x\n1\n");
        write(&dir, "c_1.csv", "x\n1\n");

        let engine = Arc::new(RecordingEngine::default());
        run(
            &dir,
            &[
                entity("a_.*", "csv", true, "a", ""),
                entity("b_.*", "csv", true, "b", ""),
                entity("c_.*", "csv", true, "c", ""),
            ],
            engine.clone(),
        )
        .await
        .unwrap();

        let reports = engine.matching("CREATE OR REPLACE TABLE FILE_LOADER_MASTER_DB.ELT.FL_FAILED_LOAD");
        assert_eq!(reports.len(), 1);
        for id in ["'job-1'", "'job-2'", "'job-3'"] {
            assert!(reports[0].contains(&format!("RESULT_SCAN({id})")), "{id} missing");
        }
    }

    #[tokio::test]
    async fn test_headerless_entity_gets_positional_columns() {
        let dir = TempDir::new().unwrap();
        write(&dir, "events_1.csv", "1,2,3,4\n5,6,7,8\n");

        let engine = Arc::new(RecordingEngine::default());
        run(&dir, &[entity("events_.*", "csv", false, "events", "")], engine.clone())
            .await
            .unwrap();

        assert_eq!(
            engine.created_tables(),
            vec![
                "CREATE OR REPLACE TABLE RAW.SALES.EVENTS (\n    COL_1 VARCHAR\n    ,COL_2 VARCHAR\n    ,COL_3 VARCHAR\n    ,COL_4 VARCHAR\n)"
            ]
        );
        let formats = engine.matching("CREATE OR REPLACE FILE FORMAT");
        assert!(formats[0].ends_with("SKIP_HEADER = 0"));
    }

    #[tokio::test]
    async fn test_shared_table_defined_by_header_entity() {
        let dir = TempDir::new().unwrap();
        write(&dir, "legacy_1.csv", "1,2\n");
        write(&dir, "current_1.csv", "order_id,amount\n1,2\n");

        let engine = Arc::new(RecordingEngine::default());
        let summary = run(
            &dir,
            &[
                entity("legacy_.*", "csv", false, "orders", ""),
                entity("current_.*", "csv", true, "orders", ""),
            ],
            engine.clone(),
        )
        .await
        .unwrap();

        assert_eq!(
            engine.created_tables(),
            vec!["CREATE OR REPLACE TABLE RAW.SALES.ORDERS (\n    ORDER_ID VARCHAR\n    ,AMOUNT VARCHAR\n)"]
        );
        // Only the entity that defined the table was probed and loaded.
        let copies = engine.matching("COPY INTO");
        assert_eq!(copies.len(), 1);
        assert!(copies[0].contains("PATTERN = 'current_.*'"));
        assert_eq!(summary.tables_created.len(), 1);
    }

    #[tokio::test]
    async fn test_clustering_only_for_discovered_tables() {
        let dir = TempDir::new().unwrap();
        write(&dir, "orders_1.csv", "id,order date\n1,2024-01-01\n");

        let engine = Arc::new(RecordingEngine::default());
        let summary = run(
            &dir,
            &[
                entity("orders_.*", "csv", true, "orders", "order date, id"),
                entity("missing_.*", "csv", true, "missing", "id"),
                entity("orders_.*", "csv", true, "unclustered", ""),
            ],
            engine.clone(),
        )
        .await
        .unwrap();

        assert_eq!(
            engine.matching("ALTER TABLE"),
            vec!["ALTER TABLE RAW.SALES.ORDERS CLUSTER BY (ORDER_DATE, ID)"]
        );
        assert_eq!(
            engine
                .matching("CREATE OR REPLACE TABLE RAW.SALES.ORDERS AS (")
                .len(),
            1
        );
        assert_eq!(summary.clustered_tables.len(), 1);
        assert_eq!(summary.clustered_tables[0].to_string(), "RAW.SALES.ORDERS");
    }

    #[tokio::test]
    async fn test_delimiters_and_names_normalized() {
        let dir = TempDir::new().unwrap();
        write(&dir, "pipe_1.txt", "first name|last-name\na|b\n");
        write(&dir, "semi_1.txt", "x;y\n1;2\n");

        let engine = Arc::new(RecordingEngine::default());
        run(
            &dir,
            &[
                entity_in("pipe_.*", "txt", "PIPE", true, "raw zone", "crm-eu", "people list", ""),
                entity_in("semi_.*", "txt", "';'", true, "raw zone", "crm-eu", "pairs", ""),
            ],
            engine.clone(),
        )
        .await
        .unwrap();

        let formats = engine.matching("CREATE OR REPLACE FILE FORMAT");
        assert_eq!(formats.len(), 2);
        assert!(formats[0].starts_with("CREATE OR REPLACE FILE FORMAT RAW_ZONE.CRM_EU.FL_FF_1"));
        assert!(formats[0].contains("FIELD_DELIMITER = '|'"));
        assert!(formats[1].contains("FIELD_DELIMITER = ';'"));

        assert_eq!(
            engine.created_tables(),
            vec![
                "CREATE OR REPLACE TABLE RAW_ZONE.CRM_EU.PEOPLE_LIST (\n    FIRST_NAME VARCHAR\n    ,LAST_NAME VARCHAR\n)",
                "CREATE OR REPLACE TABLE RAW_ZONE.CRM_EU.PAIRS (\n    X VARCHAR\n    ,Y VARCHAR\n)",
            ]
        );
    }

    #[tokio::test]
    async fn test_put_once_per_file_type() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a_1.csv", "x\n1\n");
        write(&dir, "b_1.csv", "x\n1\n");

        let engine = Arc::new(RecordingEngine::default());
        run(
            &dir,
            &[
                entity("a_.*", "csv", true, "a", ""),
                entity("b_.*", "csv", true, "b", ""),
                entity("c_.*", "csv.gz", true, "c", ""),
            ],
            engine.clone(),
        )
        .await
        .unwrap();

        let puts = engine.matching("PUT ");
        assert_eq!(puts.len(), 2);
        assert!(puts[0].ends_with("AUTO_COMPRESS = TRUE"));
        assert!(puts[1].contains("*.csv.gz'"));
        assert!(puts[1].ends_with("AUTO_COMPRESS = FALSE"));
    }

    #[tokio::test]
    async fn test_failed_load_job_aborts_run() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a_1.csv", "x\n1\n");
        write(&dir, "b_1.csv", "x\n1\n");

        let engine = Arc::new(RecordingEngine::failing(&["job-2"]));
        let err = run(
            &dir,
            &[
                entity("a_.*", "csv", true, "a", ""),
                entity("b_.*", "csv", true, "b", ""),
            ],
            engine.clone(),
        )
        .await
        .unwrap_err();

        assert!(
            matches!(err, LoaderError::Engine { source: EngineError::JobFailed { ref job, .. } } if job == "job-2"),
            "{err:?}"
        );
        // Both loads were submitted before waiting; nothing after the wait ran.
        assert_eq!(engine.matching("COPY INTO").len(), 2);
        assert!(engine.matching("CREATE OR REPLACE TABLE FILE_LOADER_MASTER_DB.ELT.FL_FAILED_LOAD").is_empty());
        assert!(engine.matching("DROP WAREHOUSE").is_empty());
    }

    #[tokio::test]
    async fn test_local_source_refused_before_any_statement_without_file_push() {
        let dir = TempDir::new().unwrap();
        write(&dir, "orders_1.csv", "id,total\n1,10\n");

        let engine = Arc::new(RecordingEngine::without_file_push());
        let err = run(&dir, &[entity("orders_.*", "csv", true, "orders", "")], engine.clone())
            .await
            .unwrap_err();

        assert!(
            matches!(err, LoaderError::FilePushUnsupported { kind: SourceKind::Local }),
            "{err:?}"
        );
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_gzip_source_file_is_probed() {
        use std::io::Write;

        let dir = TempDir::new().unwrap();
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"sku|qty\nA1|3\n").unwrap();
        std::fs::write(dir.path().join("stock_1.txt.gz"), encoder.finish().unwrap()).unwrap();

        let engine = Arc::new(RecordingEngine::default());
        run(
            &dir,
            &[entity_in("stock_.*", "txt.gz", "PIPE", true, "raw", "inv", "stock", "")],
            engine.clone(),
        )
        .await
        .unwrap();

        assert_eq!(
            engine.created_tables(),
            vec!["CREATE OR REPLACE TABLE RAW.INV.STOCK (\n    SKU VARCHAR\n    ,QTY VARCHAR\n)"]
        );
    }
}

mod planning_tests {
    use super::*;
    use std::sync::Arc;

    use snowdrift::{Loader, open_source};
    use tempfile::TempDir;

    #[test]
    fn test_planning_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let entities = [
            entity("a_.*", "csv", true, "a", ""),
            entity("b_.*", "csv", false, "b", ""),
            entity("c_.*", "csv", true, "c", ""),
            entity("d_.*", "json", true, "d", ""),
        ];

        let assignments = || {
            let config = config(dir.path(), &entities);
            let source = open_source(&config.source, config.loader.probe_bytes).unwrap();
            let loader = Loader::new(&config, Arc::new(RecordingEngine::default()), source);
            loader
                .entities()
                .iter()
                .map(|e| e.file_format_name.clone().unwrap())
                .collect::<Vec<_>>()
        };

        let first = assignments();
        assert_eq!(first, vec!["FL_FF_1", "FL_FF_2", "FL_FF_1", "FL_FF_3"]);
        assert_eq!(first, assignments());
    }
}
