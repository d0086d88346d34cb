//! SQL text for every statement a run issues.
//!
//! Pure string builders: no I/O and no state. Identifiers are normalized on
//! the way in (normalization is idempotent, so already-normalized names pass
//! through unchanged). Every column is `VARCHAR`; typing is left to whoever
//! reads the loaded tables.

use std::fmt::Write;

use snowdrift_core::SourceKind;

use crate::config::ControlObjects;
use crate::entity::{TableKey, normalize_identifier};
use crate::planner::FileFormatKey;

/// Quote a value as a single-quoted string literal.
pub fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|column| normalize_identifier(column))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn create_warehouse(control: &ControlObjects) -> String {
    format!(
        "CREATE OR REPLACE WAREHOUSE {}\n    WAREHOUSE_SIZE = {}\n    INITIALLY_SUSPENDED = true",
        control.worker_warehouse_name(),
        literal(&control.worker_warehouse_size.to_uppercase())
    )
}

pub fn drop_warehouse(warehouse: &str) -> String {
    format!("DROP WAREHOUSE IF EXISTS {}", normalize_identifier(warehouse))
}

pub fn use_warehouse(warehouse: &str) -> String {
    format!("USE WAREHOUSE {}", normalize_identifier(warehouse))
}

pub fn create_database(database: &str) -> String {
    format!("CREATE OR REPLACE DATABASE {}", normalize_identifier(database))
}

pub fn create_schema(database: &str, schema: &str) -> String {
    format!(
        "CREATE OR REPLACE SCHEMA {}.{}",
        normalize_identifier(database),
        normalize_identifier(schema)
    )
}

/// One `VARCHAR` column per header, in header order.
pub fn create_table(table: &TableKey, headers: &[String]) -> String {
    let columns = headers
        .iter()
        .map(|header| format!("{} VARCHAR", normalize_identifier(header)))
        .collect::<Vec<_>>()
        .join("\n    ,");
    format!("CREATE OR REPLACE TABLE {table} (\n    {columns}\n)")
}

/// Stage URL for a cloud source; `None` for local sources.
pub fn external_stage_url(kind: SourceKind, bucket: &str, prefix: &str) -> Option<String> {
    let prefix = prefix.trim_matches('/');
    let path = |trailing: &str| {
        if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}{trailing}")
        }
    };
    match kind {
        SourceKind::Local => None,
        SourceKind::S3 => Some(format!("s3://{bucket}/{}", path("/"))),
        SourceKind::Gcs => Some(format!("gcs://{bucket}/{}", path(""))),
        SourceKind::Azure => Some(format!(
            "azure://{bucket}.blob.core.windows.net/{}",
            path("/")
        )),
    }
}

/// Create the run's stage: internal for local sources, external otherwise.
pub fn create_stage(
    control: &ControlObjects,
    kind: SourceKind,
    integration: Option<&str>,
    bucket: &str,
    prefix: &str,
) -> String {
    let mut sql = format!("CREATE OR REPLACE STAGE {}", control.stage_name());
    if let Some(url) = external_stage_url(kind, bucket, prefix) {
        let _ = write!(
            sql,
            "\n    STORAGE_INTEGRATION = {}\n    URL = {}",
            normalize_identifier(integration.unwrap_or_default()),
            literal(&url)
        );
    }
    sql
}

pub fn create_file_format(key: &FileFormatKey, name: &str) -> String {
    format!(
        "CREATE OR REPLACE FILE FORMAT {}.{}.{}\n    TYPE = {}\n    FIELD_DELIMITER = {}\n    FIELD_OPTIONALLY_ENCLOSED_BY = '\"'\n    SKIP_HEADER = {}",
        normalize_identifier(&key.database),
        normalize_identifier(&key.schema),
        normalize_identifier(name),
        literal(&key.file_type),
        literal(&key.delimiter),
        u8::from(key.has_header)
    )
}

/// Whether a file type names an already-compressed payload.
pub fn is_compressed_type(file_type: &str) -> bool {
    let lower = file_type.to_ascii_lowercase();
    lower.contains("zip") || lower.contains("gz")
}

/// Upload every `*.{file_type}` file in `folder` to the stage.
pub fn put_files(control: &ControlObjects, folder: &str, file_type: &str) -> String {
    format!(
        "PUT 'FILE://{}/*.{}'\n    @{}\n    AUTO_COMPRESS = {}",
        folder.trim_end_matches('/').replace('\'', "''"),
        file_type.replace('\'', "''"),
        control.stage_name(),
        if is_compressed_type(file_type) { "FALSE" } else { "TRUE" }
    )
}

pub fn copy_into(
    control: &ControlObjects,
    table: &TableKey,
    file_pattern: &str,
    file_format_name: &str,
) -> String {
    format!(
        "COPY INTO {table}\nFROM @{}\n    PATTERN = {}\n    FILE_FORMAT = {}.{}.{}\n    ON_ERROR = SKIP_FILE",
        control.stage_name(),
        literal(file_pattern),
        table.database,
        table.schema,
        normalize_identifier(file_format_name)
    )
}

/// Rewrite a table physically sorted by its clustering columns.
pub fn reorder_table(table: &TableKey, columns: &[String]) -> String {
    format!(
        "CREATE OR REPLACE TABLE {table} AS (\n    SELECT * FROM {table} ORDER BY {}\n)",
        column_list(columns)
    )
}

pub fn cluster_by(table: &TableKey, columns: &[String]) -> String {
    format!("ALTER TABLE {table} CLUSTER BY ({})", column_list(columns))
}

pub fn log_step(control: &ControlObjects, group: &str, step: &str) -> String {
    format!(
        "INSERT INTO {} VALUES ({}, {}, CURRENT_TIMESTAMP())",
        control.load_log_table(),
        literal(group),
        literal(step)
    )
}

pub fn truncate_log(control: &ControlObjects) -> String {
    format!("TRUNCATE TABLE {}", control.load_log_table())
}

const LOAD_RESULT_COLUMNS: [&str; 10] = [
    "FILE_NAME",
    "STATUS",
    "ROWS_PARSED",
    "ROWS_LOADED",
    "ERROR_LIMIT",
    "ERRORS_SEEN",
    "FIRST_ERROR",
    "FIRST_ERROR_LINE",
    "FIRST_ERROR_CHARACTER",
    "FIRST_ERROR_COLUMN_NAME",
];

/// Collect the failed-file rows of every load job into the report table.
///
/// Returns `None` when there are no jobs to report on.
pub fn create_failed_load_table<S: AsRef<str>>(control: &ControlObjects, job_ids: &[S]) -> Option<String> {
    if job_ids.is_empty() {
        return None;
    }

    let columns = LOAD_RESULT_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, name)| format!("${} AS {name}", i + 1))
        .collect::<Vec<_>>()
        .join("\n        ,");
    let scans = job_ids
        .iter()
        .map(|id| format!("SELECT * FROM TABLE(RESULT_SCAN({}))", literal(id.as_ref())))
        .collect::<Vec<_>>()
        .join("\n            UNION ALL\n        ");

    Some(format!(
        "CREATE OR REPLACE TABLE {} AS (\n    SELECT\n        {columns}\n    FROM (\n        {scans}\n    ) AS T\n    WHERE\n        $2 = 'LOAD_FAILED'\n)",
        control.failed_load_table()
    ))
}
