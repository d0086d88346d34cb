//! Error types for the snowdrift loader.

use snafu::prelude::*;
use snowdrift_core::SourceKind;

// Re-export common errors
pub use snowdrift_core::error::{ConfigError, PollTimeout, StorageError};

/// Errors raised while talking to the SQL engine.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EngineError {
    /// HTTP client could not be constructed.
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild { source: reqwest::Error },

    /// Request never got a response.
    #[snafu(display("Request to SQL API failed: {source}"))]
    Http { source: reqwest::Error },

    /// Response status the API contract does not define.
    #[snafu(display("SQL API returned HTTP {status}: {body}"))]
    HttpStatus { status: u16, body: String },

    /// Response body could not be decoded.
    #[snafu(display("Failed to decode SQL API response: {source}"))]
    Decode { source: serde_json::Error },

    /// The API accepted a statement but returned no handle for it.
    #[snafu(display("SQL API response carried no statement handle"))]
    MissingHandle,

    /// A synchronously executed statement was rejected.
    #[snafu(display("Statement failed ({sql_state}): {message}"))]
    StatementFailed { message: String, sql_state: String },

    /// An asynchronous job finished in an error state.
    #[snafu(display("Job {job} failed: {message}"))]
    JobFailed { job: String, message: String },

    /// A job did not settle within the configured bound.
    #[snafu(display("Job timed out: {source}"))]
    JobTimedOut { source: PollTimeout },
}

impl From<PollTimeout> for EngineError {
    fn from(source: PollTimeout) -> Self {
        EngineError::JobTimedOut { source }
    }
}

/// Errors raised while inspecting source files.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProbeError {
    /// An entity's file pattern is not a valid regular expression.
    #[snafu(display("Invalid file pattern '{pattern}': {source}"))]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    /// Source objects could not be listed.
    #[snafu(display("Failed to list source objects: {source}"))]
    List { source: StorageError },

    /// The chosen header object could not be read.
    #[snafu(display("Failed to read header of {path}: {source}"))]
    ReadHeader { path: String, source: StorageError },

    /// The chosen header object could not be decoded.
    #[snafu(display("Failed to decode header of {path}: {source}"))]
    DecodeHeader {
        path: String,
        source: std::io::Error,
    },
}

/// Top-level loader errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LoaderError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Storage error.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// Source probe error.
    #[snafu(display("Source probe error: {source}"))]
    Probe { source: ProbeError },

    /// SQL engine error.
    #[snafu(display("SQL engine error: {source}"))]
    Engine { source: EngineError },

    /// The source needs files uploaded with `PUT`, which the engine cannot run.
    #[snafu(display(
        "{kind} sources need PUT into an internal stage, which this SQL engine does not support; \
         stage the files in cloud storage instead"
    ))]
    FilePushUnsupported { kind: SourceKind },
}

impl From<ConfigError> for LoaderError {
    fn from(source: ConfigError) -> Self {
        LoaderError::Config { source }
    }
}

impl From<StorageError> for LoaderError {
    fn from(source: StorageError) -> Self {
        LoaderError::Storage { source }
    }
}

impl From<ProbeError> for LoaderError {
    fn from(source: ProbeError) -> Self {
        LoaderError::Probe { source }
    }
}

impl From<EngineError> for LoaderError {
    fn from(source: EngineError) -> Self {
        LoaderError::Engine { source }
    }
}
