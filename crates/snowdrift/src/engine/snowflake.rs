//! Snowflake SQL API (v2) client.
//!
//! Statements are posted to `/api/v2/statements`; the response code tells the
//! state: 200 finished, 202 still running, 422 failed. Asynchronous
//! submissions return a statement handle which is later polled with
//! `GET /api/v2/statements/{handle}`.
//!
//! `PUT` needs a client-side upload and is rejected by the API, so local
//! sources cannot be loaded through this engine.
//!
//! The API is stateless, so `USE WAREHOUSE` does not stick between requests.
//! The engine remembers the current warehouse itself and sends it with every
//! statement.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use snowdrift_core::emit;
use snowdrift_core::metrics::events::{ExecutionMode, StatementExecuted};
use snowdrift_core::{PollOutcome, PollPolicy, poll_until};
use tracing::{debug, info};
use uuid::Uuid;

use super::{JobId, JobStatus, SqlEngine};
use crate::config::{Secret, TokenType, WarehouseConfig};
use crate::entity::normalize_identifier;
use crate::error::{
    ClientBuildSnafu, DecodeSnafu, EngineError, HttpSnafu, MissingHandleSnafu,
};
use crate::statements;

const STATEMENTS_PATH: &str = "/api/v2/statements";

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    sql_state: Option<String>,
    #[serde(default)]
    statement_handle: Option<String>,
}

/// What a statements endpoint reported.
#[derive(Debug, PartialEq, Eq)]
enum StatementState {
    Done { handle: Option<String> },
    Running { handle: String },
    Failed { message: String, sql_state: String },
}

/// Map a response status and body to a statement state.
fn interpret(status: StatusCode, body: &str) -> Result<StatementState, EngineError> {
    let parsed = || -> Result<StatementResponse, EngineError> {
        if body.trim().is_empty() {
            return Ok(StatementResponse::default());
        }
        serde_json::from_str(body).context(DecodeSnafu)
    };

    match status {
        StatusCode::OK => Ok(StatementState::Done {
            handle: parsed()?.statement_handle,
        }),
        StatusCode::ACCEPTED => {
            let handle = parsed()?.statement_handle.context(MissingHandleSnafu)?;
            Ok(StatementState::Running { handle })
        }
        StatusCode::UNPROCESSABLE_ENTITY => {
            let response = parsed()?;
            Ok(StatementState::Failed {
                message: response
                    .message
                    .or(response.code)
                    .unwrap_or_else(|| "statement failed".to_string()),
                sql_state: response.sql_state.unwrap_or_default(),
            })
        }
        other => Err(EngineError::HttpStatus {
            status: other.as_u16(),
            body: body.to_string(),
        }),
    }
}

/// [`SqlEngine`] backed by the Snowflake SQL API.
pub struct SnowflakeEngine {
    client: Client,
    base_url: String,
    token: Secret,
    token_type: TokenType,
    role: Option<String>,
    warehouse: Mutex<String>,
    /// Used when a synchronous statement outlives the server's wait window.
    policy: PollPolicy,
}

impl SnowflakeEngine {
    pub fn new(config: &WarehouseConfig, policy: PollPolicy) -> Result<Self, EngineError> {
        let client = Client::builder()
            .user_agent(concat!("snowdrift/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context(ClientBuildSnafu)?;

        info!(
            "Connecting to {} as {}",
            config.base_url(),
            config.user.as_deref().unwrap_or("<token subject>")
        );

        Ok(Self {
            client,
            base_url: config.base_url(),
            token: config.token.clone(),
            token_type: config.token_type,
            role: config.role.clone(),
            warehouse: Mutex::new(normalize_identifier(&config.warehouse)),
            policy,
        })
    }

    /// Warehouse sent with the next statement.
    pub fn current_warehouse(&self) -> String {
        self.warehouse
            .lock()
            .map(|warehouse| warehouse.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn set_warehouse(&self, name: String) {
        match self.warehouse.lock() {
            Ok(mut warehouse) => *warehouse = name,
            Err(poisoned) => *poisoned.into_inner() = name,
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(self.token.expose())
            .header("X-Snowflake-Authorization-Token-Type", self.token_type.header_value())
            .header("Accept", "application/json")
    }

    async fn read(response: Response) -> Result<StatementState, EngineError> {
        let status = response.status();
        let body = response.text().await.context(HttpSnafu)?;
        interpret(status, &body)
    }

    async fn post(&self, sql: &str, asynchronous: bool) -> Result<StatementState, EngineError> {
        let warehouse = self.current_warehouse();
        let request = StatementRequest {
            statement: sql,
            warehouse: Some(warehouse.as_str()),
            role: self.role.as_deref(),
        };
        let request_id = Uuid::new_v4().to_string();
        let mut query = vec![("requestId", request_id.as_str())];
        if asynchronous {
            query.push(("async", "true"));
        }

        debug!(
            warehouse = %warehouse,
            asynchronous,
            "Posting statement: {}",
            sql.lines().next().unwrap_or_default()
        );

        let response = self
            .authorized(self.client.post(format!("{}{STATEMENTS_PATH}", self.base_url)))
            .query(&query)
            .json(&request)
            .send()
            .await
            .context(HttpSnafu)?;
        Self::read(response).await
    }

    async fn get(&self, handle: &str) -> Result<StatementState, EngineError> {
        let response = self
            .authorized(
                self.client
                    .get(format!("{}{STATEMENTS_PATH}/{handle}", self.base_url)),
            )
            .send()
            .await
            .context(HttpSnafu)?;
        Self::read(response).await
    }
}

#[async_trait]
impl SqlEngine for SnowflakeEngine {
    async fn execute(&self, sql: &str) -> Result<(), EngineError> {
        emit!(StatementExecuted {
            mode: ExecutionMode::Sync
        });

        match self.post(sql, false).await? {
            StatementState::Done { .. } => Ok(()),
            StatementState::Failed { message, sql_state } => {
                Err(EngineError::StatementFailed { message, sql_state })
            }
            StatementState::Running { handle } => {
                debug!(handle = %handle, "Statement still running, polling");
                let job = &JobId::new(handle);
                poll_until::<_, EngineError, _, _>(&self.policy, job.as_str(), move || async move {
                    match self.status(job).await? {
                        JobStatus::Running => Ok(PollOutcome::Pending),
                        JobStatus::Succeeded => Ok(PollOutcome::Ready(())),
                        JobStatus::Failed { message } => Err(EngineError::StatementFailed {
                            message,
                            sql_state: String::new(),
                        }),
                    }
                })
                .await
            }
        }
    }

    async fn submit(&self, sql: &str) -> Result<JobId, EngineError> {
        emit!(StatementExecuted {
            mode: ExecutionMode::Async
        });

        match self.post(sql, true).await? {
            StatementState::Running { handle } => Ok(JobId::new(handle)),
            StatementState::Done { handle } => handle.map(JobId::new).context(MissingHandleSnafu),
            StatementState::Failed { message, sql_state } => {
                Err(EngineError::StatementFailed { message, sql_state })
            }
        }
    }

    async fn status(&self, job: &JobId) -> Result<JobStatus, EngineError> {
        Ok(match self.get(job.as_str()).await? {
            StatementState::Done { .. } => JobStatus::Succeeded,
            StatementState::Running { .. } => JobStatus::Running,
            StatementState::Failed { message, .. } => JobStatus::Failed { message },
        })
    }

    fn supports_file_push(&self) -> bool {
        false
    }

    async fn use_warehouse(&self, warehouse: &str) -> Result<(), EngineError> {
        self.execute(&statements::use_warehouse(warehouse)).await?;
        self.set_warehouse(normalize_identifier(warehouse));
        Ok(())
    }
}
