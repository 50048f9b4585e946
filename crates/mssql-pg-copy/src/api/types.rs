//! Request and response bodies of the job-control API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::config::{default_batch_size, SourceConfig, TargetConfig};
use crate::error::MigrateError;
use crate::state::MigrationJob;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub mssql_config: SourceConfig,
    pub pg_config: TargetConfig,
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub options: StartOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    #[serde(default = "default_batch_size", alias = "batch_size")]
    pub batch_size: usize,
    #[serde(default, alias = "skip_existing")]
    pub skip_existing: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            skip_existing: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectionTestResponse {
    pub success: bool,
    pub message: String,
    pub version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TablesResponse {
    pub success: bool,
    pub tables: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub success: bool,
    pub migration_id: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub migration: MigrationJob,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
}

/// Error body: `{"success": false, "message": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<MigrateError> for ApiError {
    fn from(err: MigrateError) -> Self {
        let status = match &err {
            MigrateError::Config(_) => StatusCode::BAD_REQUEST,
            MigrateError::JobNotFound(_) => StatusCode::NOT_FOUND,
            MigrateError::JobState(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
