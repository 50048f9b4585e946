//! HTTP job-control API.
//!
//! A small local admin surface with no authentication. Jobs run in the
//! background; clients poll `status` until the job is terminal.

mod types;

pub use types::*;

use crate::config::{validate_source, validate_target, SourceConfig, TargetConfig};
use crate::error::Result;
use crate::orchestrator::{Connector, Orchestrator};
use crate::state::MigrationJob;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state of the API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub connector: Arc<dyn Connector>,
}

impl ApiState {
    pub fn new(orchestrator: Arc<Orchestrator>, connector: Arc<dyn Connector>) -> Self {
        Self {
            orchestrator,
            connector,
        }
    }
}

/// Build the API router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/migration/test/mssql", post(test_mssql))
        .route("/api/migration/test/postgresql", post(test_postgresql))
        .route("/api/migration/tables", post(list_tables))
        .route("/api/migration/start", post(start_migration))
        .route("/api/migration/status/:migration_id", get(migration_status))
        .route("/api/migration/cancel/:migration_id", post(cancel_migration))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `bind` until `shutdown` is cancelled.
pub async fn serve(bind: &str, state: ApiState, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!("Migration API listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Migration API stopped");
    Ok(())
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

async fn test_mssql(
    State(state): State<ApiState>,
    Json(config): Json<SourceConfig>,
) -> ApiResult<ConnectionTestResponse> {
    validate_source(&config)?;
    let source = state.connector.source(&config).await?;
    let version = source.server_version().await;
    source.close().await;

    Ok(Json(ConnectionTestResponse {
        success: true,
        message: format!("Connected to MSSQL {}/{}", config.host, config.database),
        version: Some(version?),
    }))
}

async fn test_postgresql(
    State(state): State<ApiState>,
    Json(config): Json<TargetConfig>,
) -> ApiResult<ConnectionTestResponse> {
    validate_target(&config)?;
    let target = state.connector.target(&config).await?;
    let version = target.server_version().await;
    target.close().await;

    Ok(Json(ConnectionTestResponse {
        success: true,
        message: format!("Connected to PostgreSQL {}/{}", config.host, config.database),
        version: Some(version?),
    }))
}

async fn list_tables(
    State(state): State<ApiState>,
    Json(config): Json<SourceConfig>,
) -> ApiResult<TablesResponse> {
    validate_source(&config)?;
    let source = state.connector.source(&config).await?;
    let tables = source.list_tables().await;
    source.close().await;

    Ok(Json(TablesResponse {
        success: true,
        tables: tables?,
    }))
}

async fn start_migration(
    State(state): State<ApiState>,
    Json(request): Json<StartRequest>,
) -> ApiResult<StartResponse> {
    validate_source(&request.mssql_config)?;
    validate_target(&request.pg_config)?;
    if request.options.batch_size == 0 {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "options.batchSize must be at least 1",
        ));
    }

    let source = state.connector.source(&request.mssql_config).await?;
    let target = match state.connector.target(&request.pg_config).await {
        Ok(target) => target,
        Err(e) => {
            source.close().await;
            return Err(e.into());
        }
    };

    let job = MigrationJob::new(request.mssql_config, request.pg_config)
        .with_tables(request.tables)
        .with_batch_size(request.options.batch_size)
        .with_skip_existing(request.options.skip_existing);

    let migration_id = state.orchestrator.start(job, source, target).await?;
    info!("Started migration {}", migration_id);

    Ok(Json(StartResponse {
        success: true,
        migration_id,
    }))
}

async fn migration_status(
    State(state): State<ApiState>,
    Path(migration_id): Path<String>,
) -> ApiResult<StatusResponse> {
    let migration = state.orchestrator.status(&migration_id).await?;
    Ok(Json(StatusResponse {
        success: true,
        migration,
    }))
}

async fn cancel_migration(
    State(state): State<ApiState>,
    Path(migration_id): Path<String>,
) -> ApiResult<CancelResponse> {
    if state.orchestrator.cancel(&migration_id).await? {
        Ok(Json(CancelResponse { success: true }))
    } else {
        warn!("Cancel refused for {}: not running", migration_id);
        Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Migration is not running",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ColumnDescriptor, TableSchema};
    use crate::state::InMemoryJobStore;
    use crate::target::SqlValue;
    use crate::testing::{MemoryConnector, MemorySource, MemoryTarget};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn source() -> MemorySource {
        let schema = TableSchema::new(
            "Users",
            vec![
                ColumnDescriptor::new("Id", "int").not_null(),
                ColumnDescriptor::new("Name", "nvarchar(50)"),
            ],
        );
        let rows = (0..12)
            .map(|i| vec![SqlValue::I32(i), SqlValue::from("n")])
            .collect();
        MemorySource::new().with_table(schema, rows)
    }

    fn app(connector: MemoryConnector) -> Router {
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(InMemoryJobStore::new())));
        router(ApiState::new(orchestrator, Arc::new(connector)))
    }

    fn mssql_json() -> Value {
        json!({"server": "mssql.test", "database": "dating", "user": "sa", "password": "pw"})
    }

    fn pg_json() -> Value {
        json!({"host": "pg.test", "database": "dating", "user": "postgres", "password": "pw"})
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_connection_test_endpoints() {
        let app = app(MemoryConnector::new(source(), MemoryTarget::new()));

        let (status, body) = call(&app, "POST", "/api/migration/test/mssql", Some(mssql_json())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["version"].as_str().unwrap().contains("SQL Server"));

        let (status, body) = call(&app, "POST", "/api/migration/test/postgresql", Some(pg_json())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["version"].as_str().unwrap().contains("PostgreSQL"));
    }

    #[tokio::test]
    async fn test_unreachable_source() {
        let app = app(MemoryConnector::new(source(), MemoryTarget::new()).source_down());

        let (status, body) = call(&app, "POST", "/api/migration/test/mssql", Some(mssql_json())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_list_tables() {
        let app = app(MemoryConnector::new(source(), MemoryTarget::new()));
        let (status, body) = call(&app, "POST", "/api/migration/tables", Some(mssql_json())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "tables": ["Users"]}));
    }

    #[tokio::test]
    async fn test_start_and_poll_until_completed() {
        let app = app(MemoryConnector::new(source(), MemoryTarget::new()));
        let request = json!({
            "mssqlConfig": mssql_json(),
            "pgConfig": pg_json(),
            "tables": ["Users"],
            "options": {"batchSize": 5, "skipExisting": false}
        });

        let (status, body) = call(&app, "POST", "/api/migration/start", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        let id = body["migrationId"].as_str().unwrap().to_string();

        let uri = format!("/api/migration/status/{}", id);
        let mut migration = Value::Null;
        for _ in 0..200 {
            let (status, body) = call(&app, "GET", &uri, None).await;
            assert_eq!(status, StatusCode::OK);
            migration = body["migration"].clone();
            if migration["status"] == "completed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(migration["status"], "completed");
        assert_eq!(migration["totals"]["rowsMigrated"], 12);
        assert_eq!(migration["perTableResults"]["Users"]["status"], "completed");
        assert!(migration.get("source").is_none());

        let (status, body) = call(&app, "POST", &format!("/api/migration/cancel/{}", id), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_start_rejects_zero_batch_size() {
        let app = app(MemoryConnector::new(source(), MemoryTarget::new()));
        let request = json!({
            "mssqlConfig": mssql_json(),
            "pgConfig": pg_json(),
            "options": {"batchSize": 0}
        });
        let (status, _) = call(&app, "POST", "/api/migration/start", Some(request)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_with_unreachable_source() {
        let app = app(MemoryConnector::new(source(), MemoryTarget::new()).source_down());
        let request = json!({"mssqlConfig": mssql_json(), "pgConfig": pg_json()});
        let (status, body) = call(&app, "POST", "/api/migration/start", Some(request)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_unknown_migration() {
        let app = app(MemoryConnector::new(source(), MemoryTarget::new()));
        let (status, _) = call(&app, "GET", "/api/migration/status/unknown", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "POST", "/api/migration/cancel/unknown", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
