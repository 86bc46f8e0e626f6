//! HTTP tool server.
//!
//! Exposes every [`Tool`](crate::tools::Tool) in a [`ToolRegistry`] over a
//! JSON HTTP API. All tools are dispatched through the same
//! `POST /tools/{name}` handler and share one [`RagService`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "document_not_indexed", "message": "Document 'x' is not indexed. ..." } }
//! ```
//!
//! | Kind | Status |
//! |------|--------|
//! | not found | 404 |
//! | unsupported input | 400 |
//! | model unavailable | 503 |
//! | cancelled | 409 |
//! | internal | 500 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::{ErrorKind, RagError};
use crate::service::RagService;
use crate::tools::{validate_params, ToolContext, ToolInfo, ToolRegistry};

/// Shared state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RagService>,
    pub tools: Arc<ToolRegistry>,
}

impl AppState {
    /// State serving the built-in tools.
    pub fn new(service: Arc<RagService>) -> Self {
        Self {
            service,
            tools: Arc::new(ToolRegistry::with_builtins()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind `bind_addr` and serve until ctrl-c. Registered documents are
/// released on the way out.
pub async fn run_server(service: Arc<RagService>, bind_addr: &str) -> anyhow::Result<()> {
    let state = AppState::new(service.clone());
    for t in state.tools.tools() {
        tracing::debug!(tool = t.name(), "registered tool");
    }

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        tools = state.tools.len(),
        "tool server listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    service.shutdown();
    tracing::info!("tool server stopped");
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Error response
// ═══════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Converts into an `{error: {code, message}}` response.
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = match err.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::UnsupportedInput => StatusCode::BAD_REQUEST,
            ErrorKind::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Cancelled => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Handlers
// ═══════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.tools.infos(),
    })
}

/// Look up the tool, validate parameters against its schema, execute.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let validated = validate_params(&tool.parameters_schema(), &params)?;

    let ctx = ToolContext::new(state.service.clone());
    let result = tool.execute(validated, &ctx).await.map_err(|e| {
        tracing::warn!(tool = %name, error = %e, "tool call failed");
        AppError::from(e)
    })?;

    Ok(Json(serde_json::json!({ "result": result })))
}
