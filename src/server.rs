//! HTTP API.
//!
//! Exposes the rule store as a small JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/rules?limit=N` | List rules, highest priority first (default limit 100) |
//! | `POST` | `/rules` | Load (upsert) a rule |
//! | `POST` | `/rules/query` | Similarity search, optional category filter |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Response contract
//!
//! Every rule endpoint answers with a `success` flag:
//!
//! ```json
//! { "success": true, "rule_id": "3f1c0a9be2d4", "message": "Rule loaded successfully" }
//! { "success": false, "error": "invalid input: title must not be empty" }
//! ```
//!
//! Status is 200 on success and 400 for any failure the store reports,
//! including unsupported method/path combinations. A panic in a handler is
//! answered with 500 and `"Internal server error"`.
//!
//! # CORS
//!
//! Any origin may call `GET`, `POST`, and `OPTIONS` with the `Content-Type`
//! and `Authorization` headers.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

use governance_rules_core::models::{
    RuleDraft, RuleQuery, RuleRecord, ScoredRule, DEFAULT_LIST_LIMIT, DEFAULT_QUERY_LIMIT,
};
use governance_rules_core::{RuleStore, StoreError};

use crate::config::Config;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    store: Arc<RuleStore>,
}

/// Build the router. Exposed separately from [`run_server`] so tests can
/// serve it on an ephemeral port.
pub fn router(store: Arc<RuleStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route(
            "/rules",
            get(handle_list).post(handle_load).fallback(handle_unsupported),
        )
        .route(
            "/rules/query",
            post(handle_query).fallback(handle_unsupported),
        )
        .route("/health", get(handle_health).fallback(handle_unsupported))
        .fallback(handle_unsupported)
        .with_state(AppState { store })
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors)
}

/// Serve on an already bound listener until the process is terminated.
pub async fn serve(listener: TcpListener, store: Arc<RuleStore>) -> anyhow::Result<()> {
    axum::serve(listener, router(store)).await?;
    Ok(())
}

/// Bind `[server].bind` and serve.
pub async fn run_server(config: &Config, store: Arc<RuleStore>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.server.bind).await?;
    info!(addr = %config.server.bind, index = store.index_name(), "rules API listening");
    serve(listener, store).await
}

// ============ Responses ============

/// A failed request, rendered as `{"success": false, "error": ...}`.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        if err.is_validation() {
            warn!(error = %err, "rejected request");
        } else {
            error!(error = %err, "rule store operation failed");
        }
        Self::bad_request(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "success": false, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct LoadResponse {
    success: bool,
    rule_id: String,
    message: &'static str,
}

#[derive(Serialize)]
struct ListResponse {
    success: bool,
    rules: Vec<RuleRecord>,
    total: u64,
}

#[derive(Serialize)]
struct QueryResponse {
    success: bool,
    rules: Vec<ScoredRule>,
    total: u64,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Body of `POST /rules/query`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QueryRequest {
    query: Option<String>,
    category: Option<String>,
    limit: Option<usize>,
}

/// Decode a JSON body. An empty body reads as `{}` so that missing fields
/// surface as validation errors.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {}", e)))
}

fn parse_limit(params: &HashMap<String, String>) -> Result<usize, ApiError> {
    match params.get("limit") {
        None => Ok(DEFAULT_LIST_LIMIT),
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(limit) if limit > 0 => Ok(limit),
            _ => Err(ApiError::bad_request(format!(
                "invalid input: limit must be a positive integer, got '{}'",
                raw
            ))),
        },
    }
}

// ============ Handlers ============

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ListResponse>, ApiError> {
    let limit = parse_limit(&params)?;
    let list = state.store.list(limit).await?;
    Ok(Json(ListResponse {
        success: true,
        rules: list.rules,
        total: list.total,
    }))
}

async fn handle_load(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<LoadResponse>, ApiError> {
    let draft: RuleDraft = parse_body(&body)?;
    let rule = draft.validate()?;
    let rule_id = state.store.upsert(rule).await?;
    Ok(Json(LoadResponse {
        success: true,
        rule_id,
        message: "Rule loaded successfully",
    }))
}

async fn handle_query(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<QueryResponse>, ApiError> {
    let req: QueryRequest = parse_body(&body)?;
    let query = RuleQuery {
        text: req.query.unwrap_or_default(),
        category: req.category.filter(|c| !c.is_empty()),
        limit: req.limit.unwrap_or(DEFAULT_QUERY_LIMIT),
    };
    let hits = state.store.query(&query).await?;
    Ok(Json(QueryResponse {
        success: true,
        rules: hits.rules,
        total: hits.total,
    }))
}

async fn handle_unsupported(method: Method, uri: Uri) -> ApiError {
    ApiError::bad_request(format!(
        "Unsupported method/path: {} {}",
        method,
        uri.path()
    ))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(panic = %detail, "request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": "Internal server error" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit() {
        let mut params = HashMap::new();
        assert_eq!(parse_limit(&params).ok(), Some(100));
        params.insert("limit".to_string(), "2".to_string());
        assert_eq!(parse_limit(&params).ok(), Some(2));
        params.insert("limit".to_string(), "0".to_string());
        assert!(parse_limit(&params).is_err());
        params.insert("limit".to_string(), "ten".to_string());
        assert!(parse_limit(&params).is_err());
    }

    #[test]
    fn test_parse_body_empty_is_default() {
        let req: QueryRequest = parse_body(&Bytes::from_static(b"  ")).ok().unwrap();
        assert!(req.query.is_none());
        let bad: Result<QueryRequest, _> = parse_body(&Bytes::from_static(b"{not json"));
        assert!(bad.is_err());
    }
}
