//! REST API endpoints.
//!
//! Axum-based HTTP API serving the drop matrix, trends, patterns and
//! reference data, versioned under `/PenguinStats/api/v3`.

pub mod routes;
pub mod state;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::EngineError;
use crate::models::{Account, Server};
use crate::repo::RepoError;
use crate::api::state::AppState;

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    let v3 = Router::new()
        .route("/items", get(routes::item::get_items))
        .route("/items/:itemId", get(routes::item::get_item_by_id))
        .route("/stages", get(routes::stage::get_stages))
        .route("/stages/:stageId", get(routes::stage::get_stage_by_id))
        .route("/zones", get(routes::zone::get_zones))
        .route("/zones/:zoneId", get(routes::zone::get_zone_by_id))
        .route("/result/matrix", get(routes::result::get_drop_matrix))
        .route("/result/trends", get(routes::result::get_trends))
        .route("/result/pattern", get(routes::result::get_pattern_matrix))
        .route(
            "/dataset/aggregated/:source/:category/:server/item/:itemId",
            get(routes::dataset::aggregated_item),
        )
        .route(
            "/dataset/aggregated/:source/:category/:server/stage/:stageId",
            get(routes::dataset::aggregated_stage),
        );

    Router::new()
        .nest("/PenguinStats/api/v3", v3)
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API error types, one per taxonomy kind.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("auth required: {0}")]
    AuthRequired(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("internal error")]
    Internal,
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => ApiError::NotFound(what),
            RepoError::Storage(err) => ApiError::Upstream(err.to_string()),
            RepoError::Upstream(msg) => ApiError::Upstream(msg),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Repo(repo_err) => repo_err.into(),
            // Shim failures and fold invariant violations indicate reference
            // data inconsistency; the message stays opaque.
            EngineError::Shim(_)
            | EngineError::MismatchedKeys { .. }
            | EngineError::MissingInlineRange
            | EngineError::Cancelled
            | EngineError::Internal(_) => ApiError::Internal,
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::AuthRequired(_) => (StatusCode::UNAUTHORIZED, "AUTH_REQUIRED"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM"),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Parse an optional `server` parameter, defaulting to CN.
pub fn parse_server(param: Option<&str>) -> Result<Server, ApiError> {
    match param {
        None | Some("") => Ok(Server::CN),
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::InvalidRequest(format!("unknown server: {}", raw))),
    }
}

/// Parse an optional boolean parameter ("true"/"false").
pub fn parse_bool(param: Option<&str>, default: bool) -> Result<bool, ApiError> {
    match param {
        None | Some("") => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::InvalidRequest(format!("malformed boolean: {}", raw))),
    }
}

/// Reject empty or non-integer-shaped id path params.
pub fn require_integer_shaped(param: &str, name: &str) -> Result<(), ApiError> {
    let trimmed = param.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::InvalidRequest(format!(
            "invalid or missing {}",
            name
        )));
    }
    Ok(())
}

/// Reject empty id path params.
pub fn require_non_empty(param: &str, name: &str) -> Result<(), ApiError> {
    if param.trim().is_empty() {
        return Err(ApiError::InvalidRequest(format!(
            "invalid or missing {}",
            name
        )));
    }
    Ok(())
}

/// Validate the dataset `category` param.
pub fn validate_category(category: &str) -> Result<(), ApiError> {
    match category {
        "all" | "automated" | "manual" => Ok(()),
        other => Err(ApiError::InvalidRequest(format!(
            "unknown category: {}",
            other
        ))),
    }
}

/// Resolve the requesting account. Anonymous unless the query is personal;
/// a personal query without a resolvable bearer token is rejected.
pub async fn resolve_account(
    state: &AppState,
    headers: &HeaderMap,
    is_personal: bool,
) -> Result<Account, ApiError> {
    if !is_personal {
        return Ok(Account::Anonymous);
    }

    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value))
        .ok_or_else(|| ApiError::AuthRequired("missing credentials".to_string()))?;

    match state.account_repo.get_account_by_token(token).await? {
        Some(account_id) => Ok(Account::Known(account_id)),
        None => Err(ApiError::AuthRequired("unknown account".to_string())),
    }
}
