use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::state::AppState;
use crate::api::{parse_bool, parse_server, resolve_account, ApiError};
use crate::shim::{ShimDropMatrixQueryResult, ShimPatternMatrixQueryResult, ShimTrendQueryResult};

/// A `Last-Modified` header for a cached artifact's recompute stamp.
fn last_modified_headers(stamp: Option<DateTime<Utc>>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(stamp) = stamp {
        let formatted = stamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        if let Ok(value) = HeaderValue::from_str(&formatted) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
    headers
}

// ── Matrix Endpoint ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MatrixParams {
    pub server: Option<String>,
    pub is_personal: Option<String>,
    pub show_closed_zones: Option<String>,
    #[serde(rename = "stageFilter")]
    pub stage_filter: Option<String>,
    #[serde(rename = "itemFilter")]
    pub item_filter: Option<String>,
}

pub async fn get_drop_matrix(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<MatrixParams>,
) -> Result<(HeaderMap, Json<ShimDropMatrixQueryResult>), ApiError> {
    let server = parse_server(params.server.as_deref())?;
    let is_personal = parse_bool(params.is_personal.as_deref(), false)?;
    let show_closed_zones = parse_bool(params.show_closed_zones.as_deref(), false)?;
    let account = resolve_account(&state, &headers, is_personal).await?;

    let result = state
        .drop_matrix
        .get_shim_max_accumulable_drop_matrix(
            server,
            show_closed_zones,
            params.stage_filter.as_deref().unwrap_or(""),
            params.item_filter.as_deref().unwrap_or(""),
            account,
        )
        .await?;

    // The stamp describes the cached global view; personal and filtered
    // responses are computed fresh and carry none.
    let stamp = if !is_personal
        && params.stage_filter.as_deref().unwrap_or("").is_empty()
        && params.item_filter.as_deref().unwrap_or("").is_empty()
    {
        state
            .drop_matrix
            .result_last_modified(server, show_closed_zones)
            .await
    } else {
        None
    };
    Ok((last_modified_headers(stamp), Json(result)))
}

// ── Trends Endpoint ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TrendsParams {
    pub server: Option<String>,
}

pub async fn get_trends(
    State(state): State<AppState>,
    Query(params): Query<TrendsParams>,
) -> Result<(HeaderMap, Json<ShimTrendQueryResult>), ApiError> {
    let server = parse_server(params.server.as_deref())?;
    let result = state.trend.get_shim_trend(server).await?;
    let stamp = state.trend.result_last_modified(server).await;
    Ok((last_modified_headers(stamp), Json(result)))
}

// ── Pattern Endpoint ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PatternParams {
    pub server: Option<String>,
    pub is_personal: Option<String>,
    pub show_all_patterns: Option<String>,
}

pub async fn get_pattern_matrix(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PatternParams>,
) -> Result<(HeaderMap, Json<ShimPatternMatrixQueryResult>), ApiError> {
    let server = parse_server(params.server.as_deref())?;
    let is_personal = parse_bool(params.is_personal.as_deref(), false)?;
    let show_all_patterns = parse_bool(params.show_all_patterns.as_deref(), false)?;
    let account = resolve_account(&state, &headers, is_personal).await?;

    let result = state
        .pattern_matrix
        .get_shim_pattern_matrix(server, account, false, show_all_patterns)
        .await?;

    let stamp = if is_personal {
        None
    } else {
        state
            .pattern_matrix
            .result_last_modified(server, false, show_all_patterns)
            .await
    };
    Ok((last_modified_headers(stamp), Json(result)))
}

#[cfg(test)]
mod tests {
    use crate::api::routes::tests::{get_json, get_json_auth, seed_matrix, test_context};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_matrix_excludes_closed_zones_by_default() {
        let ctx = test_context();
        seed_matrix(&ctx).await;
        let app = crate::api::build_router(ctx.state.clone());

        let (status, json) = get_json(app, "/PenguinStats/api/v3/result/matrix").await;

        assert_eq!(status, StatusCode::OK);
        let matrix = json["matrix"].as_array().unwrap();
        // Stage 2's zone is closed: only stage 1 rows survive.
        assert_eq!(matrix.len(), 2);
        assert!(matrix.iter().all(|el| el["stageId"] == "main_01-07"));
    }

    #[tokio::test]
    async fn test_matrix_show_closed_zones() {
        let ctx = test_context();
        seed_matrix(&ctx).await;
        let app = crate::api::build_router(ctx.state.clone());

        let (status, json) = get_json(
            app,
            "/PenguinStats/api/v3/result/matrix?show_closed_zones=true",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let matrix = json["matrix"].as_array().unwrap();
        assert_eq!(matrix.len(), 4);
    }

    #[tokio::test]
    async fn test_matrix_stage_filter_post_filters() {
        let ctx = test_context();
        seed_matrix(&ctx).await;
        let app = crate::api::build_router(ctx.state.clone());

        // Filtering on a stage with no data plus stage 1 yields stage 1 only.
        let (status, json) = get_json(
            app,
            "/PenguinStats/api/v3/result/matrix?show_closed_zones=true&stageFilter=main_01-07,act99-00",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let matrix = json["matrix"].as_array().unwrap();
        assert_eq!(matrix.len(), 2);
        assert!(matrix.iter().all(|el| el["stageId"] == "main_01-07"));
    }

    #[tokio::test]
    async fn test_matrix_invalid_server() {
        let ctx = test_context();
        let app = crate::api::build_router(ctx.state.clone());
        let (status, json) = get_json(app, "/PenguinStats/api/v3/result/matrix?server=XX").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_matrix_malformed_bool() {
        let ctx = test_context();
        let app = crate::api::build_router(ctx.state.clone());
        let (status, _) = get_json(
            app,
            "/PenguinStats/api/v3/result/matrix?show_closed_zones=maybe",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_matrix_personal_requires_auth() {
        let ctx = test_context();
        let app = crate::api::build_router(ctx.state.clone());
        let (status, json) =
            get_json(app, "/PenguinStats/api/v3/result/matrix?is_personal=true").await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "AUTH_REQUIRED");
    }

    #[tokio::test]
    async fn test_matrix_personal_scoped_to_account() {
        let ctx = test_context();
        seed_matrix(&ctx).await;
        let app = crate::api::build_router(ctx.state.clone());

        let (status, json) = get_json_auth(
            app,
            "/PenguinStats/api/v3/result/matrix?is_personal=true&show_closed_zones=true",
            "token-42",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let matrix = json["matrix"].as_array().unwrap();
        // Account 42 reported a single clear of stage 1 with 10 of item 1.
        let row = matrix
            .iter()
            .find(|el| el["stageId"] == "main_01-07" && el["itemId"] == "30011")
            .unwrap();
        assert_eq!(row["quantity"], 10);
        assert_eq!(row["times"], 1);
    }

    #[tokio::test]
    async fn test_matrix_sets_last_modified_header() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::util::ServiceExt;

        let ctx = test_context();
        seed_matrix(&ctx).await;
        let app = crate::api::build_router(ctx.state.clone());

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/PenguinStats/api/v3/result/matrix")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let header = resp.headers().get("last-modified").unwrap();
        assert!(header.to_str().unwrap().ends_with("GMT"));
    }

    #[tokio::test]
    async fn test_trends() {
        let ctx = test_context();
        let app = crate::api::build_router(ctx.state.clone());
        let (status, json) = get_json(app, "/PenguinStats/api/v3/result/trends").await;

        assert_eq!(status, StatusCode::OK);
        let stage = &json["trend"]["main_01-07"];
        assert!(stage["startTime"].is_u64());
        let quantity = stage["results"]["30011"]["quantity"].as_array().unwrap();
        let times = stage["results"]["30011"]["times"].as_array().unwrap();
        assert_eq!(quantity.len(), times.len());
        let total: i64 = quantity.iter().map(|v| v.as_i64().unwrap()).sum();
        assert_eq!(total, 15);
    }

    #[tokio::test]
    async fn test_pattern_matrix() {
        let ctx = test_context();
        let app = crate::api::build_router(ctx.state.clone());
        let (status, json) = get_json(
            app,
            "/PenguinStats/api/v3/result/pattern?show_all_patterns=true",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let elements = json["patternMatrix"].as_array().unwrap();
        // Stage 2 is closed; stage 1 had three distinct drop multisets.
        assert_eq!(elements.len(), 3);
        assert!(elements.iter().all(|el| el["stageId"] == "main_01-07"));
        assert!(elements.iter().all(|el| el["times"] == 3));
    }

    #[tokio::test]
    async fn test_pattern_personal() {
        let ctx = test_context();
        let app = crate::api::build_router(ctx.state.clone());
        let (status, json) = get_json_auth(
            app,
            "/PenguinStats/api/v3/result/pattern?is_personal=true&show_all_patterns=true",
            "token-42",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let elements = json["patternMatrix"].as_array().unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0]["quantity"], 1);
        assert_eq!(elements[0]["times"], 1);
    }
}
