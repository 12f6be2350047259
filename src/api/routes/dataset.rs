use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::{
    parse_server, require_integer_shaped, require_non_empty, resolve_account, validate_category,
    ApiError,
};
use crate::models::Account;
use crate::shim::{
    ShimDropMatrixElement, ShimPatternMatrixElement, ShimStageTrend, ShimTrendQueryResult,
};

#[derive(Debug, Deserialize)]
pub struct DatasetPath {
    pub source: String,
    pub category: String,
    pub server: String,
    #[serde(rename = "itemId", default)]
    pub item_id: Option<String>,
    #[serde(rename = "stageId", default)]
    pub stage_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AggregatedItemStats {
    pub matrix: Vec<ShimDropMatrixElement>,
    pub trends: BTreeMap<String, ShimStageTrend>,
}

#[derive(Debug, Serialize)]
pub struct AggregatedStageStats {
    pub matrix: Vec<ShimDropMatrixElement>,
    pub trends: BTreeMap<String, ShimStageTrend>,
    pub patterns: Vec<ShimPatternMatrixElement>,
}

struct DatasetScope {
    server: crate::models::Server,
    account: Account,
}

async fn resolve_scope(
    state: &AppState,
    headers: &HeaderMap,
    path: &DatasetPath,
) -> Result<DatasetScope, ApiError> {
    let server = parse_server(Some(path.server.as_str()))?;
    validate_category(&path.category)?;

    let is_personal = match path.source.as_str() {
        "all" => false,
        "personal" => true,
        other => {
            return Err(ApiError::InvalidRequest(format!(
                "unknown source: {}",
                other
            )))
        }
    };
    let account = resolve_account(state, headers, is_personal).await?;
    Ok(DatasetScope { server, account })
}

/// Trend entries restricted to one item, keeping each stage's anchor.
fn filter_trends_by_item(
    trend: &ShimTrendQueryResult,
    ark_item_id: &str,
) -> BTreeMap<String, ShimStageTrend> {
    let mut trends = BTreeMap::new();
    for (stage_id, stage_trend) in &trend.trend {
        if let Some(item_trend) = stage_trend.results.get(ark_item_id) {
            let mut results = BTreeMap::new();
            results.insert(ark_item_id.to_string(), item_trend.clone());
            trends.insert(
                stage_id.clone(),
                ShimStageTrend {
                    start_time: stage_trend.start_time,
                    results,
                },
            );
        }
    }
    trends
}

pub async fn aggregated_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<DatasetPath>,
) -> Result<Json<AggregatedItemStats>, ApiError> {
    let item_id = path.item_id.clone().unwrap_or_default();
    require_integer_shaped(&item_id, "itemId")?;
    let scope = resolve_scope(&state, &headers, &path).await?;

    let matrix = state
        .drop_matrix
        .get_shim_max_accumulable_drop_matrix(scope.server, true, "", "", scope.account)
        .await?;
    let matrix: Vec<ShimDropMatrixElement> = matrix
        .matrix
        .into_iter()
        .filter(|el| el.item_id == item_id)
        .collect();

    let trend = state.trend.get_shim_trend(scope.server).await?;
    let trends = filter_trends_by_item(&trend, &item_id);

    Ok(Json(AggregatedItemStats { matrix, trends }))
}

pub async fn aggregated_stage(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<DatasetPath>,
) -> Result<Json<AggregatedStageStats>, ApiError> {
    let stage_id = path.stage_id.clone().unwrap_or_default();
    require_non_empty(&stage_id, "stageId")?;
    let scope = resolve_scope(&state, &headers, &path).await?;

    let matrix = state
        .drop_matrix
        .get_shim_max_accumulable_drop_matrix(scope.server, true, "", "", scope.account)
        .await?;
    let matrix: Vec<ShimDropMatrixElement> = matrix
        .matrix
        .into_iter()
        .filter(|el| el.stage_id == stage_id)
        .collect();

    let trend = state.trend.get_shim_trend(scope.server).await?;
    let mut trends = BTreeMap::new();
    if let Some(stage_trend) = trend.trend.get(&stage_id) {
        trends.insert(stage_id.clone(), stage_trend.clone());
    }

    let pattern = state
        .pattern_matrix
        .get_shim_pattern_matrix(scope.server, scope.account, true, false)
        .await?;
    let patterns: Vec<ShimPatternMatrixElement> = pattern
        .pattern_matrix
        .into_iter()
        .filter(|el| el.stage_id == stage_id)
        .collect();

    Ok(Json(AggregatedStageStats {
        matrix,
        trends,
        patterns,
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::routes::tests::{get_json, seed_matrix, test_context};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_aggregated_item() {
        let ctx = test_context();
        seed_matrix(&ctx).await;
        let app = crate::api::build_router(ctx.state.clone());

        let (status, json) = get_json(
            app,
            "/PenguinStats/api/v3/dataset/aggregated/all/all/CN/item/30011",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let matrix = json["matrix"].as_array().unwrap();
        assert_eq!(matrix.len(), 2);
        assert!(matrix.iter().all(|el| el["itemId"] == "30011"));

        let trends = json["trends"].as_object().unwrap();
        let stage = trends.get("main_01-07").unwrap();
        assert_eq!(stage["results"].as_object().unwrap().len(), 1);
        assert!(stage["results"].get("30011").is_some());
    }

    #[tokio::test]
    async fn test_aggregated_stage() {
        let ctx = test_context();
        seed_matrix(&ctx).await;
        let app = crate::api::build_router(ctx.state.clone());

        let (status, json) = get_json(
            app,
            "/PenguinStats/api/v3/dataset/aggregated/all/all/CN/stage/main_01-07",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let matrix = json["matrix"].as_array().unwrap();
        assert_eq!(matrix.len(), 2);
        assert!(matrix.iter().all(|el| el["stageId"] == "main_01-07"));
        assert!(json["trends"].get("main_01-07").is_some());

        let patterns = json["patterns"].as_array().unwrap();
        assert!(!patterns.is_empty());
        assert!(patterns.iter().all(|el| el["stageId"] == "main_01-07"));
    }

    #[tokio::test]
    async fn test_aggregated_unknown_source() {
        let ctx = test_context();
        let app = crate::api::build_router(ctx.state.clone());

        let (status, json) = get_json(
            app,
            "/PenguinStats/api/v3/dataset/aggregated/everyone/all/CN/item/30011",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_aggregated_unknown_category() {
        let ctx = test_context();
        let app = crate::api::build_router(ctx.state.clone());

        let (status, _) = get_json(
            app,
            "/PenguinStats/api/v3/dataset/aggregated/all/bogus/CN/item/30011",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_aggregated_personal_requires_auth() {
        let ctx = test_context();
        let app = crate::api::build_router(ctx.state.clone());

        let (status, json) = get_json(
            app,
            "/PenguinStats/api/v3/dataset/aggregated/personal/all/CN/stage/main_01-07",
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "AUTH_REQUIRED");
    }
}
