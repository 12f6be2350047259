use axum::extract::{Path, State};
use axum::Json;

use crate::api::state::AppState;
use crate::api::{require_non_empty, ApiError};
use crate::models::Zone;

pub async fn get_zones(State(state): State<AppState>) -> Result<Json<Vec<Zone>>, ApiError> {
    let zones = state.stage_repo.list_zones().await?;
    Ok(Json(zones))
}

pub async fn get_zone_by_id(
    State(state): State<AppState>,
    Path(zone_id): Path<String>,
) -> Result<Json<Zone>, ApiError> {
    require_non_empty(&zone_id, "zoneId")?;
    let zone = state.stage_repo.get_zone_by_ark_id(zone_id.trim()).await?;
    Ok(Json(zone))
}

#[cfg(test)]
mod tests {
    use crate::api::routes::tests::{get_json, test_context};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_get_zones() {
        let ctx = test_context();
        let app = crate::api::build_router(ctx.state.clone());
        let (status, json) = get_json(app, "/PenguinStats/api/v3/zones").await;

        assert_eq!(status, StatusCode::OK);
        let zones = json.as_array().unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0]["arkZoneId"], "main_1");
        assert_eq!(zones[0]["existence"]["CN"]["open"], true);
    }

    #[tokio::test]
    async fn test_get_zone_by_id() {
        let ctx = test_context();
        let app = crate::api::build_router(ctx.state.clone());
        let (status, json) = get_json(app, "/PenguinStats/api/v3/zones/main_2").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "Chapter 2");
    }

    #[tokio::test]
    async fn test_get_zone_unknown_id() {
        let ctx = test_context();
        let app = crate::api::build_router(ctx.state.clone());
        let (status, _) = get_json(app, "/PenguinStats/api/v3/zones/act99").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
