use axum::extract::{Path, State};
use axum::Json;

use crate::api::state::AppState;
use crate::api::{require_non_empty, ApiError};
use crate::models::Stage;

pub async fn get_stages(State(state): State<AppState>) -> Result<Json<Vec<Stage>>, ApiError> {
    let stages = state.stage_repo.list().await?;
    Ok(Json(stages))
}

pub async fn get_stage_by_id(
    State(state): State<AppState>,
    Path(stage_id): Path<String>,
) -> Result<Json<Stage>, ApiError> {
    require_non_empty(&stage_id, "stageId")?;
    let stage = state.stage_repo.get_by_ark_id(stage_id.trim()).await?;
    Ok(Json(stage))
}

#[cfg(test)]
mod tests {
    use crate::api::routes::tests::{get_json, test_context};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_get_stages() {
        let ctx = test_context();
        let app = crate::api::build_router(ctx.state.clone());
        let (status, json) = get_json(app, "/PenguinStats/api/v3/stages").await;

        assert_eq!(status, StatusCode::OK);
        let stages = json.as_array().unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0]["arkStageId"], "main_01-07");
    }

    #[tokio::test]
    async fn test_get_stage_by_id() {
        let ctx = test_context();
        let app = crate::api::build_router(ctx.state.clone());
        let (status, json) = get_json(app, "/PenguinStats/api/v3/stages/main_02-08").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["stageId"], 2);
    }

    #[tokio::test]
    async fn test_get_stage_unknown_id() {
        let ctx = test_context();
        let app = crate::api::build_router(ctx.state.clone());
        let (status, json) = get_json(app, "/PenguinStats/api/v3/stages/act99-00").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_get_stage_blank_id() {
        let ctx = test_context();
        let app = crate::api::build_router(ctx.state.clone());
        let (status, json) = get_json(app, "/PenguinStats/api/v3/stages/%20").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "INVALID_REQUEST");
    }
}
