use axum::extract::{Path, State};
use axum::Json;

use crate::api::state::AppState;
use crate::api::{require_integer_shaped, ApiError};
use crate::models::Item;

pub async fn get_items(State(state): State<AppState>) -> Result<Json<Vec<Item>>, ApiError> {
    let items = state.item_repo.list().await?;
    Ok(Json(items))
}

pub async fn get_item_by_id(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Json<Item>, ApiError> {
    require_integer_shaped(&item_id, "itemId")?;
    let item = state.item_repo.get_by_ark_id(item_id.trim()).await?;
    Ok(Json(item))
}
