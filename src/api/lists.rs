//! List procedures.

use super::{ApiJson, ApiPath, AppState, CurrentUser, SuccessResponse, validate};
use crate::error::ApiResult;
use crate::types::{ListStats, ListWithStats};
use axum::{Json, extract::State};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreateListRequest {
    #[serde(default)]
    pub name: String,
}

/// The caller's lists with completion counts.
pub async fn get_all(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<ListWithStats>>> {
    let Some(db) = state.db() else {
        return Ok(Json(Vec::new()));
    };

    let lists = db.get_user_lists(user.id)?;
    let mut enriched = Vec::with_capacity(lists.len());
    for list in lists {
        let stats = db.get_list_stats(list.id)?;
        enriched.push(ListWithStats { list, stats });
    }
    Ok(Json(enriched))
}

pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<CreateListRequest>,
) -> ApiResult<Json<ListWithStats>> {
    let name = validate::list_name(&req.name, state.limits())?;
    let db = state.store()?;

    let list = db.create_list(user.id, name)?;
    info!(list_id = list.id, user_id = user.id, "Created list");

    Ok(Json(ListWithStats {
        list,
        stats: ListStats::default(),
    }))
}

/// Delete a list and every task in it.
pub async fn delete(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(list_id): ApiPath<i64>,
) -> ApiResult<Json<SuccessResponse>> {
    state.store()?.delete_list(list_id, user.id)?;
    info!(list_id, user_id = user.id, "Deleted list");
    Ok(SuccessResponse::ok())
}
