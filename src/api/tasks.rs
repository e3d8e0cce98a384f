//! Task procedures. Every id is checked against the caller; tasks and
//! lists owned by someone else are reported as not found.

use super::{ApiJson, ApiPath, AppState, CurrentUser, TreeJson, validate};
use crate::db::Database;
use crate::error::{ApiError, ApiResult};
use crate::types::{Task, TaskTree, TodoList};
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub list_id: Option<i64>,
    #[serde(default)]
    pub title: String,
    pub parent_task_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTaskRequest {
    pub new_list_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DeleteTaskResponse {
    pub success: bool,
    /// Rows removed, the task itself plus all descendants.
    pub deleted: usize,
}

fn owned_list(db: &Database, list_id: i64, user: &CurrentUser) -> ApiResult<TodoList> {
    match db.get_list(list_id)? {
        Some(list) if list.user_id == user.id => Ok(list),
        _ => Err(ApiError::list_not_found(list_id)),
    }
}

fn owned_task(db: &Database, task_id: i64, user: &CurrentUser) -> ApiResult<Task> {
    match db.get_task(task_id)? {
        Some(task) if task.user_id == user.id => Ok(task),
        _ => Err(ApiError::task_not_found(task_id)),
    }
}

/// Top-level tasks of a list, each with its full subtree.
pub async fn get_list_tasks(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(list_id): ApiPath<i64>,
) -> ApiResult<TreeJson> {
    let Some(db) = state.db() else {
        return TreeJson::forest(&[]);
    };
    owned_list(db, list_id, &user)?;
    TreeJson::forest(&db.get_list_tasks(list_id)?)
}

/// One task with its full subtree; `null` without a store.
pub async fn get_task(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(task_id): ApiPath<i64>,
) -> ApiResult<TreeJson> {
    let Some(db) = state.db() else {
        return Ok(TreeJson::null());
    };
    owned_task(db, task_id, &user)?;
    let tree = db
        .get_task_with_subtasks(task_id)?
        .ok_or_else(|| ApiError::task_not_found(task_id))?;
    TreeJson::tree(&tree)
}

/// Direct children of a task, each carrying its own children.
pub async fn get_subtasks(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(task_id): ApiPath<i64>,
) -> ApiResult<TreeJson> {
    let Some(db) = state.db() else {
        return TreeJson::forest(&[]);
    };
    owned_task(db, task_id, &user)?;
    TreeJson::forest(&db.get_subtasks(task_id)?)
}

pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<CreateTaskRequest>,
) -> ApiResult<TreeJson> {
    let list_id = req
        .list_id
        .ok_or_else(|| ApiError::missing_field("listId"))?;
    let title = validate::task_title(&req.title, state.limits())?;

    let db = state.store()?;
    owned_list(db, list_id, &user)?;
    if let Some(parent_id) = req.parent_task_id {
        owned_task(db, parent_id, &user)?;
    }

    let task = db.create_task(list_id, user.id, title, req.parent_task_id)?;
    info!(task_id = task.id, list_id, parent_task_id = ?task.parent_task_id, "Created task");
    TreeJson::tree(&TaskTree::leaf(task))
}

pub async fn toggle_completion(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(task_id): ApiPath<i64>,
) -> ApiResult<Json<Task>> {
    let db = state.store()?;
    owned_task(db, task_id, &user)?;
    let task = db.toggle_task_completion(task_id)?;
    info!(task_id, completed = task.completed, "Toggled task");
    Ok(Json(task))
}

/// Rename a task.
pub async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(task_id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    let title = validate::task_title(&req.title, state.limits())?;
    let db = state.store()?;
    owned_task(db, task_id, &user)?;
    Ok(Json(db.update_task_title(task_id, title)?))
}

/// Delete a task and all of its descendants.
pub async fn delete(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(task_id): ApiPath<i64>,
) -> ApiResult<Json<DeleteTaskResponse>> {
    let db = state.store()?;
    owned_task(db, task_id, &user)?;
    let deleted = db.delete_task(task_id)?;
    info!(task_id, deleted, "Deleted task");
    Ok(Json(DeleteTaskResponse {
        success: true,
        deleted,
    }))
}

/// Move a top-level task, with its subtree, to another list of the caller.
pub async fn move_to_list(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(task_id): ApiPath<i64>,
    ApiJson(req): ApiJson<MoveTaskRequest>,
) -> ApiResult<Json<Task>> {
    let new_list_id = req
        .new_list_id
        .ok_or_else(|| ApiError::missing_field("newListId"))?;

    let db = state.store()?;
    let task = owned_task(db, task_id, &user)?;
    if !task.is_top_level() {
        return Err(ApiError::invalid_state(
            "Only top-level tasks can be moved to another list",
        ));
    }
    owned_list(db, new_list_id, &user)?;

    let moved = db.move_task_to_list(task_id, new_list_id)?;
    info!(task_id, from = task.list_id, to = new_list_id, "Moved task");
    Ok(Json(moved))
}
