use axum::{extract::{State, Path, Query}, response::IntoResponse, Json, http::StatusCode};
use crate::api::dtos::requests::TaskListQuery;
use crate::api::extractors::auth::AuthUser;
use crate::domain::services::task_service::{MilestoneUpdate, NewMilestone, NewTask, TaskUpdate};
use crate::state::AppState;
use crate::error::AppError;
use std::sync::Arc;

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<TaskListQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.tasks.list_tasks(&user.actor, query.assignee.as_deref()).await?))
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<NewTask>,
) -> Result<impl IntoResponse, AppError> {
    let task = state.tasks.create_task(&user.actor, payload).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.tasks.get_task(&user.actor, &task_id).await?))
}

pub async fn update_task(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(task_id): Path<String>,
    Json(payload): Json<TaskUpdate>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.tasks.update_task(&user.actor, &task_id, payload).await?))
}

pub async fn list_milestones(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.tasks.list_milestones(&user.actor).await?))
}

pub async fn create_milestone(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<NewMilestone>,
) -> Result<impl IntoResponse, AppError> {
    let milestone = state.tasks.create_milestone(&user.actor, payload).await?;
    Ok((StatusCode::CREATED, Json(milestone)))
}

pub async fn update_milestone(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(milestone_id): Path<String>,
    Json(payload): Json<MilestoneUpdate>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.tasks.update_milestone(&user.actor, &milestone_id, payload).await?))
}

pub async fn toggle_milestone(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(milestone_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.tasks.toggle_milestone(&user.actor, &milestone_id).await?))
}

pub async fn delete_milestone(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(milestone_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.tasks.delete_milestone(&user.actor, &milestone_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
