use axum::{extract::{State, Path, Query}, response::IntoResponse, Json};
use crate::api::dtos::{requests::LimitQuery, responses::UpdatedCountResponse};
use crate::api::extractors::auth::AuthUser;
use crate::state::AppState;
use crate::error::AppError;
use std::sync::Arc;

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.notifications.list(&user.actor, query.limit).await?))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(notification_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.notifications.mark_read(&user.actor, &notification_id).await?))
}

pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let updated = state.notifications.mark_all_read(&user.actor).await?;
    Ok(Json(UpdatedCountResponse { updated }))
}
