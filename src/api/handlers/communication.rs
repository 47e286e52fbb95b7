use axum::{extract::{State, Path, Query}, response::IntoResponse, Json, http::StatusCode};
use crate::api::dtos::requests::{
    CreateFeedbackRequest, FeedbackQuery, LimitQuery, PostMessageRequest, UpdateFeedbackStatusRequest,
};
use crate::api::extractors::auth::AuthUser;
use crate::domain::models::communication::Channel;
use crate::state::AppState;
use crate::error::AppError;
use std::sync::Arc;

pub async fn list_feedback(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<FeedbackQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.communication.list_feedback(&user.actor, query.feedback_type).await?))
}

pub async fn create_feedback(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CreateFeedbackRequest>,
) -> Result<impl IntoResponse, AppError> {
    let feedback = state.communication
        .create_feedback(&user.actor, payload.feedback_type, &payload.content, payload.source)
        .await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

pub async fn update_feedback_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(feedback_id): Path<String>,
    Json(payload): Json<UpdateFeedbackStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.communication.update_feedback_status(&user.actor, &feedback_id, payload.status).await?))
}

pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(channel): Path<Channel>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.communication.list_messages(&user.actor, channel, query.limit).await?))
}

pub async fn post_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(channel): Path<Channel>,
    Json(payload): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let message = state.communication.post_message(&user.actor, channel, &payload.text).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
