use axum::{extract::{State, Path, Query}, response::IntoResponse, Json};
use crate::api::dtos::requests::MembersQuery;
use crate::api::extractors::auth::AuthUser;
use crate::state::AppState;
use crate::error::AppError;
use serde_json::{Map, Value};
use std::sync::Arc;

pub async fn list_members(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(startup_id): Path<String>,
    Query(query): Query<MembersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let members = state.tenants
        .list_members(&user.actor, &startup_id, query.search.as_deref())
        .await?;
    Ok(Json(members))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(uid): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.tenants.get_user_profile(&user.actor, &uid).await?))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(uid): Path<String>,
    Json(patch): Json<Map<String, Value>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.tenants.update_user_profile(&user.actor, &uid, patch).await?))
}
