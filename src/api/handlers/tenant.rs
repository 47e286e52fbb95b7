use axum::{extract::{State, Path}, response::IntoResponse, Json};
use crate::api::extractors::auth::AuthUser;
use crate::state::AppState;
use crate::error::AppError;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

pub async fn get_startup(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(startup_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let startup = state.tenants.get_startup(&user.actor, &startup_id).await?;
    Ok(Json(startup))
}

pub async fn update_startup(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(startup_id): Path<String>,
    Json(patch): Json<Map<String, Value>>,
) -> Result<impl IntoResponse, AppError> {
    let startup = state.tenants.update_startup(&user.actor, &startup_id, patch).await?;
    info!("Updated startup {}", startup.id);
    Ok(Json(startup))
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.tenants.dashboard(&user.actor).await?))
}
