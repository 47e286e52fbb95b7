use axum::{extract::State, response::IntoResponse, Json};
use crate::api::dtos::responses::ClientConfigResponse;
use crate::state::AppState;
use serde_json::json;
use std::sync::Arc;

pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Identifiers a client needs to initialise against this backend.
pub async fn client_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = &state.config;
    Json(ClientConfigResponse {
        api_key: config.api_key.clone(),
        auth_domain: config.auth_domain.clone(),
        project_id: config.project_id.clone(),
        storage_bucket: config.storage_bucket.clone(),
        app_id: config.app_id.clone(),
        notification_limit: config.notification_limit,
    })
}
