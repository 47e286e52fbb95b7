//! Generic document access. Every call goes through the same authorization
//! and validation as the typed endpoints.

use axum::{extract::{State, Path, Query}, response::IntoResponse, Json, http::StatusCode};
use crate::api::dtos::requests::{BatchRequest, DocumentQueryRequest, VersionQuery};
use crate::api::extractors::auth::AuthUser;
use crate::domain::models::document::{self, Collection};
use crate::state::AppState;
use crate::error::AppError;
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((collection, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let collection: Collection = collection.parse()?;
    Ok(Json(state.documents.get(&user.actor, collection, &id).await?))
}

pub async fn create_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(collection): Path<String>,
    Json(data): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let collection: Collection = collection.parse()?;
    let doc = state.documents.create(&user.actor, collection, None, data).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

pub async fn set_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((collection, id)): Path<(String, String)>,
    Json(data): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let collection: Collection = collection.parse()?;
    Ok(Json(state.documents.set(&user.actor, collection, &id, data).await?))
}

pub async fn update_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((collection, id)): Path<(String, String)>,
    Query(version): Query<VersionQuery>,
    Json(patch): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let collection: Collection = collection.parse()?;
    let doc = state.documents
        .update(&user.actor, collection, &id, patch, version.expected_version)
        .await?;
    Ok(Json(doc))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((collection, id)): Path<(String, String)>,
    Query(version): Query<VersionQuery>,
) -> Result<impl IntoResponse, AppError> {
    let collection: Collection = collection.parse()?;
    state.documents.delete(&user.actor, collection, &id, version.expected_version).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn query_documents(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(collection): Path<String>,
    Json(payload): Json<DocumentQueryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let query = document::Query {
        collection: collection.parse()?,
        filters: payload.filters,
        order_by: payload.order_by,
        limit: payload.limit,
    };
    Ok(Json(state.documents.query(&user.actor, query).await?))
}

/// All writes commit together or not at all.
pub async fn batch_write(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<BatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.writes.is_empty() {
        return Err(AppError::InvalidArgument("A batch needs at least one write".into()));
    }
    let outcome = state.documents.batch(&user.actor, payload.writes).await?;
    Ok(Json(json!({
        "seq": outcome.seq,
        "documents": outcome.documents,
    })))
}
