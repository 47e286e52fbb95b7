use axum::{
    body::Bytes,
    extract::{State, Path, Query},
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use crate::api::dtos::{requests::SignedBlobQuery, responses::LogoResponse};
use crate::api::extractors::auth::AuthUser;
use crate::domain::services::blob_service::logo_path;
use crate::state::AppState;
use crate::error::AppError;
use std::sync::Arc;

pub async fn upload_logo(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(startup_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");

    let (startup, meta) = state.blobs.upload_logo(&user.actor, &startup_id, &body, content_type).await?;
    let url = match startup.logo_url {
        Some(url) => url,
        None => state.blobs.signed_url(&meta.path, &meta.version)?,
    };
    Ok(Json(LogoResponse {
        url,
        version: meta.version,
        size: meta.size,
        content_type: meta.content_type,
    }))
}

pub async fn get_logo(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(startup_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (meta, bytes) = state.blobs.get_logo(&user.actor, &startup_id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, meta.content_type),
            (header::ETAG, format!("\"{}\"", meta.version)),
            (header::CACHE_CONTROL, "private, no-cache".to_string()),
        ],
        bytes,
    ))
}

pub async fn get_logo_url(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(startup_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let url = state.blobs.logo_url(&user.actor, &startup_id).await?;
    Ok(Json(serde_json::json!({ "path": logo_path(&startup_id), "url": url })))
}

/// Session-less download through a signed URL. A URL stays valid until the object is replaced.
pub async fn get_signed_blob(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(query): Query<SignedBlobQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (meta, bytes) = state.blobs.fetch_signed(&path, &query.v, &query.sig).await?;
    Ok((
        [
            (header::CONTENT_TYPE, meta.content_type),
            (header::ETAG, format!("\"{}\"", meta.version)),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable".to_string()),
        ],
        bytes,
    ))
}
