use axum::{extract::{State, Path}, response::IntoResponse, Json, http::StatusCode};
use crate::api::dtos::{requests::CreateInvitationRequest, responses::InvitationCreatedResponse};
use crate::api::extractors::auth::AuthUser;
use crate::state::AppState;
use crate::error::AppError;
use std::sync::Arc;

pub async fn create_invitation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CreateInvitationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let invitation = state.invitations.create(&user.actor, &payload.email, payload.role).await?;
    let signup_link = state.invitations.signup_link(&invitation.id);
    Ok((StatusCode::CREATED, Json(InvitationCreatedResponse { invitation, signup_link })))
}

pub async fn list_invitations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.invitations.list(&user.actor).await?))
}

/// Public: the signup page resolves the invitation before an account exists.
pub async fn resolve_invitation(
    State(state): State<Arc<AppState>>,
    Path(invitation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.invitations.resolve(&invitation_id).await?))
}

pub async fn revoke_invitation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(invitation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.invitations.revoke(&user.actor, &invitation_id).await?))
}
