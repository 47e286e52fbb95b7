use axum::{extract::{Query, State}, response::IntoResponse, Json, http::StatusCode};
use crate::api::dtos::requests::{SignupQuery, SignupRequest};
use crate::api::handlers::auth::{auth_response, set_cookies};
use crate::domain::models::invitation::InvitationStatus;
use crate::domain::services::{identity_service::normalize_email, invitation_service::ResolvedInvitation};
use crate::state::AppState;
use crate::error::AppError;
use std::sync::Arc;
use tower_cookies::Cookies;
use tracing::info;

/// Account creation plus onboarding. With an invitation the new member joins
/// the inviting startup; otherwise a startup is created with the caller as Founder.
/// If onboarding fails the fresh account is removed again.
pub async fn signup(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Query(query): Query<SignupQuery>,
    Json(payload): Json<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let display_name = payload.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(AppError::InvalidArgument("Display name is required".into()));
    }

    let invitation = match payload.invite.as_deref().or(query.invite.as_deref()) {
        Some(id) if !id.trim().is_empty() => Some(state.invitations.resolve(id.trim()).await?),
        _ => None,
    };

    match &invitation {
        Some(inv) => {
            match inv.status {
                InvitationStatus::Pending => {}
                InvitationStatus::Consumed => return Err(AppError::AlreadyConsumed("This invitation has already been used".into())),
                InvitationStatus::Revoked => return Err(AppError::PermissionDenied("This invitation is no longer valid".into())),
            }
            if normalize_email(&payload.email) != inv.email {
                return Err(AppError::PermissionDenied("This invitation was sent to a different email address".into()));
            }
        }
        None => {
            if payload.startup_name.as_deref().is_none_or(|n| n.trim().is_empty()) {
                return Err(AppError::InvalidArgument("Startup name is required".into()));
            }
        }
    }

    let credential = match state.identity.signup(&payload.email, &payload.password).await {
        Ok(credential) => credential,
        Err(AppError::AlreadyExists(msg)) => {
            if let Some(inv) = &invitation {
                if lost_redemption_race(&state, inv).await? {
                    return Err(AppError::AlreadyConsumed("This invitation has already been used".into()));
                }
            }
            return Err(AppError::AlreadyExists(msg));
        }
        Err(e) => return Err(e),
    };

    let onboarding = match &invitation {
        Some(inv) => state.invitations.consume(&inv.id, &credential, &display_name).await,
        None => {
            let startup_name = payload.startup_name.as_deref().unwrap_or_default();
            state.tenants
                .register_founder(&credential, &display_name, startup_name)
                .await
                .map(|(_, profile)| profile)
        }
    };
    let profile = match onboarding {
        Ok(profile) => profile,
        Err(e) => {
            state.identity.discard_account(&credential.uid).await;
            return Err(e);
        }
    };

    if invitation.is_some() {
        state.tenants.increment_team_size(&profile.startup_id).await;
    }

    let session = state.identity.start_session(&credential).await?;
    set_cookies(&cookies, &session);

    info!(uid = %credential.uid, startup_id = %profile.startup_id, role = %profile.role, "Signup completed");

    Ok((
        StatusCode::CREATED,
        Json(auth_response(credential.uid, credential.email, session, Some(profile))),
    ))
}

/// The invited address already has an account. That account belongs to a
/// redemption of this invitation when the invitation is consumed by now, or
/// when the account is still being onboarded or already joined its startup.
async fn lost_redemption_race(state: &AppState, inv: &ResolvedInvitation) -> Result<bool, AppError> {
    if state.invitations.resolve(&inv.id).await?.status == InvitationStatus::Consumed {
        return Ok(true);
    }
    let Some(account) = state.identity.find_account(&inv.email).await? else {
        return Ok(false);
    };
    Ok(match state.identity.profile_of(&account.uid).await? {
        None => true,
        Some(profile) => profile.startup_id == inv.startup_id,
    })
}
