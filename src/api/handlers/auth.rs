use axum::{extract::State, response::IntoResponse, Json, http::StatusCode};
use crate::api::dtos::requests::CredentialsRequest;
use crate::api::extractors::auth::{AuthSession, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::state::AppState;
use crate::error::AppError;
use crate::domain::models::{
    auth::{AuthResponse, IssuedSession},
    user::UserProfile,
};
use serde_json::json;
use std::sync::Arc;
use tower_cookies::{Cookies, Cookie};
use tower_cookies::cookie::SameSite;
use time::Duration;
use tracing::info;

/// Creates an account without a workspace profile.
pub async fn signup(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Json(payload): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let credential = state.identity.signup(&payload.email, &payload.password).await?;
    let session = state.identity.start_session(&credential).await?;
    set_cookies(&cookies, &session);

    Ok((StatusCode::CREATED, Json(auth_response(credential.uid, credential.email, session, None))))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Json(payload): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (credential, session) = state.identity.login(&payload.email, &payload.password).await?;
    let profile = state.identity.profile_of(&credential.uid).await?;

    set_cookies(&cookies, &session);

    Ok(Json(auth_response(credential.uid, credential.email, session, profile)))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
) -> Result<impl IntoResponse, AppError> {
    let refresh_cookie = cookies.get(REFRESH_COOKIE).ok_or(AppError::Unauthenticated)?;
    let raw_token = refresh_cookie.value().to_string();

    let (uid, session) = match state.auth_service.refresh(&raw_token).await {
        Ok(rotated) => rotated,
        Err(e) => {
            clear_cookies(&cookies);
            return Err(e);
        }
    };
    let (credential, profile) = state.identity.current_user(&uid).await?;

    set_cookies(&cookies, &session);

    info!("Token refreshed for user: {}", uid);

    Ok(Json(auth_response(credential.uid, credential.email, session, profile)))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
) -> Result<impl IntoResponse, AppError> {
    if let Some(cookie) = cookies.get(REFRESH_COOKIE)
        && let Ok(Some(session_id)) = state.auth_service.session_of_refresh_token(cookie.value()).await
    {
        state.identity.logout(session_id).await?;
    }

    clear_cookies(&cookies);

    info!("User logged out");

    Ok(StatusCode::OK)
}

/// Ends the calling session; works with bearer tokens too.
pub async fn logout_session(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    session: AuthSession,
) -> Result<impl IntoResponse, AppError> {
    state.identity.logout(session.session_id).await?;
    clear_cookies(&cookies);
    Ok(StatusCode::OK)
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
) -> Result<impl IntoResponse, AppError> {
    let (credential, profile) = state.identity.current_user(session.uid()).await?;
    Ok(Json(json!({
        "uid": credential.uid,
        "email": credential.email,
        "profile": profile,
    })))
}

pub(crate) fn auth_response(uid: String, email: String, session: IssuedSession, profile: Option<UserProfile>) -> AuthResponse {
    AuthResponse {
        uid,
        email,
        access_token: session.access_token,
        csrf_token: session.csrf_token,
        profile,
    }
}

pub(crate) fn set_cookies(cookies: &Cookies, session: &IssuedSession) {
    let mut access_c = Cookie::new(ACCESS_COOKIE, session.access_token.clone());
    access_c.set_http_only(true);
    access_c.set_secure(true);
    access_c.set_same_site(SameSite::Strict);
    access_c.set_path("/");
    access_c.set_max_age(Duration::minutes(15));
    cookies.add(access_c);

    let mut refresh_c = Cookie::new(REFRESH_COOKIE, session.refresh_token.clone());
    refresh_c.set_http_only(true);
    refresh_c.set_secure(true);
    refresh_c.set_same_site(SameSite::Strict);
    refresh_c.set_path("/");
    refresh_c.set_max_age(Duration::days(7));
    cookies.add(refresh_c);
}

fn clear_cookies(cookies: &Cookies) {
    cookies.remove(Cookie::build((ACCESS_COOKIE, "")).path("/").into());
    cookies.remove(Cookie::build((REFRESH_COOKIE, "")).path("/").into());
}
