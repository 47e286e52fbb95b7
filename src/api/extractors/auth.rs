use axum::{
    extract::{FromRequestParts, FromRef},
    http::{header, request::Parts, Method},
};
use crate::state::AppState;
use crate::domain::models::{auth::Claims, user::{Actor, Principal}};
use crate::error::AppError;
use std::sync::Arc;
use tower_cookies::Cookies;
use tracing::Span;
use uuid::Uuid;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// A live session, whether or not the account has a workspace profile yet.
pub struct AuthSession {
    pub claims: Claims,
    pub session_id: Uuid,
}

impl AuthSession {
    pub fn uid(&self) -> &str {
        &self.claims.sub
    }
}

enum TokenSource {
    Cookie(String),
    Bearer(String),
}

fn token_from(parts: &Parts) -> Option<TokenSource> {
    if let Some(value) = parts.headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok())
        && let Some(token) = value.strip_prefix("Bearer ")
    {
        return Some(TokenSource::Bearer(token.trim().to_string()));
    }
    let cookies = parts.extensions.get::<Cookies>()?;
    cookies.get(ACCESS_COOKIE).map(|c| TokenSource::Cookie(c.value().to_string()))
}

fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

impl<S> FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = <Arc<AppState> as FromRef<S>>::from_ref(state);

        let (token, from_cookie) = match token_from(parts).ok_or(AppError::Unauthenticated)? {
            TokenSource::Cookie(t) => (t, true),
            TokenSource::Bearer(t) => (t, false),
        };

        let (claims, session_id) = app_state.auth_service.authenticate(&token).await?;

        // Cookies ride along on cross-site requests; bearer tokens do not.
        if from_cookie && !is_safe_method(&parts.method) {
            let csrf_header_val = parts.headers.get(CSRF_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| AppError::PermissionDenied("Missing CSRF token".into()))?;

            if csrf_header_val != claims.csrf_token {
                return Err(AppError::PermissionDenied("Invalid CSRF token".into()));
            }
        }

        Span::current().record("user_id", claims.sub.as_str());

        Ok(AuthSession { claims, session_id })
    }
}

/// A signed-in member of a startup. Role and startup come from the stored
/// profile on every request.
pub struct AuthUser {
    pub actor: Actor,
    pub session_id: Uuid,
}

impl AuthUser {
    pub fn principal(&self) -> Option<&Principal> {
        self.actor.principal()
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = AuthSession::from_request_parts(parts, state).await?;
        let app_state = <Arc<AppState> as FromRef<S>>::from_ref(state);

        let profile = app_state.identity.profile_of(session.uid()).await?
            .ok_or_else(|| AppError::PermissionDenied("This account is not a member of any startup".into()))?;

        Span::current().record("startup_id", profile.startup_id.as_str());

        Ok(AuthUser {
            actor: Actor::User(Principal::from(&profile)),
            session_id: session.session_id,
        })
    }
}
