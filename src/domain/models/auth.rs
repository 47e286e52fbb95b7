use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use crate::domain::models::user::UserProfile;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: usize,
    pub iat: usize,
    pub jti: String,

    #[serde(rename = "https://startupops.io/claims/sid")]
    pub session_id: String,

    #[serde(rename = "https://startupops.io/claims/csrf")]
    pub csrf_token: String,
}

/// Email/password identity. The uid keys the profile document `users/{uid}`.
#[derive(Debug, Clone, FromRow)]
pub struct Credential {
    pub uid: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(email: String, password_hash: String) -> Self {
        Self {
            uid: Uuid::new_v4().simple().to_string(),
            email,
            password_hash,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SessionRecord {
    pub id: Uuid,
    pub uid: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

#[derive(Debug, FromRow)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub uid: String,
    pub family_id: Uuid,
    pub generation_id: i32,
    pub rotated: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Everything a client needs after login or refresh.
pub struct IssuedSession {
    pub session_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub csrf_token: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub uid: String,
    pub email: String,
    pub access_token: String,
    pub csrf_token: String,
    pub profile: Option<UserProfile>,
}
