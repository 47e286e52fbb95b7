use std::sync::Arc;
use crate::domain::{
    models::auth::{Claims, IssuedSession, RefreshTokenRecord, SessionRecord},
    ports::AuthRepository
};
use crate::error::AppError;
use crate::config::Config;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;
use chrono::{Utc, Duration};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Sha256, Digest};
use tracing::warn;

pub const TOKEN_AUDIENCE: &str = "startupops-web";
const ACCESS_TOKEN_MINUTES: i64 = 15;
const SESSION_DAYS: i64 = 7;

/// Issues and validates session tokens. A session is a refresh-token family;
/// access tokens carry its id so logout takes effect immediately.
pub struct AuthService {
    repo: Arc<dyn AuthRepository>,
    config: Config,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(repo: Arc<dyn AuthRepository>, config: Config) -> Self {
        let encoding_key = EncodingKey::from_ed_pem(config.jwt_secret_key.as_bytes())
            .expect("Invalid JWT Private Key PEM");
        let decoding_key = DecodingKey::from_ed_pem(config.jwt_public_key.as_bytes())
            .expect("Invalid JWT Public Key PEM");

        Self { repo, config, encoding_key, decoding_key }
    }

    pub async fn start_session(&self, uid: &str) -> Result<IssuedSession, AppError> {
        let now = Utc::now();
        let session = SessionRecord {
            id: Uuid::new_v4(),
            uid: uid.to_string(),
            created_at: now,
            expires_at: now + Duration::days(SESSION_DAYS),
            revoked_at: None,
        };
        self.repo.create_session(&session).await?;
        self.issue_token_pair(uid, session.id, 1).await
    }

    /// Rotates a refresh token. Presenting an already-rotated token revokes the whole session.
    pub async fn refresh(&self, raw_refresh_token: &str) -> Result<(String, IssuedSession), AppError> {
        let token_hash = self.hash_token(raw_refresh_token);

        let record = self.repo.find_refresh_token(&token_hash).await?
            .ok_or(AppError::Unauthenticated)?;

        if record.rotated {
            warn!(session_id = %record.family_id, "Refresh token reuse detected, revoking session");
            self.logout(record.family_id).await?;
            return Err(AppError::Unauthenticated);
        }

        let now = Utc::now();
        if record.expires_at < now {
            return Err(AppError::Unauthenticated);
        }

        let session = self.repo.find_session(record.family_id).await?
            .ok_or(AppError::Unauthenticated)?;
        if !session.is_live(now) {
            return Err(AppError::Unauthenticated);
        }

        if !self.repo.mark_refresh_token_rotated(&token_hash).await? {
            warn!(session_id = %record.family_id, "Concurrent refresh token reuse, revoking session");
            self.logout(record.family_id).await?;
            return Err(AppError::Unauthenticated);
        }

        let issued = self.issue_token_pair(&record.uid, record.family_id, record.generation_id + 1).await?;
        Ok((record.uid, issued))
    }

    pub async fn logout(&self, session_id: Uuid) -> Result<(), AppError> {
        self.repo.revoke_session(session_id).await?;
        self.repo.delete_refresh_family(session_id).await
    }

    /// Session id of a refresh token, if the token is known.
    pub async fn session_of_refresh_token(&self, raw_refresh_token: &str) -> Result<Option<Uuid>, AppError> {
        let record = self.repo.find_refresh_token(&self.hash_token(raw_refresh_token)).await?;
        Ok(record.map(|r| r.family_id))
    }

    pub fn decode_access_token(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_audience(&[TOKEN_AUDIENCE]);
        validation.set_issuer(&[self.config.auth_issuer.as_str()]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::Unauthenticated)
    }

    /// Verifies the token and that its session has not been logged out.
    pub async fn authenticate(&self, token: &str) -> Result<(Claims, Uuid), AppError> {
        let claims = self.decode_access_token(token)?;
        let session_id = Uuid::parse_str(&claims.session_id).map_err(|_| AppError::Unauthenticated)?;

        let session = self.repo.find_session(session_id).await?
            .ok_or(AppError::Unauthenticated)?;
        if session.uid != claims.sub || !session.is_live(Utc::now()) {
            return Err(AppError::Unauthenticated);
        }
        Ok((claims, session_id))
    }

    async fn issue_token_pair(&self, uid: &str, session_id: Uuid, generation_id: i32) -> Result<IssuedSession, AppError> {
        let csrf_token = random_token(32);
        let now = Utc::now();
        let exp = (now + Duration::minutes(ACCESS_TOKEN_MINUTES)).timestamp() as usize;

        let claims = Claims {
            iss: self.config.auth_issuer.clone(),
            sub: uid.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            exp,
            iat: now.timestamp() as usize,
            jti: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            csrf_token: csrf_token.clone(),
        };

        let access_token = encode(&Header::new(Algorithm::EdDSA), &claims, &self.encoding_key)
            .map_err(|e| {
                tracing::error!("JWT encoding failed: {}", e);
                AppError::Internal
            })?;

        let refresh_token = random_token(64);
        let refresh_record = RefreshTokenRecord {
            token_hash: self.hash_token(&refresh_token),
            uid: uid.to_string(),
            family_id: session_id,
            generation_id,
            rotated: false,
            expires_at: now + Duration::days(SESSION_DAYS),
            created_at: now,
        };

        self.repo.create_refresh_token(&refresh_record).await?;
        Ok(IssuedSession { session_id, access_token, refresh_token, csrf_token })
    }

    pub fn hash_token(&self, token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}
