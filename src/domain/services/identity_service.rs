use std::sync::Arc;
use argon2::{password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString}, Argon2};
use rand::rngs::OsRng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{
    auth::{Credential, IssuedSession},
    document::Collection,
    user::{Actor, UserProfile},
};
use crate::domain::ports::CredentialRepository;
use crate::domain::services::{auth_service::AuthService, document_service::DocumentService};
use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Email/password accounts and their sessions.
pub struct IdentityService {
    credentials: Arc<dyn CredentialRepository>,
    auth: Arc<AuthService>,
    documents: Arc<DocumentService>,
}

impl IdentityService {
    pub fn new(credentials: Arc<dyn CredentialRepository>, auth: Arc<AuthService>, documents: Arc<DocumentService>) -> Self {
        Self { credentials, auth, documents }
    }

    pub async fn signup(&self, email: &str, password: &str) -> Result<Credential, AppError> {
        let email = normalize_email(email);
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(AppError::InvalidArgument("Please enter a valid email address".into()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::InvalidArgument(format!(
                "Password should be at least {} characters", MIN_PASSWORD_LEN
            )));
        }
        if self.credentials.find_by_email(&email).await?.is_some() {
            return Err(AppError::AlreadyExists("Email already in use".into()));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::InternalWithMsg(format!("Password hashing failed: {}", e)))?
            .to_string();

        let credential = self.credentials.create(&Credential::new(email, password_hash)).await?;
        info!(uid = %credential.uid, "Account created");
        Ok(credential)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(Credential, IssuedSession), AppError> {
        let credential = self.credentials.find_by_email(&normalize_email(email)).await?
            .ok_or(AppError::InvalidCredentials)?;
        self.verify_password(&credential, password)?;

        let session = self.auth.start_session(&credential.uid).await?;
        info!(uid = %credential.uid, "User logged in");
        Ok((credential, session))
    }

    /// Starts a session for an account that was just created.
    pub async fn start_session(&self, credential: &Credential) -> Result<IssuedSession, AppError> {
        self.auth.start_session(&credential.uid).await
    }

    fn verify_password(&self, credential: &Credential, password: &str) -> Result<(), AppError> {
        let parsed_hash = PasswordHash::new(&credential.password_hash)
            .map_err(|_| AppError::Internal)?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AppError::InvalidCredentials)
    }

    /// Revokes the session and closes every live subscription opened under it.
    pub async fn logout(&self, session_id: Uuid) -> Result<(), AppError> {
        self.auth.logout(session_id).await?;
        self.documents.end_session(session_id);
        info!(%session_id, "Session ended");
        Ok(())
    }

    pub async fn current_user(&self, uid: &str) -> Result<(Credential, Option<UserProfile>), AppError> {
        let credential = self.credentials.find_by_uid(uid).await?
            .ok_or(AppError::Unauthenticated)?;
        let profile = self.profile_of(uid).await?;
        Ok((credential, profile))
    }

    pub async fn find_account(&self, email: &str) -> Result<Option<Credential>, AppError> {
        self.credentials.find_by_email(&normalize_email(email)).await
    }

    pub async fn profile_of(&self, uid: &str) -> Result<Option<UserProfile>, AppError> {
        self.documents
            .find(&Actor::System, Collection::Users, uid)
            .await?
            .map(|doc| doc.decode())
            .transpose()
    }

    /// Removes an account whose profile could not be created.
    pub async fn discard_account(&self, uid: &str) {
        if let Err(e) = self.credentials.delete(uid).await {
            warn!(uid, "Failed to discard account after aborted signup: {}", e);
        }
    }
}
