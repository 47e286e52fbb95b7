use crate::domain::{models::auth::Credential, ports::CredentialRepository};
use crate::error::{is_unique_violation, AppError};
use async_trait::async_trait;
use sqlx::SqlitePool;

pub struct SqliteCredentialRepo {
    pool: SqlitePool,
}

impl SqliteCredentialRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialRepository for SqliteCredentialRepo {
    async fn create(&self, credential: &Credential) -> Result<Credential, AppError> {
        sqlx::query_as::<_, Credential>(
            "INSERT INTO credentials (uid, email, password_hash, created_at) VALUES (?, ?, ?, ?) RETURNING uid, email, password_hash, created_at",
        )
            .bind(&credential.uid)
            .bind(&credential.email)
            .bind(&credential.password_hash)
            .bind(credential.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::AlreadyExists("Email already in use".into())
                } else {
                    AppError::Database(e)
                }
            })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, AppError> {
        sqlx::query_as::<_, Credential>(
            "SELECT uid, email, password_hash, created_at FROM credentials WHERE email = ?",
        )
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn find_by_uid(&self, uid: &str) -> Result<Option<Credential>, AppError> {
        sqlx::query_as::<_, Credential>(
            "SELECT uid, email, password_hash, created_at FROM credentials WHERE uid = ?",
        )
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn delete(&self, uid: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM credentials WHERE uid = ?")
            .bind(uid)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}
