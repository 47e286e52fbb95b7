use crate::domain::{models::auth::Credential, ports::CredentialRepository};
use crate::error::{is_unique_violation, AppError};
use async_trait::async_trait;
use sqlx::PgPool;

pub struct PostgresCredentialRepo {
    pool: PgPool,
}

impl PostgresCredentialRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialRepository for PostgresCredentialRepo {
    async fn create(&self, credential: &Credential) -> Result<Credential, AppError> {
        sqlx::query_as::<_, Credential>(
            "INSERT INTO credentials (uid, email, password_hash, created_at) VALUES ($1, $2, $3, $4) RETURNING uid, email, password_hash, created_at",
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
            "SELECT uid, email, password_hash, created_at FROM credentials WHERE email = $1",
        )
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn find_by_uid(&self, uid: &str) -> Result<Option<Credential>, AppError> {
        sqlx::query_as::<_, Credential>(
            "SELECT uid, email, password_hash, created_at FROM credentials WHERE uid = $1",
        )
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn delete(&self, uid: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM credentials WHERE uid = $1")
            .bind(uid)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}
