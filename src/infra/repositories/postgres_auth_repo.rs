use crate::domain::{
    models::auth::{RefreshTokenRecord, SessionRecord},
    ports::AuthRepository,
};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

pub struct PostgresAuthRepo { pool: PgPool }
impl PostgresAuthRepo { pub fn new(pool: PgPool) -> Self { Self { pool } } }

#[async_trait]
impl AuthRepository for PostgresAuthRepo {
    async fn create_session(&self, session: &SessionRecord) -> Result<(), AppError> {
        sqlx::query("INSERT INTO sessions (id, uid, created_at, expires_at, revoked_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(session.id)
            .bind(&session.uid)
            .bind(session.created_at)
            .bind(session.expires_at)
            .bind(session.revoked_at)
            .execute(&self.pool).await.map_err(AppError::Database)?;
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>, AppError> {
        sqlx::query_as::<_, SessionRecord>(
            "SELECT id, uid, created_at, expires_at, revoked_at FROM sessions WHERE id = $1"
        )
            .bind(id)
            .fetch_optional(&self.pool).await.map_err(AppError::Database)
    }

    async fn revoke_session(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE sessions SET revoked_at = $1 WHERE id = $2 AND revoked_at IS NULL")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool).await.map_err(AppError::Database)?;
        Ok(())
    }

    async fn create_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (token_hash, uid, family_id, generation_id, rotated, expires_at, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        )
            .bind(&record.token_hash)
            .bind(&record.uid)
            .bind(record.family_id)
            .bind(record.generation_id)
            .bind(record.rotated)
            .bind(record.expires_at)
            .bind(record.created_at)
            .execute(&self.pool).await.map_err(AppError::Database)?;
        Ok(())
    }

    async fn find_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT token_hash, uid, family_id, generation_id, rotated, expires_at, created_at
             FROM refresh_tokens WHERE token_hash = $1"
        )
            .bind(token_hash)
            .fetch_optional(&self.pool).await.map_err(AppError::Database)
    }

    async fn mark_refresh_token_rotated(&self, token_hash: &str) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE refresh_tokens SET rotated = TRUE WHERE token_hash = $1 AND rotated = FALSE")
            .bind(token_hash)
            .execute(&self.pool).await.map_err(AppError::Database)?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_refresh_family(&self, family_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE family_id = $1")
            .bind(family_id)
            .execute(&self.pool).await.map_err(AppError::Database)?;
        Ok(())
    }
}
