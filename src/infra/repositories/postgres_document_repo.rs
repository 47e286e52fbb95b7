use crate::domain::{
    models::document::{Collection, CommitOutcome, Document, Precondition, ResolvedWrite, WriteKind},
    ports::DocumentRepository,
};
use crate::error::AppError;
use crate::infra::repositories::document_row::{
    insert_error, into_documents, version_conflict, DocumentRow, DOCUMENT_COLUMNS,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};

pub struct PostgresDocumentRepo {
    pool: PgPool,
}

impl PostgresDocumentRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentRepository for PostgresDocumentRepo {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, AppError> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM documents WHERE collection = $1 AND id = $2",
            DOCUMENT_COLUMNS
        ))
            .bind(collection.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;
        row.map(Document::try_from).transpose()
    }

    async fn list(&self, collection: Collection, partition: Option<&str>) -> Result<Vec<Document>, AppError> {
        let rows = match partition {
            Some(key) => sqlx::query_as::<_, DocumentRow>(&format!(
                "SELECT {} FROM documents WHERE collection = $1 AND partition_key = $2 ORDER BY id",
                DOCUMENT_COLUMNS
            ))
                .bind(collection.as_str())
                .bind(key)
                .fetch_all(&self.pool)
                .await,
            None => sqlx::query_as::<_, DocumentRow>(&format!(
                "SELECT {} FROM documents WHERE collection = $1 ORDER BY id",
                DOCUMENT_COLUMNS
            ))
                .bind(collection.as_str())
                .fetch_all(&self.pool)
                .await,
        }
        .map_err(AppError::Database)?;
        into_documents(rows)
    }

    async fn commit(&self, writes: &[ResolvedWrite], committed_at: DateTime<Utc>) -> Result<CommitOutcome, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let seq: i64 = sqlx::query_scalar("INSERT INTO commits (committed_at) VALUES ($1) RETURNING seq")
            .bind(committed_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        // Only the head matters; the sequence itself never reuses values.
        sqlx::query("DELETE FROM commits WHERE seq < $1")
            .bind(seq)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        let mut documents = Vec::with_capacity(writes.len());
        for write in writes {
            let collection = write.collection.as_str();
            let row = match (&write.kind, write.precondition) {
                (WriteKind::Put(data), Precondition::MustNotExist) => Some(
                    sqlx::query_as::<_, DocumentRow>(&format!(
                        "INSERT INTO documents (collection, id, partition_key, data, version, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, 1, $5, $6) RETURNING {}",
                        DOCUMENT_COLUMNS
                    ))
                        .bind(collection)
                        .bind(&write.id)
                        .bind(&write.partition)
                        .bind(Json(data))
                        .bind(committed_at)
                        .bind(committed_at)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(|e| insert_error(e, write))?,
                ),
                (WriteKind::Put(data), Precondition::Version(expected)) => Some(
                    sqlx::query_as::<_, DocumentRow>(&format!(
                        "UPDATE documents SET data = $1, partition_key = $2, version = version + 1, updated_at = $3
                         WHERE collection = $4 AND id = $5 AND version = $6 RETURNING {}",
                        DOCUMENT_COLUMNS
                    ))
                        .bind(Json(data))
                        .bind(&write.partition)
                        .bind(committed_at)
                        .bind(collection)
                        .bind(&write.id)
                        .bind(expected)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(AppError::Database)?
                        .ok_or_else(|| version_conflict(write))?,
                ),
                (WriteKind::Put(data), Precondition::None) => Some(
                    sqlx::query_as::<_, DocumentRow>(&format!(
                        "INSERT INTO documents (collection, id, partition_key, data, version, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, 1, $5, $6)
                         ON CONFLICT (collection, id) DO UPDATE SET
                            data = excluded.data,
                            partition_key = excluded.partition_key,
                            version = documents.version + 1,
                            updated_at = excluded.updated_at
                         RETURNING {}",
                        DOCUMENT_COLUMNS
                    ))
                        .bind(collection)
                        .bind(&write.id)
                        .bind(&write.partition)
                        .bind(Json(data))
                        .bind(committed_at)
                        .bind(committed_at)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(AppError::Database)?,
                ),
                (WriteKind::Delete, Precondition::Version(expected)) => {
                    let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2 AND version = $3")
                        .bind(collection)
                        .bind(&write.id)
                        .bind(expected)
                        .execute(&mut *tx)
                        .await
                        .map_err(AppError::Database)?;
                    if result.rows_affected() == 0 {
                        return Err(version_conflict(write));
                    }
                    None
                }
                (WriteKind::Delete, _) => {
                    let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                        .bind(collection)
                        .bind(&write.id)
                        .execute(&mut *tx)
                        .await
                        .map_err(AppError::Database)?;
                    if result.rows_affected() == 0 {
                        return Err(AppError::NotFound(format!("{}/{} not found", write.collection, write.id)));
                    }
                    None
                }
            };
            documents.push(row.map(Document::try_from).transpose()?);
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(CommitOutcome { seq, documents })
    }

    async fn head_seq(&self) -> Result<i64, AppError> {
        sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) FROM commits")
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)
    }
}
