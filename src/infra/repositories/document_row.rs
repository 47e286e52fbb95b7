use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{types::Json, FromRow};

use crate::domain::models::document::{Collection, Document, ResolvedWrite};
use crate::error::{is_unique_violation, AppError};

pub(crate) const DOCUMENT_COLUMNS: &str = "collection, id, data, version, created_at, updated_at";

#[derive(Debug, FromRow)]
pub(crate) struct DocumentRow {
    pub collection: String,
    pub id: String,
    pub data: Json<Value>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = AppError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Document {
            collection: row.collection.parse::<Collection>()?,
            id: row.id,
            data: row.data.0,
            version: row.version,
            create_time: row.created_at,
            update_time: row.updated_at,
        })
    }
}

pub(crate) fn into_documents(rows: Vec<DocumentRow>) -> Result<Vec<Document>, AppError> {
    rows.into_iter().map(Document::try_from).collect()
}

pub(crate) fn insert_error(e: sqlx::Error, write: &ResolvedWrite) -> AppError {
    if is_unique_violation(&e) {
        AppError::AlreadyExists(format!("{}/{} already exists", write.collection, write.id))
    } else {
        AppError::Database(e)
    }
}

pub(crate) fn version_conflict(write: &ResolvedWrite) -> AppError {
    AppError::Conflict(format!("{}/{} was modified concurrently", write.collection, write.id))
}
