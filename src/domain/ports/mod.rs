use crate::domain::models::{
    auth::{Credential, RefreshTokenRecord, SessionRecord},
    document::{Collection, CommitOutcome, Document, ResolvedWrite},
};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, AppError>;
    /// All documents of a collection, narrowed to one partition key when given.
    async fn list(&self, collection: Collection, partition: Option<&str>) -> Result<Vec<Document>, AppError>;
    /// Applies every write in one transaction and appends one entry to the commit log.
    async fn commit(&self, writes: &[ResolvedWrite], committed_at: DateTime<Utc>) -> Result<CommitOutcome, AppError>;
    async fn head_seq(&self) -> Result<i64, AppError>;
}

#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn create(&self, credential: &Credential) -> Result<Credential, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, AppError>;
    async fn find_by_uid(&self, uid: &str) -> Result<Option<Credential>, AppError>;
    async fn delete(&self, uid: &str) -> Result<(), AppError>;
}

#[async_trait]
pub trait AuthRepository: Send + Sync {
    async fn create_session(&self, session: &SessionRecord) -> Result<(), AppError>;
    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>, AppError>;
    async fn revoke_session(&self, id: Uuid) -> Result<(), AppError>;

    async fn create_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), AppError>;
    async fn find_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, AppError>;
    /// Marks the token used; false when it had already been rotated.
    async fn mark_refresh_token_rotated(&self, token_hash: &str) -> Result<bool, AppError>;
    async fn delete_refresh_family(&self, family_id: Uuid) -> Result<(), AppError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMeta {
    pub path: String,
    pub content_type: String,
    pub size: u64,
    /// Content digest; changes whenever the object is overwritten.
    pub version: String,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<BlobMeta, AppError>;
    async fn get(&self, path: &str) -> Result<Option<(BlobMeta, Vec<u8>)>, AppError>;
    async fn head(&self, path: &str) -> Result<Option<BlobMeta>, AppError>;
    async fn delete(&self, path: &str) -> Result<(), AppError>;
}
