//! Blob storage on the local filesystem.
//!
//! Each object lives at `<root>/<path>` with its metadata next to it in
//! `<root>/<path>.meta.json`. Writes go through a temp file and a rename so
//! readers never observe a partially written object.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::ports::{BlobMeta, BlobStore};
use crate::error::AppError;

const META_SUFFIX: &str = ".meta.json";

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub async fn new<P: AsRef<Path>>(root: P) -> Result<Self, AppError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await.map_err(io_error)?;
        info!(path = %root.display(), "Initialized blob store");
        Ok(Self { root })
    }

    /// Short content digest used as the object version.
    pub fn compute_version(bytes: &[u8]) -> String {
        let digest = hex::encode(Sha256::digest(bytes));
        digest[..16].to_string()
    }

    fn object_path(&self, path: &str) -> Result<PathBuf, AppError> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }

    fn meta_path(object: &Path) -> PathBuf {
        let mut name = object.as_os_str().to_owned();
        name.push(META_SUFFIX);
        PathBuf::from(name)
    }

    async fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), AppError> {
        let tmp = target.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
        fs::write(&tmp, bytes).await.map_err(io_error)?;
        if let Err(e) = fs::rename(&tmp, target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_error(e));
        }
        Ok(())
    }

    async fn read_meta(object: &Path) -> Result<Option<BlobMeta>, AppError> {
        match fs::read(Self::meta_path(object)).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| AppError::InternalWithMsg(format!("Corrupt blob metadata: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }
}

/// Relative, slash-separated, no `..` or empty segments.
fn validate_path(path: &str) -> Result<(), AppError> {
    let invalid = || AppError::InvalidArgument(format!("Invalid blob path '{}'", path));
    if path.is_empty() || path.ends_with(META_SUFFIX) || path.contains('\\') {
        return Err(invalid());
    }
    for segment in path.split('/') {
        let ok = !segment.is_empty()
            && segment.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !ok {
            return Err(invalid());
        }
    }
    if Path::new(path).components().any(|c| !matches!(c, Component::Normal(_))) {
        return Err(invalid());
    }
    Ok(())
}

fn io_error(e: std::io::Error) -> AppError {
    AppError::Unavailable(format!("Blob storage error: {}", e))
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<BlobMeta, AppError> {
        let object = self.object_path(path)?;
        if let Some(parent) = object.parent() {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let meta = BlobMeta {
            path: path.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
            version: Self::compute_version(bytes),
            updated_at: Utc::now(),
        };
        let raw_meta = serde_json::to_vec(&meta).map_err(|e| AppError::InternalWithMsg(e.to_string()))?;

        Self::write_atomic(&object, bytes).await?;
        Self::write_atomic(&Self::meta_path(&object), &raw_meta).await?;
        debug!(path, size = meta.size, version = %meta.version, "Stored blob");
        Ok(meta)
    }

    async fn get(&self, path: &str) -> Result<Option<(BlobMeta, Vec<u8>)>, AppError> {
        let object = self.object_path(path)?;
        let Some(meta) = Self::read_meta(&object).await? else {
            return Ok(None);
        };
        match fs::read(&object).await {
            Ok(bytes) => Ok(Some((meta, bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }

    async fn head(&self, path: &str) -> Result<Option<BlobMeta>, AppError> {
        let object = self.object_path(path)?;
        Self::read_meta(&object).await
    }

    async fn delete(&self, path: &str) -> Result<(), AppError> {
        let object = self.object_path(path)?;
        for target in [Self::meta_path(&object), object] {
            match fs::remove_file(&target).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(e)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> FsBlobStore {
        let dir = std::env::temp_dir().join(format!("startupops-blobs-{}", Uuid::new_v4()));
        FsBlobStore::new(dir).await.unwrap()
    }

    #[test]
    fn rejects_escaping_paths() {
        assert!(validate_path("startups/s1/logo").is_ok());
        assert!(validate_path("../etc/passwd").is_err());
        assert!(validate_path("/abs").is_err());
        assert!(validate_path("a//b").is_err());
        assert!(validate_path("a/./b").is_err());
        assert!(validate_path("a/logo.meta.json").is_err());
        assert!(validate_path("").is_err());
    }

    #[tokio::test]
    async fn overwrite_changes_version() {
        let store = store().await;
        let first = store.put("startups/s1/logo", b"one", "image/png").await.unwrap();
        let second = store.put("startups/s1/logo", b"two", "image/png").await.unwrap();
        assert_ne!(first.version, second.version);

        let (meta, bytes) = store.get("startups/s1/logo").await.unwrap().unwrap();
        assert_eq!(meta.version, second.version);
        assert_eq!(bytes, b"two");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = store().await;
        store.put("startups/s1/logo", b"x", "image/png").await.unwrap();
        store.delete("startups/s1/logo").await.unwrap();
        store.delete("startups/s1/logo").await.unwrap();
        assert!(store.head("startups/s1/logo").await.unwrap().is_none());
        assert!(store.get("startups/s1/logo").await.unwrap().is_none());
    }
}
