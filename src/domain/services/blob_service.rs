use std::sync::Arc;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::json;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::info;

use crate::domain::models::{
    document::Collection,
    tenant::Startup,
    user::Actor,
};
use crate::domain::ports::{BlobMeta, BlobStore};
use crate::domain::services::document_service::DocumentService;
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const MAX_LOGO_BYTES: usize = 5 * 1024 * 1024;

pub fn logo_path(startup_id: &str) -> String {
    format!("startups/{}/logo", startup_id)
}

fn blob_mac(key: &[u8], path: &str, version: &str) -> Result<HmacSha256, AppError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::InternalWithMsg(format!("Invalid blob signing key: {}", e)))?;
    mac.update(path.as_bytes());
    mac.update(b"\n");
    mac.update(version.as_bytes());
    Ok(mac)
}

pub fn sign_blob(key: &[u8], path: &str, version: &str) -> Result<String, AppError> {
    let tag = blob_mac(key, path, version)?.finalize().into_bytes();
    Ok(URL_SAFE_NO_PAD.encode(tag))
}

/// Constant-time check of a `sig` query value. Malformed signatures are simply invalid.
pub fn verify_blob_signature(key: &[u8], path: &str, version: &str, signature: &str) -> Result<bool, AppError> {
    let Ok(tag) = URL_SAFE_NO_PAD.decode(signature) else {
        return Ok(false);
    };
    Ok(blob_mac(key, path, version)?.verify_slice(&tag).is_ok())
}

/// Startup logo storage with stable, signed, session-less URLs.
pub struct BlobService {
    store: Arc<dyn BlobStore>,
    documents: Arc<DocumentService>,
    signing_key: String,
    public_base_url: String,
}

impl BlobService {
    pub fn new(store: Arc<dyn BlobStore>, documents: Arc<DocumentService>, signing_key: String, public_base_url: String) -> Self {
        Self { store, documents, signing_key, public_base_url }
    }

    /// URL-safe HMAC-SHA256 over the path and object version.
    pub fn sign(&self, path: &str, version: &str) -> Result<String, AppError> {
        sign_blob(self.signing_key.as_bytes(), path, version)
    }

    pub fn signed_url(&self, path: &str, version: &str) -> Result<String, AppError> {
        Ok(format!(
            "{}/api/v1/blobs/{}?v={}&sig={}",
            self.public_base_url.trim_end_matches('/'),
            path,
            version,
            self.sign(path, version)?
        ))
    }

    fn check_member(actor: &Actor, startup_id: &str) -> Result<(), AppError> {
        match actor.principal() {
            Some(p) if p.startup_id == startup_id => Ok(()),
            Some(_) => Err(AppError::NotFound(format!("{} not found", logo_path(startup_id)))),
            None => Ok(()),
        }
    }

    /// Stores the logo and points `Startup.logoUrl` at its signed URL.
    pub async fn upload_logo(
        &self,
        actor: &Actor,
        startup_id: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(Startup, BlobMeta), AppError> {
        Self::check_member(actor, startup_id)?;
        if let Some(p) = actor.principal()
            && !p.role.is_leadership()
        {
            return Err(AppError::PermissionDenied("Only Founder or Co-Founder can change the logo".into()));
        }
        if bytes.is_empty() {
            return Err(AppError::InvalidArgument("Logo upload is empty".into()));
        }
        if bytes.len() > MAX_LOGO_BYTES {
            return Err(AppError::InvalidArgument("Logo must be at most 5 MiB".into()));
        }
        if !content_type.starts_with("image/") {
            return Err(AppError::InvalidArgument("Logo must be an image".into()));
        }

        let path = logo_path(startup_id);
        let meta = self.store.put(&path, bytes, content_type).await?;
        let url = self.signed_url(&path, &meta.version)?;

        let startup: Startup = self.documents
            .update(actor, Collection::Startups, startup_id, json!({ "logoUrl": url }), None)
            .await?
            .decode()?;
        info!(startup_id, size = meta.size, "Logo uploaded");
        Ok((startup, meta))
    }

    pub async fn get_logo(&self, actor: &Actor, startup_id: &str) -> Result<(BlobMeta, Vec<u8>), AppError> {
        Self::check_member(actor, startup_id)?;
        let path = logo_path(startup_id);
        self.store
            .get(&path)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} not found", path)))
    }

    pub async fn logo_url(&self, actor: &Actor, startup_id: &str) -> Result<String, AppError> {
        Self::check_member(actor, startup_id)?;
        let path = logo_path(startup_id);
        let meta = self.store
            .head(&path)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} not found", path)))?;
        self.signed_url(&path, &meta.version)
    }

    /// Serves a blob by signed URL. Only the current version is served.
    pub async fn fetch_signed(&self, path: &str, version: &str, signature: &str) -> Result<(BlobMeta, Vec<u8>), AppError> {
        if !verify_blob_signature(self.signing_key.as_bytes(), path, version, signature)? {
            return Err(AppError::PermissionDenied("Invalid signature".into()));
        }
        match self.store.get(path).await? {
            Some((meta, bytes)) if meta.version == version => Ok((meta, bytes)),
            _ => Err(AppError::NotFound(format!("{} not found", path))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_bind_key_path_and_version() {
        let sig = sign_blob(b"k1", "startups/s1/logo", "v1").unwrap();
        assert_eq!(sig.len(), 43);
        assert!(verify_blob_signature(b"k1", "startups/s1/logo", "v1", &sig).unwrap());

        assert!(!verify_blob_signature(b"k2", "startups/s1/logo", "v1", &sig).unwrap());
        assert!(!verify_blob_signature(b"k1", "startups/s2/logo", "v1", &sig).unwrap());
        assert!(!verify_blob_signature(b"k1", "startups/s1/logo", "v2", &sig).unwrap());
        assert!(!verify_blob_signature(b"k1", "startups/s1/logo", "v1", &format!("{}x", sig)).unwrap());
        assert!(!verify_blob_signature(b"k1", "startups/s1/logo", "v1", "not base64!").unwrap());
    }

    #[test]
    fn signature_is_standard_hmac_sha256() {
        let mut mac = HmacSha256::new_from_slice(b"k1").unwrap();
        mac.update(b"startups/s1/logo\nv1");
        let expected = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        assert_eq!(sign_blob(b"k1", "startups/s1/logo", "v1").unwrap(), expected);
    }

    #[test]
    fn logo_paths_are_keyed_by_startup() {
        assert_eq!(logo_path("startup_u1"), "startups/startup_u1/logo");
    }
}
