use crate::errors::{AppError, AppResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DOCUMENTS_BUCKET: &str = "documents";
pub const FORM_UPLOADS_BUCKET: &str = "form_uploads";

static UNSAFE_NAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"));

/// Binary object storage split into named buckets.
pub trait ObjectStore: Send + Sync {
    fn put(&self, bucket: &str, path: &str, bytes: &[u8], upsert: bool) -> AppResult<()>;
    fn get(&self, bucket: &str, path: &str) -> AppResult<Vec<u8>>;
    fn exists(&self, bucket: &str, path: &str) -> AppResult<bool>;
}

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> AppResult<Self> {
        let root = root.into();
        for bucket in [DOCUMENTS_BUCKET, FORM_UPLOADS_BUCKET] {
            fs::create_dir_all(root.join(bucket))?;
        }
        Ok(Self { root })
    }

    fn resolve(&self, bucket: &str, path: &str) -> AppResult<PathBuf> {
        if !matches!(bucket, DOCUMENTS_BUCKET | FORM_UPLOADS_BUCKET) {
            return Err(AppError::NotFound(format!("bucket {} does not exist", bucket)));
        }
        validate_object_path(path)?;
        Ok(self.root.join(bucket).join(path))
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(&self, bucket: &str, path: &str, bytes: &[u8], upsert: bool) -> AppResult<()> {
        let target = self.resolve(bucket, path)?;
        if !upsert && target.exists() {
            return Err(AppError::Storage(format!("object {}/{} already exists", bucket, path)));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|error| AppError::Storage(error.to_string()))?;
        }
        fs::write(&target, bytes).map_err(|error| AppError::Storage(error.to_string()))
    }

    fn get(&self, bucket: &str, path: &str) -> AppResult<Vec<u8>> {
        let target = self.resolve(bucket, path)?;
        if !target.is_file() {
            return Err(AppError::NotFound(format!("object {}/{} not found", bucket, path)));
        }
        fs::read(&target).map_err(|error| AppError::Storage(error.to_string()))
    }

    fn exists(&self, bucket: &str, path: &str) -> AppResult<bool> {
        Ok(self.resolve(bucket, path)?.is_file())
    }
}

pub fn is_public_bucket(bucket: &str) -> bool {
    bucket == DOCUMENTS_BUCKET
}

pub fn public_url(base_url: &str, bucket: &str, path: &str) -> String {
    format!("{}/storage/public/{}/{}", base_url.trim_end_matches('/'), bucket, path)
}

/// Replaces anything outside `[A-Za-z0-9._-]` so object keys stay URL-safe.
pub fn sanitize_object_name(name: &str) -> String {
    let file_name = Path::new(name)
        .file_name()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_default();
    let cleaned = UNSAFE_NAME_CHARS.replace_all(file_name.trim(), "_").to_string();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

pub fn validate_object_path(path: &str) -> AppResult<()> {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return Err(AppError::Validation(format!("invalid object path: {}", path)));
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(AppError::Validation(format!("invalid object path: {}", path)));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignedObject {
    pub bucket: String,
    pub path: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues time-limited tokens for objects in private buckets.
#[derive(Clone)]
pub struct UrlSigner {
    key: [u8; 32],
    ttl: Duration,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(key: [u8; 32], ttl: Duration) -> Self {
        Self { key, ttl }
    }

    pub fn from_base64(encoded: Option<&str>, ttl: Duration) -> AppResult<Self> {
        let Some(encoded) = encoded.filter(|value| !value.trim().is_empty()) else {
            tracing::warn!("no url signing key configured; signed urls will not survive a restart");
            return Ok(Self::new(rand::random(), ttl));
        };
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|error| AppError::Validation(format!("url signing key is not base64: {}", error)))?;
        let key: [u8; 32] = decoded
            .try_into()
            .map_err(|_| AppError::Validation("url signing key must be 32 bytes".to_string()))?;
        Ok(Self::new(key, ttl))
    }

    pub fn sign(&self, bucket: &str, path: &str) -> AppResult<String> {
        let expires_at = Utc::now()
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::Validation("signed url ttl is out of range".to_string()))?;
        self.sign_until(bucket, path, expires_at)
    }

    pub fn sign_until(&self, bucket: &str, path: &str, expires_at: DateTime<Utc>) -> AppResult<String> {
        let claim = SignedObject {
            bucket: bucket.to_string(),
            path: path.to_string(),
            expires_at,
        };
        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|error| AppError::Internal(error.to_string()))?;
        let nonce_bytes: [u8; 12] = rand::random();
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), serde_json::to_vec(&claim)?.as_slice())
            .map_err(|error| AppError::Internal(error.to_string()))?;

        let mut token = nonce_bytes.to_vec();
        token.extend_from_slice(&sealed);
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(token))
    }

    pub fn verify(&self, token: &str) -> AppResult<SignedObject> {
        let invalid = || AppError::Policy("signed url is invalid".to_string());
        let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| invalid())?;
        if raw.len() <= 12 {
            return Err(invalid());
        }
        let (nonce_bytes, sealed) = raw.split_at(12);
        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|error| AppError::Internal(error.to_string()))?;
        let opened = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| invalid())?;
        let claim: SignedObject = serde_json::from_slice(&opened).map_err(|_| invalid())?;
        if claim.expires_at <= Utc::now() {
            return Err(AppError::Policy("signed url has expired".to_string()));
        }
        Ok(claim)
    }

    pub fn signed_url(&self, base_url: &str, bucket: &str, path: &str) -> AppResult<String> {
        Ok(format!(
            "{}/storage/signed/{}",
            base_url.trim_end_matches('/'),
            self.sign(bucket, path)?
        ))
    }
}
