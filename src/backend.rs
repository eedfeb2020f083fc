use crate::access::AccessPolicy;
use crate::config::PortalConfig;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::storage::{LocalObjectStore, ObjectStore, UrlSigner};
use chrono::Duration;
use std::sync::Arc;

/// Handles to the backing store shared by every facade.
#[derive(Clone)]
pub struct Backend {
    db: Arc<Database>,
    storage: Arc<dyn ObjectStore>,
    signer: Arc<UrlSigner>,
    policy: AccessPolicy,
    public_base_url: String,
}

impl Backend {
    pub fn new(
        db: Arc<Database>,
        storage: Arc<dyn ObjectStore>,
        signer: UrlSigner,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            storage,
            signer: Arc::new(signer),
            policy: AccessPolicy::new(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn open(config: &PortalConfig) -> AppResult<Self> {
        let db = Arc::new(Database::new(&config.database_path())?);
        let storage = Arc::new(LocalObjectStore::new(config.storage_root())?);
        let ttl = i64::try_from(config.signed_url_ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                AppError::Validation(format!("signed_url_ttl_secs {} is out of range", config.signed_url_ttl_secs))
            })?;
        let signer = UrlSigner::from_base64(config.url_signing_key.as_deref(), ttl)?;
        tracing::info!(
            database = %db.path().to_string_lossy(),
            storage = %config.storage_root().to_string_lossy(),
            "backing store opened"
        );
        Ok(Self::new(db, storage, signer, config.public_base_url.clone()))
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn shared_db(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    pub fn storage(&self) -> &dyn ObjectStore {
        self.storage.as_ref()
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }
}
