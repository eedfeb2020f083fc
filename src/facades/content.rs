use super::operator;
use crate::backend::Backend;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{BatchOutcome, SiteContentBundle, SiteContentEntry, SiteSection};
use crate::session::SessionContext;
use serde_json::{Map, Value};

const DEFAULT_CONTENT: &str = include_str!("default_content.json");
const INVALID_FILE: &str = "invalid file: expected a JSON object of content sections";

/// Editable marketing copy, one JSON blob per key.
pub struct SiteContentStore {
    backend: Backend,
    session: SessionContext,
}

impl SiteContentStore {
    pub fn new(backend: Backend, session: SessionContext) -> Self {
        Self { backend, session }
    }

    pub fn get(&self, key: &str) -> AppResult<Option<Value>> {
        let key = validate_key(key)?;
        Ok(self
            .backend
            .db()
            .get_site_content(key)?
            .map(|entry| entry.content))
    }

    pub fn get_section(&self, key: &str) -> AppResult<Option<SiteSection>> {
        Ok(self
            .get(key)?
            .map(|content| SiteSection::decode(key, content)))
    }

    pub fn list(&self) -> AppResult<Vec<SiteContentEntry>> {
        self.backend.db().list_site_content()
    }

    pub fn set(&self, key: &str, content: Value) -> AppResult<SiteContentEntry> {
        operator(&self.backend, &self.session, "site content edit")?;
        let key = validate_key(key)?;
        let entry = self.backend.db().upsert_site_content(key, &content)?;
        tracing::info!(key = %key, "site content saved");
        Ok(entry)
    }

    pub fn set_section(&self, section: &SiteSection) -> AppResult<SiteContentEntry> {
        self.set(section.key(), section.to_value()?)
    }

    /// Every stored key with its content.
    pub fn export_all(&self) -> AppResult<Map<String, Value>> {
        operator(&self.backend, &self.session, "site content export")?;
        Ok(self
            .backend
            .db()
            .list_site_content()?
            .into_iter()
            .map(|entry| (entry.key, entry.content))
            .collect())
    }

    /// Upserts each top-level key of `raw` independently. Input that is not a
    /// JSON object is rejected before anything is written.
    pub fn import_all(&self, raw: &str) -> AppResult<BatchOutcome> {
        operator(&self.backend, &self.session, "site content import")?;
        let parsed: Value = serde_json::from_str(raw).map_err(|error| {
            tracing::warn!(error = %error, "content import is not valid json");
            AppError::InvalidImport(INVALID_FILE.to_string())
        })?;
        let Value::Object(sections) = parsed else {
            return Err(AppError::InvalidImport(INVALID_FILE.to_string()));
        };

        let mut outcome = BatchOutcome::default();
        for (key, content) in sections {
            let result = validate_key(&key).and_then(|key| self.backend.db().upsert_site_content(key, &content));
            match result {
                Ok(_) => outcome.record_success(key),
                Err(error) => {
                    tracing::warn!(key = %key, error = %error, "content import entry failed");
                    outcome.record_failure(key, error);
                }
            }
        }
        tracing::info!(
            imported = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "site content import finished"
        );
        Ok(outcome)
    }
}

/// Home-page content: the built-in bundle with every stored key laid over it.
/// A failed read renders the defaults.
pub fn public_bundle(db: &Database) -> SiteContentBundle {
    let mut bundle = default_bundle();
    match db.list_site_content() {
        Ok(entries) => {
            for entry in entries {
                bundle.overlay(&entry.key, entry.content);
            }
        }
        Err(error) => {
            tracing::warn!(error = %error, "site content read failed; rendering defaults");
        }
    }
    bundle
}

pub fn default_bundle() -> SiteContentBundle {
    let mut bundle = SiteContentBundle::default();
    match serde_json::from_str::<Map<String, Value>>(DEFAULT_CONTENT) {
        Ok(sections) => {
            for (key, content) in sections {
                bundle.overlay(&key, content);
            }
        }
        Err(error) => tracing::error!(error = %error, "built-in site content is malformed"),
    }
    bundle
}

/// Keys are stored exactly as given, so padded keys are rejected rather than
/// trimmed into a collision with an existing key.
fn validate_key(key: &str) -> AppResult<&str> {
    if key.trim().is_empty() {
        return Err(AppError::Validation("content key is required".to_string()));
    }
    if key != key.trim() {
        return Err(AppError::Validation(format!(
            "content key has surrounding whitespace: {:?}",
            key
        )));
    }
    if key.len() > 128 || key.chars().any(char::is_control) {
        return Err(AppError::Validation(format!("invalid content key: {:?}", key)));
    }
    Ok(key)
}
