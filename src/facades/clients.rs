use super::{operator, tenant_scope};
use crate::backend::Backend;
use crate::errors::{AppError, AppResult};
use crate::models::{Client, CreateClientPayload, FileUpload};
use crate::session::SessionContext;
use crate::storage::{public_url, DOCUMENTS_BUCKET};
use chrono::Utc;

/// Tenant records visible to the session.
pub struct ClientDirectory {
    backend: Backend,
    session: SessionContext,
}

impl ClientDirectory {
    pub fn new(backend: Backend, session: SessionContext) -> Self {
        Self { backend, session }
    }

    pub fn list(&self) -> AppResult<Vec<Client>> {
        let principal = self.session.principal()?;
        self.backend.db().list_clients(&principal.scope())
    }

    pub fn get(&self, client_id: &str) -> AppResult<Client> {
        let (_, scope) = tenant_scope(&self.backend, &self.session, client_id)?;
        self.backend
            .db()
            .get_client(&scope, client_id)?
            .ok_or_else(|| AppError::NotFound(format!("client {} not found", client_id)))
    }

    /// The tenant a request acts on. Members default to their own tenant;
    /// operators must name one. A named tenant is still subject to the
    /// facades' policy checks.
    pub fn selection(&self, requested: Option<&str>) -> AppResult<String> {
        let principal = self.session.principal()?;
        match (requested.filter(|id| !id.is_empty()), principal.client_id()) {
            (Some(requested), _) => Ok(requested.to_string()),
            (None, Some(own)) => Ok(own.to_string()),
            (None, None) if principal.is_operator() => Err(AppError::Validation("clientId is required".to_string())),
            (None, None) => Err(AppError::NotFound("no client is linked to this account".to_string())),
        }
    }

    pub fn create(&self, payload: CreateClientPayload) -> AppResult<Client> {
        operator(&self.backend, &self.session, "client creation")?;
        let company_name = payload.company_name.trim().to_string();
        if company_name.is_empty() {
            return Err(AppError::Validation("company name is required".to_string()));
        }
        let client = self.backend.db().insert_client(&CreateClientPayload {
            company_name,
            ..payload
        })?;
        tracing::info!(client_id = %client.id, "client created");
        Ok(client)
    }

    /// Stores the avatar under `avatars/{client}/` in the public bucket and
    /// points the client record at it.
    pub fn set_avatar(&self, client_id: &str, file: FileUpload) -> AppResult<Client> {
        operator(&self.backend, &self.session, "avatar upload")?;
        let existing = self.get(client_id)?;
        if file.bytes.is_empty() {
            return Err(AppError::Validation("avatar file is empty".to_string()));
        }

        let extension = file
            .extension()
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("png")
            .to_ascii_lowercase();
        let path = format!(
            "avatars/{}/avatar-{}.{}",
            existing.id,
            Utc::now().timestamp_millis(),
            extension
        );
        self.backend
            .storage()
            .put(DOCUMENTS_BUCKET, &path, &file.bytes, true)?;

        let url = public_url(self.backend.public_base_url(), DOCUMENTS_BUCKET, &path);
        let scope = self.session.principal()?.scope();
        if !self
            .backend
            .db()
            .update_client_avatar(&scope, &existing.id, &url)?
        {
            return Err(AppError::NotFound(format!("client {} not found", client_id)));
        }
        Ok(Client {
            avatar_url: Some(url),
            ..existing
        })
    }
}
