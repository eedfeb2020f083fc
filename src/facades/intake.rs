use super::random_suffix;
use crate::backend::Backend;
use crate::errors::{AppError, AppResult};
use crate::models::{BatchOutcome, FileUpload, FormSubmission, FormType, IntakeReceipt};
use crate::session::SessionContext;
use crate::storage::FORM_UPLOADS_BUCKET;
use chrono::Utc;
use serde_json::{Map, Value};

const ANONYMOUS_OWNER: &str = "anonymous";

/// Public intake forms. Attachments are best effort: a failed upload is
/// logged and left out of the stored submission.
pub struct IntakeService {
    backend: Backend,
    session: SessionContext,
}

impl IntakeService {
    pub fn new(backend: Backend, session: SessionContext) -> Self {
        Self { backend, session }
    }

    pub fn submit(
        &self,
        form_type: FormType,
        fields: Map<String, Value>,
        files: Vec<FileUpload>,
    ) -> AppResult<IntakeReceipt> {
        validate_fields(form_type, &fields)?;

        let user_id = self
            .session
            .current_principal()
            .map(|principal| principal.user_id().to_string());
        let owner = user_id.as_deref().unwrap_or(ANONYMOUS_OWNER);

        let mut uploads = BatchOutcome::default();
        let mut stored_paths = Vec::with_capacity(files.len());
        for file in &files {
            let extension = attachment_extension(file);
            let path = format!(
                "{}/{}_{}.{}",
                owner,
                Utc::now().timestamp_millis(),
                random_suffix(8),
                extension
            );
            match self
                .backend
                .storage()
                .put(FORM_UPLOADS_BUCKET, &path, &file.bytes, false)
            {
                Ok(()) => {
                    uploads.record_success(file.name.clone());
                    stored_paths.push(path);
                }
                Err(error) => {
                    tracing::warn!(file = %file.name, error = %error, "intake attachment upload failed; skipping");
                    uploads.record_failure(file.name.clone(), error);
                }
            }
        }

        let submission = self.backend.db().insert_form_submission(
            form_type,
            &Value::Object(fields),
            user_id.as_deref(),
            &stored_paths,
        )?;
        tracing::info!(
            submission_id = %submission.id,
            form_type = form_type.as_str(),
            attachments = stored_paths.len(),
            "intake form received"
        );
        Ok(IntakeReceipt { submission, uploads })
    }

    /// Recent submissions for the admin panel.
    pub fn recent(&self, limit: u32) -> AppResult<Vec<FormSubmission>> {
        let principal = self.session.principal()?;
        self.backend
            .policy()
            .authorize_operator(&principal, "intake review")?;
        self.backend.db().list_form_submissions(limit)
    }

    /// Time-limited link to an attachment in the private bucket.
    pub fn attachment_url(&self, path: &str) -> AppResult<String> {
        let principal = self.session.principal()?;
        self.backend
            .policy()
            .authorize_operator(&principal, "intake attachment access")?;
        self.backend
            .signer()
            .signed_url(self.backend.public_base_url(), FORM_UPLOADS_BUCKET, path)
    }
}

/// Lowercased extension when it is plain alphanumeric, else `bin`.
fn attachment_extension(file: &FileUpload) -> String {
    file.extension()
        .filter(|ext| !ext.is_empty() && ext.len() <= 16 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string())
}

fn validate_fields(form_type: FormType, fields: &Map<String, Value>) -> AppResult<()> {
    let missing: Vec<&str> = form_type
        .required_fields()
        .iter()
        .copied()
        .filter(|field| match fields.get(*field) {
            Some(Value::String(value)) => value.trim().is_empty(),
            Some(Value::Null) | None => true,
            Some(_) => false,
        })
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "missing required fields for {}: {}",
            form_type.as_str(),
            missing.join(", ")
        )))
    }
}
