use super::{random_suffix, tenant_scope};
use crate::backend::Backend;
use crate::db::NewDocument;
use crate::errors::{AppError, AppResult};
use crate::models::{
    Document, DocumentUploadOptions, FileUpload, LinkDocumentPayload, ALL_CATEGORIES, DEFAULT_DOCUMENT_CATEGORY,
};
use crate::session::SessionContext;
use crate::storage::{public_url, sanitize_object_name, DOCUMENTS_BUCKET};

const LINK_FILE_TYPE: &str = "LINK";
const UNKNOWN_FILE_TYPE: &str = "FILE";

/// Per-tenant document listing, upload and external links.
pub struct DocumentRepository {
    backend: Backend,
    session: SessionContext,
}

impl DocumentRepository {
    pub fn new(backend: Backend, session: SessionContext) -> Self {
        Self { backend, session }
    }

    /// Newest first.
    pub fn list(&self, client_id: &str) -> AppResult<Vec<Document>> {
        let (_, scope) = tenant_scope(&self.backend, &self.session, client_id)?;
        self.backend.db().list_documents(&scope, client_id)
    }

    /// Dashboard listing: failures are logged and rendered as an empty repository.
    pub fn list_or_empty(&self, client_id: &str) -> Vec<Document> {
        match self.list(client_id) {
            Ok(documents) => documents,
            Err(error) => {
                tracing::warn!(client_id = %client_id, error = %error, "document listing failed");
                Vec::new()
            }
        }
    }

    pub fn upload(&self, client_id: &str, file: FileUpload, options: DocumentUploadOptions) -> AppResult<Document> {
        let (_, scope) = tenant_scope(&self.backend, &self.session, client_id)?;
        let name = file.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("file name is required".to_string()));
        }

        let storage_path = format!("{}/{}-{}", client_id, random_suffix(10), sanitize_object_name(&name));
        self.backend
            .storage()
            .put(DOCUMENTS_BUCKET, &storage_path, &file.bytes, false)?;
        let file_url = public_url(self.backend.public_base_url(), DOCUMENTS_BUCKET, &storage_path);

        let file_type = file
            .extension()
            .map(str::to_uppercase)
            .unwrap_or_else(|| UNKNOWN_FILE_TYPE.to_string());
        let category = resolve_category(options.category.as_deref());
        let description = trimmed(options.description.as_deref());

        // The stored object is left in place when the row insert fails.
        let document = self
            .backend
            .db()
            .insert_document(
                &scope,
                &NewDocument {
                    client_id,
                    name: &name,
                    file_type: &file_type,
                    file_url: &file_url,
                    storage_path: Some(&storage_path),
                    category,
                    is_external_link: false,
                    description,
                },
            )
            .inspect_err(|error| {
                tracing::warn!(
                    client_id = %client_id,
                    storage_path = %storage_path,
                    error = %error,
                    "document row insert failed after storage write"
                );
            })?;
        tracing::info!(client_id = %client_id, document_id = %document.id, "document uploaded");
        Ok(document)
    }

    /// Records a document hosted elsewhere. Storage is not touched.
    pub fn link(&self, client_id: &str, payload: LinkDocumentPayload) -> AppResult<Document> {
        let (_, scope) = tenant_scope(&self.backend, &self.session, client_id)?;
        let name = payload.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("link name is required".to_string()));
        }
        let url = payload.url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(AppError::Validation(format!("link must be an http(s) url: {}", url)));
        }

        self.backend.db().insert_document(
            &scope,
            &NewDocument {
                client_id,
                name,
                file_type: LINK_FILE_TYPE,
                file_url: url,
                storage_path: None,
                category: resolve_category(payload.category.as_deref()),
                is_external_link: true,
                description: trimmed(payload.description.as_deref()),
            },
        )
    }
}

/// `Todos` (or no category) keeps everything.
pub fn filter_by_category(documents: &[Document], category: Option<&str>) -> Vec<Document> {
    match category.map(str::trim).filter(|value| !value.is_empty()) {
        None => documents.to_vec(),
        Some(ALL_CATEGORIES) => documents.to_vec(),
        Some(category) => documents
            .iter()
            .filter(|document| document.category == category)
            .cloned()
            .collect(),
    }
}

fn resolve_category(category: Option<&str>) -> &str {
    match category.map(str::trim) {
        Some(value) if !value.is_empty() && value != ALL_CATEGORIES => value,
        _ => DEFAULT_DOCUMENT_CATEGORY,
    }
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{backend, member_session, operator_session, seed_client};
    use crate::models::DocumentAction;

    #[test]
    fn upload_then_list_shows_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend(&dir);
        let acme = seed_client(&backend, "Acme");
        let repo = DocumentRepository::new(backend.clone(), operator_session());

        let uploaded = repo
            .upload(
                &acme.id,
                FileUpload::new("Presupuesto 2025.xlsx", b"sheet".to_vec()),
                DocumentUploadOptions {
                    category: Some("Presupuesto".to_string()),
                    description: None,
                },
            )
            .expect("upload");
        assert_eq!(uploaded.file_type, "XLSX");
        assert_eq!(uploaded.category, "Presupuesto");

        let storage_path = uploaded.storage_path.clone().expect("storage path");
        assert!(storage_path.starts_with(&format!("{}/", acme.id)));
        assert!(storage_path.ends_with("-Presupuesto_2025.xlsx"));
        assert_eq!(
            uploaded.file_url,
            format!("http://localhost:8080/storage/public/documents/{}", storage_path)
        );
        assert_eq!(
            backend.storage().get(DOCUMENTS_BUCKET, &storage_path).expect("object"),
            b"sheet"
        );

        let member = DocumentRepository::new(backend, member_session(&acme.id));
        let listed = member.list(&acme.id).expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Presupuesto 2025.xlsx");
        assert_eq!(listed[0].file_type, "XLSX");
    }

    #[test]
    fn missing_extension_and_category_fall_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend(&dir);
        let acme = seed_client(&backend, "Acme");
        let repo = DocumentRepository::new(backend, operator_session());

        let uploaded = repo
            .upload(&acme.id, FileUpload::new("README", b"x".to_vec()), DocumentUploadOptions::default())
            .expect("upload");
        assert_eq!(uploaded.file_type, "FILE");
        assert_eq!(uploaded.category, "General");
    }

    #[test]
    fn members_cannot_reach_other_tenants() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend(&dir);
        let acme = seed_client(&backend, "Acme");
        let globex = seed_client(&backend, "Globex");
        let operator = DocumentRepository::new(backend.clone(), operator_session());
        operator
            .upload(&globex.id, FileUpload::new("secret.pdf", b"%PDF".to_vec()), DocumentUploadOptions::default())
            .expect("upload");

        let member = DocumentRepository::new(backend, member_session(&acme.id));
        let denied = member.list(&globex.id).unwrap_err();
        assert!(matches!(denied, AppError::Policy(_)));
        assert!(member.list_or_empty(&globex.id).is_empty());
        assert!(member
            .upload(&globex.id, FileUpload::new("x.pdf", b"x".to_vec()), DocumentUploadOptions::default())
            .is_err());
    }

    #[test]
    fn row_failure_after_storage_write_surfaces_and_keeps_blob() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend(&dir);
        let repo = DocumentRepository::new(backend.clone(), operator_session());

        let err = repo
            .upload("ghost-client", FileUpload::new("orphan.pdf", b"%PDF".to_vec()), DocumentUploadOptions::default())
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));

        let objects = std::fs::read_dir(dir.path().join("objects").join(DOCUMENTS_BUCKET).join("ghost-client"))
            .expect("blob directory")
            .count();
        assert_eq!(objects, 1);
    }

    #[test]
    fn links_skip_storage_and_open_externally() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend(&dir);
        let acme = seed_client(&backend, "Acme");
        let repo = DocumentRepository::new(backend, operator_session());

        assert!(repo
            .link(
                &acme.id,
                LinkDocumentPayload {
                    name: "Drive".to_string(),
                    url: "drive.google.com/x".to_string(),
                    category: None,
                    description: None,
                },
            )
            .is_err());

        let linked = repo
            .link(
                &acme.id,
                LinkDocumentPayload {
                    name: "Forecast Q3".to_string(),
                    url: "https://docs.google.com/spreadsheets/d/abc".to_string(),
                    category: Some("Forecast".to_string()),
                    description: Some("  hoja compartida ".to_string()),
                },
            )
            .expect("link");
        assert!(linked.is_external_link);
        assert_eq!(linked.file_type, "LINK");
        assert!(linked.storage_path.is_none());
        assert_eq!(linked.description.as_deref(), Some("hoja compartida"));
        assert!(matches!(linked.action(), DocumentAction::OpenExternal { .. }));
    }

    #[test]
    fn category_filter_treats_todos_as_all() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend(&dir);
        let acme = seed_client(&backend, "Acme");
        let repo = DocumentRepository::new(backend, operator_session());
        for (name, category) in [("a.pdf", "Forecast"), ("b.pdf", "Matriz"), ("c.pdf", "Forecast")] {
            repo.upload(
                &acme.id,
                FileUpload::new(name, b"x".to_vec()),
                DocumentUploadOptions {
                    category: Some(category.to_string()),
                    description: None,
                },
            )
            .expect("upload");
        }
        let all = repo.list(&acme.id).expect("list");

        assert_eq!(filter_by_category(&all, Some("Todos")).len(), 3);
        assert_eq!(filter_by_category(&all, None).len(), 3);
        assert_eq!(filter_by_category(&all, Some("Forecast")).len(), 2);
        assert!(filter_by_category(&all, Some("Entregable")).is_empty());
    }

    #[test]
    fn presentation_action_depends_on_type() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend(&dir);
        let acme = seed_client(&backend, "Acme");
        let repo = DocumentRepository::new(backend, operator_session());

        let pdf = repo
            .upload(&acme.id, FileUpload::new("informe.pdf", b"%PDF".to_vec()), DocumentUploadOptions::default())
            .expect("pdf");
        assert!(matches!(pdf.action(), DocumentAction::View { .. }));

        let sheet = repo
            .upload(&acme.id, FileUpload::new("matriz.xlsx", b"x".to_vec()), DocumentUploadOptions::default())
            .expect("sheet");
        assert_eq!(
            sheet.action(),
            DocumentAction::Download {
                url: sheet.file_url.clone(),
                file_name: "matriz.xlsx".to_string(),
            }
        );
    }
}
