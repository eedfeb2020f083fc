use crate::access::TenantScope;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AddPhasePayload, AuthUser, Client, CreateClientPayload, Document, FinancialMetric, FormData, FormSubmission,
    FormType, PhaseStatus, ProjectPhase, RecordMetricPayload, SessionRecord, SiteContentEntry, UserRole,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const CLIENT_COLUMNS: &str =
    "id, company_name, avatar_url, subscription_status, service_level, subscription_end_date, auth_user_id, created_at";
const DOCUMENT_COLUMNS: &str =
    "id, client_id, name, file_type, file_url, storage_path, category, is_external_link, uploaded_at, description";
const METRIC_COLUMNS: &str = "id, client_id, month, revenue, margin_percent, ebitda, cash_flow, created_at";
const PHASE_COLUMNS: &str = "id, client_id, phase_name, status, due_date, created_at";

#[derive(Debug, Clone)]
pub struct NewDocument<'a> {
    pub client_id: &'a str,
    pub name: &'a str,
    pub file_type: &'a str,
    pub file_url: &'a str,
    pub storage_path: Option<&'a str>,
    pub category: &'a str,
    pub is_external_link: bool,
    pub description: Option<&'a str>,
}

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    pub fn insert_user(&self, email: &str, password_hash: &str, role: UserRole) -> AppResult<AuthUser> {
        let now = current_time();
        let id = Uuid::new_v4().to_string();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO auth_users (id, email, password_hash, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, email, password_hash, role.as_str(), format_time(now)],
        )?;
        Ok(AuthUser {
            id,
            email: email.to_string(),
            role,
            created_at: now,
        })
    }

    /// Returns the user together with its stored password hash.
    pub fn find_user_by_email(&self, email: &str) -> AppResult<Option<(AuthUser, String)>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, email, role, created_at, password_hash FROM auth_users WHERE email = ?1",
            [email],
            |row| Ok((parse_user_row(row)?, row.get::<_, String>(4)?)),
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn get_user(&self, user_id: &str) -> AppResult<Option<AuthUser>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, email, role, created_at FROM auth_users WHERE id = ?1",
            [user_id],
            parse_user_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn insert_session(&self, token: &str, user_id: &str, expires_at: DateTime<Utc>) -> AppResult<SessionRecord> {
        let now = current_time();
        let expires_at = expires_at.trunc_subsecs(6);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO auth_sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![token, user_id, format_time(now), format_time(expires_at)],
        )?;
        Ok(SessionRecord {
            token: token.to_string(),
            user_id: user_id.to_string(),
            created_at: now,
            expires_at,
        })
    }

    pub fn find_session(&self, token: &str) -> AppResult<Option<SessionRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT token, user_id, created_at, expires_at FROM auth_sessions WHERE token = ?1",
            [token],
            |row| {
                Ok(SessionRecord {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    created_at: parse_time(&row.get::<_, String>(2)?)?,
                    expires_at: parse_time(&row.get::<_, String>(3)?)?,
                })
            },
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn delete_session(&self, token: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM auth_sessions WHERE token = ?1", [token])?;
        Ok(changed > 0)
    }

    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM auth_sessions WHERE expires_at <= ?1",
            [format_time(now)],
        )?;
        Ok(changed as u64)
    }

    pub fn insert_client(&self, payload: &CreateClientPayload) -> AppResult<Client> {
        let now = current_time();
        let id = Uuid::new_v4().to_string();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO clients (
               id, company_name, subscription_status, service_level, subscription_end_date, auth_user_id, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                payload.company_name,
                payload.subscription_status,
                payload.service_level,
                payload.subscription_end_date.map(format_date),
                payload.auth_user_id,
                format_time(now),
            ],
        )?;
        Ok(Client {
            id,
            company_name: payload.company_name.clone(),
            avatar_url: None,
            subscription_status: payload.subscription_status.clone(),
            service_level: payload.service_level.clone(),
            subscription_end_date: payload.subscription_end_date,
            auth_user_id: payload.auth_user_id.clone(),
            created_at: now,
        })
    }

    pub fn list_clients(&self, scope: &TenantScope) -> AppResult<Vec<Client>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients
             WHERE (?1 IS NULL OR id = ?1)
             ORDER BY company_name COLLATE NOCASE ASC"
        ))?;
        let clients = stmt
            .query_map([scope.client_filter()], parse_client_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clients)
    }

    pub fn get_client(&self, scope: &TenantScope, client_id: &str) -> AppResult<Option<Client>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?1 AND (?2 IS NULL OR id = ?2)"),
            params![client_id, scope.client_filter()],
            parse_client_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn find_client_by_auth_user(&self, auth_user_id: &str) -> AppResult<Option<Client>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE auth_user_id = ?1"),
            [auth_user_id],
            parse_client_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn update_client_avatar(&self, scope: &TenantScope, client_id: &str, avatar_url: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE clients SET avatar_url = ?1 WHERE id = ?2 AND (?3 IS NULL OR id = ?3)",
            params![avatar_url, client_id, scope.client_filter()],
        )?;
        Ok(changed > 0)
    }

    pub fn insert_document(&self, scope: &TenantScope, document: &NewDocument<'_>) -> AppResult<Document> {
        ensure_scope(scope, document.client_id)?;
        let now = current_time();
        let id = Uuid::new_v4().to_string();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO documents (
               id, client_id, name, file_type, file_url, storage_path, category, is_external_link, uploaded_at, description
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                document.client_id,
                document.name,
                document.file_type,
                document.file_url,
                document.storage_path,
                document.category,
                document.is_external_link,
                format_time(now),
                document.description,
            ],
        )?;
        Ok(Document {
            id,
            client_id: document.client_id.to_string(),
            name: document.name.to_string(),
            file_type: document.file_type.to_string(),
            file_url: document.file_url.to_string(),
            storage_path: document.storage_path.map(ToString::to_string),
            category: document.category.to_string(),
            is_external_link: document.is_external_link,
            uploaded_at: now,
            description: document.description.map(ToString::to_string),
        })
    }

    pub fn list_documents(&self, scope: &TenantScope, client_id: &str) -> AppResult<Vec<Document>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents
             WHERE client_id = ?1 AND (?2 IS NULL OR client_id = ?2)
             ORDER BY uploaded_at DESC, rowid DESC"
        ))?;
        let documents = stmt
            .query_map(params![client_id, scope.client_filter()], parse_document_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(documents)
    }

    pub fn insert_metric(
        &self,
        scope: &TenantScope,
        client_id: &str,
        payload: &RecordMetricPayload,
    ) -> AppResult<FinancialMetric> {
        ensure_scope(scope, client_id)?;
        let now = current_time();
        let id = Uuid::new_v4().to_string();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO financial_metrics (id, client_id, month, revenue, margin_percent, ebitda, cash_flow, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                client_id,
                format_date(payload.month),
                payload.revenue,
                payload.margin_percent,
                payload.ebitda,
                payload.cash_flow,
                format_time(now),
            ],
        )?;
        Ok(FinancialMetric {
            id,
            client_id: client_id.to_string(),
            month: payload.month,
            revenue: payload.revenue,
            margin_percent: payload.margin_percent,
            ebitda: payload.ebitda,
            cash_flow: payload.cash_flow,
            created_at: now,
        })
    }

    pub fn list_metrics(&self, scope: &TenantScope, client_id: &str) -> AppResult<Vec<FinancialMetric>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {METRIC_COLUMNS} FROM financial_metrics
             WHERE client_id = ?1 AND (?2 IS NULL OR client_id = ?2)
             ORDER BY month ASC, rowid ASC"
        ))?;
        let metrics = stmt
            .query_map(params![client_id, scope.client_filter()], parse_metric_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(metrics)
    }

    pub fn insert_phase(&self, scope: &TenantScope, client_id: &str, payload: &AddPhasePayload) -> AppResult<ProjectPhase> {
        ensure_scope(scope, client_id)?;
        let now = current_time();
        let id = Uuid::new_v4().to_string();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO projects (id, client_id, phase_name, status, due_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                client_id,
                payload.phase_name,
                payload.status.as_str(),
                format_date(payload.due_date),
                format_time(now),
            ],
        )?;
        Ok(ProjectPhase {
            id,
            client_id: client_id.to_string(),
            phase_name: payload.phase_name.clone(),
            status: payload.status,
            due_date: payload.due_date,
            created_at: now,
        })
    }

    pub fn list_phases(&self, scope: &TenantScope, client_id: &str) -> AppResult<Vec<ProjectPhase>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PHASE_COLUMNS} FROM projects
             WHERE client_id = ?1 AND (?2 IS NULL OR client_id = ?2)
             ORDER BY due_date ASC, rowid ASC"
        ))?;
        let phases = stmt
            .query_map(params![client_id, scope.client_filter()], parse_phase_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(phases)
    }

    pub fn get_phase(&self, scope: &TenantScope, phase_id: &str) -> AppResult<Option<ProjectPhase>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {PHASE_COLUMNS} FROM projects WHERE id = ?1 AND (?2 IS NULL OR client_id = ?2)"),
            params![phase_id, scope.client_filter()],
            parse_phase_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub(crate) fn delete_phase(&self, scope: &TenantScope, phase_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM projects WHERE id = ?1 AND (?2 IS NULL OR client_id = ?2)",
            params![phase_id, scope.client_filter()],
        )?;
        Ok(changed > 0)
    }

    pub fn insert_form_submission(
        &self,
        form_type: FormType,
        data: &serde_json::Value,
        user_id: Option<&str>,
        file_urls: &[String],
    ) -> AppResult<FormSubmission> {
        let now = current_time();
        let id = Uuid::new_v4().to_string();
        let status = "new";
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO form_submissions (id, form_type, data_json, user_id, status, file_urls_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                form_type.as_str(),
                serde_json::to_string(data)?,
                user_id,
                status,
                serde_json::to_string(file_urls)?,
                format_time(now),
            ],
        )?;
        Ok(FormSubmission {
            id,
            form_type,
            data: FormData::decode(form_type, data.clone()),
            user_id: user_id.map(ToString::to_string),
            status: status.to_string(),
            file_urls: file_urls.to_vec(),
            created_at: now,
        })
    }

    pub fn list_form_submissions(&self, limit: u32) -> AppResult<Vec<FormSubmission>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, form_type, data_json, user_id, status, file_urls_json, created_at
             FROM form_submissions ORDER BY created_at DESC, rowid DESC LIMIT ?1",
        )?;
        let submissions = stmt
            .query_map([limit], parse_form_submission_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(submissions)
    }

    pub fn list_site_content(&self) -> AppResult<Vec<SiteContentEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key, content_json, updated_at FROM site_content ORDER BY key ASC")?;
        let entries = stmt
            .query_map([], parse_site_content_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn get_site_content(&self, key: &str) -> AppResult<Option<SiteContentEntry>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT key, content_json, updated_at FROM site_content WHERE key = ?1",
            [key],
            parse_site_content_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn upsert_site_content(&self, key: &str, content: &serde_json::Value) -> AppResult<SiteContentEntry> {
        let now = current_time();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO site_content (key, content_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET content_json = excluded.content_json, updated_at = excluded.updated_at",
            params![key, serde_json::to_string(content)?, format_time(now)],
        )?;
        Ok(SiteContentEntry {
            key: key.to_string(),
            content: content.clone(),
            updated_at: now,
        })
    }
}

fn ensure_scope(scope: &TenantScope, client_id: &str) -> AppResult<()> {
    if scope.allows(client_id) {
        Ok(())
    } else {
        Err(AppError::Policy(format!("row for tenant {} is outside the session scope", client_id)))
    }
}

fn parse_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuthUser> {
    let role: String = row.get(2)?;
    Ok(AuthUser {
        id: row.get(0)?,
        email: row.get(1)?,
        role: UserRole::parse(&role).ok_or_else(|| invalid_text(format!("unknown user role: {}", role)))?,
        created_at: parse_time(&row.get::<_, String>(3)?)?,
    })
}

fn parse_client_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        company_name: row.get(1)?,
        avatar_url: row.get(2)?,
        subscription_status: row.get(3)?,
        service_level: row.get(4)?,
        subscription_end_date: row
            .get::<_, Option<String>>(5)?
            .map(|raw| parse_date(&raw))
            .transpose()?,
        auth_user_id: row.get(6)?,
        created_at: parse_time(&row.get::<_, String>(7)?)?,
    })
}

fn parse_document_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        client_id: row.get(1)?,
        name: row.get(2)?,
        file_type: row.get(3)?,
        file_url: row.get(4)?,
        storage_path: row.get(5)?,
        category: row.get(6)?,
        is_external_link: row.get(7)?,
        uploaded_at: parse_time(&row.get::<_, String>(8)?)?,
        description: row.get(9)?,
    })
}

fn parse_metric_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FinancialMetric> {
    Ok(FinancialMetric {
        id: row.get(0)?,
        client_id: row.get(1)?,
        month: parse_date(&row.get::<_, String>(2)?)?,
        revenue: row.get(3)?,
        margin_percent: row.get(4)?,
        ebitda: row.get(5)?,
        cash_flow: row.get(6)?,
        created_at: parse_time(&row.get::<_, String>(7)?)?,
    })
}

fn parse_phase_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProjectPhase> {
    let status: String = row.get(3)?;
    Ok(ProjectPhase {
        id: row.get(0)?,
        client_id: row.get(1)?,
        phase_name: row.get(2)?,
        status: PhaseStatus::parse(&status).ok_or_else(|| invalid_text(format!("unknown phase status: {}", status)))?,
        due_date: parse_date(&row.get::<_, String>(4)?)?,
        created_at: parse_time(&row.get::<_, String>(5)?)?,
    })
}

fn parse_form_submission_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FormSubmission> {
    let form_type: String = row.get(1)?;
    let form_type =
        FormType::parse(&form_type).ok_or_else(|| invalid_text(format!("unknown form type: {}", form_type)))?;
    let data: serde_json::Value = parse_json_column(row, 2)?;
    let file_urls: Vec<String> = parse_json_column(row, 5)?;
    Ok(FormSubmission {
        id: row.get(0)?,
        form_type,
        data: FormData::decode(form_type, data),
        user_id: row.get(3)?,
        status: row.get(4)?,
        file_urls,
        created_at: parse_time(&row.get::<_, String>(6)?)?,
    })
}

fn parse_site_content_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SiteContentEntry> {
    let content = parse_json_column(row, 1)?;
    Ok(SiteContentEntry {
        key: row.get(0)?,
        content,
        updated_at: parse_time(&row.get::<_, String>(2)?)?,
    })
}

fn parse_json_column<T: serde::de::DeserializeOwned>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(error)))
}

fn invalid_text(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

pub(crate) fn current_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn format_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn format_date(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error)))
}

fn parse_date(raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open(dir: &tempfile::TempDir) -> Database {
        Database::new(&dir.path().join("test.db")).expect("db")
    }

    fn client(db: &Database, name: &str) -> Client {
        db.insert_client(&CreateClientPayload {
            company_name: name.to_string(),
            ..CreateClientPayload::default()
        })
        .expect("insert client")
    }

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date")
    }

    #[test]
    fn tenant_scope_filters_rows_in_sql() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open(&dir);
        let acme = client(&db, "Acme");
        let globex = client(&db, "Globex");

        for (owner, name) in [(&acme, "phase-a"), (&globex, "phase-b")] {
            db.insert_phase(
                &TenantScope::All,
                &owner.id,
                &AddPhasePayload {
                    phase_name: name.to_string(),
                    status: PhaseStatus::Upcoming,
                    due_date: date("2025-03-01"),
                },
            )
            .expect("insert phase");
        }

        let acme_scope = TenantScope::Tenant(acme.id.clone());
        assert_eq!(db.list_phases(&acme_scope, &acme.id).expect("own").len(), 1);
        assert!(db.list_phases(&acme_scope, &globex.id).expect("foreign").is_empty());
        assert!(db.list_phases(&TenantScope::Empty, &acme.id).expect("empty").is_empty());

        let clients = db.list_clients(&acme_scope).expect("clients");
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].id, acme.id);

        let err = db
            .insert_metric(
                &acme_scope,
                &globex.id,
                &RecordMetricPayload {
                    month: date("2025-01-01"),
                    revenue: 1.0,
                    margin_percent: 1.0,
                    ebitda: 1.0,
                    cash_flow: 1.0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, AppError::Policy(_)));
    }

    #[test]
    fn foreign_phase_is_invisible_to_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open(&dir);
        let acme = client(&db, "Acme");
        let globex = client(&db, "Globex");
        let phase = db
            .insert_phase(
                &TenantScope::All,
                &globex.id,
                &AddPhasePayload {
                    phase_name: "Kickoff".to_string(),
                    status: PhaseStatus::Current,
                    due_date: date("2025-02-10"),
                },
            )
            .expect("insert phase");

        let deleted = db
            .delete_phase(&TenantScope::Tenant(acme.id.clone()), &phase.id)
            .expect("delete");
        assert!(!deleted);
        assert!(db.get_phase(&TenantScope::All, &phase.id).expect("get").is_some());
    }

    #[test]
    fn documents_come_back_newest_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open(&dir);
        let acme = client(&db, "Acme");
        for name in ["first.pdf", "second.xlsx"] {
            db.insert_document(
                &TenantScope::All,
                &NewDocument {
                    client_id: &acme.id,
                    name,
                    file_type: "FILE",
                    file_url: "http://localhost/x",
                    storage_path: None,
                    category: "General",
                    is_external_link: false,
                    description: None,
                },
            )
            .expect("insert document");
        }
        let docs = db.list_documents(&TenantScope::All, &acme.id).expect("list");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name, "second.xlsx");
    }

    #[test]
    fn document_for_missing_client_is_rejected_by_foreign_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open(&dir);
        let result = db.insert_document(
            &TenantScope::All,
            &NewDocument {
                client_id: "missing",
                name: "orphan.pdf",
                file_type: "PDF",
                file_url: "http://localhost/orphan.pdf",
                storage_path: Some("missing/orphan.pdf"),
                category: "General",
                is_external_link: false,
                description: None,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn site_content_upsert_replaces_existing_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open(&dir);
        assert!(db.list_site_content().expect("empty").is_empty());

        db.upsert_site_content("hero", &json!({ "tagline": "one" }))
            .expect("insert");
        db.upsert_site_content("hero", &json!({ "tagline": "two" }))
            .expect("replace");

        let entries = db.list_site_content().expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, json!({ "tagline": "two" }));
    }

    #[test]
    fn sessions_expire_and_purge() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open(&dir);
        let user = db
            .insert_user("ops@example.com", "hash", UserRole::Operator)
            .expect("user");
        let past = Utc::now() - chrono::Duration::hours(1);
        db.insert_session("stale", &user.id, past).expect("session");
        assert!(db.find_session("stale").expect("find").is_some());

        let purged = db.purge_expired_sessions(Utc::now()).expect("purge");
        assert_eq!(purged, 1);
        assert!(db.find_session("stale").expect("find").is_none());
    }

    #[test]
    fn corrupt_submission_json_fails_the_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open(&dir);
        db.insert_form_submission(FormType::Inicial, &json!({ "empresa": "Acme" }), None, &[])
            .expect("insert");
        db.conn()
            .expect("conn")
            .execute("UPDATE form_submissions SET file_urls_json = 'not json'", [])
            .expect("corrupt row");

        let err = db.list_form_submissions(10).unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }
}
