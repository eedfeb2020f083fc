use super::tenant_scope;
use crate::backend::Backend;
use crate::errors::{AppError, AppResult};
use crate::models::Client;
use crate::session::SessionContext;
use chrono::{NaiveDate, Utc};
use serde::Serialize;

pub const DEFAULT_SERVICE_LEVEL: &str = "Consultoría Base";
pub const OPEN_ENDED: &str = "Indefinido";
const PROVIDER: &str = "CARO CONSULTING SpA";
const PLACE: &str = "Santiago de Chile";
const DATE_FORMAT: &str = "%d-%m-%Y";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContractClause {
    pub title: String,
    pub body: String,
}

/// Display-only service agreement derived from a client's subscription fields.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContractView {
    pub company_name: String,
    pub provider: String,
    pub place: String,
    pub issued_on: String,
    pub service_level: String,
    pub end_date: String,
    pub is_active: bool,
    /// Set when the subscription is not active; the contract is still rendered.
    pub paused_overlay: bool,
    pub clauses: Vec<ContractClause>,
}

pub struct ContractViewer {
    backend: Backend,
    session: SessionContext,
}

impl ContractViewer {
    pub fn new(backend: Backend, session: SessionContext) -> Self {
        Self { backend, session }
    }

    pub fn view(&self, client_id: &str) -> AppResult<ContractView> {
        let (_, scope) = tenant_scope(&self.backend, &self.session, client_id)?;
        let client = self
            .backend
            .db()
            .get_client(&scope, client_id)?
            .ok_or_else(|| AppError::NotFound(format!("client {} not found", client_id)))?;
        Ok(render(&client, Utc::now().date_naive()))
    }
}

pub fn render(client: &Client, today: NaiveDate) -> ContractView {
    let service_level = client
        .service_level
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_SERVICE_LEVEL)
        .to_string();
    let end_date = client
        .subscription_end_date
        .map(|date| date.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| OPEN_ENDED.to_string());
    let is_active = client.subscription_status.as_deref() == Some("active");

    let clauses = vec![
        ContractClause {
            title: "PRIMERO: Objeto".to_string(),
            body: format!(
                "Caro Consulting entregará servicios de asesoría estratégica bajo la modalidad {}, incluyendo acceso a plataforma digital, reportes mensuales y reuniones de seguimiento.",
                service_level
            ),
        },
        ContractClause {
            title: "SEGUNDO: Vigencia y Plazos".to_string(),
            body: format!(
                "El presente contrato tiene vigencia hasta el {}, renovable automáticamente salvo aviso contrario.",
                end_date
            ),
        },
        ContractClause {
            title: "TERCERO: Confidencialidad".to_string(),
            body: "Ambas partes se obligan a mantener estricta confidencialidad sobre la información financiera y estratégica compartida durante la ejecución de este servicio.".to_string(),
        },
    ];

    ContractView {
        company_name: client.company_name.clone(),
        provider: PROVIDER.to_string(),
        place: PLACE.to_string(),
        issued_on: today.format(DATE_FORMAT).to_string(),
        service_level,
        end_date,
        is_active,
        paused_overlay: !is_active,
        clauses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{backend, member_session, seed_client};
    use crate::models::CreateClientPayload;

    fn client(status: Option<&str>, level: Option<&str>, end: Option<NaiveDate>) -> Client {
        Client {
            id: "c-1".to_string(),
            company_name: "Tubexa".to_string(),
            avatar_url: None,
            subscription_status: status.map(ToString::to_string),
            service_level: level.map(ToString::to_string),
            subscription_end_date: end,
            auth_user_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn missing_fields_use_defaults() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 9).expect("date");
        let view = render(&client(None, None, None), today);
        assert_eq!(view.service_level, "Consultoría Base");
        assert_eq!(view.end_date, "Indefinido");
        assert_eq!(view.issued_on, "09-03-2025");
        assert!(!view.is_active);
        assert!(view.paused_overlay);
        assert!(view.clauses[0].body.contains("Consultoría Base"));
        assert!(view.clauses[1].body.contains("Indefinido"));
    }

    #[test]
    fn active_subscription_has_no_overlay() {
        let end = NaiveDate::from_ymd_opt(2026, 12, 31).expect("date");
        let view = render(&client(Some("active"), Some("Plan Premium"), Some(end)), end);
        assert!(view.is_active);
        assert!(!view.paused_overlay);
        assert_eq!(view.service_level, "Plan Premium");
        assert_eq!(view.end_date, "31-12-2026");
        assert_eq!(view.company_name, "Tubexa");
    }

    #[test]
    fn viewer_is_scoped_to_member_tenant() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend(&dir);
        let acme = seed_client(&backend, "Acme");
        let paused = backend
            .db()
            .insert_client(&CreateClientPayload {
                company_name: "Paused Co".to_string(),
                subscription_status: Some("cancelled".to_string()),
                ..CreateClientPayload::default()
            })
            .expect("client");

        let viewer = ContractViewer::new(backend, member_session(&acme.id));
        let view = viewer.view(&acme.id).expect("view");
        assert!(view.is_active);
        assert!(viewer.view(&paused.id).is_err());
    }
}
