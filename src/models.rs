use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const ALL_CATEGORIES: &str = "Todos";
pub const DEFAULT_DOCUMENT_CATEGORY: &str = "General";
pub const DOCUMENT_CATEGORIES: [&str; 6] = [
    ALL_CATEGORIES,
    "Presupuesto",
    "Forecast",
    "Matriz",
    "Entregable",
    DEFAULT_DOCUMENT_CATEGORY,
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub company_name: String,
    pub avatar_url: Option<String>,
    pub subscription_status: Option<String>,
    pub service_level: Option<String>,
    pub subscription_end_date: Option<NaiveDate>,
    pub auth_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientPayload {
    pub company_name: String,
    pub subscription_status: Option<String>,
    pub service_level: Option<String>,
    pub subscription_end_date: Option<NaiveDate>,
    pub auth_user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub client_id: String,
    pub name: String,
    pub file_type: String,
    pub file_url: String,
    pub storage_path: Option<String>,
    pub category: String,
    pub is_external_link: bool,
    pub uploaded_at: DateTime<Utc>,
    pub description: Option<String>,
}

/// How the dashboard presents a document when the user opens it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DocumentAction {
    View { url: String },
    Download { url: String, file_name: String },
    OpenExternal { url: String },
}

impl Document {
    pub fn is_pdf(&self) -> bool {
        self.file_type == "PDF" || self.name.to_lowercase().ends_with(".pdf")
    }

    pub fn action(&self) -> DocumentAction {
        if self.is_external_link {
            DocumentAction::OpenExternal {
                url: self.file_url.clone(),
            }
        } else if self.is_pdf() {
            DocumentAction::View {
                url: self.file_url.clone(),
            }
        } else {
            DocumentAction::Download {
                url: self.file_url.clone(),
                file_name: self.name.clone(),
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileUpload {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn extension(&self) -> Option<&str> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            None
        } else {
            Some(ext)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploadOptions {
    pub category: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkDocumentPayload {
    pub name: String,
    pub url: String,
    pub category: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinancialMetric {
    pub id: String,
    pub client_id: String,
    pub month: NaiveDate,
    pub revenue: f64,
    pub margin_percent: f64,
    pub ebitda: f64,
    pub cash_flow: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetricPayload {
    pub month: NaiveDate,
    pub revenue: f64,
    pub margin_percent: f64,
    pub ebitda: f64,
    pub cash_flow: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub label: String,
    pub month: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KpiSnapshot {
    pub margin_percent: f64,
    pub ebitda: f64,
    pub cash_flow: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetricSeries {
    pub margin: Vec<ChartPoint>,
    pub cash_flow: Vec<ChartPoint>,
    pub current: Option<KpiSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseStatus {
    #[default]
    Upcoming,
    Current,
    Completed,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Current => "current",
            Self::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "upcoming" => Some(Self::Upcoming),
            "current" => Some(Self::Current),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPhase {
    pub id: String,
    pub client_id: String,
    pub phase_name: String,
    pub status: PhaseStatus,
    pub due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPhasePayload {
    pub phase_name: String,
    #[serde(default)]
    pub status: PhaseStatus,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoveOutcome {
    Removed,
    AlreadyAbsent,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormType {
    #[serde(rename = "INICIAL")]
    Inicial,
    #[serde(rename = "PRICING")]
    Pricing,
}

impl FormType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inicial => "INICIAL",
            Self::Pricing => "PRICING",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "INICIAL" => Some(Self::Inicial),
            "PRICING" => Some(Self::Pricing),
            _ => None,
        }
    }

    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::Inicial => &["empresa", "industria", "facturacion", "desafio"],
            Self::Pricing => &["nombre", "estrategia_pricing", "ultima_alza", "decision_descuentos"],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitialAssessment {
    pub empresa: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub industria: String,
    pub facturacion: String,
    pub desafio: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricingQuestionnaire {
    pub nombre: String,
    pub estrategia_pricing: String,
    pub ultima_alza: String,
    pub decision_descuentos: String,
}

/// Stored form payload. Rows that no longer match their form's shape are kept raw.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum FormData {
    Inicial(InitialAssessment),
    Pricing(PricingQuestionnaire),
    Raw(Map<String, Value>),
}

impl FormData {
    pub fn decode(form_type: FormType, value: Value) -> Self {
        let typed = match form_type {
            FormType::Inicial => serde_json::from_value::<InitialAssessment>(value.clone()).map(Self::Inicial),
            FormType::Pricing => serde_json::from_value::<PricingQuestionnaire>(value.clone()).map(Self::Pricing),
        };
        match typed {
            Ok(data) => data,
            Err(_) => match value {
                Value::Object(map) => Self::Raw(map),
                other => {
                    let mut map = Map::new();
                    map.insert("value".to_string(), other);
                    Self::Raw(map)
                }
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmission {
    pub id: String,
    pub form_type: FormType,
    pub data: FormData,
    pub user_id: Option<String>,
    pub status: String,
    pub file_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub item: String,
    pub error: String,
}

/// Per-item result of a best-effort batch (multi-file upload, content import).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn record_success(&mut self, item: impl Into<String>) {
        self.succeeded.push(item.into());
    }

    pub fn record_failure(&mut self, item: impl Into<String>, error: impl std::fmt::Display) {
        self.failed.push(BatchFailure {
            item: item.into(),
            error: error.to_string(),
        });
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntakeReceipt {
    pub submission: FormSubmission,
    pub uploads: BatchOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKey {
    Hero,
    Bio,
    Cases,
    Services,
}

impl ContentKey {
    pub const ALL: [ContentKey; 4] = [Self::Hero, Self::Services, Self::Cases, Self::Bio];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hero => "hero",
            Self::Bio => "bio",
            Self::Cases => "cases",
            Self::Services => "services",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "hero" => Some(Self::Hero),
            "bio" => Some(Self::Bio),
            "cases" => Some(Self::Cases),
            "services" => Some(Self::Services),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct HeroContent {
    pub tagline: String,
    pub title: String,
    pub subtitle: String,
    pub cta_primary: String,
    pub cta_secondary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct BioContent {
    pub name: String,
    pub role: String,
    pub description: String,
    pub linkedin: String,
    pub email: String,
    pub initials: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CaseStudy {
    pub title: String,
    pub description: String,
    pub metric_value: String,
    pub metric_label: String,
    pub time_value: String,
    pub time_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ServiceOffering {
    pub icon: String,
    pub title: String,
    pub description: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SiteSection {
    Hero(HeroContent),
    Bio(BioContent),
    Cases(Vec<CaseStudy>),
    Services(Vec<ServiceOffering>),
    Raw { key: String, content: Value },
}

impl SiteSection {
    pub fn decode(key: &str, content: Value) -> Self {
        let typed = match ContentKey::parse(key) {
            Some(ContentKey::Hero) => serde_json::from_value(content.clone()).map(Self::Hero).ok(),
            Some(ContentKey::Bio) => serde_json::from_value(content.clone()).map(Self::Bio).ok(),
            Some(ContentKey::Cases) => serde_json::from_value(content.clone()).map(Self::Cases).ok(),
            Some(ContentKey::Services) => serde_json::from_value(content.clone()).map(Self::Services).ok(),
            None => None,
        };
        typed.unwrap_or_else(|| Self::Raw {
            key: key.to_string(),
            content,
        })
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Hero(_) => ContentKey::Hero.as_str(),
            Self::Bio(_) => ContentKey::Bio.as_str(),
            Self::Cases(_) => ContentKey::Cases.as_str(),
            Self::Services(_) => ContentKey::Services.as_str(),
            Self::Raw { key, .. } => key,
        }
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            Self::Hero(hero) => serde_json::to_value(hero),
            Self::Bio(bio) => serde_json::to_value(bio),
            Self::Cases(cases) => serde_json::to_value(cases),
            Self::Services(services) => serde_json::to_value(services),
            Self::Raw { content, .. } => Ok(content.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SiteContentEntry {
    pub key: String,
    pub content: Value,
    pub updated_at: DateTime<Utc>,
}

/// Everything the marketing home page renders.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct SiteContentBundle {
    pub hero: HeroContent,
    pub services: Vec<ServiceOffering>,
    pub cases: Vec<CaseStudy>,
    pub bio: BioContent,
    pub extra: BTreeMap<String, Value>,
}

impl SiteContentBundle {
    /// Replaces the matching section; sections that fail to decode land in `extra`.
    pub fn overlay(&mut self, key: &str, content: Value) {
        match SiteSection::decode(key, content) {
            SiteSection::Hero(hero) => self.hero = hero,
            SiteSection::Bio(bio) => self.bio = bio,
            SiteSection::Cases(cases) => self.cases = cases,
            SiteSection::Services(services) => self.services = services,
            SiteSection::Raw { key, content } => {
                self.extra.insert(key, content);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UserRole {
    Operator,
    #[default]
    Member,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::Member => "member",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "operator" => Some(Self::Operator),
            "member" => Some(Self::Member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
