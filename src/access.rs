use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Who is acting. Resolved once at sign-in from the auth user and its tenant link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Principal {
    Operator { user_id: String },
    Member { user_id: String, client_id: Option<String> },
}

impl Principal {
    pub fn user_id(&self) -> &str {
        match self {
            Self::Operator { user_id } | Self::Member { user_id, .. } => user_id,
        }
    }

    pub fn client_id(&self) -> Option<&str> {
        match self {
            Self::Operator { .. } => None,
            Self::Member { client_id, .. } => client_id.as_deref(),
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(self, Self::Operator { .. })
    }

    pub fn scope(&self) -> TenantScope {
        match self {
            Self::Operator { .. } => TenantScope::All,
            Self::Member {
                client_id: Some(client_id),
                ..
            } => TenantScope::Tenant(client_id.clone()),
            Self::Member { client_id: None, .. } => TenantScope::Empty,
        }
    }
}

/// Row visibility applied by the store to every tenant-scoped statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    All,
    Tenant(String),
    Empty,
}

const NO_TENANT: &str = "";

impl TenantScope {
    pub fn allows(&self, client_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Tenant(own) => own == client_id,
            Self::Empty => false,
        }
    }

    /// Bound into `(?N IS NULL OR client_id = ?N)`; the empty id never matches a row.
    pub fn client_filter(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Tenant(own) => Some(own.as_str()),
            Self::Empty => Some(NO_TENANT),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccessPolicy;

impl AccessPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn authorize_tenant(&self, principal: &Principal, client_id: &str) -> AppResult<()> {
        if principal.scope().allows(client_id) {
            return Ok(());
        }
        Err(AppError::Policy(format!(
            "user {} may not access tenant {}",
            principal.user_id(),
            client_id
        )))
    }

    pub fn authorize_operator(&self, principal: &Principal, action: &str) -> AppResult<()> {
        if principal.is_operator() {
            return Ok(());
        }
        Err(AppError::Policy(format!("{} requires an operator session", action)))
    }
}
