//! Thin facades invoked by the HTTP handlers. Each one is built per request
//! from the shared [`Backend`](crate::backend::Backend) and the caller's
//! [`SessionContext`](crate::session::SessionContext).

pub mod clients;
pub mod content;
pub mod contract;
pub mod documents;
pub mod intake;
pub mod metrics;
pub mod timeline;

pub use clients::ClientDirectory;
pub use content::SiteContentStore;
pub use contract::{ContractView, ContractViewer};
pub use documents::{filter_by_category, DocumentRepository};
pub use intake::IntakeService;
pub use metrics::{build_series, month_label, MetricsFacade};
pub use timeline::{ConfirmPrompt, RemovalChallenges, RemovalTicket, TimelineFacade};

use crate::access::{Principal, TenantScope};
use crate::backend::Backend;
use crate::errors::AppResult;
use crate::session::SessionContext;
use rand::distr::Alphanumeric;
use rand::Rng;

/// Resolves the caller and checks it may act on `client_id`.
fn tenant_scope(backend: &Backend, session: &SessionContext, client_id: &str) -> AppResult<(Principal, TenantScope)> {
    let principal = session.principal()?;
    backend.policy().authorize_tenant(&principal, client_id)?;
    let scope = principal.scope();
    Ok((principal, scope))
}

fn operator(backend: &Backend, session: &SessionContext, action: &str) -> AppResult<Principal> {
    let principal = session.principal()?;
    backend.policy().authorize_operator(&principal, action)?;
    Ok(principal)
}

fn random_suffix(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|byte| char::from(byte).to_ascii_lowercase())
        .collect()
}
