use super::tenant_scope;
use crate::backend::Backend;
use crate::errors::{AppError, AppResult};
use crate::models::{AddPhasePayload, ProjectPhase, RemoveOutcome};
use crate::session::SessionContext;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

/// Asked before a phase is deleted. Returning `false` cancels the removal.
pub trait ConfirmPrompt {
    fn confirm(&self, phase: &ProjectPhase) -> bool;
}

impl<F> ConfirmPrompt for F
where
    F: Fn(&ProjectPhase) -> bool,
{
    fn confirm(&self, phase: &ProjectPhase) -> bool {
        self(phase)
    }
}

pub struct TimelineFacade {
    backend: Backend,
    session: SessionContext,
}

impl TimelineFacade {
    pub fn new(backend: Backend, session: SessionContext) -> Self {
        Self { backend, session }
    }

    /// Ascending by due date.
    pub fn list(&self, client_id: &str) -> AppResult<Vec<ProjectPhase>> {
        let (_, scope) = tenant_scope(&self.backend, &self.session, client_id)?;
        self.backend.db().list_phases(&scope, client_id)
    }

    pub fn get(&self, phase_id: &str) -> AppResult<Option<ProjectPhase>> {
        let principal = self.session.principal()?;
        self.backend.db().get_phase(&principal.scope(), phase_id)
    }

    pub fn add(&self, client_id: &str, payload: AddPhasePayload) -> AppResult<ProjectPhase> {
        let (_, scope) = tenant_scope(&self.backend, &self.session, client_id)?;
        let phase_name = payload.phase_name.trim().to_string();
        if phase_name.is_empty() {
            return Err(AppError::Validation("phase name is required".to_string()));
        }
        self.backend.db().insert_phase(
            &scope,
            client_id,
            &AddPhasePayload {
                phase_name,
                ..payload
            },
        )
    }

    /// Deletes a phase once `prompt` agrees. A phase that is already gone, or
    /// not visible to the session, reports `AlreadyAbsent`.
    pub fn remove(&self, phase_id: &str, prompt: &dyn ConfirmPrompt) -> AppResult<RemoveOutcome> {
        let principal = self.session.principal()?;
        let scope = principal.scope();
        let Some(phase) = self.backend.db().get_phase(&scope, phase_id)? else {
            return Ok(RemoveOutcome::AlreadyAbsent);
        };
        self.backend
            .policy()
            .authorize_tenant(&principal, &phase.client_id)?;

        if !prompt.confirm(&phase) {
            return Ok(RemoveOutcome::Cancelled);
        }
        if self.backend.db().delete_phase(&scope, phase_id)? {
            tracing::info!(phase_id = %phase_id, client_id = %phase.client_id, "project phase removed");
            Ok(RemoveOutcome::Removed)
        } else {
            Ok(RemoveOutcome::AlreadyAbsent)
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemovalTicket {
    pub token: String,
    pub phase_id: String,
    pub phase_name: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PendingRemoval {
    phase_id: String,
    user_id: String,
    expires_at: DateTime<Utc>,
}

/// Two-step confirmation for callers that cannot answer a prompt inline:
/// a ticket is issued first and redeemed by the confirming request.
#[derive(Debug)]
pub struct RemovalChallenges {
    ttl: Duration,
    pending: Mutex<HashMap<String, PendingRemoval>>,
}

impl Default for RemovalChallenges {
    fn default() -> Self {
        Self::new(Duration::minutes(5))
    }
}

impl RemovalChallenges {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn issue(&self, phase: &ProjectPhase, user_id: &str) -> AppResult<RemovalTicket> {
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(rand::random::<[u8; 18]>());
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| AppError::Internal("removal challenge lock poisoned".to_string()))?;
        pending.retain(|_, entry| entry.expires_at > now);
        pending.insert(
            token.clone(),
            PendingRemoval {
                phase_id: phase.id.clone(),
                user_id: user_id.to_string(),
                expires_at,
            },
        );
        Ok(RemovalTicket {
            token,
            phase_id: phase.id.clone(),
            phase_name: phase.phase_name.clone(),
            expires_at,
        })
    }

    /// A prompt that confirms only when `token` was issued to `user_id` for the
    /// phase being removed. The ticket is consumed on a match.
    pub fn prompt<'a>(&'a self, token: &'a str, user_id: &'a str) -> impl ConfirmPrompt + 'a {
        move |phase: &ProjectPhase| self.redeem(token, &phase.id, user_id)
    }

    fn redeem(&self, token: &str, phase_id: &str, user_id: &str) -> bool {
        let Ok(mut pending) = self.pending.lock() else {
            return false;
        };
        let matches = pending.get(token).is_some_and(|entry| {
            entry.phase_id == phase_id && entry.user_id == user_id && entry.expires_at > Utc::now()
        });
        if matches {
            pending.remove(token);
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{backend, member_session, operator_session, seed_client};
    use crate::models::PhaseStatus;
    use chrono::NaiveDate;

    fn phase(name: &str, due: &str, status: PhaseStatus) -> AddPhasePayload {
        AddPhasePayload {
            phase_name: name.to_string(),
            status,
            due_date: NaiveDate::parse_from_str(due, "%Y-%m-%d").expect("date"),
        }
    }

    #[test]
    fn phases_list_by_due_date_with_stored_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend(&dir);
        let acme = seed_client(&backend, "Acme");
        let timeline = TimelineFacade::new(backend, operator_session());

        timeline
            .add(&acme.id, phase("Implementación", "2020-06-01", PhaseStatus::Upcoming))
            .expect("add");
        timeline
            .add(&acme.id, phase("Diagnóstico", "2020-01-15", PhaseStatus::Completed))
            .expect("add");

        let phases = timeline.list(&acme.id).expect("list");
        let names: Vec<&str> = phases.iter().map(|p| p.phase_name.as_str()).collect();
        assert_eq!(names, vec!["Diagnóstico", "Implementación"]);
        // Past due date, status stays as entered.
        assert_eq!(phases[1].status, PhaseStatus::Upcoming);
        assert!(timeline.add(&acme.id, phase("  ", "2020-01-01", PhaseStatus::Current)).is_err());
    }

    #[test]
    fn remove_requires_confirmation_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend(&dir);
        let acme = seed_client(&backend, "Acme");
        let timeline = TimelineFacade::new(backend, operator_session());
        let kickoff = timeline
            .add(&acme.id, phase("Kickoff", "2025-01-10", PhaseStatus::Current))
            .expect("add");

        let declined = timeline.remove(&kickoff.id, &|_: &ProjectPhase| false).expect("decline");
        assert_eq!(declined, RemoveOutcome::Cancelled);
        assert_eq!(timeline.list(&acme.id).expect("list").len(), 1);

        let removed = timeline.remove(&kickoff.id, &|_: &ProjectPhase| true).expect("remove");
        assert_eq!(removed, RemoveOutcome::Removed);
        assert!(timeline.list(&acme.id).expect("list").is_empty());

        let again = timeline.remove(&kickoff.id, &|_: &ProjectPhase| true).expect("again");
        assert_eq!(again, RemoveOutcome::AlreadyAbsent);
    }

    #[test]
    fn member_cannot_remove_foreign_phase() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend(&dir);
        let acme = seed_client(&backend, "Acme");
        let globex = seed_client(&backend, "Globex");
        let foreign = TimelineFacade::new(backend.clone(), operator_session())
            .add(&globex.id, phase("Cierre", "2025-05-01", PhaseStatus::Upcoming))
            .expect("add");

        let member = TimelineFacade::new(backend.clone(), member_session(&acme.id));
        let outcome = member.remove(&foreign.id, &|_: &ProjectPhase| true).expect("remove");
        assert_eq!(outcome, RemoveOutcome::AlreadyAbsent);
        assert!(TimelineFacade::new(backend, operator_session())
            .get(&foreign.id)
            .expect("get")
            .is_some());
    }

    #[test]
    fn challenge_tickets_confirm_once_for_matching_phase() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend(&dir);
        let acme = seed_client(&backend, "Acme");
        let timeline = TimelineFacade::new(backend, operator_session());
        let first = timeline
            .add(&acme.id, phase("Uno", "2025-01-01", PhaseStatus::Upcoming))
            .expect("add");
        let second = timeline
            .add(&acme.id, phase("Dos", "2025-02-01", PhaseStatus::Upcoming))
            .expect("add");

        let challenges = RemovalChallenges::default();
        let ticket = challenges.issue(&first, "operator").expect("ticket");

        let wrong_phase = timeline
            .remove(&second.id, &challenges.prompt(&ticket.token, "operator"))
            .expect("remove");
        assert_eq!(wrong_phase, RemoveOutcome::Cancelled);

        let wrong_user = timeline
            .remove(&first.id, &challenges.prompt(&ticket.token, "someone-else"))
            .expect("remove");
        assert_eq!(wrong_user, RemoveOutcome::Cancelled);

        let removed = timeline
            .remove(&first.id, &challenges.prompt(&ticket.token, "operator"))
            .expect("remove");
        assert_eq!(removed, RemoveOutcome::Removed);

        let reissued = challenges.issue(&second, "operator").expect("ticket");
        challenges.redeem(&reissued.token, &second.id, "operator");
        let reused = timeline
            .remove(&second.id, &challenges.prompt(&reissued.token, "operator"))
            .expect("remove");
        assert_eq!(reused, RemoveOutcome::Cancelled);
    }
}
