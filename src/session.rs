use crate::access::Principal;
use crate::errors::{AppError, AppResult};
use std::sync::Arc;
use tokio::sync::watch;

pub const LOGIN_ROUTE: &str = "/login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    SignedIn(Principal),
    SignedOut,
}

#[derive(Debug)]
struct SessionInner {
    token: Option<String>,
    state: watch::Sender<SessionState>,
}

/// Explicit session handed to every facade. Clones share state, so a sign-out
/// through one handle is observed by all subscribers.
#[derive(Debug, Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

impl SessionContext {
    pub fn signed_in(token: impl Into<String>, principal: Principal) -> Self {
        let (state, _) = watch::channel(SessionState::SignedIn(principal));
        Self {
            inner: Arc::new(SessionInner {
                token: Some(token.into()),
                state,
            }),
        }
    }

    /// Operator session for local administration from the command line. It has
    /// no backing token row.
    pub fn maintenance() -> Self {
        Self::signed_in(
            "local-maintenance",
            Principal::Operator {
                user_id: "local-maintenance".to_string(),
            },
        )
    }

    pub fn anonymous() -> Self {
        let (state, _) = watch::channel(SessionState::SignedOut);
        Self {
            inner: Arc::new(SessionInner { token: None, state }),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.inner.token.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(*self.inner.state.borrow(), SessionState::SignedIn(_))
    }

    pub fn current_principal(&self) -> Option<Principal> {
        match &*self.inner.state.borrow() {
            SessionState::SignedIn(principal) => Some(principal.clone()),
            SessionState::SignedOut => None,
        }
    }

    pub fn principal(&self) -> AppResult<Principal> {
        self.current_principal()
            .ok_or_else(|| AppError::Unauthenticated("sign in to continue".to_string()))
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub(crate) fn mark_signed_out(&self) {
        self.inner.state.send_replace(SessionState::SignedOut);
    }
}

/// Resolves once the session signs out, yielding the route to navigate to.
pub async fn wait_for_sign_out(mut receiver: watch::Receiver<SessionState>) -> &'static str {
    // A dropped sender means the session is gone, which navigates the same way.
    let _ = receiver
        .wait_for(|state| matches!(state, SessionState::SignedOut))
        .await;
    LOGIN_ROUTE
}
