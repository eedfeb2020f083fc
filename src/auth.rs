use crate::access::Principal;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{AuthUser, UserRole};
use crate::session::{SessionContext, LOGIN_ROUTE};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::Engine;
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use std::sync::Arc;

const MIN_PASSWORD_LEN: usize = 8;
const PROTECTED_PREFIXES: [&str; 2] = ["/dashboard", "/admin"];

static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| hash_password("portal-sign-in-placeholder").ok());

/// Email/password identities and the sessions issued for them.
#[derive(Debug, Clone)]
pub struct AuthService {
    db: Arc<Database>,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(db: Arc<Database>, session_ttl: Duration) -> Self {
        Self { db, session_ttl }
    }

    pub fn register(&self, email: &str, password: &str, role: UserRole) -> AppResult<AuthUser> {
        let email = normalize_email(email);
        if !email.contains('@') {
            return Err(AppError::Validation(format!("invalid email address: {}", email)));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "password must have at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.db.find_user_by_email(&email)?.is_some() {
            return Err(AppError::Validation(format!("user {} already exists", email)));
        }

        let hash = hash_password(password)?;
        let user = self.db.insert_user(&email, &hash, role)?;
        tracing::info!(user_id = %user.id, role = role.as_str(), "auth user registered");
        Ok(user)
    }

    pub fn sign_in(&self, email: &str, password: &str) -> AppResult<SessionContext> {
        let invalid = || AppError::Unauthenticated("invalid credentials".to_string());
        let Some((user, stored_hash)) = self.db.find_user_by_email(&normalize_email(email))? else {
            // Same argon2 cost as a real mismatch, so unknown emails are not
            // distinguishable by response time.
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify_password(password, dummy);
            }
            return Err(invalid());
        };
        if !verify_password(password, &stored_hash)? {
            tracing::warn!(user_id = %user.id, "sign-in rejected");
            return Err(invalid());
        }

        let principal = self.resolve_principal(&user)?;
        let expires_at = Utc::now()
            .checked_add_signed(self.session_ttl)
            .ok_or_else(|| AppError::Validation("session ttl is out of range".to_string()))?;
        let token = new_session_token();
        self.db.insert_session(&token, &user.id, expires_at)?;
        tracing::info!(user_id = %user.id, operator = principal.is_operator(), "session opened");
        Ok(SessionContext::signed_in(token, principal))
    }

    /// Looks up a session token. Unknown or expired tokens yield an anonymous session.
    pub fn resolve(&self, token: &str) -> AppResult<SessionContext> {
        let Some(record) = self.db.find_session(token)? else {
            return Ok(SessionContext::anonymous());
        };
        if record.expires_at <= Utc::now() {
            self.db.delete_session(token)?;
            return Ok(SessionContext::anonymous());
        }
        let Some(user) = self.db.get_user(&record.user_id)? else {
            self.db.delete_session(token)?;
            return Ok(SessionContext::anonymous());
        };
        let principal = self.resolve_principal(&user)?;
        Ok(SessionContext::signed_in(record.token, principal))
    }

    pub fn sign_out(&self, session: &SessionContext) -> AppResult<()> {
        if let Some(token) = session.token() {
            self.db.delete_session(token)?;
        }
        session.mark_signed_out();
        Ok(())
    }

    pub fn resolve_principal(&self, user: &AuthUser) -> AppResult<Principal> {
        match user.role {
            UserRole::Operator => Ok(Principal::Operator {
                user_id: user.id.clone(),
            }),
            UserRole::Member => {
                let client = self.db.find_client_by_auth_user(&user.id)?;
                Ok(Principal::Member {
                    user_id: user.id.clone(),
                    client_id: client.map(|client| client.id),
                })
            }
        }
    }

    pub fn purge_expired(&self) -> AppResult<u64> {
        self.db.purge_expired_sessions(Utc::now())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Redirect(&'static str),
}

/// Route guard for the private pages. Session presence is the only check.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthGate;

impl AuthGate {
    pub fn is_protected(path: &str) -> bool {
        PROTECTED_PREFIXES.iter().any(|prefix| {
            path == *prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn check(path: &str, session: &SessionContext) -> GateDecision {
        if Self::is_protected(path) && !session.is_signed_in() {
            GateDecision::Redirect(LOGIN_ROUTE)
        } else {
            GateDecision::Allow
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn new_session_token() -> String {
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|error| AppError::Internal(error.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| AppError::Internal(error.to_string()))
}

fn verify_password(password: &str, stored_hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|error| AppError::Internal(error.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
