//! Access gating for the editor.
//!
//! [`SharedSecretGate`] is a plain string comparison against one shared
//! secret. It is a gate, not authentication: nothing is hashed, attempts are
//! not rate limited and the signed-in state lives only in memory. Swap in
//! another [`AccessGate`] to validate real credentials.

use std::env;
use std::fmt;

use thiserror::Error;

use crate::session::EditSession;

pub const DEFAULT_SHARED_SECRET: &str = "213213213";
pub const ACCESS_SECRET_ENV: &str = "IDPHOTO_ACCESS_SECRET";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("access rejected")]
    Rejected,
}

impl AccessError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AccessError::Rejected => "Incorrect password. Please try again.",
        }
    }
}

pub trait AccessGate: Send + Sync {
    fn verify(&self, password: &str) -> Result<(), AccessError>;
}

#[derive(Clone)]
pub struct SharedSecretGate {
    secret: String,
}

impl SharedSecretGate {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Uses `IDPHOTO_ACCESS_SECRET` when set, the built-in secret otherwise.
    pub fn from_env() -> Self {
        env::var(ACCESS_SECRET_ENV)
            .ok()
            .filter(|value| !value.is_empty())
            .map(Self::new)
            .unwrap_or_default()
    }
}

impl Default for SharedSecretGate {
    fn default() -> Self {
        Self::new(DEFAULT_SHARED_SECRET)
    }
}

impl fmt::Debug for SharedSecretGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecretGate")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl AccessGate for SharedSecretGate {
    fn verify(&self, password: &str) -> Result<(), AccessError> {
        if password == self.secret {
            Ok(())
        } else {
            Err(AccessError::Rejected)
        }
    }
}

/// Password field and error line of the sign-in prompt.
#[derive(Debug, Default)]
pub struct LoginForm {
    password: String,
    error: Option<String>,
}

impl LoginForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Submits the typed password. The field is cleared either way.
    pub fn submit(&mut self, session: &mut EditSession) -> bool {
        let password = std::mem::take(&mut self.password);
        if session.on_login(&password) {
            self.error = None;
            true
        } else {
            self.error = Some(AccessError::Rejected.user_message().to_string());
            false
        }
    }
}
