//! Per-request authentication state
//!
//! Each request owns its own `AuthCheck`, so concurrent requests can never
//! observe each other's progress.
//!
//! ```text
//! Idle -> Checking -> Confirmed(user)
//!                  -> Redirecting(reason)
//! ```

use super::middleware::AuthUser;

/// Why an unauthenticated caller is sent to the login page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    MissingToken,
    InvalidToken,
    ExpiredToken,
}

impl RedirectReason {
    pub fn message(&self) -> &'static str {
        match self {
            RedirectReason::MissingToken => "Authentication required",
            RedirectReason::InvalidToken => "Invalid authentication token",
            RedirectReason::ExpiredToken => "Authentication token expired",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthCheck {
    #[default]
    Idle,
    Checking,
    Confirmed(AuthUser),
    Redirecting(RedirectReason),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal auth transition: {from} -> {to}")]
pub struct IllegalTransition {
    pub from: &'static str,
    pub to: &'static str,
}

impl AuthCheck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            AuthCheck::Idle => "idle",
            AuthCheck::Checking => "checking",
            AuthCheck::Confirmed(_) => "confirmed",
            AuthCheck::Redirecting(_) => "redirecting",
        }
    }

    /// Idle -> Checking
    pub fn begin(self) -> Result<Self, IllegalTransition> {
        match self {
            AuthCheck::Idle => Ok(AuthCheck::Checking),
            other => Err(other.illegal("checking")),
        }
    }

    /// Checking -> Confirmed
    pub fn confirm(self, user: AuthUser) -> Result<Self, IllegalTransition> {
        match self {
            AuthCheck::Checking => Ok(AuthCheck::Confirmed(user)),
            other => Err(other.illegal("confirmed")),
        }
    }

    /// Checking -> Redirecting
    pub fn redirect(self, reason: RedirectReason) -> Result<Self, IllegalTransition> {
        match self {
            AuthCheck::Checking => Ok(AuthCheck::Redirecting(reason)),
            other => Err(other.illegal("redirecting")),
        }
    }

    fn illegal(&self, to: &'static str) -> IllegalTransition {
        IllegalTransition {
            from: self.state_name(),
            to,
        }
    }
}
