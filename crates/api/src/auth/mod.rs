//! Authentication module for Propvest

pub mod check;
pub mod jwt;
pub mod middleware;

pub use check::{AuthCheck, IllegalTransition, RedirectReason};
pub use jwt::{Claims, JwtVerifier};
pub use middleware::{authenticate, require_auth, AuthError, AuthState, AuthUser, LOGIN_PATH};
