//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use propvest_shared::UserId;

use super::check::{AuthCheck, IllegalTransition, RedirectReason};
use super::jwt::JwtVerifier;

/// Where the frontend sends callers that fail the auth check
pub const LOGIN_PATH: &str = "/login";

/// Authenticated user extracted from a Supabase access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: UserId,
    pub email: Option<String>,
}

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt: JwtVerifier,
}

/// Extract bearer token from the Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Run a fresh auth check for one request
pub fn authenticate(auth_state: &AuthState, headers: &HeaderMap) -> Result<AuthCheck, IllegalTransition> {
    let check = AuthCheck::new().begin()?;

    match extract_bearer_token(headers) {
        None => check.redirect(RedirectReason::MissingToken),
        Some(token) => match auth_state.jwt.verify(token) {
            Ok(user) => check.confirm(user),
            Err(reason) => check.redirect(reason),
        },
    }
}

/// Middleware that requires authentication
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let check = match authenticate(&auth_state, request.headers()) {
        Ok(check) => check,
        Err(e) => return AuthError::Internal(e.to_string()).into_response(),
    };

    match check {
        AuthCheck::Confirmed(auth_user) => {
            tracing::debug!(
                path = %path,
                user_id = %auth_user.user_id,
                "require_auth: authentication successful"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        AuthCheck::Redirecting(reason) => {
            tracing::info!(path = %path, reason = ?reason, "require_auth: redirecting to login");
            AuthError::Redirect(reason).into_response()
        }
        other => AuthError::Internal(format!("auth check ended in {}", other.state_name()))
            .into_response(),
    }
}

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{}", .0.message())]
    Redirect(RedirectReason),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Redirect(reason) => {
                let body = Json(json!({
                    "error": reason.message(),
                    "redirect": LOGIN_PATH,
                }));
                (StatusCode::UNAUTHORIZED, body).into_response()
            }
            AuthError::Internal(e) => {
                tracing::error!(error = %e, "Auth check failed");
                let body = Json(json!({ "error": "Internal server error" }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}
