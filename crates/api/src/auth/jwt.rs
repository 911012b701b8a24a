//! Supabase access token verification

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use propvest_shared::UserId;

use super::check::RedirectReason;
use super::middleware::AuthUser;

/// Audience Supabase puts on tokens of signed-in users
pub const SUPABASE_AUDIENCE: &str = "authenticated";

/// Claims we read from a Supabase access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn with_supabase_secret(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[SUPABASE_AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "sub", "aud"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Validate `token` and extract the user it belongs to
    pub fn verify(&self, token: &str) -> Result<AuthUser, RedirectReason> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => RedirectReason::ExpiredToken,
                _ => {
                    tracing::debug!(error = %e, "Rejected access token");
                    RedirectReason::InvalidToken
                }
            }
        })?;

        let user_id = UserId::parse(&data.claims.sub).ok_or(RedirectReason::InvalidToken)?;

        Ok(AuthUser {
            user_id,
            email: data.claims.email,
        })
    }
}
