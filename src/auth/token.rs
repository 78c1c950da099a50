//! Signed bearer tokens.

use crate::db::User;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: String,
    /// Username at issue time.
    pub username: String,
    /// Role at issue time.
    pub role: String,
    /// Whether the user was an author at issue time.
    pub is_author: bool,
    /// Issued-at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
    /// Token ID, used for revocation.
    pub jti: String,
}

/// Token verification failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Malformed, badly signed or missing claims.
    #[error("Invalid token")]
    Invalid,

    /// Past its expiry.
    #[error("Token has expired")]
    Expired,

    /// Revoked by logout.
    #[error("Token has been revoked")]
    Revoked,
}

/// A freshly issued token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Encoded JWT.
    pub token: String,
    /// Decoded claims.
    pub claims: Claims,
}

/// HS256 token issuer and verifier.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: i64,
}

impl TokenIssuer {
    /// Create an issuer from a shared secret and token lifetime.
    pub fn new(secret: &[u8], ttl_seconds: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_seconds,
        }
    }

    /// Token lifetime in seconds.
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Issue a token for `user`, valid from `now`.
    pub fn issue_at(&self, user: &User, now: i64) -> Result<IssuedToken, TokenError> {
        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            role: user.role.clone(),
            is_author: user.is_author,
            iat: now,
            exp: now + self.ttl_seconds,
            jti: uuid::Uuid::new_v4().simple().to_string(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to sign token");
                TokenError::Invalid
            })?;

        Ok(IssuedToken { token, claims })
    }

    /// Check signature and expiry against `now`.
    ///
    /// Revocation is not consulted here; see `AuthService::verify_token`.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| TokenError::Invalid)?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

/// Deterministic time checks on decoded claims.
pub fn validate_claims(claims: &Claims, now: i64) -> Result<(), TokenError> {
    if claims.exp <= claims.iat || claims.jti.is_empty() || claims.sub.is_empty() {
        return Err(TokenError::Invalid);
    }
    if now >= claims.exp {
        return Err(TokenError::Expired);
    }
    Ok(())
}
