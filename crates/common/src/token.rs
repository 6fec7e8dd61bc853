//! Access-token claims and validation helpers.
//!
//! The signaling controller trusts an external identity provider that issues
//! short-lived HS256 tokens carrying the caller's user id and role. This
//! module holds the pieces both the connection handshake and the
//! administrative HTTP surface need:
//!
//! - a size cap applied BEFORE any parsing or cryptographic work
//! - the claims structure (`sub` redacted in Debug output)
//! - HS256 decoding with `exp`/`iat` checks
//!
//! Error messages are intentionally generic; the reason a token was rejected
//! is logged at debug level server-side, never returned to the caller.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Maximum accepted token size in bytes.
///
/// Typical tokens are a few hundred bytes; anything near this limit is
/// hostile or broken. Checked before base64 decoding so oversized input is
/// rejected with minimal work.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

/// Clock skew tolerance for `exp`/`iat` validation (5 minutes).
pub const CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Errors produced while validating an access token.
///
/// All variants render the same client-facing message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Token exceeds [`MAX_TOKEN_SIZE_BYTES`].
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token failed structural or signature validation, or has expired.
    #[error("The access token is invalid or expired")]
    InvalidToken,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IssuedInFuture,
}

/// Claims carried by a caller's access token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the caller's user id. Redacted in Debug output.
    pub sub: String,

    /// Caller role as asserted by the identity provider
    /// (e.g. "clinician", "patient", "admin"). Informational for signaling;
    /// enforced only on the administrative surface.
    pub role: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,
}

impl fmt::Debug for AccessClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessClaims")
            .field("sub", &"[REDACTED]")
            .field("role", &self.role)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .finish()
    }
}

/// Decode and validate an HS256 access token.
///
/// Checks, in order: size cap, signature + `exp` (with [`CLOCK_SKEW`]
/// leeway), then `iat` not further than the skew into the future.
///
/// # Errors
///
/// Returns a [`TokenError`] with a generic message on any failure.
pub fn decode_hs256(token: &str, secret: &SecretString) -> Result<AccessClaims, TokenError> {
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        return Err(TokenError::TokenTooLarge);
    }

    let key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = CLOCK_SKEW.as_secs();

    let data = jsonwebtoken::decode::<AccessClaims>(token, &key, &validation)
        .map_err(|_| TokenError::InvalidToken)?;

    validate_iat(data.claims.iat)?;

    Ok(data.claims)
}

/// Reject tokens whose `iat` lies more than [`CLOCK_SKEW`] in the future.
fn validate_iat(iat: i64) -> Result<(), TokenError> {
    let now = Utc::now().timestamp();
    let skew = i64::try_from(CLOCK_SKEW.as_secs()).unwrap_or(i64::MAX);
    if iat > now + skew {
        return Err(TokenError::IssuedInFuture);
    }
    Ok(())
}
