//! Identity verification boundary.
//!
//! The controller never mints identities; it verifies tokens issued by the
//! platform's identity provider, once per connection handshake and once per
//! administrative HTTP call. Structural failures are rejected at this
//! boundary and never reach routing or lifecycle logic.

use crate::errors::SignalingError;
use async_trait::async_trait;
use common::secret::SecretString;
use common::token::{self, TokenError};
use std::collections::HashMap;
use tracing::debug;

/// A successfully verified identity claim.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub user_id: String,
    pub role: String,
}

/// External identity verifier consumed by the handshake and admin surface.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a bearer token and return the claimed identity.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` with a generic message on any failure; the precise
    /// reason is logged at debug level only.
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, SignalingError>;
}

/// Verifies HS256 tokens against the shared signing secret.
pub struct JwtVerifier {
    secret: SecretString,
}

impl JwtVerifier {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, SignalingError> {
        match token::decode_hs256(token, &self.secret) {
            Ok(claims) => Ok(VerifiedIdentity {
                user_id: claims.sub,
                role: claims.role,
            }),
            Err(e) => {
                debug!(
                    target: "sc.auth",
                    reason = ?e,
                    "Token rejected"
                );
                Err(SignalingError::Unauthenticated(
                    TokenError::InvalidToken.to_string(),
                ))
            }
        }
    }
}

/// Fixed token table for local development and tests.
///
/// Maps literal token strings to identities; anything else is rejected.
#[derive(Debug, Default)]
pub struct StaticVerifier {
    tokens: HashMap<String, VerifiedIdentity>,
}

impl StaticVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(mut self, token: &str, user_id: &str, role: &str) -> Self {
        self.tokens.insert(
            token.to_string(),
            VerifiedIdentity {
                user_id: user_id.to_string(),
                role: role.to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, SignalingError> {
        self.tokens.get(token).cloned().ok_or_else(|| {
            SignalingError::Unauthenticated(TokenError::InvalidToken.to_string())
        })
    }
}
