//! JWT Claims structure
//!
//! Payload of an access token: identity, role and the standard
//! `iat`/`exp`/`iss`/`jti` claims (RFC 7519).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AuthError};

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// External-facing user number
    pub user_number: String,
    pub role: String,
    /// Unique token ID, for audit correlation only
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    pub fn new(
        user_id: Uuid,
        user_number: String,
        role: String,
        issued_at: i64,
        expiry_seconds: i64,
        issuer: String,
    ) -> Self {
        Self {
            sub: user_id.to_string(),
            user_number,
            role,
            jti: Uuid::new_v4().to_string(),
            iat: issued_at,
            exp: issued_at + expiry_seconds,
            iss: issuer,
        }
    }

    /// Extract user ID from claims
    ///
    /// # Errors
    /// Returns `InvalidToken` if the subject is not a valid UUID
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidToken.into())
    }

    /// Checks the `iat <= now <= exp` window. Both ends are inclusive.
    pub fn check_time_window(&self, now: i64) -> Result<(), AuthError> {
        if now > self.exp {
            return Err(AuthError::TokenExpired);
        }
        if now < self.iat {
            return Err(AuthError::TokenNotYetValid);
        }
        Ok(())
    }

    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|role| *role == self.role)
    }
}
