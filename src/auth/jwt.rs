//! JWT Token Generation and Validation
//!
//! Access tokens are HS256-signed and stateless. They cannot be revoked
//! individually; they simply expire.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::clock::Clock;
use crate::configuration::AuthSettings;
use crate::error::{AppError, AuthError};

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: String,
    pub claims: Claims,
}

impl IssuedAccessToken {
    /// The token's own `exp` claim.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.claims.exp, 0).unwrap_or_default()
    }
}

pub trait AccessTokenCodec: Send + Sync {
    fn issue(
        &self,
        user_id: Uuid,
        user_number: &str,
        role: &str,
    ) -> Result<IssuedAccessToken, AppError>;

    /// Verify signature, algorithm, issuer and the `iat..=exp` window.
    fn validate(&self, token: &str) -> Result<Claims, AppError>;
}

pub struct JwtCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime_seconds: i64,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl JwtCodec {
    pub fn new(
        secret: &[u8],
        lifetime_seconds: i64,
        issuer: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetime_seconds,
            issuer: issuer.into(),
            clock,
        }
    }

    pub fn from_settings(settings: &AuthSettings, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            settings.jwt_secret.as_bytes(),
            settings.access_token_expiry,
            settings.issuer.clone(),
            clock,
        )
    }

    fn validation(&self) -> Validation {
        // Pinning HS256 rejects `none` and every other algorithm in the header.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        // The time window is checked against the injected clock instead.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation
    }
}

impl AccessTokenCodec for JwtCodec {
    fn issue(
        &self,
        user_id: Uuid,
        user_number: &str,
        role: &str,
    ) -> Result<IssuedAccessToken, AppError> {
        let claims = Claims::new(
            user_id,
            user_number.to_string(),
            role.to_string(),
            self.clock.now().timestamp(),
            self.lifetime_seconds,
            self.issuer.clone(),
        );

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        Ok(IssuedAccessToken { token, claims })
    }

    fn validate(&self, token: &str) -> Result<Claims, AppError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT validation error: {}", e);
                AuthError::InvalidToken
            })?;

        claims.check_time_window(self.clock.now().timestamp())?;
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::Duration;

    const SECRET: &[u8] = b"test-secret-key-at-least-32-characters-long";
    const T0: i64 = 1_700_000_000;
    const LIFETIME: i64 = 900;

    fn codec_at(clock: Arc<FixedClock>) -> JwtCodec {
        JwtCodec::new(SECRET, LIFETIME, "test", clock)
    }

    fn expect_auth_error(result: Result<Claims, AppError>) -> AuthError {
        match result {
            Err(AppError::Auth(e)) => e,
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[test]
    fn test_generate_and_validate_token() {
        let clock = Arc::new(FixedClock::at_unix(T0));
        let codec = codec_at(clock.clone());
        let user_id = Uuid::new_v4();

        let issued = codec.issue(user_id, "5551234", "admin").expect("Failed to generate token");
        clock.advance(Duration::seconds(10));
        let claims = codec.validate(&issued.token).expect("Failed to validate token");

        assert_eq!(claims, issued.claims);
        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.user_number, "5551234");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.iss, "test");
        assert_eq!(issued.expires_at().timestamp(), T0 + LIFETIME);
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let clock = Arc::new(FixedClock::at_unix(T0));
        let codec = codec_at(clock.clone());
        let issued = codec.issue(Uuid::new_v4(), "1", "user").unwrap();

        clock.set(DateTime::from_timestamp(T0 + LIFETIME, 0).unwrap());
        assert!(codec.validate(&issued.token).is_ok());

        clock.advance(Duration::seconds(1));
        assert_eq!(
            expect_auth_error(codec.validate(&issued.token)),
            AuthError::TokenExpired
        );
    }

    #[test]
    fn test_token_from_the_future_is_rejected() {
        let clock = Arc::new(FixedClock::at_unix(T0));
        let codec = codec_at(clock.clone());
        let issued = codec.issue(Uuid::new_v4(), "1", "user").unwrap();

        clock.advance(Duration::seconds(-1));
        assert_eq!(
            expect_auth_error(codec.validate(&issued.token)),
            AuthError::TokenNotYetValid
        );
    }

    #[test]
    fn test_invalid_token() {
        let codec = codec_at(Arc::new(FixedClock::at_unix(T0)));
        assert_eq!(
            expect_auth_error(codec.validate("invalid.token.here")),
            AuthError::InvalidToken
        );
        assert_eq!(expect_auth_error(codec.validate("")), AuthError::InvalidToken);
    }

    #[test]
    fn test_tampered_token() {
        let codec = codec_at(Arc::new(FixedClock::at_unix(T0)));
        let issued = codec.issue(Uuid::new_v4(), "1", "user").unwrap();

        let tampered = format!("{}X", issued.token);
        assert_eq!(
            expect_auth_error(codec.validate(&tampered)),
            AuthError::InvalidToken
        );
    }

    #[test]
    fn test_wrong_secret() {
        let clock = Arc::new(FixedClock::at_unix(T0));
        let issued = codec_at(clock.clone())
            .issue(Uuid::new_v4(), "1", "user")
            .unwrap();

        let other = JwtCodec::new(b"another-secret-key-at-least-32-characters", LIFETIME, "test", clock);
        assert_eq!(
            expect_auth_error(other.validate(&issued.token)),
            AuthError::InvalidToken
        );
    }

    #[test]
    fn test_wrong_issuer() {
        let clock = Arc::new(FixedClock::at_unix(T0));
        let issued = codec_at(clock.clone())
            .issue(Uuid::new_v4(), "1", "user")
            .unwrap();

        let other = JwtCodec::new(SECRET, LIFETIME, "wrong-issuer", clock);
        assert!(other.validate(&issued.token).is_err());
    }

    #[test]
    fn test_other_hmac_algorithm_rejected() {
        let clock = Arc::new(FixedClock::at_unix(T0));
        let codec = codec_at(clock);
        let claims = Claims::new(
            Uuid::new_v4(),
            "1".to_string(),
            "admin".to_string(),
            T0,
            LIFETIME,
            "test".to_string(),
        );

        // Same key, different algorithm in the header.
        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert_eq!(expect_auth_error(codec.validate(&token)), AuthError::InvalidToken);
    }

    #[test]
    fn test_alg_none_rejected() {
        let codec = codec_at(Arc::new(FixedClock::at_unix(T0)));
        let issued = codec.issue(Uuid::new_v4(), "1", "admin").unwrap();
        let payload = issued.token.split('.').nth(1).unwrap();

        // {"alg":"none","typ":"JWT"}
        let unsigned = format!("eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.{}.", payload);

        assert_eq!(
            expect_auth_error(codec.validate(&unsigned)),
            AuthError::InvalidToken
        );
    }
}
