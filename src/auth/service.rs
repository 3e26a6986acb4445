//! Session orchestration
//!
//! Composes the password verifier, the access token codec and the refresh
//! token vault into login, refresh, logout and logout-everywhere.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::jwt::{AccessTokenCodec, IssuedAccessToken, JwtCodec};
use crate::auth::password::{BcryptVerifier, PasswordVerifier};
use crate::auth::refresh_token::{
    RefreshToken, RefreshTokenState, RefreshTokenStore, RefreshTokenVault, RequestMetadata,
    TokenHash,
};
use crate::auth::Claims;
use crate::clock::Clock;
use crate::configuration::AuthSettings;
use crate::error::{AppError, AuthError, ErrorContext, StoreError};
use crate::users::{User, UserStore};

/// Credentials handed back after login or refresh
#[derive(Clone, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Expiry of `access_token`, taken from its own `exp` claim
    pub expires_at: DateTime<Utc>,
}

impl AuthTokens {
    fn new(access: IssuedAccessToken, refresh_secret: String) -> Self {
        Self {
            expires_at: access.expires_at(),
            access_token: access.token,
            refresh_token: refresh_secret,
            token_type: "Bearer".to_string(),
        }
    }
}

impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// Deadline for each persistence call
    pub store_timeout: Duration,
    /// Revoke every session of a user when a rotated token is replayed
    pub revoke_all_on_reuse: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            revoke_all_on_reuse: true,
        }
    }
}

impl SessionPolicy {
    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self {
            store_timeout: Duration::from_millis(settings.store_timeout_ms),
            revoke_all_on_reuse: settings.revoke_all_on_reuse,
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    verifier: Arc<dyn PasswordVerifier>,
    codec: Arc<dyn AccessTokenCodec>,
    vault: RefreshTokenVault,
    policy: SessionPolicy,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        verifier: Arc<dyn PasswordVerifier>,
        codec: Arc<dyn AccessTokenCodec>,
        vault: RefreshTokenVault,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            users,
            verifier,
            codec,
            vault,
            policy,
        }
    }

    /// Wire bcrypt, HS256 JWTs and the given stores from settings.
    pub fn from_settings(
        settings: &AuthSettings,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn RefreshTokenStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let vault = RefreshTokenVault::new(
            tokens,
            clock.clone(),
            chrono::Duration::seconds(settings.refresh_token_expiry),
        );
        Self::new(
            users,
            Arc::new(BcryptVerifier::new(settings.password_hash_cost)),
            Arc::new(JwtCodec::from_settings(settings, clock)),
            vault,
            SessionPolicy::from_settings(settings),
        )
    }

    /// Authenticate by user number and password.
    ///
    /// Either both tokens are returned or none: a failure to persist the
    /// refresh token fails the whole call.
    pub async fn login(
        &self,
        user_number: &str,
        password: &str,
        metadata: RequestMetadata,
    ) -> Result<AuthTokens, AppError> {
        let context = ErrorContext::new("user_login");

        let result = self.login_inner(user_number, password, metadata).await;
        match &result {
            Ok((user_id, _)) => tracing::info!(
                request_id = %context.request_id,
                user_id = %user_id,
                "User logged in successfully"
            ),
            Err(e) => context.log_error(e),
        }
        result.map(|(_, tokens)| tokens)
    }

    async fn login_inner(
        &self,
        user_number: &str,
        password: &str,
        metadata: RequestMetadata,
    ) -> Result<(Uuid, AuthTokens), AppError> {
        let user = self
            .within_deadline(self.users.find_by_number(user_number))
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.is_active {
            return Err(AuthError::AccountInactive.into());
        }

        if !self.password_matches(&user, password).await? {
            return Err(AuthError::InvalidCredentials.into());
        }

        let access = self.codec.issue(user.id, &user.user_number, &user.role)?;
        let refresh = self
            .within_deadline(self.vault.issue(user.id, metadata))
            .await?;

        Ok((user.id, AuthTokens::new(access, refresh.secret)))
    }

    /// Exchange a refresh secret for a new access token and a new secret.
    ///
    /// The presented secret is single-use: once this succeeds, presenting it
    /// again fails.
    pub async fn refresh(
        &self,
        refresh_secret: &str,
        metadata: RequestMetadata,
    ) -> Result<AuthTokens, AppError> {
        let context = ErrorContext::new("token_refresh");

        let result = self.refresh_inner(refresh_secret, metadata).await;
        match &result {
            Ok((user_id, _)) => tracing::info!(
                request_id = %context.request_id,
                user_id = %user_id,
                "Token refreshed successfully"
            ),
            Err(e) => context.log_error(e),
        }
        result.map(|(_, tokens)| tokens)
    }

    async fn refresh_inner(
        &self,
        refresh_secret: &str,
        metadata: RequestMetadata,
    ) -> Result<(Uuid, AuthTokens), AppError> {
        let token_hash = TokenHash::of(refresh_secret);
        let record = self.within_deadline(self.vault.lookup(&token_hash)).await?;

        match record.state(self.vault.now()) {
            RefreshTokenState::Active => {}
            RefreshTokenState::Rotated => {
                self.handle_reuse(&record).await?;
                return Err(AuthError::TokenRevoked.into());
            }
            RefreshTokenState::Revoked => return Err(AuthError::TokenRevoked.into()),
            RefreshTokenState::Expired => return Err(AuthError::TokenExpired.into()),
        }

        let user = self
            .within_deadline(self.users.find_by_id(record.user_id))
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::AccountInactive.into());
        }

        let access = self.codec.issue(user.id, &user.user_number, &user.role)?;
        let rotated = match self
            .within_deadline(self.vault.rotate(&token_hash, user.id, metadata))
            .await
        {
            Ok(rotated) => rotated,
            Err(AppError::Auth(AuthError::TokenNotFound)) => {
                tracing::info!(
                    user_id = %user.id,
                    token_id = %record.id,
                    "Refresh token consumed by a concurrent rotation"
                );
                return Err(AuthError::TokenNotFound.into());
            }
            Err(e) => return Err(e),
        };

        Ok((user.id, AuthTokens::new(access, rotated.secret)))
    }

    /// A rotated token came back. Either a client raced itself or someone
    /// replayed a stolen secret; the two cannot be told apart here.
    async fn handle_reuse(&self, record: &RefreshToken) -> Result<(), AppError> {
        tracing::warn!(
            user_id = %record.user_id,
            token_id = %record.id,
            "Rotated refresh token presented again, possible token theft"
        );

        if self.policy.revoke_all_on_reuse {
            let revoked = self
                .within_deadline(self.vault.revoke_all(record.user_id))
                .await?;
            tracing::warn!(
                user_id = %record.user_id,
                revoked,
                "Revoked all sessions after refresh token reuse"
            );
        }
        Ok(())
    }

    /// Revoke the session behind `refresh_secret`.
    ///
    /// A second call for the same secret returns `TokenNotFound`; callers that
    /// treat logout as idempotent should ignore it. Access tokens already
    /// issued stay valid until they expire.
    pub async fn logout(&self, refresh_secret: &str) -> Result<(), AppError> {
        let context = ErrorContext::new("logout");
        let token_hash = TokenHash::of(refresh_secret);

        match self.within_deadline(self.vault.revoke(&token_hash)).await {
            Ok(()) => {
                tracing::info!(request_id = %context.request_id, "Session logged out");
                Ok(())
            }
            Err(e) => {
                context.log_error(&e);
                Err(e)
            }
        }
    }

    /// Revoke every refresh token of the user. Returns how many were live.
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let context = ErrorContext::new("logout_all").with_user_id(user_id.to_string());

        self.within_deadline(self.vault.revoke_all(user_id))
            .await
            .map_err(|e| {
                context.log_error(&e);
                e
            })
    }

    /// Stateless check of an access token.
    pub fn authenticate(&self, access_token: &str) -> Result<Claims, AppError> {
        self.codec.validate(access_token)
    }

    async fn password_matches(&self, user: &User, password: &str) -> Result<bool, AppError> {
        let verifier = Arc::clone(&self.verifier);
        let hash = user.password_hash.clone();
        let password = password.to_string();

        tokio::task::spawn_blocking(move || verifier.verify(&hash, &password))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))
    }

    async fn within_deadline<T, F>(&self, operation: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout(self.policy.store_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.policy.store_timeout.as_millis() as u64).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::refresh_token::NewRefreshToken;
    use crate::clock::FixedClock;
    use crate::store::memory::{InMemoryRefreshTokenStore, InMemoryUserStore};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use mockall::mock;

    const SECRET: &str = "test-secret-key-at-least-32-characters-long";

    mock! {
        pub TokenStore {}

        #[async_trait]
        impl RefreshTokenStore for TokenStore {
            async fn insert(&self, token: NewRefreshToken) -> Result<RefreshToken, AppError>;
            async fn find(&self, token_hash: &TokenHash) -> Result<Option<RefreshToken>, AppError>;
            async fn rotate(
                &self,
                old_hash: &TokenHash,
                successor: NewRefreshToken,
                now: DateTime<Utc>,
            ) -> Result<RefreshToken, AppError>;
            async fn revoke(&self, token_hash: &TokenHash, now: DateTime<Utc>) -> Result<(), AppError>;
            async fn revoke_all_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, AppError>;
        }
    }

    struct SlowUserStore;

    #[async_trait]
    impl UserStore for SlowUserStore {
        async fn find_by_number(&self, _user_number: &str) -> Result<Option<User>, AppError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(None)
        }

        async fn find_by_id(&self, _user_id: Uuid) -> Result<Option<User>, AppError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(None)
        }
    }

    fn test_user(verifier: &BcryptVerifier) -> User {
        User {
            id: Uuid::new_v4(),
            user_number: "5551234".to_string(),
            password_hash: verifier.hash("correct-horse").unwrap(),
            is_active: true,
            role: "user".to_string(),
            created_at: Utc::now(),
        }
    }

    fn service_with(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn RefreshTokenStore>,
        policy: SessionPolicy,
    ) -> AuthService {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::at_unix(1_700_000_000));
        AuthService::new(
            users,
            Arc::new(BcryptVerifier::new(4)),
            Arc::new(JwtCodec::new(SECRET.as_bytes(), 900, "test", clock.clone())),
            RefreshTokenVault::new(tokens, clock, chrono::Duration::days(7)),
            policy,
        )
    }

    fn active_record(user_id: Uuid, secret: &str) -> RefreshToken {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        RefreshToken {
            id: Uuid::new_v4(),
            user_id,
            token_hash: TokenHash::of(secret),
            expires_at: now + chrono::Duration::days(7),
            created_at: now,
            revoked_at: None,
            replaced_by: None,
            metadata: RequestMetadata::default(),
        }
    }

    #[tokio::test]
    async fn test_login_fails_whole_when_refresh_token_cannot_be_stored() {
        let users = Arc::new(InMemoryUserStore::new());
        users.insert(test_user(&BcryptVerifier::new(4)));

        let mut tokens = MockTokenStore::new();
        tokens
            .expect_insert()
            .times(1)
            .returning(|_| Err(StoreError::Unavailable("connection refused".to_string()).into()));

        let service = service_with(users, Arc::new(tokens), SessionPolicy::default());
        let result = service
            .login("5551234", "correct-horse", RequestMetadata::default())
            .await;

        assert_matches!(result, Err(AppError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_refresh_surfaces_rotation_failure() {
        let users = Arc::new(InMemoryUserStore::new());
        let user = test_user(&BcryptVerifier::new(4));
        let record = active_record(user.id, "presented-secret");
        users.insert(user);

        let mut tokens = MockTokenStore::new();
        tokens
            .expect_find()
            .times(1)
            .returning(move |_| Ok(Some(record.clone())));
        tokens
            .expect_rotate()
            .times(1)
            .returning(|_, _, _| Err(StoreError::Query("serialization failure".to_string()).into()));

        let service = service_with(users, Arc::new(tokens), SessionPolicy::default());
        let result = service
            .refresh("presented-secret", RequestMetadata::default())
            .await;

        assert_matches!(result, Err(AppError::Store(StoreError::Query(_))));
    }

    #[tokio::test]
    async fn test_lost_rotation_race_is_not_escalated() {
        let users = Arc::new(InMemoryUserStore::new());
        let user = test_user(&BcryptVerifier::new(4));
        let record = active_record(user.id, "presented-secret");
        users.insert(user);

        let mut tokens = MockTokenStore::new();
        tokens
            .expect_find()
            .returning(move |_| Ok(Some(record.clone())));
        tokens
            .expect_rotate()
            .returning(|_, _, _| Err(AuthError::TokenNotFound.into()));
        tokens.expect_revoke_all_for_user().never();

        let service = service_with(users, Arc::new(tokens), SessionPolicy::default());
        let result = service
            .refresh("presented-secret", RequestMetadata::default())
            .await;

        assert_matches!(result, Err(AppError::Auth(AuthError::TokenNotFound)));
    }

    #[tokio::test]
    async fn test_slow_store_hits_deadline() {
        let policy = SessionPolicy {
            store_timeout: Duration::from_millis(20),
            revoke_all_on_reuse: true,
        };
        let service = service_with(
            Arc::new(SlowUserStore),
            Arc::new(InMemoryRefreshTokenStore::new()),
            policy,
        );

        let result = service
            .login("5551234", "correct-horse", RequestMetadata::default())
            .await;

        assert_matches!(result, Err(AppError::Store(StoreError::Timeout(20))));
    }

    #[tokio::test]
    async fn test_inactive_account_cannot_log_in() {
        let users = Arc::new(InMemoryUserStore::new());
        let mut user = test_user(&BcryptVerifier::new(4));
        user.is_active = false;
        users.insert(user);
        let tokens = Arc::new(InMemoryRefreshTokenStore::new());

        let service = service_with(users, tokens.clone(), SessionPolicy::default());
        let result = service
            .login("5551234", "correct-horse", RequestMetadata::default())
            .await;

        assert_matches!(result, Err(AppError::Auth(AuthError::AccountInactive)));
        assert!(tokens.is_empty());
    }

    #[tokio::test]
    async fn test_reuse_without_escalation_policy_keeps_other_sessions() {
        let users = Arc::new(InMemoryUserStore::new());
        users.insert(test_user(&BcryptVerifier::new(4)));
        let policy = SessionPolicy {
            revoke_all_on_reuse: false,
            ..SessionPolicy::default()
        };
        let service = service_with(users, Arc::new(InMemoryRefreshTokenStore::new()), policy);

        let first = service
            .login("5551234", "correct-horse", RequestMetadata::default())
            .await
            .unwrap();
        let second = service
            .refresh(&first.refresh_token, RequestMetadata::default())
            .await
            .unwrap();

        let replay = service
            .refresh(&first.refresh_token, RequestMetadata::default())
            .await;
        assert_matches!(replay, Err(AppError::Auth(AuthError::TokenRevoked)));

        assert!(service
            .refresh(&second.refresh_token, RequestMetadata::default())
            .await
            .is_ok());
    }

    #[test]
    fn test_tokens_debug_hides_secrets() {
        let tokens = AuthTokens {
            access_token: "header.payload.signature".to_string(),
            refresh_token: "super-secret".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: Utc::now(),
        };

        let rendered = format!("{:?}", tokens);
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("signature"));
    }
}
