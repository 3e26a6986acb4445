//! Refresh Token Management
//!
//! Refresh tokens are:
//! - Cryptographically secure random 64-character strings
//! - Hashed with SHA-256 before storage (never store plaintext)
//! - Single-use: every refresh rotates the record in one transaction
//! - Terminal once revoked, whether by rotation or logout

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AppError, AuthError};

const SECRET_LENGTH: usize = 64;

/// SHA-256 hex digest of a refresh secret. The only form ever persisted.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TokenHash(String);

impl TokenHash {
    pub fn of(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wrap a digest read back from storage.
    pub fn from_stored(digest: String) -> Self {
        Self(digest)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Short prefix only, so hashes never land whole in logs.
impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.0.get(..8).unwrap_or(self.0.as_str());
        write!(f, "TokenHash({}…)", prefix)
    }
}

/// Generate a new cryptographically secure refresh secret
///
/// 64 characters drawn from a 62-symbol alphabet, about 381 bits.
pub fn generate_refresh_secret() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LENGTH)
        .map(char::from)
        .collect()
}

/// Where a session was opened from, kept for audit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    pub user_agent: Option<String>,
    pub client_ip: Option<String>,
}

impl RequestMetadata {
    pub fn new(user_agent: impl Into<String>, client_ip: impl Into<String>) -> Self {
        Self {
            user_agent: Some(user_agent.into()),
            client_ip: Some(client_ip.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTokenState {
    Active,
    /// Revoked because a successor replaced it
    Rotated,
    /// Revoked without successor (logout)
    Revoked,
    Expired,
}

/// Persisted refresh token record
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: TokenHash,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by: Option<TokenHash>,
    pub metadata: RequestMetadata,
}

impl RefreshToken {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn state(&self, now: DateTime<Utc>) -> RefreshTokenState {
        match (self.revoked_at, &self.replaced_by) {
            (Some(_), Some(_)) => RefreshTokenState::Rotated,
            (Some(_), None) => RefreshTokenState::Revoked,
            (None, _) if self.is_expired(now) => RefreshTokenState::Expired,
            (None, _) => RefreshTokenState::Active,
        }
    }
}

/// Record about to be inserted. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub token_hash: TokenHash,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub metadata: RequestMetadata,
}

/// Persistence port for refresh token records.
///
/// `rotate` and `revoke` must apply their "still live" predicate in the same
/// atomic step that changes the row.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshToken, AppError>;

    /// `Ok(None)` when no record has this hash.
    async fn find(&self, token_hash: &TokenHash) -> Result<Option<RefreshToken>, AppError>;

    /// Revoke the live, unexpired record for `old_hash` pointing it at
    /// `successor`, and insert `successor`, all or nothing.
    /// `TokenNotFound` if there was no such live record.
    async fn rotate(
        &self,
        old_hash: &TokenHash,
        successor: NewRefreshToken,
        now: DateTime<Utc>,
    ) -> Result<RefreshToken, AppError>;

    /// `TokenNotFound` if missing or already revoked.
    async fn revoke(&self, token_hash: &TokenHash, now: DateTime<Utc>) -> Result<(), AppError>;

    /// Number of records revoked; zero is fine.
    async fn revoke_all_for_user(&self, user_id: Uuid, now: DateTime<Utc>)
        -> Result<u64, AppError>;
}

/// A record plus the plaintext secret it was created for. The secret is not
/// recoverable once this value is dropped.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub secret: String,
    pub record: RefreshToken,
}

/// Issues, rotates and revokes refresh tokens on top of a store.
#[derive(Clone)]
pub struct RefreshTokenVault {
    store: Arc<dyn RefreshTokenStore>,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
}

impl RefreshTokenVault {
    pub fn new(store: Arc<dyn RefreshTokenStore>, clock: Arc<dyn Clock>, lifetime: Duration) -> Self {
        Self {
            store,
            clock,
            lifetime,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn prepare(&self, user_id: Uuid, metadata: RequestMetadata) -> (String, NewRefreshToken) {
        let secret = generate_refresh_secret();
        let now = self.clock.now();
        let token = NewRefreshToken {
            user_id,
            token_hash: TokenHash::of(&secret),
            expires_at: now + self.lifetime,
            created_at: now,
            metadata,
        };
        (secret, token)
    }

    pub async fn issue(
        &self,
        user_id: Uuid,
        metadata: RequestMetadata,
    ) -> Result<IssuedRefreshToken, AppError> {
        let (secret, token) = self.prepare(user_id, metadata);
        let record = self.store.insert(token).await?;
        Ok(IssuedRefreshToken { secret, record })
    }

    pub async fn lookup(&self, token_hash: &TokenHash) -> Result<RefreshToken, AppError> {
        self.store
            .find(token_hash)
            .await?
            .ok_or_else(|| AuthError::TokenNotFound.into())
    }

    pub async fn rotate(
        &self,
        old_hash: &TokenHash,
        user_id: Uuid,
        metadata: RequestMetadata,
    ) -> Result<IssuedRefreshToken, AppError> {
        let (secret, successor) = self.prepare(user_id, metadata);
        let record = self.store.rotate(old_hash, successor, self.clock.now()).await?;
        Ok(IssuedRefreshToken { secret, record })
    }

    pub async fn revoke(&self, token_hash: &TokenHash) -> Result<(), AppError> {
        self.store.revoke(token_hash, self.clock.now()).await
    }

    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self
            .store
            .revoke_all_for_user(user_id, self.clock.now())
            .await?;
        tracing::info!(user_id = %user_id, revoked, "All refresh tokens revoked for user");
        Ok(revoked)
    }
}
