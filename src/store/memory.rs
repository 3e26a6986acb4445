//! In-process stores.
//!
//! Every operation runs under one lock, which gives the same all-or-nothing
//! rotation the Postgres store gets from its transaction.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::{NewRefreshToken, RefreshToken, RefreshTokenStore, TokenHash};
use crate::error::{AppError, AuthError, StoreError};
use crate::users::{User, UserStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStore {
    records: Mutex<HashMap<TokenHash, RefreshToken>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record owned by `user_id`, oldest first.
    pub fn records_for_user(&self, user_id: Uuid) -> Vec<RefreshToken> {
        let mut records: Vec<_> = lock(&self.records)
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.created_at);
        records
    }
}

fn materialize(token: NewRefreshToken) -> RefreshToken {
    RefreshToken {
        id: Uuid::new_v4(),
        user_id: token.user_id,
        token_hash: token.token_hash,
        expires_at: token.expires_at,
        created_at: token.created_at,
        revoked_at: None,
        replaced_by: None,
        metadata: token.metadata,
    }
}

fn duplicate() -> AppError {
    StoreError::UniqueViolation("refresh_tokens.token_hash".to_string()).into()
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshToken, AppError> {
        let mut records = lock(&self.records);
        if records.contains_key(&token.token_hash) {
            return Err(duplicate());
        }
        let record = materialize(token);
        records.insert(record.token_hash.clone(), record.clone());
        Ok(record)
    }

    async fn find(&self, token_hash: &TokenHash) -> Result<Option<RefreshToken>, AppError> {
        Ok(lock(&self.records).get(token_hash).cloned())
    }

    async fn rotate(
        &self,
        old_hash: &TokenHash,
        successor: NewRefreshToken,
        now: DateTime<Utc>,
    ) -> Result<RefreshToken, AppError> {
        let mut records = lock(&self.records);

        let live = records
            .get(old_hash)
            .map(|old| !old.is_revoked() && !old.is_expired(now))
            .unwrap_or(false);
        if !live {
            return Err(AuthError::TokenNotFound.into());
        }
        if records.contains_key(&successor.token_hash) {
            return Err(duplicate());
        }

        if let Some(old) = records.get_mut(old_hash) {
            old.revoked_at = Some(now);
            old.replaced_by = Some(successor.token_hash.clone());
        }
        let record = materialize(successor);
        records.insert(record.token_hash.clone(), record.clone());
        Ok(record)
    }

    async fn revoke(&self, token_hash: &TokenHash, now: DateTime<Utc>) -> Result<(), AppError> {
        match lock(&self.records).get_mut(token_hash) {
            Some(record) if !record.is_revoked() => {
                record.revoked_at = Some(now);
                Ok(())
            }
            _ => Err(AuthError::TokenNotFound.into()),
        }
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut revoked = 0;
        for record in lock(&self.records).values_mut() {
            if record.user_id == user_id && !record.is_revoked() {
                record.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        lock(&self.users).insert(user.id, user);
    }

    pub fn set_active(&self, user_id: Uuid, is_active: bool) {
        if let Some(user) = lock(&self.users).get_mut(&user_id) {
            user.is_active = is_active;
        }
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_number(&self, user_number: &str) -> Result<Option<User>, AppError> {
        Ok(lock(&self.users)
            .values()
            .find(|user| user.user_number == user_number)
            .cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(lock(&self.users).get(&user_id).cloned())
    }
}
