//! User records as seen by the session layer.
//!
//! Users are owned by the wider application; this crate only reads them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    /// External-facing login identifier
    pub user_number: String,
    pub password_hash: String,
    pub is_active: bool,
    /// Plain role tag, e.g. `"admin"` or `"user"`
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Read-only user lookups. `Ok(None)` means no such user.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_number(&self, user_number: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError>;
}
