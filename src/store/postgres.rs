//! Postgres-backed stores
//!
//! Rotation and revocation use conditional updates (`WHERE revoked_at IS NULL`)
//! and check the affected row, so concurrent callers racing on one hash see
//! exactly one winner under Postgres' row locking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{NewRefreshToken, RefreshToken, RefreshTokenStore, RequestMetadata, TokenHash};
use crate::error::{AppError, AuthError};
use crate::users::{User, UserStore};

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    replaced_by: Option<String>,
    user_agent: Option<String>,
    client_ip: Option<String>,
}

impl From<RefreshTokenRow> for RefreshToken {
    fn from(row: RefreshTokenRow) -> Self {
        RefreshToken {
            id: row.id,
            user_id: row.user_id,
            token_hash: TokenHash::from_stored(row.token_hash),
            expires_at: row.expires_at,
            created_at: row.created_at,
            revoked_at: row.revoked_at,
            replaced_by: row.replaced_by.map(TokenHash::from_stored),
            metadata: RequestMetadata {
                user_agent: row.user_agent,
                client_ip: row.client_ip,
            },
        }
    }
}

const INSERT_REFRESH_TOKEN: &str = r#"
    INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at, user_agent, client_ip)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    RETURNING id, user_id, token_hash, expires_at, created_at,
              revoked_at, replaced_by, user_agent, client_ip
"#;

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshToken, AppError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(INSERT_REFRESH_TOKEN)
            .bind(Uuid::new_v4())
            .bind(token.user_id)
            .bind(token.token_hash.as_str())
            .bind(token.expires_at)
            .bind(token.created_at)
            .bind(token.metadata.user_agent)
            .bind(token.metadata.client_ip)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn find(&self, token_hash: &TokenHash) -> Result<Option<RefreshToken>, AppError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, user_id, token_hash, expires_at, created_at,
                   revoked_at, replaced_by, user_agent, client_ip
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn rotate(
        &self,
        old_hash: &TokenHash,
        successor: NewRefreshToken,
        now: DateTime<Utc>,
    ) -> Result<RefreshToken, AppError> {
        // Dropping `tx` on any early return rolls it back.
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $1, replaced_by = $2
            WHERE token_hash = $3 AND revoked_at IS NULL AND expires_at >= $1
            RETURNING id
            "#,
        )
        .bind(now)
        .bind(successor.token_hash.as_str())
        .bind(old_hash.as_str())
        .fetch_optional(&mut tx)
        .await?;

        if revoked.is_none() {
            return Err(AuthError::TokenNotFound.into());
        }

        let row = sqlx::query_as::<_, RefreshTokenRow>(INSERT_REFRESH_TOKEN)
            .bind(Uuid::new_v4())
            .bind(successor.user_id)
            .bind(successor.token_hash.as_str())
            .bind(successor.expires_at)
            .bind(successor.created_at)
            .bind(successor.metadata.user_agent)
            .bind(successor.metadata.client_ip)
            .fetch_one(&mut tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn revoke(&self, token_hash: &TokenHash, now: DateTime<Utc>) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $1
            WHERE token_hash = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(now)
        .bind(token_hash.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::TokenNotFound.into());
        }
        Ok(())
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $1
            WHERE user_id = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_number(&self, user_number: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, user_number, password_hash, is_active, role, created_at
            FROM users
            WHERE user_number = $1
            "#,
        )
        .bind(user_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, user_number, password_hash, is_active, role, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}
