use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::auth::AuthService;
use crate::clock::SystemClock;
use crate::configuration::{DatabaseSettings, Settings};
use crate::error::AppError;
use crate::store::{PgRefreshTokenStore, PgUserStore};

pub async fn connect_pool(settings: &DatabaseSettings) -> Result<PgPool, AppError> {
    tracing::info!(
        host = %settings.host,
        database = %settings.database_name,
        "Attempting to connect to database"
    );

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            AppError::from(e)
        })?;

    tracing::info!("Database connection pool created successfully");
    Ok(pool)
}

/// Postgres-backed session service on the wall clock.
pub fn build_auth_service(settings: &Settings, pool: PgPool) -> AuthService {
    AuthService::from_settings(
        &settings.auth,
        Arc::new(PgUserStore::new(pool.clone())),
        Arc::new(PgRefreshTokenStore::new(pool)),
        Arc::new(SystemClock),
    )
}
