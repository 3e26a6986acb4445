//! Error Handling Module
//!
//! One error type for the whole crate, layered by domain:
//! 1. Domain-specific errors (auth, store, config)
//! 2. The unified `AppError` used for control flow
//! 3. Boundary classification (what callers outside the crate may see)
//! 4. Structured error logging with context

use thiserror::Error;

// ============================================================================
// 1. DOMAIN-SPECIFIC ERROR TYPES
// ============================================================================

/// Authentication and token-state errors.
///
/// These keep their full detail inside the crate (logs, tests) but all
/// collapse into one `Unauthorized` class at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("User not found")]
    UserNotFound,
    #[error("Account is inactive")]
    AccountInactive,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Token is not valid yet")]
    TokenNotYetValid,
    #[error("Token has been revoked")]
    TokenRevoked,
    #[error("Token not found")]
    TokenNotFound,
    #[error("Invalid token")]
    InvalidToken,
}

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Duplicate entry: {0}")]
    UniqueViolation(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Store operation timed out after {0}ms")]
    Timeout(u64),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config load error: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

// ============================================================================
// 2. UNIFIED APPLICATION ERROR TYPE
// ============================================================================

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let store_error = match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                StoreError::UniqueViolation(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => StoreError::Unavailable(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(err.to_string())
            }
            _ => StoreError::Query(err.to_string()),
        };
        AppError::Store(store_error)
    }
}

impl AppError {
    /// True for every token-state failure: expired, not yet valid, revoked,
    /// unknown or malformed.
    pub fn is_invalid_token(&self) -> bool {
        matches!(
            self,
            AppError::Auth(
                AuthError::TokenExpired
                    | AuthError::TokenNotYetValid
                    | AuthError::TokenRevoked
                    | AuthError::TokenNotFound
                    | AuthError::InvalidToken
            )
        )
    }
}

// ============================================================================
// 3. BOUNDARY CLASSIFICATION
// ============================================================================

/// Coarse outcome for the transport layer to map onto its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Credentials or tokens rejected. Never says which check failed.
    Unauthorized,
    /// The store could not be reached in time.
    Unavailable,
    Internal,
}

/// Error payload handed to the boundary layer
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking (request ID or trace ID)
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String) -> Self {
        Self {
            error_id,
            message,
            code,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl AppError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Auth(_) => ErrorClass::Unauthorized,
            AppError::Store(StoreError::Unavailable(_) | StoreError::Timeout(_)) => {
                ErrorClass::Unavailable
            }
            AppError::Store(_) | AppError::Config(_) | AppError::Hashing(_) => {
                ErrorClass::Internal
            }
            AppError::Internal(_) => ErrorClass::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self.class() {
            ErrorClass::Unauthorized => "UNAUTHORIZED",
            ErrorClass::Unavailable => "SERVICE_UNAVAILABLE",
            ErrorClass::Internal => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show outside the crate.
    pub fn public_message(&self) -> &'static str {
        match self.class() {
            ErrorClass::Unauthorized => "Invalid credentials or token",
            ErrorClass::Unavailable => "Service temporarily unavailable",
            ErrorClass::Internal => "Internal server error",
        }
    }

    pub fn to_response(&self, request_id: &str) -> ErrorResponse {
        ErrorResponse::new(
            request_id.to_string(),
            self.public_message().to_string(),
            self.code().to_string(),
        )
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for enhanced logging and debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Logs the internal detail of `error`. The boundary only ever sees the
    /// collapsed class.
    pub fn log_error(&self, error: &AppError) {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "user_id": self.user_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            AppError::Auth(AuthError::InvalidCredentials | AuthError::UserNotFound) => {
                tracing::warn!(
                    error = %error,
                    context = ?context,
                    "Invalid credentials attempt"
                );
            }
            AppError::Auth(_) => {
                tracing::warn!(
                    error = %error,
                    context = ?context,
                    "Authentication error"
                );
            }
            AppError::Store(_) => {
                tracing::error!(
                    error = %error,
                    context = ?context,
                    "Store error"
                );
            }
            AppError::Config(_) => {
                tracing::error!(
                    error = %error,
                    context = ?context,
                    "Configuration error"
                );
            }
            AppError::Hashing(_) | AppError::Internal(_) => {
                tracing::error!(
                    error = %error,
                    context = ?context,
                    "Internal error"
                );
            }
        }
    }
}
