//! Persistence adapters for the user and refresh token ports.

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryRefreshTokenStore, InMemoryUserStore};
pub use postgres::{PgRefreshTokenStore, PgUserStore};
