//! Credential issuance and refresh-token lifecycle.
//!
//! [`auth::AuthService`] turns a verified password into a short-lived HS256
//! access token plus a single-use, rotatable refresh token, and handles
//! logout and logout-everywhere.

pub mod auth;
pub mod clock;
pub mod configuration;
pub mod error;
pub mod startup;
pub mod store;
pub mod telemetry;
pub mod users;
