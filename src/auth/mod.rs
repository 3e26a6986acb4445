//! Authentication module
//!
//! Password verification, access token issuance/validation, refresh token
//! storage and rotation, and the session service composing them.

mod claims;
mod jwt;
mod password;
mod refresh_token;
mod service;

pub use claims::Claims;
pub use jwt::{AccessTokenCodec, IssuedAccessToken, JwtCodec};
pub use password::{BcryptVerifier, PasswordVerifier};
pub use refresh_token::generate_refresh_secret;
pub use refresh_token::{
    IssuedRefreshToken, NewRefreshToken, RefreshToken, RefreshTokenState, RefreshTokenStore,
    RefreshTokenVault, RequestMetadata, TokenHash,
};
pub use service::{AuthService, AuthTokens, SessionPolicy};
