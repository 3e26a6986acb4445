//! Password Hashing and Verification
//!
//! bcrypt hashes are self-describing: the cost and salt live inside the hash,
//! so the configured cost can be raised without touching stored hashes.

use crate::error::AppError;

pub trait PasswordVerifier: Send + Sync {
    /// Produce a salted bcrypt hash of `password`.
    fn hash(&self, password: &str) -> Result<String, AppError>;

    /// `true` only if `password` matches `hash`.
    ///
    /// A malformed stored hash is reported as a plain mismatch.
    fn verify(&self, hash: &str, password: &str) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct BcryptVerifier {
    cost: u32,
}

impl BcryptVerifier {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptVerifier {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordVerifier for BcryptVerifier {
    fn hash(&self, password: &str) -> Result<String, AppError> {
        bcrypt::hash(password, self.cost)
            .map_err(|e| AppError::Hashing(e.to_string()))
    }

    fn verify(&self, hash: &str, password: &str) -> bool {
        match bcrypt::verify(password, hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::error!(error = %e, "Stored password hash could not be parsed");
                false
            }
        }
    }
}
