//! Argon2 credentials for user accounts.

use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use thiserror::Error;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password too short")]
    TooShort,

    #[error("hashing failed: {0}")]
    Hash(password_hash::Error),

    #[error("stored hash unreadable: {0}")]
    StoredHash(password_hash::Error),
}

/// A sign-up password that passed the length rule. Only ever leaves this
/// module as a PHC hash string.
pub struct NewPassword(String);

impl NewPassword {
    pub fn parse(plain: String) -> Result<Self, PasswordError> {
        if plain.chars().count() < MIN_PASSWORD_LEN {
            return Err(PasswordError::TooShort);
        }
        Ok(Self(plain))
    }

    pub fn hash(&self) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(self.0.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(PasswordError::Hash)
    }
}

/// Checks a login attempt against the hash stored on the user record.
pub fn matches_stored(plain: &str, stored: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored).map_err(PasswordError::StoredHash)?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
