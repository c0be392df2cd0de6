//! Password hashing for locally held accounts (Argon2id)

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::SessionError;

/// Hash a password into a PHC string carrying salt and parameters
pub fn hash_password(password: &str) -> Result<String, SessionError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SessionError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, SessionError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| SessionError::Hash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
