//! Argon2id password hashing for stored accounts.
//!
//! Stores keep only the PHC string produced by [`hash_password`] in
//! [`crate::User::password_hash`]. [`verify_password`] tells a wrong password
//! (`Ok(false)`) apart from a stored hash it cannot use (`Err`).
//! [`verify_absent`] spends the same work on a login that is not registered,
//! so sign-in timing does not reveal which logins exist.

use std::sync::OnceLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::StoreError;

fn unusable(err: password_hash::Error) -> StoreError {
    StoreError::Transient(format!("password hashing failed: {err}"))
}

/// Hash with a fresh salt. Returns a PHC string.
pub fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(unusable)
}

pub fn verify_password(password: &str, stored: &str) -> Result<bool, StoreError> {
    let stored = PasswordHash::new(stored).map_err(unusable)?;
    match Argon2::default().verify_password(password.as_bytes(), &stored) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(err) => Err(unusable(err)),
    }
}

/// Verify against a decoy hash and discard the result.
pub fn verify_absent(password: &str) {
    static DECOY: OnceLock<Option<String>> = OnceLock::new();
    if let Some(decoy) = DECOY.get_or_init(|| hash_password("decoy").ok()) {
        let _ = verify_password(password, decoy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_salted_phc() {
        let first = hash_password("secret-pass").unwrap();
        let second = hash_password("secret-pass").unwrap();
        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);
        assert!(verify_password("secret-pass", &first).unwrap());
        assert!(verify_password("secret-pass", &second).unwrap());
    }

    #[test]
    fn test_wrong_password_is_not_an_error() {
        let hash = hash_password("secret-pass").unwrap();
        assert_eq!(verify_password("wrong-pass", &hash), Ok(false));
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }
}
