//! Argon2 password hashing shared by accounts, cards and share links.

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};

use crate::error::AppError;

/// Argon2id hasher.
#[derive(Debug, Clone, Default)]
pub struct Passwords {
    argon: Argon2<'static>,
}

impl Passwords {
    /// Hasher with the smallest parameters Argon2 allows. For tests and
    /// local runs only.
    #[must_use]
    pub fn low_cost() -> Self {
        let params = Params::new(Params::MIN_M_COST, 1, 1, None).unwrap_or_default();
        Self {
            argon: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Hashes `password` into a PHC string.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] if hashing fails.
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
    }

    /// Checks `password` against a stored PHC string. A malformed hash
    /// never verifies.
    #[must_use]
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        PasswordHash::new(hash).is_ok_and(|parsed| {
            self.argon
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let passwords = Passwords::low_cost();
        let Ok(hash) = passwords.hash("correct horse") else {
            panic!("hashing failed");
        };
        assert!(hash.starts_with("$argon2id$"));
        assert!(passwords.verify("correct horse", &hash));
        assert!(!passwords.verify("wrong horse", &hash));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!Passwords::low_cost().verify("x", "not-a-phc-string"));
    }
}
