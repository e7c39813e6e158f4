use anyhow::anyhow;
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{SaltString, rand_core::OsRng},
};

use crate::error::ApiError;

/// Password hashing and verification. Plaintext never touches storage; the
/// iteration count is injected at startup and immutable afterwards.
pub struct CredentialStore {
    argon2: Argon2<'static>,
}

impl CredentialStore {
    pub fn new(t_cost: u32) -> anyhow::Result<Self> {
        let params = Params::new(Params::DEFAULT_M_COST, t_cost, Params::DEFAULT_P_COST, None)
            .map_err(|e| anyhow!("invalid argon2 cost parameters: {e}"))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash with a fresh random salt, returning the PHC string to store.
    pub fn hash_password(&self, password: &str) -> Result<String, ApiError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("password hashing failed: {e}"))?;
        Ok(hash.to_string())
    }

    /// Constant-time comparison through argon2's own verification routine.
    /// A wrong password is `Ok(false)`; only a malformed stored hash is an
    /// error.
    pub fn verify_password(&self, candidate: &str, stored: &str) -> Result<bool, ApiError> {
        let parsed =
            PasswordHash::new(stored).map_err(|e| anyhow!("stored hash is malformed: {e}"))?;
        match self.argon2.verify_password(candidate.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow!("password verification failed: {e}").into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CredentialStore {
        CredentialStore::new(1).unwrap()
    }

    #[test]
    fn hash_round_trips() {
        let store = store();
        let hash = store.hash_password("secret1").unwrap();
        assert!(store.verify_password("secret1", &hash).unwrap());
    }

    #[test]
    fn wrong_password_is_false_not_error() {
        let store = store();
        let hash = store.hash_password("secret1").unwrap();
        assert!(!store.verify_password("secret2", &hash).unwrap());
    }

    #[test]
    fn stored_credential_is_never_plaintext() {
        let store = store();
        let hash = store.hash_password("secret1").unwrap();
        assert_ne!(hash, "secret1");
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn hashes_are_salted() {
        let store = store();
        let a = store.hash_password("secret1").unwrap();
        let b = store.hash_password("secret1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        let store = store();
        assert!(store.verify_password("secret1", "not-a-phc-string").is_err());
    }
}
