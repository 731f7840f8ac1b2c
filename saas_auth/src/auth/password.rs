//! Credential verification.

use super::errors::{AuthError, AuthResult};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use subtle::ConstantTimeEq;

/// Hashes and checks passwords.
///
/// Primary path: Argon2id with a per-hash salt and a server-side pepper.
/// Secondary path: an operator override password, compared in constant time.
#[derive(Clone)]
pub struct CredentialVerifier {
    pepper: String,
    override_password: Option<String>,
}

impl CredentialVerifier {
    pub fn new(pepper: String, override_password: Option<String>) -> Self {
        Self {
            pepper,
            override_password: override_password.filter(|p| !p.is_empty()),
        }
    }

    /// Whether the override path is configured at all.
    pub fn override_enabled(&self) -> bool {
        self.override_password.is_some()
    }

    /// Hash password with Argon2id + pepper
    pub fn hash(&self, password: &str) -> AuthResult<String> {
        let peppered = format!("{}{}", password, self.pepper);
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        Ok(argon2
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| AuthError::HashingFailed)?
            .to_string())
    }

    /// Verify password against a stored hash. Accounts without a hash never match.
    pub fn verify(&self, password: &str, stored_hash: Option<&str>) -> bool {
        let Some(hash) = stored_hash.filter(|h| !h.is_empty()) else {
            return false;
        };
        let Ok(parsed_hash) = PasswordHash::new(hash) else {
            return false;
        };
        let peppered = format!("{}{}", password, self.pepper);

        Argon2::default()
            .verify_password(peppered.as_bytes(), &parsed_hash)
            .is_ok()
    }

    /// Compare against the operator override password.
    pub fn verify_override(&self, password: &str) -> bool {
        match &self.override_password {
            Some(secret) if !password.is_empty() => {
                bool::from(password.as_bytes().ct_eq(secret.as_bytes()))
            }
            _ => false,
        }
    }

    /// Primary check with fallback to the override path.
    pub fn authenticate(&self, password: &str, stored_hash: Option<&str>) -> bool {
        if self.verify(password, stored_hash) {
            return true;
        }
        let accepted = self.verify_override(password);
        if accepted {
            log::warn!("Sign-in accepted through the override password");
        }
        accepted
    }
}
