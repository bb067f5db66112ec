//! Credential generation, hashing and the one-time disclosure slot.

use std::fmt;

use argon2::password_hash::{self, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use serde::{Serialize, Serializer};
use thiserror::Error;
use zeroize::Zeroizing;

const MAX_PASSWORD_LENGTH: usize = 128;

/// A password held in memory. Wiped on drop and redacted from `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.expose())
    }
}

/// The transient plaintext copy of an approved request's password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disclosure {
    Undisclosed(Secret),
    Disclosed,
}

impl Disclosure {
    pub fn is_available(&self) -> bool {
        matches!(self, Disclosure::Undisclosed(_))
    }

    /// Takes the plaintext out, leaving the slot disclosed.
    pub fn take(&mut self) -> Option<Secret> {
        match std::mem::replace(self, Disclosure::Disclosed) {
            Disclosure::Undisclosed(secret) => Some(secret),
            Disclosure::Disclosed => None,
        }
    }

    pub fn plaintext(&self) -> Option<&Secret> {
        match self {
            Disclosure::Undisclosed(secret) => Some(secret),
            Disclosure::Disclosed => None,
        }
    }
}

/// Argon2 hash of a role password in PHC string format (`$argon2id$v=19$...`).
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn from_stored(value: impl Into<String>) -> Result<Self, VaultError> {
        let value = value.into();
        let parsed = password_hash::PasswordHash::new(&value).map_err(|_| VaultError::MalformedHash)?;
        if !parsed.algorithm.as_str().starts_with("argon2") {
            return Err(VaultError::MalformedHash);
        }
        Ok(Self(value))
    }

    pub fn as_stored(&self) -> &str {
        &self.0
    }

    pub fn verify(&self, candidate: &str) -> bool {
        match password_hash::PasswordHash::new(&self.0) {
            Ok(parsed) => Argon2::default()
                .verify_password(candidate.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(***)")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("password must be at least {min} characters")]
    TooShort { min: usize },

    #[error("password must be at most {max} characters")]
    TooLong { max: usize },

    #[error("password contains control characters")]
    ControlCharacters,

    #[error("stored password hash is malformed")]
    MalformedHash,

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Password policy and generator.
#[derive(Debug, Clone)]
pub struct CredentialVault {
    generated_length: usize,
    min_length: usize,
}

impl CredentialVault {
    pub fn new(generated_length: usize, min_length: usize) -> Self {
        Self {
            // Generated passwords always satisfy the policy applied to user-chosen ones
            generated_length: generated_length.max(min_length).max(3),
            min_length,
        }
    }

    /// Generates an alphanumeric password from the OS RNG containing at least one
    /// lowercase letter, one uppercase letter and one digit.
    pub fn generate_password(&self) -> Secret {
        loop {
            let candidate: Zeroizing<String> = Zeroizing::new(
                OsRng
                    .sample_iter(&Alphanumeric)
                    .take(self.generated_length)
                    .map(char::from)
                    .collect(),
            );
            if has_required_classes(&candidate) {
                return Secret(candidate);
            }
        }
    }

    pub fn validate(&self, candidate: &str) -> Result<(), VaultError> {
        let length = candidate.chars().count();
        if length < self.min_length {
            return Err(VaultError::TooShort { min: self.min_length });
        }
        if length > MAX_PASSWORD_LENGTH {
            return Err(VaultError::TooLong { max: MAX_PASSWORD_LENGTH });
        }
        if candidate.chars().any(char::is_control) {
            return Err(VaultError::ControlCharacters);
        }
        Ok(())
    }

    /// Argon2id with a fresh random salt.
    pub fn hash(&self, password: &Secret) -> Result<PasswordHash, VaultError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.expose().as_bytes(), &salt)
            .map_err(|e| VaultError::Hashing(e.to_string()))?;
        Ok(PasswordHash(hash.to_string()))
    }
}

fn has_required_classes(candidate: &str) -> bool {
    candidate.chars().any(|c| c.is_ascii_lowercase())
        && candidate.chars().any(|c| c.is_ascii_uppercase())
        && candidate.chars().any(|c| c.is_ascii_digit())
}
