//! Master Key Manager
//!
//! Owns the master secret's lifecycle in the vault and derives the symmetric
//! encryption key from it. Every read of the secret (and of the startup
//! prompt setting) is gated behind the application signature check.
//!
//! Key derivation is a single unsalted SHA-256 of the secret. This keeps
//! derived keys stable across installs but is brute-forceable offline if the
//! config file is exfiltrated; moving to a slow salted KDF would break
//! existing encrypted files and is deliberately not done here.

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::security::SecurityConfig;
use crate::vault::{SecretVault, VaultError};

/// Vault key for the master secret
const MASTER_SECRET_KEY: &str = "master-secret";

/// Vault key for the "prompt for the secret on startup" setting
const PROMPT_ON_STARTUP_KEY: &str = "prompt-on-startup";

/// Minimum length for a new master secret
const MIN_SECRET_LEN: usize = 8;

/// Master key errors
#[derive(Debug, thiserror::Error)]
pub enum MasterKeyError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Application failed the signature check")]
    NotAuthorized,

    #[error("Master secret is not set")]
    NotFound,

    #[error("Current master secret does not match")]
    Auth,

    #[error("Vault error: {0}")]
    Vault(VaultError),
}

impl From<VaultError> for MasterKeyError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::NotFound(_) => MasterKeyError::NotFound,
            other => MasterKeyError::Vault(other),
        }
    }
}

/// Manages the master secret and the key derived from it.
pub struct MasterKeyManager {
    vault: Box<dyn SecretVault>,
    security: SecurityConfig,
}

impl MasterKeyManager {
    pub fn new(vault: Box<dyn SecretVault>, security: SecurityConfig) -> Self {
        Self { vault, security }
    }

    fn check_signature(&self) -> Result<(), MasterKeyError> {
        self.security
            .validate_signature()
            .map_err(|_| MasterKeyError::NotAuthorized)
    }

    /// Store the master secret, overwriting any prior value.
    pub fn set_master_secret(&self, secret: &str) -> Result<(), MasterKeyError> {
        if secret.is_empty() {
            return Err(MasterKeyError::Validation(
                "master secret must not be empty".to_string(),
            ));
        }

        tracing::info!("Storing master secret");
        Ok(self.vault.set(MASTER_SECRET_KEY, secret)?)
    }

    /// Retrieve the master secret. Signature-gated.
    pub fn get_master_secret(&self) -> Result<String, MasterKeyError> {
        self.check_signature()?;
        Ok(self.vault.get(MASTER_SECRET_KEY)?)
    }

    /// Remove the master secret from the vault. Signature-gated.
    pub fn clear_master_secret(&self) -> Result<(), MasterKeyError> {
        self.check_signature()?;
        tracing::info!("Clearing master secret");
        Ok(self.vault.delete(MASTER_SECRET_KEY)?)
    }

    /// True iff the signature check passes and a secret is stored.
    /// Never fails; any error reads as "not initialized".
    pub fn is_initialized(&self) -> bool {
        if self.security.validate_signature().is_err() {
            return false;
        }
        self.vault.get(MASTER_SECRET_KEY).is_ok()
    }

    /// Derive the 32-byte symmetric encryption key from a master secret.
    pub fn derive_key(&self, secret: &str) -> Zeroizing<[u8; 32]> {
        let mut key = Zeroizing::new([0u8; 32]);
        let digest = Sha256::digest(secret.as_bytes());
        key.copy_from_slice(&digest);
        key
    }

    /// Convenience: fetch the stored secret and derive the key from it.
    pub fn current_key(&self) -> Result<Zeroizing<[u8; 32]>, MasterKeyError> {
        let secret = self.get_master_secret()?;
        Ok(self.derive_key(&secret))
    }

    /// Validate a candidate master secret.
    pub fn validate_secret(&self, secret: &str) -> Result<(), MasterKeyError> {
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(MasterKeyError::Validation(format!(
                "master secret must contain at least {} characters",
                MIN_SECRET_LEN
            )));
        }
        Ok(())
    }

    /// Replace the master secret after verifying the current one.
    pub fn change_secret(&self, old: &str, new: &str) -> Result<(), MasterKeyError> {
        let current = self.get_master_secret()?;
        if current != old {
            return Err(MasterKeyError::Auth);
        }

        self.validate_secret(new)?;
        self.set_master_secret(new)
    }

    /// Set the "prompt for master secret on startup" setting. Signature-gated.
    pub fn set_prompt_on_startup(&self, prompt: bool) -> Result<(), MasterKeyError> {
        self.check_signature()?;
        let value = if prompt { "true" } else { "false" };
        Ok(self.vault.set(PROMPT_ON_STARTUP_KEY, value)?)
    }

    /// Read the startup prompt setting. Unset reads as `true` — always
    /// prompting is the safe default. Signature-gated.
    pub fn prompt_on_startup(&self) -> Result<bool, MasterKeyError> {
        self.check_signature()?;
        match self.vault.get(PROMPT_ON_STARTUP_KEY) {
            Ok(value) => Ok(value == "true"),
            Err(VaultError::NotFound(_)) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the startup prompt setting. Signature-gated.
    pub fn clear_prompt_on_startup(&self) -> Result<(), MasterKeyError> {
        self.check_signature()?;
        Ok(self.vault.delete(PROMPT_ON_STARTUP_KEY)?)
    }
}
