//! Secret Vault
//!
//! Small key-value store for long-lived secrets (the master secret and a
//! couple of settings), backed by the system keychain via the `keyring`
//! crate. The [`SecretVault`] trait exists so tests can run against an
//! in-memory backend instead of the real keychain.

use std::collections::HashMap;
use std::sync::Mutex;

use keyring::Entry;

/// Service name for keychain entries
const SERVICE_NAME: &str = "ssh-keeper";

/// Vault errors
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Secret not found for key: {0}")]
    NotFound(String),
}

/// Storage backend for small named secrets.
pub trait SecretVault {
    fn set(&self, key: &str, value: &str) -> Result<(), VaultError>;
    fn get(&self, key: &str) -> Result<String, VaultError>;
    fn delete(&self, key: &str) -> Result<(), VaultError>;
}

/// Vault backed by the OS keychain.
pub struct KeyringVault {
    service: String,
}

impl KeyringVault {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    /// Create with custom service name (for testing)
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, VaultError> {
        // Use explicit username to ensure stable keychain identity on macOS
        let username = whoami::username();
        Ok(Entry::new(&self.service, &format!("{}@{}", username, key))?)
    }
}

impl SecretVault for KeyringVault {
    fn set(&self, key: &str, value: &str) -> Result<(), VaultError> {
        tracing::info!("Vault set: service={}, key={}", self.service, key);
        let entry = self.entry(key)?;
        match entry.set_password(value) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!("Vault set failed: key={}, error={:?}", key, e);
                Err(VaultError::Keyring(e))
            }
        }
    }

    fn get(&self, key: &str) -> Result<String, VaultError> {
        tracing::debug!("Vault get: service={}, key={}", self.service, key);
        let entry = self.entry(key)?;
        match entry.get_password() {
            Ok(value) => Ok(value),
            Err(keyring::Error::NoEntry) => {
                tracing::debug!("Vault get: no entry for key={}", key);
                Err(VaultError::NotFound(key.to_string()))
            }
            Err(e) => {
                tracing::error!("Vault get failed: key={}, error={:?}", key, e);
                Err(VaultError::Keyring(e))
            }
        }
    }

    fn delete(&self, key: &str) -> Result<(), VaultError> {
        let entry = self.entry(key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already deleted
            Err(e) => Err(VaultError::Keyring(e)),
        }
    }
}

impl Default for KeyringVault {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory vault for tests. Never touches the system keychain.
#[derive(Default)]
pub struct MemoryVault {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretVault for MemoryVault {
    fn set(&self, key: &str, value: &str) -> Result<(), VaultError> {
        self.secrets
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<String, VaultError> {
        self.secrets
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(key.to_string()))
    }

    fn delete(&self, key: &str) -> Result<(), VaultError> {
        self.secrets.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_vault_operations() {
        let vault = MemoryVault::new();

        vault.set("master-secret", "hunter22").unwrap();
        assert_eq!(vault.get("master-secret").unwrap(), "hunter22");

        // Overwrite
        vault.set("master-secret", "changed").unwrap();
        assert_eq!(vault.get("master-secret").unwrap(), "changed");

        vault.delete("master-secret").unwrap();
        assert!(matches!(
            vault.get("master-secret"),
            Err(VaultError::NotFound(_))
        ));

        // Deleting an absent key is not an error
        vault.delete("master-secret").unwrap();
    }

    // Note: this test interacts with the real system keychain.
    // It uses a unique service name to avoid conflicts.
    #[test]
    #[ignore] // Run manually: cargo test vault -- --ignored
    fn test_keyring_vault_operations() {
        let vault = KeyringVault::with_service("ssh-keeper-test");

        vault.set("test-key", "test-secret").unwrap();
        assert_eq!(vault.get("test-key").unwrap(), "test-secret");

        vault.delete("test-key").unwrap();
        assert!(matches!(
            vault.get("test-key"),
            Err(VaultError::NotFound(_))
        ));
    }
}
