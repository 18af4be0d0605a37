//! Connection model
//!
//! The domain entity users perceive. Passwords live here as plaintext in
//! memory; the store encrypts them on the way to disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Authentication method for a connection — exactly one of the two,
/// never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AuthMethod {
    /// Key-based auth. An empty `key_path` means "search the default key
    /// locations" — resolving that is the SSH launcher's concern.
    Key { key_path: String },
    /// Password-based auth. Plaintext in memory, ciphertext at rest.
    Password { password: String },
}

impl AuthMethod {
    pub fn password(&self) -> Option<&str> {
        match self {
            AuthMethod::Password { password } => Some(password),
            AuthMethod::Key { .. } => None,
        }
    }

    pub fn key_path(&self) -> Option<&str> {
        match self {
            AuthMethod::Key { key_path } => Some(key_path),
            AuthMethod::Password { .. } => None,
        }
    }
}

/// An SSH connection profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Opaque unique identifier, assigned by the store on creation.
    /// Empty only before first persistence.
    pub id: String,
    pub name: String,
    pub host: String,
    pub user: String,
    pub port: u16,
    pub auth: AuthMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// New unsaved connection with default port and key-based auth.
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.into(),
            host: host.into(),
            user: user.into(),
            port: DEFAULT_SSH_PORT,
            auth: AuthMethod::Key {
                key_path: String::new(),
            },
            created_at: now,
            updated_at: now,
        }
    }

    /// Normalize an on-disk port value: unset (0) falls back to 22.
    pub fn normalize_port(port: u16) -> u16 {
        if port == 0 {
            DEFAULT_SSH_PORT
        } else {
            port
        }
    }

    /// Refresh `updated_at` after a mutation.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
