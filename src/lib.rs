//! SSH Keeper Core
//!
//! Secure local store for SSH connection profiles. Connections are persisted
//! to a human-editable OpenSSH-style config file; password fields are
//! encrypted at rest with a key derived from a user-supplied master secret,
//! which itself lives in the OS keychain.
//!
//! The UI layer consumes this crate exclusively through [`ConnectionStore`]
//! and [`MasterKeyManager`]; it never touches the cipher or file format
//! directly.

pub mod cipher;
pub mod codec;
pub mod connection;
pub mod master_key;
pub mod security;
pub mod storage;
pub mod store;
pub mod vault;

pub use cipher::{looks_encrypted, CipherError, FieldCipher};
pub use codec::{parse, serialize, ConfigFile, HostBlock, FORMAT_VERSION};
pub use connection::{AuthMethod, Connection, DEFAULT_SSH_PORT};
pub use master_key::{MasterKeyManager, MasterKeyError};
pub use security::{SecurityConfig, SecurityError};
pub use storage::{config_dir, connections_file, StorageError};
pub use store::{ConnectionStore, ImportReport, StoreError};
pub use vault::{KeyringVault, MemoryVault, SecretVault, VaultError};
