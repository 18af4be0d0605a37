//! Connection Store
//!
//! The aggregate root: owns the in-memory connection list, moves it through
//! the codec and cipher on the way to and from disk, and implements CRUD
//! plus import/export with merge. Every mutating call rewrites the whole
//! file atomically before returning; on write failure the in-memory list is
//! rolled back to its pre-call state.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::cipher::{looks_encrypted, CipherError, FieldCipher};
use crate::codec::{self, ConfigFile, HostBlock};
use crate::connection::{AuthMethod, Connection};

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("No connection with id: {0}")]
    NotFound(String),

    #[error("Failed to persist connection file: {0}")]
    Persist(#[from] std::io::Error),

    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("All {skipped} connections in the file already exist")]
    AllDuplicates { skipped: usize },
}

/// Outcome of a successful import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub added: usize,
    pub skipped: usize,
}

/// Persistent store of SSH connection profiles.
pub struct ConnectionStore {
    path: PathBuf,
    cipher: FieldCipher,
    connections: Vec<Connection>,
    /// Directives outside any host block, carried through rewrites verbatim.
    global_settings: BTreeMap<String, String>,
    /// Ids of records whose in-memory password is an unopened ciphertext
    /// token: loaded without a key, or adopted from an import that already
    /// carried ciphertext. Every other password is plaintext, so `save`
    /// never has to guess which form it is looking at.
    sealed: HashSet<String>,
}

impl ConnectionStore {
    pub fn new(path: impl Into<PathBuf>, cipher: FieldCipher) -> Self {
        Self {
            path: path.into(),
            cipher,
            connections: Vec::new(),
            global_settings: BTreeMap::new(),
            sealed: HashSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bind (or replace) the encryption key, e.g. after onboarding.
    /// Passwords held as ciphertext from a keyless load stay that way until
    /// the next [`ConnectionStore::reload`].
    pub fn bind_key(&mut self, key: Zeroizing<[u8; 32]>) {
        self.cipher.bind_key(key);
    }

    pub fn cipher_initialized(&self) -> bool {
        self.cipher.is_initialized()
    }

    pub fn get_all(&self) -> &[Connection] {
        &self.connections
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }

    pub fn global_settings(&self) -> &BTreeMap<String, String> {
        &self.global_settings
    }

    /// Load the connection file. A missing file is an empty store, not an
    /// error. A password that fails to decrypt fails the whole load; the
    /// previous in-memory state is left untouched.
    pub fn load(&mut self) -> Result<(), StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Connection file not found, starting empty: {:?}", self.path);
                self.connections.clear();
                self.global_settings.clear();
                self.sealed.clear();
                return Ok(());
            }
            Err(e) => return Err(StoreError::Persist(e)),
        };

        let config = codec::parse(&content);

        let mut connections = Vec::with_capacity(config.hosts.len());
        let mut sealed = HashSet::new();
        for block in &config.hosts {
            let mut conn = block.to_connection();
            if let AuthMethod::Password { password } = &conn.auth {
                if looks_encrypted(password) {
                    if self.cipher.is_initialized() {
                        let plaintext = self.cipher.decrypt(password)?;
                        conn.auth = AuthMethod::Password {
                            password: plaintext,
                        };
                    } else {
                        // Keyless load: carry the token as-is and remember
                        // that it is not plaintext.
                        sealed.insert(conn.id.clone());
                    }
                }
            }
            connections.push(conn);
        }

        tracing::info!("Loaded {} connections from {:?}", connections.len(), self.path);
        self.connections = connections;
        self.global_settings = config.global_settings;
        self.sealed = sealed;
        Ok(())
    }

    /// Re-read the file, discarding in-memory state.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        self.load()
    }

    /// Serialize and rewrite the whole file. Passwords are encrypted iff the
    /// cipher is initialized; otherwise they are written in whatever form
    /// they are in memory — degraded but non-destructive.
    pub fn save(&self) -> Result<(), StoreError> {
        if !self.cipher.is_initialized() {
            tracing::warn!("Cipher not initialized, passwords written as-is");
        }

        let mut config = ConfigFile::new();
        config.global_settings = self.global_settings.clone();

        for conn in &self.connections {
            let mut block = HostBlock::from_connection(conn);
            // Sealed records already hold a ciphertext token; everything
            // else is plaintext and gets encrypted unconditionally.
            if !block.password.is_empty()
                && self.cipher.is_initialized()
                && !self.sealed.contains(&conn.id)
            {
                block.password = self.cipher.encrypt(&block.password)?;
            }
            config.hosts.push(block);
        }

        let text = codec::serialize(&config);
        write_atomic(&self.path, &text)?;

        tracing::debug!("Saved {} connections to {:?}", self.connections.len(), self.path);
        Ok(())
    }

    /// Add a new connection: assigns a fresh id (any caller-supplied id is
    /// discarded) and timestamps, persists.
    pub fn create(&mut self, conn: Connection) -> Result<Connection, StoreError> {
        if conn.name.is_empty() {
            return Err(StoreError::Validation(
                "connection name is required".to_string(),
            ));
        }

        let mut conn = conn;
        conn.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        conn.created_at = now;
        conn.updated_at = now;

        self.connections.push(conn.clone());
        if let Err(e) = self.save() {
            self.connections.pop();
            return Err(e);
        }

        tracing::info!("Created connection {} ({})", conn.name, conn.id);
        Ok(conn)
    }

    /// Replace an existing connection and persist.
    pub fn update(&mut self, conn: Connection) -> Result<Connection, StoreError> {
        let idx = self
            .connections
            .iter()
            .position(|c| c.id == conn.id)
            .ok_or_else(|| StoreError::NotFound(conn.id.clone()))?;

        let mut conn = conn;
        conn.touch();

        // A changed password comes from the caller and is plaintext; an
        // unchanged one keeps whatever provenance it had.
        let password_changed =
            conn.auth.password() != self.connections[idx].auth.password();
        let was_sealed = if password_changed {
            self.sealed.remove(&conn.id)
        } else {
            false
        };

        let previous = std::mem::replace(&mut self.connections[idx], conn.clone());
        if let Err(e) = self.save() {
            self.connections[idx] = previous;
            if was_sealed {
                self.sealed.insert(conn.id.clone());
            }
            return Err(e);
        }

        tracing::info!("Updated connection {} ({})", conn.name, conn.id);
        Ok(conn)
    }

    /// Remove a connection by id and persist.
    pub fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        let idx = self
            .connections
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let removed = self.connections.remove(idx);
        if let Err(e) = self.save() {
            self.connections.insert(idx, removed);
            return Err(e);
        }
        self.sealed.remove(id);

        tracing::info!("Deleted connection {}", id);
        Ok(())
    }

    /// Export the current records to another file with passwords decrypted
    /// to plaintext. The caller owns the resulting file's confidentiality.
    ///
    /// Best-effort per record: a password that fails to decrypt keeps its
    /// ciphertext instead of aborting the export — deliberately laxer than
    /// [`ConnectionStore::load`].
    pub fn export_to(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let mut config = ConfigFile::new();
        config.global_settings = self.global_settings.clone();

        for conn in &self.connections {
            let mut block = HostBlock::from_connection(conn);
            if self.sealed.contains(&conn.id) && self.cipher.is_initialized() {
                match self.cipher.decrypt(&block.password) {
                    Ok(plaintext) => block.password = plaintext,
                    Err(e) => {
                        tracing::warn!(
                            "Export keeps ciphertext for connection {}: {}",
                            conn.id,
                            e
                        );
                    }
                }
            }
            config.hosts.push(block);
        }

        let text = codec::serialize(&config);
        write_atomic(path.as_ref(), &text)?;

        tracing::info!(
            "Exported {} connections to {:?}",
            self.connections.len(),
            path.as_ref()
        );
        Ok(())
    }

    /// Merge connections from another file into the store.
    ///
    /// A candidate is a duplicate if it carries an id matching an existing
    /// record, or carries no id and matches an existing record's
    /// `(host, port, user, name)`. Non-duplicates get a fresh id and
    /// timestamps. Plaintext passwords are encrypted on the next save.
    /// A file containing only duplicates fails with
    /// [`StoreError::AllDuplicates`]; an empty file imports successfully
    /// with zero counts.
    pub fn import_from(&mut self, path: impl AsRef<Path>) -> Result<ImportReport, StoreError> {
        let content = fs::read_to_string(path.as_ref()).map_err(StoreError::Persist)?;
        let config = codec::parse(&content);

        let baseline = self.connections.len();
        let mut added = 0usize;
        let mut skipped = 0usize;

        for block in &config.hosts {
            let candidate = block.to_connection();

            let duplicate = if !candidate.id.is_empty() {
                self.connections.iter().any(|c| c.id == candidate.id)
            } else {
                self.connections.iter().any(|c| {
                    c.host == candidate.host
                        && c.port == candidate.port
                        && c.user == candidate.user
                        && c.name == candidate.name
                })
            };

            if duplicate {
                tracing::debug!("Skipping duplicate {}@{}", candidate.user, candidate.host);
                skipped += 1;
                continue;
            }

            let mut conn = candidate;
            conn.id = Uuid::new_v4().to_string();
            let now = Utc::now();
            conn.created_at = now;
            conn.updated_at = now;

            // A candidate that already carries ciphertext is adopted
            // verbatim; plaintext is encrypted by the save below.
            if conn.auth.password().is_some_and(looks_encrypted) {
                self.sealed.insert(conn.id.clone());
            }

            self.connections.push(conn);
            added += 1;
        }

        if added > 0 {
            if let Err(e) = self.save() {
                for conn in &self.connections[baseline..] {
                    self.sealed.remove(&conn.id);
                }
                self.connections.truncate(baseline);
                return Err(e);
            }
            tracing::info!("Imported {} connections ({} duplicates skipped)", added, skipped);
            return Ok(ImportReport { added, skipped });
        }

        if skipped > 0 {
            return Err(StoreError::AllDuplicates { skipped });
        }

        Ok(ImportReport {
            added: 0,
            skipped: 0,
        })
    }
}

/// Write to a temp file in the same directory, then rename over the target.
fn write_atomic(path: &Path, text: &str) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(text.as_bytes())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_key() -> Zeroizing<[u8; 32]> {
        Zeroizing::new([42u8; 32])
    }

    fn store_at(path: impl Into<PathBuf>) -> ConnectionStore {
        ConnectionStore::new(path, FieldCipher::with_key(test_key()))
    }

    fn password_conn(name: &str, host: &str) -> Connection {
        let mut conn = Connection::new(name, host, "root");
        conn.auth = AuthMethod::Password {
            password: "secret".to_string(),
        };
        conn
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp = tempdir().unwrap();
        let mut store = store_at(temp.path().join("config"));

        store.load().unwrap();
        assert!(store.get_all().is_empty());
    }

    #[test]
    fn test_create_assigns_id_and_persists_ciphertext() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config");
        let mut store = store_at(&path);

        let created = store.create(password_conn("db", "10.0.0.1")).unwrap();
        assert!(!created.id.is_empty());

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("Host 10.0.0.1"));
        assert!(text.contains("Password "));
        assert!(!text.contains("secret"), "plaintext must not hit disk");
    }

    #[test]
    fn test_create_requires_name() {
        let temp = tempdir().unwrap();
        let mut store = store_at(temp.path().join("config"));

        let result = store.create(Connection::new("", "h", "u"));
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_update_unknown_id_leaves_file_unchanged() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config");
        let mut store = store_at(&path);
        store.create(password_conn("db", "10.0.0.1")).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let mut ghost = password_conn("ghost", "nowhere");
        ghost.id = "no-such-id".to_string();
        assert!(matches!(
            store.update(ghost),
            Err(StoreError::NotFound(_))
        ));

        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_delete_unknown_id() {
        let temp = tempdir().unwrap();
        let mut store = store_at(temp.path().join("config"));
        assert!(matches!(
            store.delete("missing"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_create_rolls_back_on_write_failure() {
        let temp = tempdir().unwrap();
        // Parent "dir" is a plain file, so the write must fail
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let mut store = store_at(blocker.join("config"));

        let result = store.create(password_conn("db", "10.0.0.1"));
        assert!(matches!(result, Err(StoreError::Persist(_))));
        assert!(store.get_all().is_empty());
    }

    #[test]
    fn test_save_degraded_without_key() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config");
        let mut store = ConnectionStore::new(&path, FieldCipher::uninitialized());

        store.create(password_conn("db", "10.0.0.1")).unwrap();

        // Without a key the password is written as-is
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("Password secret"));
    }

    #[test]
    fn test_heuristic_lookalike_password_encrypted_at_rest() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config");
        let mut store = store_at(&path);

        // 20+ base64-alphabet characters: would be misclassified as
        // ciphertext by looks_encrypted, but save knows it is plaintext
        let mut conn = Connection::new("db", "10.0.0.1", "root");
        conn.auth = AuthMethod::Password {
            password: "Correct0Horse0Battery0Staple".to_string(),
        };
        store.create(conn).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(
            !text.contains("Correct0Horse0Battery0Staple"),
            "password must be ciphertext at rest"
        );

        let mut fresh = store_at(&path);
        fresh.load().unwrap();
        assert_eq!(
            fresh.get_all()[0].auth.password(),
            Some("Correct0Horse0Battery0Staple")
        );
    }

    #[test]
    fn test_keyless_load_then_bind_key_keeps_token_intact() {
        fn password_line(text: &str) -> String {
            text.lines()
                .find(|l| l.trim_start().starts_with("Password "))
                .unwrap()
                .to_string()
        }

        let temp = tempdir().unwrap();
        let path = temp.path().join("config");
        let mut writer = store_at(&path);
        writer.create(password_conn("db", "10.0.0.1")).unwrap();
        let before = password_line(&fs::read_to_string(&path).unwrap());

        // Load without a key: the on-disk token is carried as-is
        let mut degraded = ConnectionStore::new(&path, FieldCipher::uninitialized());
        degraded.load().unwrap();
        assert_ne!(degraded.get_all()[0].auth.password(), Some("secret"));

        // Binding the key later and rewriting must not encrypt the
        // token a second time
        degraded.bind_key(test_key());
        degraded.save().unwrap();
        let after = password_line(&fs::read_to_string(&path).unwrap());
        assert_eq!(before, after);

        let mut fresh = store_at(&path);
        fresh.load().unwrap();
        assert_eq!(fresh.get_all()[0].auth.password(), Some("secret"));
    }

    #[test]
    fn test_load_fails_on_corrupt_ciphertext() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config");
        let mut store = store_at(&path);
        store.create(password_conn("db", "10.0.0.1")).unwrap();

        // Flip the ciphertext into a different, still-ciphertext-looking value
        let text = fs::read_to_string(&path).unwrap();
        let corrupted: String = text
            .lines()
            .map(|line| {
                if line.trim_start().starts_with("Password ") {
                    "    Password AAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_string()
                } else {
                    line.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(&path, corrupted).unwrap();

        let mut fresh = store_at(&path);
        assert!(matches!(fresh.load(), Err(StoreError::Cipher(_))));
        assert!(fresh.get_all().is_empty(), "no partial state exposed");
    }

    #[test]
    fn test_global_settings_survive_rewrite() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config");
        fs::write(&path, "Compression yes\n\nHost h\n    Name h\n    HostName h\n    User u\n").unwrap();

        let mut store = store_at(&path);
        store.load().unwrap();
        store.create(password_conn("db", "10.0.0.1")).unwrap();

        let mut fresh = store_at(&path);
        fresh.load().unwrap();
        assert_eq!(
            fresh.global_settings().get("compression"),
            Some(&"yes".to_string())
        );
    }
}
