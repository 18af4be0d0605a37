//! Config Codec
//!
//! Parses and serializes the on-disk connection file: a constrained
//! OpenSSH-config dialect with store-specific metadata directives (`Name`,
//! `UseSSHKey`, `Password`, `ID`, timestamps). Directive keys are
//! case-insensitive on read; unrecognized keys are ignored so files written
//! by newer versions still parse.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connection::{AuthMethod, Connection, DEFAULT_SSH_PORT};

/// Current file format version, carried in the header for forward
/// compatibility. Unknown versions are still read best-effort.
pub const FORMAT_VERSION: &str = "1.0";

/// One `Host` block of the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostBlock {
    /// Host match patterns; the store writes exactly one, the hostname.
    pub patterns: Vec<String>,

    pub name: String,
    pub host_name: String,
    /// 0 means unset; normalized to 22 on conversion.
    pub port: u16,
    pub user: String,

    pub identity_file: String,
    pub use_ssh_key: bool,
    /// Opaque — may be ciphertext or plaintext.
    pub password: String,

    // SSH options passed through verbatim
    pub strict_host_key_checking: String,
    pub user_known_hosts_file: String,
    pub server_alive_interval: u32,
    pub server_alive_count_max: u32,

    // Store metadata
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// The complete parsed config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Directives outside any host block, keyed lowercase. Opaque
    /// passthrough; the store never interprets them.
    pub global_settings: BTreeMap<String, String>,
    pub hosts: Vec<HostBlock>,

    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConfigFile {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            global_settings: BTreeMap::new(),
            hosts: Vec::new(),
            version: FORMAT_VERSION.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBlock {
    /// Convert a parsed block into the domain model.
    ///
    /// An explicit `UseSSHKey` wins over a present password; otherwise a
    /// non-empty password selects password auth.
    pub fn to_connection(&self) -> Connection {
        let auth = if !self.use_ssh_key && !self.password.is_empty() {
            AuthMethod::Password {
                password: self.password.clone(),
            }
        } else {
            AuthMethod::Key {
                key_path: self.identity_file.clone(),
            }
        };

        // Fallback display name for hand-written or imported files
        let name = if self.name.is_empty() {
            format!("{}@{}", self.user, self.host_name)
        } else {
            self.name.clone()
        };

        Connection {
            id: self.id.clone(),
            name,
            host: self.host_name.clone(),
            user: self.user.clone(),
            port: Connection::normalize_port(self.port),
            auth,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            updated_at: self.updated_at.unwrap_or_else(Utc::now),
        }
    }

    pub fn from_connection(conn: &Connection) -> Self {
        let mut block = HostBlock {
            patterns: vec![conn.host.clone()],
            name: conn.name.clone(),
            host_name: conn.host.clone(),
            port: conn.port,
            user: conn.user.clone(),
            strict_host_key_checking: "ask".to_string(),
            server_alive_interval: 60,
            server_alive_count_max: 3,
            id: conn.id.clone(),
            created_at: Some(conn.created_at),
            updated_at: Some(conn.updated_at),
            ..Default::default()
        };

        match &conn.auth {
            AuthMethod::Key { key_path } => {
                block.use_ssh_key = true;
                block.identity_file = key_path.clone();
            }
            AuthMethod::Password { password } => {
                block.password = password.clone();
            }
        }

        block
    }
}

/// Parse config file content.
///
/// Lenient by design: blank lines, comments, malformed lines, and unknown
/// directives are skipped, never errors.
pub fn parse(content: &str) -> ConfigFile {
    let mut config = ConfigFile::new();
    let mut current: Option<HostBlock> = None;

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.to_lowercase().starts_with("host ") {
            if let Some(block) = current.take() {
                config.hosts.push(block);
            }

            let patterns = line
                .split_whitespace()
                .skip(1) // the "Host" keyword
                .map(str::to_string)
                .collect();
            current = Some(HostBlock {
                patterns,
                ..Default::default()
            });
            continue;
        }

        let mut parts = line.splitn(2, char::is_whitespace);
        let (key, value) = match (parts.next(), parts.next()) {
            (Some(k), Some(v)) => (k.to_lowercase(), v.trim()),
            _ => continue, // skip malformed lines
        };

        let Some(ref mut block) = current else {
            // Before the first Host line: global setting
            config.global_settings.insert(key, value.to_string());
            continue;
        };

        match key.as_str() {
            "name" => block.name = value.to_string(),
            "hostname" => block.host_name = value.to_string(),
            "port" => {
                // Non-numeric port is ignored
                if let Ok(port) = value.parse() {
                    block.port = port;
                }
            }
            "user" => block.user = value.to_string(),
            "identityfile" => block.identity_file = value.to_string(),
            "usesshkey" => {
                let v = value.to_lowercase();
                block.use_ssh_key = v == "true" || v == "yes" || v == "1";
            }
            "password" => block.password = value.to_string(),
            "stricthostkeychecking" => block.strict_host_key_checking = value.to_string(),
            "userknownhostsfile" => block.user_known_hosts_file = value.to_string(),
            "serveraliveinterval" => {
                if let Ok(interval) = value.parse() {
                    block.server_alive_interval = interval;
                }
            }
            "serveralivecountmax" => {
                if let Ok(count) = value.parse() {
                    block.server_alive_count_max = count;
                }
            }
            "id" => block.id = value.to_string(),
            "createdat" => {
                if let Ok(t) = DateTime::parse_from_rfc3339(value) {
                    block.created_at = Some(t.with_timezone(&Utc));
                }
            }
            "updatedat" => {
                if let Ok(t) = DateTime::parse_from_rfc3339(value) {
                    block.updated_at = Some(t.with_timezone(&Utc));
                }
            }
            _ => {} // Ignore unknown directives
        }
    }

    if let Some(block) = current {
        config.hosts.push(block);
    }

    config
}

/// Serialize a config file to text. Defaults and empty fields are omitted;
/// `ID` and timestamps are always written when present so the file
/// round-trips.
pub fn serialize(config: &ConfigFile) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# SSH Keeper Configuration File");
    let _ = writeln!(out, "# Generated on {}", Utc::now().to_rfc3339());
    let _ = writeln!(out, "# Version: {}", config.version);
    out.push('\n');

    if !config.global_settings.is_empty() {
        let _ = writeln!(out, "# Global Settings");
        for (key, value) in &config.global_settings {
            let _ = writeln!(out, "{} {}", key, value);
        }
        out.push('\n');
    }

    for block in &config.hosts {
        let _ = writeln!(out, "Host {}", block.patterns.join(" "));

        if !block.name.is_empty() {
            let _ = writeln!(out, "    Name {}", block.name);
        }
        if !block.host_name.is_empty() {
            let _ = writeln!(out, "    HostName {}", block.host_name);
        }
        if block.port != 0 && block.port != DEFAULT_SSH_PORT {
            let _ = writeln!(out, "    Port {}", block.port);
        }
        if !block.user.is_empty() {
            let _ = writeln!(out, "    User {}", block.user);
        }
        if !block.identity_file.is_empty() {
            let _ = writeln!(out, "    IdentityFile {}", block.identity_file);
        }
        if block.use_ssh_key {
            let _ = writeln!(out, "    UseSSHKey true");
        }
        if !block.password.is_empty() {
            let _ = writeln!(out, "    Password {}", block.password);
        }
        if !block.strict_host_key_checking.is_empty() {
            let _ = writeln!(
                out,
                "    StrictHostKeyChecking {}",
                block.strict_host_key_checking
            );
        }
        if !block.user_known_hosts_file.is_empty() {
            let _ = writeln!(out, "    UserKnownHostsFile {}", block.user_known_hosts_file);
        }
        if block.server_alive_interval != 0 {
            let _ = writeln!(out, "    ServerAliveInterval {}", block.server_alive_interval);
        }
        if block.server_alive_count_max != 0 {
            let _ = writeln!(
                out,
                "    ServerAliveCountMax {}",
                block.server_alive_count_max
            );
        }

        if !block.id.is_empty() {
            let _ = writeln!(out, "    ID {}", block.id);
        }
        if let Some(created) = block.created_at {
            let _ = writeln!(out, "    CreatedAt {}", created.to_rfc3339());
        }
        if let Some(updated) = block.updated_at {
            let _ = writeln!(out, "    UpdatedAt {}", updated.to_rfc3339());
        }

        out.push('\n');
    }

    out
}
