//! Configuration type definitions.

use serde::Deserialize;

use crate::protocol::auth::VersionPolicy;

pub const DEFAULT_BIND: &str = "0.0.0.0:3030";
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub mods: ModsConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Seconds a client has to send its hello frame.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    /// Longest accepted frame in bytes, newline excluded.
    #[serde(default = "default_max_frame_length")]
    pub max_frame_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            max_frame_length: default_max_frame_length(),
        }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_handshake_timeout_secs() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_SECS
}

fn default_max_frame_length() -> usize {
    DEFAULT_MAX_FRAME_LENGTH
}

/// Token validation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared HS256 secret.
    pub jwt_secret: String,
}

/// Mod client requirements.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModsConfig {
    /// Oldest mod version allowed to submit stream lines.
    pub minimum_version: Option<String>,
}

impl ModsConfig {
    /// Build the version policy. Unset or unparseable minimums accept every tag.
    pub fn version_policy(&self) -> VersionPolicy {
        self.minimum_version
            .as_deref()
            .and_then(VersionPolicy::parse_tag)
            .map(VersionPolicy::new)
            .unwrap_or_default()
    }
}

/// Ledger backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum LedgerKind {
    #[default]
    Memory,
    File,
}

impl TryFrom<String> for LedgerKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            other => Err(format!("unknown ledger kind '{}' (use: memory, file)", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub kind: LedgerKind,
    /// Directory for the file ledger.
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable ones.
    #[serde(default)]
    pub json: bool,
}
