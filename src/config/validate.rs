//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use std::net::SocketAddr;

use crate::common::error::ConfigError;
use crate::config::types::{Config, LedgerKind};
use crate::protocol::auth::VersionPolicy;

const SECRET_PLACEHOLDER: &str = "CHANGE_ME";
const MIN_FRAME_LENGTH: usize = 256;

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    // Server
    if config.server.bind.parse::<SocketAddr>().is_err() {
        errors.push(format!(
            "server.bind '{}' is not a valid socket address",
            config.server.bind
        ));
    }
    if config.server.handshake_timeout_secs == 0 {
        errors.push("server.handshake_timeout_secs must be non-zero".to_string());
    }
    if config.server.max_frame_length < MIN_FRAME_LENGTH {
        errors.push(format!(
            "server.max_frame_length must be at least {} (got {})",
            MIN_FRAME_LENGTH, config.server.max_frame_length
        ));
    }

    // Auth
    if config.auth.jwt_secret.is_empty() {
        errors.push("auth.jwt_secret is required".to_string());
    }
    if config.auth.jwt_secret == SECRET_PLACEHOLDER {
        errors.push("auth.jwt_secret has not been configured (still using placeholder)".to_string());
    }

    // Mods
    if let Some(ref version) = config.mods.minimum_version {
        if VersionPolicy::parse_tag(version).is_none() {
            errors.push(format!(
                "mods.minimum_version '{}' is not a valid semantic version",
                version
            ));
        }
    }

    // Ledger
    if config.ledger.kind == LedgerKind::File {
        match config.ledger.directory.as_deref() {
            None | Some("") => {
                errors.push("ledger.directory is required when ledger.kind is 'file'".to_string())
            }
            Some(_) => {}
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}
