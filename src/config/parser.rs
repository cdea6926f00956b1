//! Configuration file parsing (HOCON format).

use std::path::Path;

use crate::common::error::ConfigError;
use crate::config::types::Config;
use hocon::HoconLoader;

/// Load configuration from a HOCON file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    HoconLoader::new()
        .load_file(path)
        .map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?
        .resolve()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
}

/// Load configuration from a HOCON string.
#[cfg(test)]
pub fn load_config_str(content: &str) -> Result<Config, ConfigError> {
    HoconLoader::new()
        .load_str(content)
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?
        .resolve()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{LedgerKind, DEFAULT_BIND, DEFAULT_MAX_FRAME_LENGTH};

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = load_config_str(
            r#"
            auth {
              jwt_secret = "super-secret-value"
            }
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.server.max_frame_length, DEFAULT_MAX_FRAME_LENGTH);
        assert_eq!(config.ledger.kind, LedgerKind::Memory);
        assert!(config.mods.minimum_version.is_none());
        assert!(!config.logging.json);
    }

    #[test]
    fn test_full_config() {
        let config = load_config_str(
            r#"
            server {
              bind = "127.0.0.1:4000"
              handshake_timeout_secs = 3
              max_frame_length = 4096
            }
            auth.jwt_secret = "super-secret-value"
            mods.minimum_version = "1.4.0"
            ledger {
              kind = "file"
              directory = "/var/lib/wynnrelay"
            }
            logging.json = true
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:4000");
        assert_eq!(config.server.handshake_timeout_secs, 3);
        assert_eq!(config.ledger.kind, LedgerKind::File);
        assert_eq!(config.ledger.directory.as_deref(), Some("/var/lib/wynnrelay"));
        assert_eq!(config.mods.minimum_version.as_deref(), Some("1.4.0"));
        assert!(config.logging.json);
        assert!(config.mods.version_policy().check("1.4.1"));
        assert!(!config.mods.version_policy().check("1.3.0"));
    }

    #[test]
    fn test_missing_auth_section_fails() {
        assert!(load_config_str("server.bind = \"127.0.0.1:4000\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/definitely/not/here/wynnrelay.conf");
        assert!(matches!(result, Err(ConfigError::IoError { .. })));
    }
}
