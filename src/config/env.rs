//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `WYNNRELAY_BIND` - Listen address
//! - `WYNNRELAY_JWT_SECRET` - Token secret
//! - `WYNNRELAY_MIN_MOD_VERSION` - Minimum mod version
//! - `WYNNRELAY_LEDGER_DIR` - File ledger directory (selects the file ledger)

use std::env;

use crate::config::types::{Config, LedgerKind};

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "WYNNRELAY";

/// Apply environment variable overrides to a config.
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(bind) = env::var(format!("{}_BIND", ENV_PREFIX)) {
        config.server.bind = bind;
    }
    if let Ok(secret) = env::var(format!("{}_JWT_SECRET", ENV_PREFIX)) {
        config.auth.jwt_secret = secret;
    }
    if let Ok(version) = env::var(format!("{}_MIN_MOD_VERSION", ENV_PREFIX)) {
        config.mods.minimum_version = Some(version);
    }
    if let Ok(directory) = env::var(format!("{}_LEDGER_DIR", ENV_PREFIX)) {
        config.ledger.kind = LedgerKind::File;
        config.ledger.directory = Some(directory);
    }

    config
}

/// Get the config file path from environment or use default.
///
/// Checks `WYNNRELAY_CONFIG` environment variable, otherwise returns "wynnrelay.conf".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "wynnrelay.conf".to_string())
}
