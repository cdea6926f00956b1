//! Configuration parsing, environment overrides and validation.

pub mod env;
pub mod parser;
pub mod types;
pub mod validate;

use std::path::Path;

use crate::common::error::ConfigError;

pub use parser::load_config;
pub use types::*;

/// Load a config file, apply environment overrides, then validate.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let config = env::apply_env_overrides(load_config(path)?);
    validate::validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn conf_file() -> tempfile::NamedTempFile {
        tempfile::Builder::new().suffix(".conf").tempfile().unwrap()
    }

    #[test]
    fn test_load_and_validate_file() {
        let mut file = conf_file();
        writeln!(
            file,
            r#"server.bind = "127.0.0.1:0"
auth.jwt_secret = "from-the-file-secret""#
        )
        .unwrap();

        let config = load_and_validate(file.path()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:0");
    }

    #[test]
    fn test_load_and_validate_rejects_invalid() {
        let mut file = conf_file();
        writeln!(file, r#"auth.jwt_secret = "CHANGE_ME""#).unwrap();

        assert!(matches!(
            load_and_validate(file.path()),
            Err(ConfigError::ValidationError { .. })
        ));
    }
}
