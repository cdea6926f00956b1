//! Handshake checks: token authentication and mod version policy.

use jsonwebtoken::{DecodingKey, Validation};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::common::error::AuthError;

/// Claims carried by a mod client token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// In-game name, becomes the session identity.
    #[serde(default)]
    pub username: String,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Resolves a handshake token to a session identity.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Result<String, AuthError>;
}

/// HS256 token validation.
#[derive(Clone)]
pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::default(),
        }
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, token: &str) -> Result<String, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        let username = data.claims.username.trim();
        if username.is_empty() {
            return Err(AuthError::MissingUsername);
        }
        Ok(username.to_string())
    }
}

/// Minimum mod version accepted for stream submissions.
#[derive(Debug, Clone, Default)]
pub struct VersionPolicy {
    minimum: Option<Version>,
}

impl VersionPolicy {
    pub fn new(minimum: Version) -> Self {
        Self {
            minimum: Some(minimum),
        }
    }

    /// Parse a version tag, accepting an optional leading `v`.
    pub fn parse_tag(tag: &str) -> Option<Version> {
        let tag = tag.trim();
        let tag = tag.strip_prefix('v').unwrap_or(tag);
        Version::parse(tag).ok()
    }

    /// Returns true if the tag is at least the minimum version.
    ///
    /// Without a minimum every tag passes. With one, unparseable tags are rejected.
    pub fn check(&self, tag: &str) -> bool {
        let Some(minimum) = &self.minimum else {
            return true;
        };
        match Self::parse_tag(tag) {
            Some(version) => version >= *minimum,
            None => false,
        }
    }
}

/// Issue a token for tests.
#[cfg(test)]
pub fn issue_test_token(secret: &[u8], username: &str) -> String {
    use jsonwebtoken::{EncodingKey, Header};

    let claims = Claims {
        username: username.to_string(),
        exp: chrono::Utc::now().timestamp() + 3600,
    };
    jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap()
}
