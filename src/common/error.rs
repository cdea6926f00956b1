//! Error types for the application.

use thiserror::Error;

use crate::bridge::sequence::StreamKind;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {message}")]
    IoError { path: String, message: String },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Wire protocol errors (framing and handshake).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Frame exceeds maximum length")]
    FrameTooLong,

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Handshake failed: {reason}")]
    Handshake { reason: String },

    #[error("Handshake timed out")]
    HandshakeTimeout,

    #[error("Connection closed before handshake")]
    ClosedBeforeHandshake,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_util::codec::LinesCodecError> for ProtocolError {
    fn from(e: tokio_util::codec::LinesCodecError) -> Self {
        match e {
            tokio_util::codec::LinesCodecError::MaxLineLengthExceeded => Self::FrameTooLong,
            tokio_util::codec::LinesCodecError::Io(e) => Self::Io(e),
        }
    }
}

/// Errors raised while relaying a single submission.
///
/// None of these are fatal: the relay loop logs them and moves on.
#[derive(Debug, Error, PartialEq)]
pub enum RelayError {
    #[error("Submission rejected: mod version '{version}' is below the minimum")]
    VersionRejected { version: String },

    #[error("No rule matched line on {stream} stream")]
    NoRuleMatched { stream: StreamKind },

    #[error("Passthrough line is not of the form 'header: content'")]
    UnmatchedPassthrough,

    #[error("Unknown session {0}")]
    UnknownSession(u64),
}

/// Item token decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Codepoint U+{0:X} is outside the encoded ranges")]
    InvalidCodepoint(u32),

    #[error("Single-byte codepoint is not the last character of the token")]
    MisplacedTrailingByte,

    #[error("Token payload is empty")]
    Empty,

    #[error("Expected start block, found block id {0}")]
    MissingStart(u8),

    #[error("Unsupported encoding version {0}")]
    UnsupportedVersion(u8),

    #[error("Unknown block id {0}")]
    UnknownBlock(u8),

    #[error("Token ended before the name block")]
    MissingName,

    #[error("Name is not valid UTF-8")]
    InvalidName,
}

/// Errors from side-effect collaborators (completion and reward ledgers).
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Ledger unavailable: {message}")]
    Unavailable { message: String },
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Token has no username")]
    MissingUsername,
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Result type alias for relay operations.
pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// Result type alias for ledger operations.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
