//! Error types for the restore subsystem
//!
//! Library components return these typed errors; the binary and startup code
//! wrap them in `anyhow` with context.

use std::path::PathBuf;
use thiserror::Error;

/// Failure while reading tagged values from a byte buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("input truncated: needed {needed} more bytes")]
    Truncated { needed: usize },
    #[error("unexpected tag {found:#04x} (expected {expected:#04x})")]
    UnexpectedTag { expected: u8, found: u8 },
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid channel position {0}")]
    InvalidPosition(u8),
    #[error("{0} channels exceeds the supported maximum")]
    TooManyChannels(usize),
}

/// Semantic problem with an entry's fields
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidEntry {
    #[error("invalid device or card name {0:?}")]
    InvalidName(String),
    #[error("volume has {volume} channels but channel map has {map}")]
    IncompatibleVolume { volume: usize, map: usize },
    #[error("invalid channel map")]
    InvalidChannelMap,
    #[error("invalid volume")]
    InvalidVolume,
}

/// A persisted record that cannot be turned into an [`Entry`](crate::entry::Entry)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecord {
    #[error(transparent)]
    Decode(#[from] TagError),
    #[error("unsupported record version {0}")]
    UnsupportedVersion(u8),
    #[error("record uses the legacy version {0} layout")]
    LegacyLayout(u8),
    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
    #[error(transparent)]
    Invalid(#[from] InvalidEntry),
}

/// Preference database failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open preference database at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: sled::Error,
    },
    #[error("preference database error: {0}")]
    Db(#[from] sled::Error),
}

/// Malformed extension protocol request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Decode(#[from] TagError),
    #[error("unknown command {0}")]
    UnknownCommand(u32),
    #[error("unknown update mode {0}")]
    UnknownMode(u32),
    #[error("unexpected trailing data in request")]
    TrailingData,
}

/// Errors surfaced by control operations (extension commands, object surface)
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("no entry named {0:?}")]
    NotFound(String),
    #[error("entry name must not be empty")]
    EmptyName,
    #[error(transparent)]
    Invalid(#[from] InvalidEntry),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl RestoreError {
    /// True for validation failures on a submitted record
    pub fn is_validation(&self) -> bool {
        matches!(self, RestoreError::EmptyName | RestoreError::Invalid(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_wraps_tag_error() {
        let err: MalformedRecord = TagError::Truncated { needed: 4 }.into();
        assert_eq!(err.to_string(), "input truncated: needed 4 more bytes");
    }

    #[test]
    fn test_validation_classification() {
        assert!(RestoreError::EmptyName.is_validation());
        assert!(RestoreError::from(InvalidEntry::InvalidVolume).is_validation());
        assert!(!RestoreError::NotFound("x".into()).is_validation());
        assert!(!RestoreError::from(ProtocolError::TrailingData).is_validation());
    }
}
