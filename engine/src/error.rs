//! Error types for the Threadline engine.

use crate::{remote::RemoteError, EntityId};
use thiserror::Error;

/// All possible errors from the Threadline engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Content policy errors
    #[error("content is empty")]
    EmptyContent,

    #[error("content must be under {max} characters, got {len}")]
    ContentTooLong { len: usize, max: usize },

    #[error("content contains reserved word: '{0}'")]
    ReservedWord(String),

    #[error("not permitted: {0}")]
    NotPermitted(String),

    // State errors
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("malformed notification: {0}")]
    MalformedNotification(String),

    // Collaborator errors
    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::EntityNotFound(42);
        assert_eq!(err.to_string(), "entity not found: 42");

        let err = Error::ContentTooLong { len: 501, max: 500 };
        assert_eq!(
            err.to_string(),
            "content must be under 500 characters, got 501"
        );

        let err = Error::ReservedWord("spam".into());
        assert_eq!(err.to_string(), "content contains reserved word: 'spam'");
    }

    #[test]
    fn remote_error_converts() {
        let err: Error = RemoteError::Rejected("validation".into()).into();
        assert_eq!(
            err.to_string(),
            "remote call failed: rejected by server: validation"
        );
    }
}
