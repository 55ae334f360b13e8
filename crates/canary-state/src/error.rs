//! Error types for the canaryd object store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("invalid object: {0}")]
    Invalid(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict on {key}: writer has version {expected}, stored version is {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },
}

impl StateError {
    /// Whether the error is a transient write conflict that a
    /// read-modify-write loop should retry after re-reading.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExists(_) | Self::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_conflicts() {
        assert!(StateError::AlreadyExists("default/web".into()).is_conflict());
        assert!(
            StateError::Conflict {
                key: "default/web".into(),
                expected: 1,
                actual: 2
            }
            .is_conflict()
        );
        assert!(!StateError::NotFound("default/web".into()).is_conflict());
        assert!(!StateError::Read("io".into()).is_conflict());
        assert!(StateError::NotFound("default/web".into()).is_not_found());
    }
}
