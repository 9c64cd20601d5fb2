//! Error Types
//!
//! Two layers: [`CollaboratorError`] for failures reported by the external
//! fetch, write and storage collaborators, and [`TreeError`] for the tree
//! subsystem itself.

use thiserror::Error;

use crate::models::NodeId;

/// Failure reported by an external collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    /// Collaborator could not be reached or failed internally
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    /// Collaborator refused the request
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl CollaboratorError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

impl From<std::io::Error> for CollaboratorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised by the tree subsystem
#[derive(Error, Debug)]
pub enum TreeError {
    /// A fetch during tree assembly failed; the whole build is discarded
    #[error("Tree build failed during {phase}: {source}")]
    Build {
        phase: &'static str,
        #[source]
        source: CollaboratorError,
    },

    #[error("Node not found: {id}")]
    NodeNotFound { id: NodeId },

    /// Move would break the tree shape (self or descendant target)
    #[error("Invalid move: {0}")]
    InvalidMove(String),

    /// Target node cannot receive the operation
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("No current container is selected")]
    NoCurrentContainer,

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl TreeError {
    pub fn build(phase: &'static str, source: CollaboratorError) -> Self {
        Self::Build { phase, source }
    }

    pub fn node_not_found(id: NodeId) -> Self {
        Self::NodeNotFound { id }
    }

    pub fn invalid_move(msg: impl Into<String>) -> Self {
        Self::InvalidMove(msg.into())
    }

    pub fn invalid_target(msg: impl Into<String>) -> Self {
        Self::InvalidTarget(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error was detected before any write call was issued
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TreeError::NodeNotFound { .. }
                | TreeError::InvalidMove(_)
                | TreeError::InvalidTarget(_)
                | TreeError::NoCurrentContainer
        )
    }
}

pub type TreeResult<T> = Result<T, TreeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_validation_errors_precede_writes() {
        assert!(TreeError::node_not_found(Uuid::new_v4()).is_validation());
        assert!(TreeError::invalid_move("into itself").is_validation());
        assert!(TreeError::NoCurrentContainer.is_validation());

        let write: TreeError = CollaboratorError::rejected("unknown parent").into();
        assert!(matches!(write, TreeError::Collaborator(CollaboratorError::Rejected(_))));
        assert!(!write.is_validation());
        assert!(!TreeError::build("leaves", CollaboratorError::unavailable("down")).is_validation());
    }

    #[test]
    fn test_io_and_json_errors_convert() {
        let io: CollaboratorError = std::io::Error::other("disk full").into();
        assert!(matches!(io, CollaboratorError::Io(_)));

        let json: CollaboratorError = serde_json::from_str::<Vec<Uuid>>("{").unwrap_err().into();
        assert!(matches!(json, CollaboratorError::Serialization(_)));
    }
}
