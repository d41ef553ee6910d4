use thiserror::Error;

use crate::core::node::NodeError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("node error: {0}")]
    Node(#[from] NodeError),
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    /// Broken chain or store invariant. Retrying the block won't help.
    #[error("invariant violation: {0}")]
    Invariant(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true for errors that must stop the indexer.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Node(_) | Self::Postgres(_) => false,
            Self::Invariant(_) | Self::Config(_) => true,
        }
    }
}

/// Builds an invariant violation error.
pub fn invariant(msg: impl Into<String>) -> Error {
    let msg = msg.into();
    tracing::error!("{msg}");
    Error::Invariant(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_errors_are_transient() {
        assert!(!Error::Node(NodeError::NodeUnreachable).is_fatal());
    }

    #[test]
    fn invariants_are_fatal() {
        assert!(invariant("missing rights").is_fatal());
        assert!(Error::Config(String::from("missing TW_NODE_URL")).is_fatal());
    }
}
