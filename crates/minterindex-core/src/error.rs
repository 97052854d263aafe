//! Error types for the ingestion pipeline.

use thiserror::Error;

/// Errors that can occur during indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Connection refused, timeout, non-2xx status.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The node answered with a non-zero `code` or a `log` message.
    #[error("Node error {code}: {log}")]
    Node { code: u32, log: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Block {height} is not available yet")]
    BlockUnavailable { height: u64 },

    #[error("Malformed block response for height {height}: {reason}")]
    MalformedBlock { height: u64, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Circuit breaker open for node: {0}")]
    CircuitOpen(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if the ingestion loop should simply retry the same height.
    ///
    /// Everything the node or the store can throw at us is transient from the
    /// loop's point of view; only configuration problems are not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Config(_))
    }

    /// Returns `true` if the error came from the node side (fetch or decode).
    pub fn is_node_side(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Node { .. }
                | Self::Decode(_)
                | Self::BlockUnavailable { .. }
                | Self::MalformedBlock { .. }
                | Self::CircuitOpen(_)
        )
    }
}
