//! Error taxonomy for engine operations
//!
//! A duplicate award is not an error: it comes back as `AwardResult { awarded: false, .. }`.
//! Ledger drift is not an error either: it is reported by the reconciliation checker.

/// Errors returned by progression engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Unknown node, malformed payload, or a request that can never succeed as sent
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Prerequisites of the node are not complete for this learner
    #[error("Node {node_id} is locked for learner {learner_id}")]
    LockedNode { learner_id: String, node_id: String },

    /// Actor is not allowed to perform an admin operation
    #[error("Actor {0} is not authorized for this operation")]
    Unauthorized(String),

    /// Store failure; the request is idempotent and safe to resend as-is
    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    pub(crate) fn unknown_node(node_id: &str) -> Self {
        Self::Validation(format!("Unknown node: {node_id}"))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
