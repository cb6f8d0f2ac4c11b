use crate::transport::TransportError;

/// Error returned by the data-access layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Locally malformed intent, e.g. a delete or patch without an identifier.
    #[error("invalid mutation: {0}")]
    InvalidMutation(String),
    /// Scoped commit requested for a document type with an empty batch.
    #[error("no pending changes for document type `{0}`")]
    NoPendingChanges(&'static str),
    /// Failure reported by the transport collaborator, propagated unchanged.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    /// Document could not be turned into (or recovered from) its wire value.
    #[error("document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
