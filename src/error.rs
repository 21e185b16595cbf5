//! Crate-wide error type.
//!
//! Only the synchronous, propagatable failure kinds live here. Stream-closed
//! and remote-source-failure are protocol-level conditions represented by
//! the stream sentinel (see [`crate::streams`]) rather than by this type —
//! they are routine termination paths an operator takes every run, not
//! exceptional failures a caller needs to `match` on.

use thiserror::Error;

/// Errors surfaced at AST construction, RML translation, or configuration
/// load time.
#[derive(Debug, Clone, Error)]
pub enum FedQueryError {
    /// An AST node was asked to do something its shape does not support,
    /// e.g. instantiating a malformed expression tree.
    #[error("malformed AST node: {detail}")]
    MalformedAst { detail: String },

    /// The RML term-map translator was given an input it cannot translate,
    /// e.g. an empty template string.
    #[error("RML term-map translation failed: {detail}")]
    TermMapTranslation { detail: String },

    /// Configuration could not be loaded or did not deserialize.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<figment::Error> for FedQueryError {
    fn from(err: figment::Error) -> Self {
        FedQueryError::Config(err.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FedQueryError>;
