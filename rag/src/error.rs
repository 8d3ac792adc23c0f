//! Error types for the retrieval engine.

use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`RagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input: empty query or document, invalid size, threshold or `top_k`.
    Validation,
    /// A document, chunk or cache key does not exist.
    NotFound,
    /// An input exceeds a configured limit.
    Capacity,
    /// The embedding provider failed or timed out.
    External,
    /// Cache or store I/O failure, or a broken invariant.
    Internal,
}

/// Errors that can occur in retrieval operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Document content is empty.
    #[error("document content is empty")]
    EmptyDocument,

    /// Chunk size must be positive.
    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    /// Overlap must lie in `[0, max_chunk_size)`.
    #[error("invalid overlap {overlap} for max chunk size {max_chunk_size}")]
    InvalidOverlap {
        /// Requested overlap.
        overlap: usize,
        /// Configured maximum chunk size.
        max_chunk_size: usize,
    },

    /// Unrecognized chunking strategy tag.
    #[error("invalid chunking strategy: {0}")]
    InvalidStrategy(String),

    /// Query text is empty.
    #[error("query text is empty")]
    QueryEmpty,

    /// `top_k` must be positive.
    #[error("invalid top_k: {0}")]
    InvalidTopK(usize),

    /// Threshold must lie in `[0, 1]`.
    #[error("invalid threshold: {0}")]
    InvalidThreshold(f32),

    /// Dimension mismatch between a vector and the store.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension provided.
        actual: usize,
    },

    /// A document was stored without a vector.
    #[error("document {0} has no vector")]
    EmptyVector(String),

    /// A document failed validation.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Document is larger than the configured maximum.
    #[error("document {id} is {size} bytes, limit is {max}")]
    DocumentTooLarge {
        /// Document identifier.
        id: String,
        /// Document size in bytes.
        size: usize,
        /// Configured maximum in bytes.
        max: usize,
    },

    /// Document or chunk not found.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Cache key absent or expired.
    #[error("cache key not found: {0}")]
    KeyNotFound(String),

    /// Embedding operation failed.
    #[error("embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),

    /// Embedding call exceeded the configured deadline.
    #[error("embedding timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Persistence operation failed.
    #[error("persistence error at {path}: {source}")]
    Persistence {
        /// Path where the error occurred.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A background task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),

    /// The component has been closed.
    #[error("{0} is closed")]
    Closed(&'static str),

    /// An error annotated with the operation that produced it.
    #[error("{op}: {source}")]
    Operation {
        /// Operation name, e.g. `retrieve` or `add_document`.
        op: &'static str,
        /// Structured diagnostic details.
        details: BTreeMap<String, String>,
        /// Underlying error.
        #[source]
        source: Box<RagError>,
    },
}

impl RagError {
    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyDocument
            | Self::InvalidChunkSize(_)
            | Self::InvalidOverlap { .. }
            | Self::InvalidStrategy(_)
            | Self::QueryEmpty
            | Self::InvalidTopK(_)
            | Self::InvalidThreshold(_)
            | Self::DimensionMismatch { .. }
            | Self::EmptyVector(_)
            | Self::InvalidDocument(_)
            | Self::InvalidConfig(_) => ErrorKind::Validation,
            Self::NotFound(_) | Self::KeyNotFound(_) => ErrorKind::NotFound,
            Self::DocumentTooLarge { .. } => ErrorKind::Capacity,
            Self::Embedding(_) | Self::Timeout(_) => ErrorKind::External,
            Self::Persistence { .. }
            | Self::Serialization(_)
            | Self::Task(_)
            | Self::Closed(_) => ErrorKind::Internal,
            Self::Operation { source, .. } => source.kind(),
        }
    }

    /// Wraps this error with the name of the failing operation.
    ///
    /// An error that already carries an operation keeps the innermost name.
    #[must_use]
    pub fn context(self, op: &'static str) -> Self {
        match self {
            already @ Self::Operation { .. } => already,
            other => Self::Operation {
                op,
                details: BTreeMap::new(),
                source: Box::new(other),
            },
        }
    }

    /// Attaches a diagnostic detail, wrapping the error in an anonymous operation if needed.
    #[must_use]
    pub fn with_detail(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        match self {
            Self::Operation {
                op,
                mut details,
                source,
            } => {
                details.insert(key.into(), value.into());
                Self::Operation {
                    op,
                    details,
                    source,
                }
            }
            other => other.context("unknown").with_detail(key, value),
        }
    }

    /// Operation name, if the error carries one.
    #[must_use]
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Operation { op, .. } => Some(op),
            _ => None,
        }
    }

    /// Diagnostic details, empty when the error carries none.
    #[must_use]
    pub fn details(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Operation { details, .. } => Some(details),
            _ => None,
        }
    }

    /// Returns the innermost error, looking through operation wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns `true` for not-found errors, including wrapped ones.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(RagError::QueryEmpty.kind(), ErrorKind::Validation);
        assert_eq!(RagError::KeyNotFound("k".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            RagError::DocumentTooLarge {
                id: "d".into(),
                size: 10,
                max: 5
            }
            .kind(),
            ErrorKind::Capacity
        );
        assert_eq!(
            RagError::Embedding(anyhow::anyhow!("rate limited")).kind(),
            ErrorKind::External
        );
        assert_eq!(RagError::Closed("vector store").kind(), ErrorKind::Internal);
    }

    #[test]
    fn operation_wrapper_keeps_cause() {
        let err = RagError::NotFound("doc-1".into())
            .context("delete_document")
            .with_detail("id", "doc-1");

        assert_eq!(err.operation(), Some("delete_document"));
        assert!(err.is_not_found());
        assert!(matches!(err.root(), RagError::NotFound(id) if id == "doc-1"));
        assert_eq!(
            err.details().and_then(|d| d.get("id")).map(String::as_str),
            Some("doc-1")
        );
        assert_eq!(err.to_string(), "delete_document: document not found: doc-1");
    }

    #[test]
    fn context_does_not_double_wrap() {
        let err = RagError::QueryEmpty.context("retrieve").context("hybrid_retrieve");
        assert_eq!(err.operation(), Some("retrieve"));
    }
}
