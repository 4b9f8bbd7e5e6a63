use crate::DocId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document {0} not found")]
    DocumentNotFound(DocId),

    /// A document is present in the collection but missing from a norm table.
    /// The rebuild-on-mutation discipline makes this unreachable unless the
    /// index state was assembled by hand.
    #[error("index state is inconsistent: no norm entry for document {0}")]
    InconsistentState(DocId),

    #[error("language detector failed: {0}")]
    Detector(String),

    #[error("malformed input in {file}: {message}")]
    Malformed { file: String, message: String },
}

/// Why a boolean query was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("query is empty")]
    Empty,

    #[error("operator {operator} at token {index} has no left operand")]
    ConsecutiveOperators { operator: String, index: usize },

    #[error("unbalanced parentheses")]
    UnbalancedParentheses,

    #[error("operator is missing an operand")]
    MissingOperand,
}
