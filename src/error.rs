use thiserror::Error;

use crate::router::Route;

/// Errors raised by the relational data accessor.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("database backend error: {0}")]
    Backend(String),

    /// The server refused the statement itself: bad syntax or unknown names.
    #[error("statement rejected by the database: {0}")]
    Query(String),

    #[error("invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("failed to decode row: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for DataError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DataError::Decode(e.to_string())
            }
            sqlx::Error::Database(db) => DataError::Query(db.message().to_string()),
            _ => DataError::Backend(e.to_string()),
        }
    }
}

/// Errors raised while talking to the vector store or the embedding model.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("vector store unavailable: {0}")]
    Store(String),

    #[error("embedding model error: {0}")]
    Embedding(String),

    #[error("invalid upsert batch: {0}")]
    InvalidBatch(String),
}

impl From<qdrant_client::QdrantError> for RetrievalError {
    fn from(e: qdrant_client::QdrantError) -> Self {
        RetrievalError::Store(e.to_string())
    }
}

/// Errors raised by a completion backend.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Ollama error: {0}")]
    Ollama(String),

    #[error("completion service returned an empty reply")]
    Empty,
}

/// Errors raised while composing an answer for a routed query.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("refusing to execute non-SELECT statement: {0}")]
    UnsafeSql(String),

    #[error("cannot build chart: {0}")]
    ChartSpec(String),
}

/// Coarse classification of a failure, exposed to the chat surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A backend (database, vector store, completion service) failed.
    BackendUnavailable,
    /// Model output failed validation and was not acted upon.
    Rejected,
    /// The request could not be mapped onto the available data.
    Unsupported,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::BackendUnavailable => "backend_unavailable",
            FailureKind::Rejected => "rejected",
            FailureKind::Unsupported => "unsupported",
        }
    }
}

pub const SQL_REFUSAL: &str = "I can only run read-only SELECT queries against enterprise data.";

impl ComposeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ComposeError::Data(DataError::InvalidIdentifier(_)) => FailureKind::Unsupported,
            ComposeError::Data(DataError::Query(_)) | ComposeError::UnsafeSql(_) => {
                FailureKind::Rejected
            }
            ComposeError::Data(_) | ComposeError::Retrieval(_) | ComposeError::Completion(_) => {
                FailureKind::BackendUnavailable
            }
            ComposeError::ChartSpec(_) => FailureKind::Unsupported,
        }
    }

    /// The fixed message shown to the user in place of an answer.
    pub fn user_message(&self, route: Route) -> &'static str {
        if let ComposeError::UnsafeSql(_) = self {
            return SQL_REFUSAL;
        }
        match route {
            Route::Plot => "Unable to generate plot from enterprise data.",
            Route::Analytics => "Unable to compute analytics from enterprise data.",
            Route::Sql => "Unable to answer from the enterprise database.",
            Route::Retrieval => "Unable to search enterprise documents right now.",
        }
    }
}
