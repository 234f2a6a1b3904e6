//! Error types shared across the indexing and query sides. Conversions for
//! the HTTP client live in [`crate::extra_errors`] behind the `extra-errors`
//! feature so library users can opt out of the reqwest dependency.

use serde::{Deserialize, Serialize};
use tantivy::query::QueryParserError;
use tantivy::schema::FacetParseError;
use tantivy::TantivyError;
use thiserror::Error;

/// The body handed back to callers when a query cannot be built. Echoes the
/// offending query so the caller can correlate.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// The human-readable message given back
    pub message: String,
    /// The query that triggered the failure, when one was involved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl ErrorResponse {
    /// Create an error response from anything that implements ToString
    pub fn new<M: ToString>(message: M) -> Self {
        Self {
            message: message.to_string(),
            query: None,
        }
    }

    /// Attach the original query string to the response
    pub fn with_query<M: ToString>(message: M, query: M) -> Self {
        Self {
            message: message.to_string(),
            query: Some(query.to_string()),
        }
    }
}

/// Base error taxonomy of the service
#[derive(Debug, Error)]
pub enum Error {
    /// Anything related to reading from disk or network streams
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
    /// A notification that does not carry the mandatory keys; logged and dropped
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
    /// Registry or parser misconfiguration; fatal at startup, surfaced at first use otherwise
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Malformed submission JSON, bad date or bad extractor pattern
    #[error("Parse error: {0}")]
    ParseError(String),
    /// A single file or manifest could not be processed
    #[error("File parsing error: {0}")]
    FileParsingError(String),
    /// Failure to write or commit an index; aborts the current submission
    #[error("Index write error: {0}")]
    IndexWriteError(String),
    /// The user query could not be parsed or expanded
    #[error("Error building query: '{0}'")]
    QueryBuildError(String),
    /// A query tried to reference a field that does not exist
    #[error("Unknown field: '{0}' queried")]
    UnknownField(String),
    /// Any error bubbling out of tantivy
    #[error("Error in index: '{0}'")]
    TantivyError(#[from] TantivyError),
    /// Any error related to serde_json
    #[error("Error parsing json: '{0}'")]
    JsonParsing(#[from] serde_json::Error),
    /// Any error from an upstream HTTP call
    #[error("Http error: '{0}'")]
    HttpError(String),
}

impl From<QueryParserError> for Error {
    fn from(err: QueryParserError) -> Self {
        Error::QueryBuildError(err.to_string())
    }
}

impl From<FacetParseError> for Error {
    fn from(err: FacetParseError) -> Self {
        Error::QueryBuildError(err.to_string())
    }
}
