#![warn(clippy::all)]
//! Subsearch-Types
//! The high level types shared by the subsearch indexing pipeline and its
//! query side: the query DSL, registry descriptors, task statuses, and the
//! contracts of the upstream collaborators.

pub use error::{Error, ErrorResponse};
pub use fetch::{FetchStatus, FileAttribute, FileEntry, FileListPage, SubmissionFetchResult, SubmissionNotification};
pub use query::{
    boolean::BoolQuery, boolean::BoolQueryBuilder, facet::FacetQuery, phrase::PhraseQuery, phrase::TermGroup, range::RangeQuery,
    range::Ranges, term::ExactTerm, wildcard::WildcardQuery, CreateQuery, KeyValue, Query,
};
pub use registry::{CollectionDescriptor, FacetKind, FieldDescriptor, FieldType, ParserKind, PUBLIC_COLLECTION};
pub use server::SearchRequest;
pub use task::{TaskState, TaskStatus};

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, error::Error>;

/// Errors associated with indexing and query building
mod error;

/// Contracts of the upstream fetchers and listeners
mod fetch;

/// The query DSL produced by the parser and expansion engine
mod query;

/// Field and collection descriptors of the registry
mod registry;

/// Request bodies accepted by the search facade
mod server;

/// Indexing task lifecycle
mod task;

/// Extra error conversions for the HTTP client; omit the `extra-errors`
/// feature to avoid pulling in reqwest
#[cfg(feature = "extra-errors")]
mod extra_errors;
