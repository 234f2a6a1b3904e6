#![forbid(unsafe_code)]
#![deny(future_incompatible)]
#![allow(clippy::cognitive_complexity)]

//! Subsearch: a faceted full-text index service for biological-study
//! submissions. The indexing pipeline turns a submission body plus its
//! file-list manifests into documents across three tantivy indices; the
//! query side parses, expands, and filters user queries against them.

pub mod analyzers;
pub mod client;
pub mod commit;
pub mod documents;
pub mod facets;
pub mod filelists;
pub mod indexer;
pub mod json_path;
pub mod listener;
pub mod ontology;
pub mod parsers;
pub mod registry;
pub mod schema;
pub mod search;
pub mod service;
pub mod settings;
pub mod writers;

pub type Result<T> = std::result::Result<T, subsearch_types::Error>;
