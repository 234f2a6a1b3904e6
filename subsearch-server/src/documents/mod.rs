//! Document assembly: the submission model, the per-submission indexing
//! context, and the factories building file and submission documents.

use serde_json::Value;

use subsearch_types::{Error, Result};

use crate::parsers::date::epoch_millis;

pub mod context;
pub mod file_doc;
pub mod submission_doc;

pub use context::FileIndexingContext;

/// One submission, parsed out of the upstream JSON body. The raw body is
/// kept alongside the typed header because parsers and the file-list walk
/// read arbitrary nested structure.
#[derive(Debug, Clone)]
pub struct Submission {
    pub accession: String,
    pub version: i64,
    pub owner: Option<String>,
    pub released: bool,
    pub release_time: Option<i64>,
    pub modification_time: Option<i64>,
    pub creation_time: Option<i64>,
    pub raw: Value,
}

impl Submission {
    /// Parse the typed header. A missing or blank `accNo` is fatal for the
    /// whole submission.
    pub fn from_value(raw: Value) -> Result<Self> {
        let accession = raw
            .get("accNo")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| Error::ParseError("submission body without accNo".into()))?
            .to_string();
        let version = raw.get("version").and_then(Value::as_i64).unwrap_or(0);
        let owner = raw.get("owner").and_then(Value::as_str).map(str::to_string);
        let released = raw.get("released").and_then(Value::as_bool).unwrap_or(false);
        let release_time = epoch_millis(raw.get("releaseTime"))?;
        let modification_time = epoch_millis(raw.get("modificationTime"))?;
        let creation_time = epoch_millis(raw.get("creationTime"))?;
        Ok(Self {
            accession,
            version,
            owner,
            released,
            release_time,
            modification_time,
            creation_time,
            raw,
        })
    }

    /// Release instant per the resolver rule: an explicit positive
    /// `releaseTime` wins; a released submission falls back to its
    /// modification time; everything else has no release instant.
    pub fn resolved_release_time(&self) -> Option<i64> {
        match self.release_time {
            Some(t) if t > 0 => Some(t),
            _ if self.released => self.modification_time,
            _ => None,
        }
    }
}
