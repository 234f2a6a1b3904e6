//! External collaborators: the submission fetcher, the file-list manifest
//! fetcher, and the view-count stats loader. Trait seams keep the pipeline
//! testable without a network.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use async_trait::async_trait;
use log::warn;

use subsearch_types::{Error, FileListPage, Result, SubmissionFetchResult};

/// Fetches one submission body from its `extTabUrl`
#[async_trait]
pub trait SubmissionClient: Send + Sync {
    async fn fetch_submission(&self, url: &str) -> SubmissionFetchResult;
}

/// Fetches one file-list manifest from its `filesUrl`
#[async_trait]
pub trait FileListClient: Send + Sync {
    async fn fetch_file_list(&self, url: &str) -> Result<FileListPage>;
}

/// Reqwest-backed implementation of both fetch seams
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl SubmissionClient for HttpClient {
    async fn fetch_submission(&self, url: &str) -> SubmissionFetchResult {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return SubmissionFetchResult::error(0, e.to_string()),
        };
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return SubmissionFetchResult::not_found(status.as_u16());
        }
        if !status.is_success() {
            return SubmissionFetchResult::error(status.as_u16(), format!("unexpected status {}", status));
        }
        match response.json::<serde_json::Value>().await {
            Ok(body) => SubmissionFetchResult::found(body, status.as_u16()),
            Err(e) => SubmissionFetchResult::error(status.as_u16(), e.to_string()),
        }
    }
}

#[async_trait]
impl FileListClient for HttpClient {
    async fn fetch_file_list(&self, url: &str) -> Result<FileListPage> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::FileParsingError(format!("manifest {} returned {}", url, status)));
        }
        Ok(response.json::<FileListPage>().await?)
    }
}

/// Load the view-count CSV: one `accession,count` line per submission.
/// Malformed lines are logged and skipped; a missing file is an error the
/// caller may tolerate.
pub fn load_view_counts(path: &Path) -> Result<HashMap<String, u64>> {
    let file = File::open(path)?;
    let mut counts = HashMap::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, ',');
        let accession = parts.next().map(str::trim).unwrap_or("");
        let count = parts.next().map(str::trim).and_then(|c| c.parse::<u64>().ok());
        match (accession.is_empty(), count) {
            (false, Some(count)) => {
                counts.insert(accession.to_string(), count);
            }
            _ => warn!("skipping malformed stats line {}: '{}'", number + 1, line),
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_view_counts_load() {
        let dir = std::env::temp_dir().join("subsearch-stats-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("views.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "S-TEST1,17").unwrap();
        writeln!(file, "S-TEST2, 3").unwrap();
        writeln!(file, "garbage-line").unwrap();
        writeln!(file).unwrap();

        let counts = load_view_counts(&path).unwrap();
        assert_eq!(counts.get("S-TEST1"), Some(&17));
        assert_eq!(counts.get("S-TEST2"), Some(&3));
        assert_eq!(counts.len(), 2);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_stats_file() {
        assert_eq!(load_view_counts(Path::new("/nonexistent/views.csv")).is_err(), true);
    }
}
