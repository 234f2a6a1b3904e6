//! Contracts for the upstream collaborators: the change-notification
//! message, the submission fetch result, and the file-list manifest page.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The message consumed from the upstream listener. Both keys are
/// mandatory; anything else is an invalid message.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmissionNotification {
    #[serde(rename = "accNo", default)]
    pub acc_no: Option<String>,
    #[serde(rename = "extTabUrl", default)]
    pub ext_tab_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchStatus {
    Found,
    NotFound,
    Error,
}

/// Outcome of fetching one submission body from its `extTabUrl`
#[derive(Debug, Clone)]
pub struct SubmissionFetchResult {
    pub status: FetchStatus,
    pub body: Option<Value>,
    pub http_status: u16,
    pub error_message: Option<String>,
}

impl SubmissionFetchResult {
    pub fn found(body: Value, http_status: u16) -> Self {
        Self {
            status: FetchStatus::Found,
            body: Some(body),
            http_status,
            error_message: None,
        }
    }

    pub fn not_found(http_status: u16) -> Self {
        Self {
            status: FetchStatus::NotFound,
            body: None,
            http_status,
            error_message: None,
        }
    }

    pub fn error<M: ToString>(http_status: u16, message: M) -> Self {
        Self {
            status: FetchStatus::Error,
            body: None,
            http_status,
            error_message: Some(message.to_string()),
        }
    }
}

/// One attribute of a file entry; blank names or values are skipped
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileAttribute {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// One file inside a fetched manifest. `size` may arrive as a number or a
/// string-encoded long, so it stays a raw value until parsed.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileEntry {
    #[serde(rename = "fileName", default)]
    pub file_name: Option<String>,
    #[serde(rename = "filePath", default)]
    pub file_path: Option<String>,
    #[serde(rename = "relPath", default)]
    pub rel_path: Option<String>,
    #[serde(default)]
    pub size: Option<Value>,
    #[serde(rename = "type", default)]
    pub entry_type: Option<String>,
    #[serde(default)]
    pub attributes: Vec<FileAttribute>,
}

impl FileEntry {
    /// Resolve `filePath` over `relPath`; absent means no path field at all
    pub fn path(&self) -> Option<&str> {
        self.file_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .or_else(|| self.rel_path.as_deref().filter(|p| !p.is_empty()))
    }

    /// Explicit `fileName`, else the basename of the resolved path
    pub fn name(&self) -> Option<&str> {
        if let Some(n) = self.file_name.as_deref().filter(|n| !n.is_empty()) {
            return Some(n);
        }
        self.path().map(|p| p.rsplit('/').next().unwrap_or(p))
    }

    /// Size with a default of zero; string-encoded longs are accepted
    pub fn size_bytes(&self) -> u64 {
        match &self.size {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse::<u64>().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.entry_type.as_deref() == Some("directory")
    }
}

/// A fetched file-list manifest: `{ "files": [...], "extType": "filesTable" }`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileListPage {
    #[serde(default)]
    pub files: Option<Vec<FileEntry>>,
    #[serde(rename = "extType", default)]
    pub ext_type: Option<String>,
}
