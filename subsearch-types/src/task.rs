//! Per-accession indexing task state, visible to status polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    NotFound,
}

impl TaskState {
    /// States that hold the per-accession slot; a second call while one of
    /// these is live gets the existing task id back.
    pub fn is_live(self) -> bool {
        matches!(self, TaskState::Queued | TaskState::Running)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TaskStatus {
    pub accession: String,
    /// Absent on the NOT_FOUND ghost status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    pub queued_at: DateTime<Utc>,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskStatus {
    pub fn queued(accession: &str) -> Self {
        Self {
            accession: accession.to_string(),
            task_id: Some(Uuid::new_v4()),
            queued_at: Utc::now(),
            state: TaskState::Queued,
            message: None,
        }
    }

    /// The ghost status returned when no task is known for an accession
    pub fn not_found(accession: &str) -> Self {
        Self {
            accession: accession.to_string(),
            task_id: None,
            queued_at: Utc::now(),
            state: TaskState::NotFound,
            message: None,
        }
    }
}
