//! The end-to-end per-submission pipeline: task admission, optional
//! pre-delete, parsing, file-list indexing, document build, write, and the
//! grouped commit. At most one task is RUNNING per accession; a duplicate
//! call gets the existing task id back without starting a second worker.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{info, warn};
use uuid::Uuid;

use subsearch_types::{Result, TaskState, TaskStatus};

use crate::client::FileListClient;
use crate::documents::context::ValueMap;
use crate::documents::submission_doc::SubmissionDocumentBuilder;
use crate::documents::{FileIndexingContext, Submission};
use crate::filelists::FileListIndexer;
use crate::json_path::JsonPathService;
use crate::ontology::OntologyResolver;
use crate::parsers::{ParseContext, Parser};
use crate::registry::RegistryHandle;
use crate::settings::Settings;
use crate::writers::IndexWriterGroup;

/// What one `index_one` call produced
#[derive(Debug, Clone)]
pub struct IndexingResult {
    pub task_id: Uuid,
    pub accession: String,
    pub success: bool,
    /// True when an already-live task was returned instead of a new one
    pub deduplicated: bool,
    pub value_map: ValueMap,
    pub file_columns: BTreeSet<String>,
    pub file_count: u64,
}

impl IndexingResult {
    fn deduplicated(task_id: Uuid, accession: &str) -> Self {
        Self {
            task_id,
            accession: accession.to_string(),
            success: true,
            deduplicated: true,
            value_map: ValueMap::new(),
            file_columns: BTreeSet::new(),
            file_count: 0,
        }
    }
}

struct TaskEntry {
    status: RwLock<TaskStatus>,
    cancelled: Arc<AtomicBool>,
}

impl TaskEntry {
    fn queued(accession: &str) -> Self {
        Self {
            status: RwLock::new(TaskStatus::queued(accession)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn task_id(&self) -> Option<Uuid> {
        self.status.read().expect("task lock poisoned").task_id
    }

    fn state(&self) -> TaskState {
        self.status.read().expect("task lock poisoned").state
    }

    fn transition(&self, state: TaskState, message: Option<String>) {
        let mut status = self.status.write().expect("task lock poisoned");
        status.state = state;
        status.message = message;
    }
}

pub struct SubmissionIndexer {
    group: Arc<IndexWriterGroup>,
    registry: Arc<RegistryHandle>,
    resolver: Arc<OntologyResolver>,
    file_lists: FileListIndexer,
    json_paths: Arc<JsonPathService>,
    view_counts: Arc<HashMap<String, u64>>,
    tasks: DashMap<String, Arc<TaskEntry>>,
}

impl SubmissionIndexer {
    pub fn new(
        settings: &Settings,
        group: Arc<IndexWriterGroup>,
        registry: Arc<RegistryHandle>,
        resolver: Arc<OntologyResolver>,
        file_list_client: Arc<dyn FileListClient>,
        view_counts: Arc<HashMap<String, u64>>,
    ) -> Self {
        let file_lists = FileListIndexer::new(
            Arc::clone(&group),
            file_list_client,
            settings.batch_size,
            settings.manifest_concurrency,
        );
        Self {
            group,
            registry,
            resolver,
            file_lists,
            json_paths: Arc::new(JsonPathService::new()),
            view_counts,
            tasks: DashMap::new(),
        }
    }

    /// Index one submission end to end. `remove_existing` pre-deletes the
    /// file and page-tab documents of the accession; `commit` issues the
    /// grouped commit and publishes new searchers before returning.
    pub async fn index_one(&self, submission: Submission, remove_existing: bool, commit: bool) -> Result<IndexingResult> {
        let accession = submission.accession.clone();

        let entry = match self.tasks.entry(accession.clone()) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get().clone();
                if existing.state().is_live() {
                    if let Some(task_id) = existing.task_id() {
                        info!("{}: task {} already live, deduplicating", accession, task_id);
                        return Ok(IndexingResult::deduplicated(task_id, &accession));
                    }
                }
                let fresh = Arc::new(TaskEntry::queued(&accession));
                occupied.insert(fresh.clone());
                fresh
            }
            Entry::Vacant(vacant) => {
                let fresh = Arc::new(TaskEntry::queued(&accession));
                vacant.insert(fresh.clone());
                fresh
            }
        };
        let task_id = entry.task_id().expect("fresh task carries an id");
        entry.transition(TaskState::Running, None);

        match self.run_pipeline(&submission, remove_existing, commit, &entry).await {
            Ok((value_map, file_columns, file_count)) => {
                entry.transition(TaskState::Completed, None);
                info!("{}: indexed {} file(s)", accession, file_count);
                Ok(IndexingResult {
                    task_id,
                    accession,
                    success: true,
                    deduplicated: false,
                    value_map,
                    file_columns,
                    file_count,
                })
            }
            Err(e) => {
                warn!("{}: indexing failed: {}", accession, e);
                entry.transition(TaskState::Failed, Some(e.to_string()));
                Ok(IndexingResult {
                    task_id,
                    accession,
                    success: false,
                    deduplicated: false,
                    value_map: ValueMap::new(),
                    file_columns: BTreeSet::new(),
                    file_count: 0,
                })
            }
        }
    }

    async fn run_pipeline(
        &self,
        submission: &Submission,
        remove_existing: bool,
        commit: bool,
        entry: &TaskEntry,
    ) -> Result<(ValueMap, BTreeSet<String>, u64)> {
        if remove_existing {
            self.group.delete_files_by_owner(&submission.accession).await?;
            self.group.delete_pagetab_documents(&submission.accession).await?;
        }

        let ctx = Arc::new(FileIndexingContext::new());
        let registry = self.registry.snapshot();
        let ontology = self.resolver.get()?;

        let mut value_map = ValueMap::new();
        {
            let parse_ctx = ParseContext {
                submission,
                json_paths: &self.json_paths,
                view_counts: &self.view_counts,
            };
            for descriptor in registry.global_property_registry().values() {
                match Parser::from(descriptor.parser).parse(&parse_ctx, descriptor) {
                    Ok(Some(value)) => {
                        value_map.insert(descriptor.name.clone(), value);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("{}: parser for '{}' failed: {}", submission.accession, descriptor.name, e);
                        ctx.mark_indexing_error();
                    }
                }
            }
        }

        self.file_lists
            .index_file_lists(submission, Arc::clone(&ctx), Arc::clone(&entry.cancelled))
            .await?;

        let builder = SubmissionDocumentBuilder::new(&self.group.submission_schema, &registry, &ontology);
        let doc = builder.build(submission, &mut value_map, &ctx)?;
        self.group.update_submission(&submission.accession, doc).await?;

        if commit {
            self.group
                .set_submission_commit_data(vec![("updateTime".to_string(), Utc::now().timestamp_millis().to_string())]);
            self.group.commit_all().await?;
            self.group.refresh_all()?;
        }

        Ok((value_map, ctx.file_columns(), ctx.file_count()))
    }

    /// Remove every trace of an accession from the submission and file
    /// indices, then commit.
    pub async fn delete_submission(&self, accession: &str) -> Result<()> {
        self.group.delete_submission_documents(accession).await?;
        self.group.delete_files_by_owner(accession).await?;
        self.group.commit_submission_and_files().await?;
        self.group.refresh_all()?;
        info!("{}: deleted", accession);
        Ok(())
    }

    /// Current status of the accession's task, or the NOT_FOUND ghost
    pub fn task_status(&self, accession: &str) -> TaskStatus {
        match self.tasks.get(accession) {
            Some(entry) => entry.status.read().expect("task lock poisoned").clone(),
            None => TaskStatus::not_found(accession),
        }
    }

    /// Ask a live task to stop scheduling new work. In-flight writes
    /// complete; partial file writes stay until the next successful pass.
    pub fn cancel(&self, accession: &str) -> bool {
        if let Some(entry) = self.tasks.get(accession) {
            if entry.state().is_live() {
                entry.cancelled.store(true, std::sync::atomic::Ordering::SeqCst);
                entry.transition(TaskState::Cancelled, None);
                return true;
            }
        }
        false
    }
}
