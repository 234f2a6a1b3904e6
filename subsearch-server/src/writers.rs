//! The writer coordinator: one handle per index family (submissions,
//! files, page-tab), grouped commits with live commit metadata, and
//! explicit reader refreshes. Facets live inside the submission index,
//! so refreshing the taxonomy is refreshing that reader.

use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex as SyncMutex;

use log::trace;
use tantivy::directory::MmapDirectory;
use tantivy::schema::Schema;
use tantivy::{Document, Index, IndexReader, IndexWriter, LeasedItem, ReloadPolicy, Searcher, Term};
use tokio::sync::Mutex;

use serde_json::Value;
use subsearch_types::{Error, Result};

use crate::analyzers::AnalyzerConfig;
use crate::registry::PropertyRegistry;
use crate::schema::{FileFields, PageTabFields, SubmissionSchema};
use crate::settings::{Settings, FILES_DIR, PAGETAB_DIR, SUBMISSIONS_DIR};

/// One tantivy index with its writer behind a mutex and a manually
/// refreshed reader. Updates are delete-then-add under a single lock
/// acquisition so a key is never observably duplicated.
#[derive(Clone)]
pub struct IndexHandle {
    name: String,
    index: Index,
    writer: Arc<Mutex<IndexWriter>>,
    reader: IndexReader,
    current_opstamp: Arc<AtomicUsize>,
}

impl IndexHandle {
    pub fn open(settings: &Settings, dir: &str, schema: Schema, analyzer: Option<&AnalyzerConfig>) -> Result<Self> {
        let path = settings.index_path(dir);
        if !path.exists() {
            fs::create_dir_all(&path)?;
        }
        let mmap = MmapDirectory::open(&path).map_err(|e| Error::IndexWriteError(e.to_string()))?;
        let index = Index::open_or_create(mmap, schema)?;
        if let Some(analyzer) = analyzer {
            analyzer.register(&index);
        }
        let writer = index.writer(settings.writer_memory)?;
        writer.set_merge_policy(settings.get_merge_policy());
        Self::with_index(dir, index, writer)
    }

    /// In-memory variant used by tests
    pub fn in_ram(name: &str, schema: Schema, analyzer: Option<&AnalyzerConfig>) -> Result<Self> {
        let index = Index::create_in_ram(schema);
        if let Some(analyzer) = analyzer {
            analyzer.register(&index);
        }
        let writer = index.writer(50_000_000)?;
        Self::with_index(name, index, writer)
    }

    fn with_index(name: &str, index: Index, writer: IndexWriter) -> Result<Self> {
        let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
        Ok(Self {
            name: name.into(),
            index,
            writer: Arc::new(Mutex::new(writer)),
            reader,
            current_opstamp: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_index(&self) -> &Index {
        &self.index
    }

    /// Operations applied since the last commit
    pub fn get_opstamp(&self) -> usize {
        self.current_opstamp.load(Ordering::SeqCst)
    }

    fn bump_opstamp(&self) {
        self.current_opstamp.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn update_document(&self, key: Term, doc: Document) -> Result<()> {
        let writer = self.writer.lock().await;
        writer.delete_term(key);
        writer.add_document(doc).map_err(|e| Error::IndexWriteError(e.to_string()))?;
        self.bump_opstamp();
        Ok(())
    }

    pub async fn delete_by_term(&self, term: Term) -> Result<()> {
        let writer = self.writer.lock().await;
        writer.delete_term(term);
        self.bump_opstamp();
        Ok(())
    }

    /// Commit pending writes, attaching the payload when one is given
    pub async fn commit(&self, payload: Option<&str>) -> Result<u64> {
        let mut writer = self.writer.lock().await;
        trace!("committing index {}", self.name);
        let opstamp = match payload {
            Some(data) => {
                let mut prepared = writer.prepare_commit().map_err(|e| Error::IndexWriteError(e.to_string()))?;
                prepared.set_payload(data);
                prepared.commit().map_err(|e| Error::IndexWriteError(e.to_string()))?
            }
            None => writer.commit().map_err(|e| Error::IndexWriteError(e.to_string()))?,
        };
        self.current_opstamp.store(0, Ordering::SeqCst);
        Ok(opstamp)
    }

    /// Publish a new point-in-time searcher
    pub fn refresh(&self) -> Result<()> {
        self.reader.reload()?;
        Ok(())
    }

    pub fn searcher(&self) -> LeasedItem<Searcher> {
        self.reader.searcher()
    }
}

/// Owns the three index families. Process-global: exactly one instance
/// per data directory.
pub struct IndexWriterGroup {
    pub submissions: IndexHandle,
    pub files: IndexHandle,
    pub pagetab: IndexHandle,
    pub submission_schema: SubmissionSchema,
    pub file_fields: FileFields,
    pub pagetab_fields: PageTabFields,
    commit_data: SyncMutex<BTreeMap<String, String>>,
}

impl IndexWriterGroup {
    pub fn open(settings: &Settings, registry: &PropertyRegistry) -> Result<Self> {
        let submission_schema = SubmissionSchema::for_registry(registry)?;
        let file_fields = FileFields::build();
        let pagetab_fields = PageTabFields::build();
        Ok(Self {
            submissions: IndexHandle::open(settings, SUBMISSIONS_DIR, submission_schema.schema.clone(), Some(&settings.analyzer))?,
            files: IndexHandle::open(settings, FILES_DIR, file_fields.schema.clone(), None)?,
            pagetab: IndexHandle::open(settings, PAGETAB_DIR, pagetab_fields.schema.clone(), None)?,
            submission_schema,
            file_fields,
            pagetab_fields,
            commit_data: SyncMutex::new(BTreeMap::new()),
        })
    }

    /// All three families in RAM, for tests
    pub fn in_ram(registry: &PropertyRegistry) -> Result<Self> {
        let submission_schema = SubmissionSchema::for_registry(registry)?;
        let file_fields = FileFields::build();
        let pagetab_fields = PageTabFields::build();
        let analyzer = AnalyzerConfig::default();
        Ok(Self {
            submissions: IndexHandle::in_ram(SUBMISSIONS_DIR, submission_schema.schema.clone(), Some(&analyzer))?,
            files: IndexHandle::in_ram(FILES_DIR, file_fields.schema.clone(), None)?,
            pagetab: IndexHandle::in_ram(PAGETAB_DIR, pagetab_fields.schema.clone(), None)?,
            submission_schema,
            file_fields,
            pagetab_fields,
            commit_data: SyncMutex::new(BTreeMap::new()),
        })
    }

    /// Atomic update of the submission document by accession
    pub async fn update_submission(&self, accession: &str, doc: Document) -> Result<()> {
        let key = self.submission_schema.accession_term(accession);
        self.submissions.update_document(key, doc).await
    }

    /// Upsert one file document keyed `"{accession}-{position}"`
    pub async fn update_file(&self, accession: &str, position: u64, doc: Document) -> Result<()> {
        let key = self.file_fields.id_term(accession, position);
        self.files.update_document(key, doc).await
    }

    /// Upsert the stored raw body of a submission
    pub async fn update_pagetab(&self, accession: &str, body: &Value) -> Result<()> {
        let fields = &self.pagetab_fields;
        let mut doc = Document::default();
        doc.add_text(fields.accession, accession);
        doc.add_text(fields.content, &body.to_string());
        self.pagetab.update_document(fields.accession_term(accession), doc).await
    }

    pub async fn delete_submission_documents(&self, accession: &str) -> Result<()> {
        self.submissions
            .delete_by_term(self.submission_schema.accession_term(accession))
            .await
    }

    pub async fn delete_files_by_owner(&self, accession: &str) -> Result<()> {
        self.files.delete_by_term(self.file_fields.owner_term(accession)).await
    }

    pub async fn delete_pagetab_documents(&self, accession: &str) -> Result<()> {
        self.pagetab.delete_by_term(self.pagetab_fields.accession_term(accession)).await
    }

    /// Live key/value metadata persisted with the next submission commit
    pub fn set_submission_commit_data<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut data = self.commit_data.lock().expect("commit data lock poisoned");
        data.extend(entries);
    }

    fn take_commit_payload(&self) -> Option<String> {
        let mut data = self.commit_data.lock().expect("commit data lock poisoned");
        if data.is_empty() {
            return None;
        }
        let payload = serde_json::to_string(&*data).ok();
        data.clear();
        payload
    }

    /// Commit the write-heavy pair together; the page-tab family commits
    /// separately in `commit_all`.
    pub async fn commit_submission_and_files(&self) -> Result<()> {
        let payload = self.take_commit_payload();
        self.submissions.commit(payload.as_deref()).await?;
        self.files.commit(None).await?;
        Ok(())
    }

    pub async fn commit_all(&self) -> Result<()> {
        self.commit_submission_and_files().await?;
        self.pagetab.commit(None).await?;
        Ok(())
    }

    pub fn refresh_all(&self) -> Result<()> {
        self.submissions.refresh()?;
        self.files.refresh()?;
        self.pagetab.refresh()?;
        Ok(())
    }

    /// Facet postings live in the submission index
    pub fn refresh_taxonomy(&self) -> Result<()> {
        self.submissions.refresh()
    }

    /// Uncommitted operations across all three families
    pub fn pending_ops(&self) -> usize {
        self.submissions.get_opstamp() + self.files.get_opstamp() + self.pagetab.get_opstamp()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tantivy::collector::Count;
    use tantivy::query::TermQuery;
    use tantivy::schema::IndexRecordOption;

    use super::*;
    use crate::registry::tests::tiny_registry;

    fn count(handle: &IndexHandle, term: Term) -> usize {
        let searcher = handle.searcher();
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        searcher.search(&query, &Count).unwrap()
    }

    #[tokio::test]
    async fn test_update_is_upsert() {
        let registry = tiny_registry();
        let group = IndexWriterGroup::in_ram(&registry).unwrap();
        let schema = &group.submission_schema;

        for _ in 0..2 {
            let mut doc = Document::default();
            doc.add_text(schema.accession, "S-TEST1");
            group.update_submission("S-TEST1", doc).await.unwrap();
            group.commit_all().await.unwrap();
        }
        group.refresh_all().unwrap();
        assert_eq!(count(&group.submissions, schema.accession_term("S-TEST1")), 1);
    }

    #[tokio::test]
    async fn test_delete_files_by_owner() {
        let registry = tiny_registry();
        let group = IndexWriterGroup::in_ram(&registry).unwrap();
        let fields = group.file_fields.clone();

        for position in 0..3u64 {
            let mut doc = Document::default();
            doc.add_text(fields.id, &format!("S-TEST1-{}", position));
            doc.add_text(fields.owner, "S-TEST1");
            doc.add_u64(fields.position, position);
            group.update_file("S-TEST1", position, doc).await.unwrap();
        }
        group.commit_all().await.unwrap();
        group.refresh_all().unwrap();
        assert_eq!(count(&group.files, fields.owner_term("S-TEST1")), 3);

        group.delete_files_by_owner("S-TEST1").await.unwrap();
        group.commit_all().await.unwrap();
        group.refresh_all().unwrap();
        assert_eq!(count(&group.files, fields.owner_term("S-TEST1")), 0);
    }

    #[tokio::test]
    async fn test_pagetab_upsert_and_delete() {
        let registry = tiny_registry();
        let group = IndexWriterGroup::in_ram(&registry).unwrap();
        let body = serde_json::json!({ "accNo": "S-TEST1", "section": { "type": "study" } });

        group.update_pagetab("S-TEST1", &body).await.unwrap();
        group.update_pagetab("S-TEST1", &body).await.unwrap();
        group.commit_all().await.unwrap();
        group.refresh_all().unwrap();
        assert_eq!(count(&group.pagetab, group.pagetab_fields.accession_term("S-TEST1")), 1);

        group.delete_pagetab_documents("S-TEST1").await.unwrap();
        group.commit_all().await.unwrap();
        group.refresh_taxonomy().unwrap();
        group.refresh_all().unwrap();
        assert_eq!(count(&group.pagetab, group.pagetab_fields.accession_term("S-TEST1")), 0);
    }

    #[tokio::test]
    async fn test_commit_payload_roundtrip() {
        let registry = tiny_registry();
        let group = IndexWriterGroup::in_ram(&registry).unwrap();
        group.set_submission_commit_data(vec![("updateTime".to_string(), "1580464800000".to_string())]);
        group.commit_submission_and_files().await.unwrap();

        let meta = group.submissions.get_index().load_metas().unwrap();
        let payload = meta.payload.unwrap();
        assert_eq!(payload.contains("updateTime"), true);
    }
}
