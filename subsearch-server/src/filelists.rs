//! The file-list indexer: discovers every manifest referenced by a
//! submission, fetches them concurrently, and drives the file-document
//! factory over batches. Per-file failures mark the context error flag and
//! the loop continues; only the caller's cancellation stops scheduling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, warn};
use serde_json::Value;
use tokio::sync::Semaphore;

use subsearch_types::{FileEntry, Result};

use crate::client::FileListClient;
use crate::documents::file_doc::{FileDocumentFactory, SectionRef};
use crate::documents::{FileIndexingContext, Submission};
use crate::writers::IndexWriterGroup;

/// One discovered manifest reference
#[derive(Debug, Clone)]
pub struct ManifestRef {
    pub file_name: String,
    pub files_url: String,
    pub section: SectionRef,
}

/// Walk the raw submission JSON for parent nodes carrying a `fileList`
/// child with a non-empty `fileName`. Entries missing the `fileName` or
/// the `filesUrl` are dropped.
pub fn discover_manifests(raw: &Value) -> Vec<ManifestRef> {
    let mut out = Vec::new();
    walk(raw, &mut out);
    out
}

fn walk(value: &Value, out: &mut Vec<ManifestRef>) {
    match value {
        Value::Object(map) => {
            if let Some(file_list) = map.get("fileList") {
                let file_name = file_list
                    .get("fileName")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|n| !n.is_empty());
                let files_url = file_list
                    .get("filesUrl")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|u| !u.is_empty());
                if let (Some(file_name), Some(files_url)) = (file_name, files_url) {
                    out.push(ManifestRef {
                        file_name: file_name.to_string(),
                        files_url: files_url.to_string(),
                        section: SectionRef {
                            acc_no: map.get("accNo").and_then(Value::as_str).map(str::to_string),
                            section_type: map.get("type").and_then(Value::as_str).map(str::to_string),
                        },
                    });
                }
            }
            for (key, child) in map {
                if key != "fileList" {
                    walk(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, out);
            }
        }
        _ => {}
    }
}

pub struct FileListIndexer {
    group: Arc<IndexWriterGroup>,
    client: Arc<dyn FileListClient>,
    batch_size: usize,
    concurrency: usize,
}

impl FileListIndexer {
    pub fn new(group: Arc<IndexWriterGroup>, client: Arc<dyn FileListClient>, batch_size: usize, concurrency: usize) -> Self {
        Self {
            group,
            client,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch and index every manifest of the submission. Joins on all
    /// manifest workers before returning; the context carries positions,
    /// columns, metadata, and the error flag.
    pub async fn index_file_lists(
        &self,
        submission: &Submission,
        ctx: Arc<FileIndexingContext>,
        cancelled: Arc<AtomicBool>,
    ) -> Result<()> {
        let manifests = discover_manifests(&submission.raw);
        if manifests.is_empty() {
            return Ok(());
        }
        debug!("{}: {} file list(s) to fetch", submission.accession, manifests.len());
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let mut workers = Vec::with_capacity(manifests.len());
        for manifest in manifests {
            let group = Arc::clone(&self.group);
            let client = Arc::clone(&self.client);
            let ctx = Arc::clone(&ctx);
            let cancelled = Arc::clone(&cancelled);
            let semaphore = Arc::clone(&semaphore);
            let accession = submission.accession.clone();
            let batch_size = self.batch_size;

            workers.push(tokio::spawn(async move {
                if cancelled.load(Ordering::SeqCst) {
                    return;
                }
                let page = {
                    let _permit = semaphore.acquire().await.expect("semaphore closed");
                    client.fetch_file_list(&manifest.files_url).await
                };
                let page = match page {
                    Ok(page) => page,
                    Err(e) => {
                        warn!("{}: manifest {} failed: {}", accession, manifest.file_name, e);
                        ctx.mark_indexing_error();
                        return;
                    }
                };
                let files = match page.files {
                    Some(files) => files,
                    None => {
                        warn!("{}: manifest {} has no files array", accession, manifest.file_name);
                        ctx.mark_indexing_error();
                        return;
                    }
                };
                ctx.add_section_with_files(&manifest.file_name);

                let batches: Vec<Vec<FileEntry>> = files.chunks(batch_size).map(|c| c.to_vec()).collect();
                let mut batch_workers = Vec::with_capacity(batches.len());
                for batch in batches {
                    let group = Arc::clone(&group);
                    let ctx = Arc::clone(&ctx);
                    let cancelled = Arc::clone(&cancelled);
                    let semaphore = Arc::clone(&semaphore);
                    let accession = accession.clone();
                    let section = manifest.section.clone();

                    batch_workers.push(tokio::spawn(async move {
                        let _permit = semaphore.acquire().await.expect("semaphore closed");
                        let factory = FileDocumentFactory::new(&group.file_fields, &accession);
                        for entry in &batch {
                            if cancelled.load(Ordering::SeqCst) {
                                return;
                            }
                            let position = ctx.next_position();
                            let doc = factory.build(entry, position, Some(&section), &ctx);
                            if let Err(e) = group.update_file(&accession, position, doc).await {
                                warn!("{}: file {} failed to index: {}", accession, position, e);
                                ctx.mark_indexing_error();
                            }
                        }
                    }));
                }
                join_all(batch_workers).await;
            }));
        }
        join_all(workers).await;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tantivy::collector::{Count, TopDocs};
    use tantivy::query::TermQuery;
    use tantivy::schema::IndexRecordOption;

    use subsearch_types::{Error, FileListPage};

    use super::*;
    use crate::registry::tests::tiny_registry;

    /// Serves canned manifests keyed by URL
    pub(crate) struct StubFileListClient {
        pub pages: HashMap<String, serde_json::Value>,
    }

    #[async_trait]
    impl FileListClient for StubFileListClient {
        async fn fetch_file_list(&self, url: &str) -> Result<FileListPage> {
            match self.pages.get(url) {
                Some(page) => Ok(serde_json::from_value(page.clone())?),
                None => Err(Error::FileParsingError(format!("no such manifest: {}", url))),
            }
        }
    }

    fn manifest(count: usize) -> serde_json::Value {
        let files: Vec<serde_json::Value> = (0..count)
            .map(|i| json!({ "fileName": format!("file-{}.txt", i), "size": format!("{}", i * 10) }))
            .collect();
        json!({ "files": files, "extType": "filesTable" })
    }

    fn submission_with_three_manifests() -> Submission {
        Submission::from_value(json!({
            "accNo": "S-TEST1",
            "section": {
                "type": "study",
                "fileList": { "fileName": "main-files", "filesUrl": "http://x/1" },
                "sections": [
                    {
                        "type": "imaging",
                        "accNo": "SEC-1",
                        "fileList": { "fileName": "imaging-files", "filesUrl": "http://x/2" }
                    },
                    {
                        "type": "imaging",
                        "accNo": "SEC-2",
                        "fileList": { "fileName": "extra-files", "filesUrl": "http://x/3" },
                        "sections": [
                            { "type": "broken", "fileList": { "fileName": "", "filesUrl": "http://x/ignored" } },
                            { "type": "broken", "fileList": { "fileName": "no-url" } }
                        ]
                    }
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_discover_manifests() {
        let submission = submission_with_three_manifests();
        let manifests = discover_manifests(&submission.raw);
        assert_eq!(manifests.len(), 3);
        let urls: Vec<&str> = manifests.iter().map(|m| m.files_url.as_str()).collect();
        assert_eq!(urls.contains(&"http://x/1"), true);
        assert_eq!(urls.contains(&"http://x/ignored"), false);
    }

    #[tokio::test]
    async fn test_positions_dense_across_manifests() {
        // three manifests totaling 17 files, small batches force contention
        let registry = tiny_registry();
        let group = Arc::new(IndexWriterGroup::in_ram(&registry).unwrap());
        let mut pages = HashMap::new();
        pages.insert("http://x/1".to_string(), manifest(7));
        pages.insert("http://x/2".to_string(), manifest(6));
        pages.insert("http://x/3".to_string(), manifest(4));
        let client = Arc::new(StubFileListClient { pages });
        let indexer = FileListIndexer::new(Arc::clone(&group), client, 2, 5);

        let submission = submission_with_three_manifests();
        let ctx = Arc::new(FileIndexingContext::new());
        indexer
            .index_file_lists(&submission, Arc::clone(&ctx), Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();

        assert_eq!(ctx.file_count(), 17);
        assert_eq!(ctx.has_indexing_error(), false);

        group.commit_all().await.unwrap();
        group.refresh_all().unwrap();
        let searcher = group.files.searcher();
        let owner_query = TermQuery::new(group.file_fields.owner_term("S-TEST1"), IndexRecordOption::Basic);
        let hits = searcher.search(&owner_query, &Count).unwrap();
        assert_eq!(hits, 17);

        // positions are exactly 0..17 with no duplicates
        let docs = searcher.search(&owner_query, &TopDocs::with_limit(100)).unwrap();
        let mut positions: Vec<u64> = docs
            .into_iter()
            .map(|(_, addr)| {
                let doc = searcher.doc(addr).unwrap();
                match doc.get_first(group.file_fields.position) {
                    Some(tantivy::schema::Value::U64(p)) => *p,
                    _ => panic!("file doc without position"),
                }
            })
            .collect();
        positions.sort_unstable();
        assert_eq!(positions, (0..17).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_missing_files_array_sets_error_flag() {
        let registry = tiny_registry();
        let group = Arc::new(IndexWriterGroup::in_ram(&registry).unwrap());
        let mut pages = HashMap::new();
        pages.insert("http://x/1".to_string(), json!({ "extType": "filesTable" }));
        pages.insert("http://x/2".to_string(), manifest(2));
        pages.insert("http://x/3".to_string(), manifest(1));
        let client = Arc::new(StubFileListClient { pages });
        let indexer = FileListIndexer::new(Arc::clone(&group), client, 250, 5);

        let submission = submission_with_three_manifests();
        let ctx = Arc::new(FileIndexingContext::new());
        indexer
            .index_file_lists(&submission, Arc::clone(&ctx), Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();

        assert_eq!(ctx.has_indexing_error(), true);
        // the healthy manifests still index
        assert_eq!(ctx.file_count(), 3);
    }

    #[tokio::test]
    async fn test_fetch_failure_sets_error_flag() {
        let registry = tiny_registry();
        let group = Arc::new(IndexWriterGroup::in_ram(&registry).unwrap());
        let client = Arc::new(StubFileListClient { pages: HashMap::new() });
        let indexer = FileListIndexer::new(Arc::clone(&group), client, 250, 5);

        let submission = submission_with_three_manifests();
        let ctx = Arc::new(FileIndexingContext::new());
        indexer
            .index_file_lists(&submission, Arc::clone(&ctx), Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();
        assert_eq!(ctx.has_indexing_error(), true);
        assert_eq!(ctx.file_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_stops_scheduling() {
        let registry = tiny_registry();
        let group = Arc::new(IndexWriterGroup::in_ram(&registry).unwrap());
        let mut pages = HashMap::new();
        pages.insert("http://x/1".to_string(), manifest(7));
        pages.insert("http://x/2".to_string(), manifest(6));
        pages.insert("http://x/3".to_string(), manifest(4));
        let client = Arc::new(StubFileListClient { pages });
        let indexer = FileListIndexer::new(Arc::clone(&group), client, 2, 5);

        let submission = submission_with_three_manifests();
        let ctx = Arc::new(FileIndexingContext::new());
        let cancelled = Arc::new(AtomicBool::new(true));
        indexer.index_file_lists(&submission, Arc::clone(&ctx), cancelled).await.unwrap();
        assert_eq!(ctx.file_count(), 0);
    }
}
