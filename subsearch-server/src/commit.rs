//! Background commit watcher for caller-managed batches: submissions
//! indexed with `commit = false` accumulate until the interval fires. The
//! pause flag lets a bulk operation take over commit control.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, trace};
use tokio::time;

use crate::writers::IndexWriterGroup;

pub async fn watcher(group: Arc<IndexWriterGroup>, commit_duration: f32, lock: Arc<AtomicBool>) {
    let mut interval = time::interval(Duration::from_secs_f32(commit_duration));
    loop {
        interval.tick().await;
        let pending = group.pending_ops();
        if pending == 0 {
            trace!("no pending index operations");
            continue;
        }
        if lock.load(Ordering::SeqCst) {
            trace!("commit watcher paused, {} operation(s) pending", pending);
            continue;
        }
        trace!("committing {} pending operation(s)", pending);
        if let Err(e) = group.commit_all().await {
            error!("background commit failed: {}", e);
            continue;
        }
        if let Err(e) = group.refresh_all() {
            error!("reader refresh failed: {}", e);
        }
    }
}

#[cfg(test)]
pub mod tests {
    use tantivy::collector::Count;
    use tantivy::query::TermQuery;
    use tantivy::schema::IndexRecordOption;
    use tantivy::Document;

    use crate::registry::tests::tiny_registry;

    use super::*;

    #[tokio::test]
    pub async fn test_auto_commit() {
        let registry = tiny_registry();
        let group = Arc::new(IndexWriterGroup::in_ram(&registry).unwrap());
        let lock = Arc::new(AtomicBool::new(false));

        let schema = group.submission_schema.clone();
        let mut doc = Document::default();
        doc.add_text(schema.accession, "S-AUTO1");
        group.update_submission("S-AUTO1", doc).await.unwrap();
        assert_eq!(group.pending_ops() > 0, true);

        tokio::spawn(watcher(Arc::clone(&group), 0.05, Arc::clone(&lock)));

        let query = TermQuery::new(schema.accession_term("S-AUTO1"), IndexRecordOption::Basic);
        for _ in 0..50 {
            let hits = group.submissions.searcher().search(&query, &Count).unwrap();
            if hits == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("watcher never committed the pending document");
    }

    #[tokio::test]
    pub async fn test_paused_watcher_holds_back() {
        let registry = tiny_registry();
        let group = Arc::new(IndexWriterGroup::in_ram(&registry).unwrap());
        let lock = Arc::new(AtomicBool::new(true));
        tokio::spawn(watcher(Arc::clone(&group), 0.05, Arc::clone(&lock)));

        let schema = group.submission_schema.clone();
        let mut doc = Document::default();
        doc.add_text(schema.accession, "S-AUTO2");
        group.update_submission("S-AUTO2", doc).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(group.pending_ops() > 0, true);
    }
}
