//! The per-submission mutable workspace. File workers run concurrently,
//! so every collection here is thread-safe: the position counter and the
//! error flag are atomics, the sets are mutex-guarded.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Workspace created at the start of `index_one`, mutated by file workers,
/// consumed once to finalize the submission document.
#[derive(Debug, Default)]
pub struct FileIndexingContext {
    /// Assigns dense zero-based positions across all manifests
    file_counter: AtomicU64,
    /// Attribute names discovered across all of this submission's files
    file_columns: Mutex<BTreeSet<String>>,
    /// Accessions of sections that carry file lists
    sections_with_files: Mutex<BTreeSet<String>>,
    /// Attribute tokens embedded into the submission document
    searchable_file_metadata: Mutex<BTreeSet<String>>,
    /// Set on any per-file or per-manifest failure; never aborts the loop
    has_indexing_error: AtomicBool,
}

impl FileIndexingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next file position
    pub fn next_position(&self) -> u64 {
        self.file_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Number of positions handed out so far
    pub fn file_count(&self) -> u64 {
        self.file_counter.load(Ordering::SeqCst)
    }

    pub fn add_file_column(&self, column: &str) {
        self.file_columns.lock().expect("context lock poisoned").insert(column.to_string());
    }

    pub fn file_columns(&self) -> BTreeSet<String> {
        self.file_columns.lock().expect("context lock poisoned").clone()
    }

    pub fn add_section_with_files(&self, section: &str) {
        self.sections_with_files
            .lock()
            .expect("context lock poisoned")
            .insert(section.to_string());
    }

    pub fn sections_with_files(&self) -> BTreeSet<String> {
        self.sections_with_files.lock().expect("context lock poisoned").clone()
    }

    pub fn add_searchable_metadata(&self, token: &str) {
        let token = token.trim();
        if !token.is_empty() {
            self.searchable_file_metadata
                .lock()
                .expect("context lock poisoned")
                .insert(token.to_string());
        }
    }

    pub fn searchable_metadata(&self) -> BTreeSet<String> {
        self.searchable_file_metadata.lock().expect("context lock poisoned").clone()
    }

    pub fn mark_indexing_error(&self) {
        self.has_indexing_error.store(true, Ordering::SeqCst);
    }

    pub fn has_indexing_error(&self) -> bool {
        self.has_indexing_error.load(Ordering::SeqCst)
    }
}

/// The value map assembled for one submission document
pub type ValueMap = BTreeMap<String, String>;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_positions_are_dense() {
        let ctx = FileIndexingContext::new();
        let mut seen: Vec<u64> = (0..10).map(|_| ctx.next_position()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<u64>>());
        assert_eq!(ctx.file_count(), 10);
    }

    #[test]
    fn test_concurrent_positions_stay_dense() {
        let ctx = Arc::new(FileIndexingContext::new());
        let mut handles = Vec::new();
        for _ in 0..5 {
            let ctx = Arc::clone(&ctx);
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| ctx.next_position()).collect::<Vec<u64>>()
            }));
        }
        let mut all: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..500).collect::<Vec<u64>>());
        assert_eq!(ctx.file_count(), 500);
    }

    #[test]
    fn test_error_flag() {
        let ctx = FileIndexingContext::new();
        assert_eq!(ctx.has_indexing_error(), false);
        ctx.mark_indexing_error();
        assert_eq!(ctx.has_indexing_error(), true);
    }

    #[test]
    fn test_blank_metadata_ignored() {
        let ctx = FileIndexingContext::new();
        ctx.add_searchable_metadata("  ");
        ctx.add_searchable_metadata("Imaging");
        assert_eq!(ctx.searchable_metadata().len(), 1);
    }
}
