//! Turns upstream change notifications into indexer calls. A message must
//! carry `accNo` and `extTabUrl`; anything else is logged and dropped. A
//! NOT_FOUND fetch deletes the accession, a FOUND fetch reindexes it.

use std::sync::Arc;

use log::{error, info, warn};
use serde_json::Value;
use tokio::sync::mpsc;

use subsearch_types::{FetchStatus, SubmissionNotification};

use crate::client::SubmissionClient;
use crate::documents::Submission;
use crate::indexer::SubmissionIndexer;

pub struct Listener {
    indexer: Arc<SubmissionIndexer>,
    client: Arc<dyn SubmissionClient>,
}

impl Listener {
    pub fn new(indexer: Arc<SubmissionIndexer>, client: Arc<dyn SubmissionClient>) -> Self {
        Self { indexer, client }
    }

    /// Drain notifications until the sender closes
    pub async fn run_loop(&self, mut rx: mpsc::Receiver<Value>) {
        while let Some(message) = rx.recv().await {
            self.handle_notification(message).await;
        }
    }

    pub async fn handle_notification(&self, message: Value) {
        let notification: SubmissionNotification = match serde_json::from_value(message) {
            Ok(n) => n,
            Err(e) => {
                warn!("dropping unparsable notification: {}", e);
                return;
            }
        };
        let (acc_no, url) = match (
            notification.acc_no.as_deref().map(str::trim).filter(|a| !a.is_empty()),
            notification.ext_tab_url.as_deref().map(str::trim).filter(|u| !u.is_empty()),
        ) {
            (Some(acc_no), Some(url)) => (acc_no.to_string(), url.to_string()),
            _ => {
                warn!("dropping notification without accNo/extTabUrl");
                return;
            }
        };

        let fetched = self.client.fetch_submission(&url).await;
        match fetched.status {
            FetchStatus::NotFound => {
                info!("{}: upstream reports NOT_FOUND, deleting", acc_no);
                if let Err(e) = self.indexer.delete_submission(&acc_no).await {
                    error!("{}: delete failed: {}", acc_no, e);
                }
            }
            FetchStatus::Error => {
                error!(
                    "{}: fetch failed with status {}: {}",
                    acc_no,
                    fetched.http_status,
                    fetched.error_message.unwrap_or_default()
                );
            }
            FetchStatus::Found => {
                let body = match fetched.body {
                    Some(body) => body,
                    None => {
                        error!("{}: FOUND without a body", acc_no);
                        return;
                    }
                };
                let submission = match Submission::from_value(body) {
                    Ok(s) => s,
                    Err(e) => {
                        error!("{}: bad submission body: {}", acc_no, e);
                        return;
                    }
                };
                match self.indexer.index_one(submission, true, true).await {
                    Ok(result) if !result.success => {
                        warn!("{}: indexing finished unsuccessfully, task {}", acc_no, result.task_id)
                    }
                    Ok(_) => {}
                    Err(e) => error!("{}: indexing failed: {}", acc_no, e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use subsearch_types::{SubmissionFetchResult, TaskState};

    use super::*;
    use crate::filelists::tests::StubFileListClient;
    use crate::indexer::SubmissionIndexer;
    use crate::ontology::loader::{OntologyIndex, OntologyResolver};
    use crate::ontology::lookup::EfoLookup;
    use crate::ontology::matcher::TermMatcher;
    use crate::ontology::model::tests::tiny_model;
    use crate::registry::tests::tiny_registry;
    use crate::registry::RegistryHandle;
    use crate::settings::Settings;
    use crate::writers::IndexWriterGroup;

    struct StubSubmissionClient {
        responses: HashMap<String, SubmissionFetchResult>,
    }

    #[async_trait]
    impl SubmissionClient for StubSubmissionClient {
        async fn fetch_submission(&self, url: &str) -> SubmissionFetchResult {
            self.responses
                .get(url)
                .cloned()
                .unwrap_or_else(|| SubmissionFetchResult::error(500, "unexpected url"))
        }
    }

    fn indexer() -> Arc<SubmissionIndexer> {
        let settings = Settings::default();
        let registry = tiny_registry();
        let group = Arc::new(IndexWriterGroup::in_ram(&registry).unwrap());
        let resolver = OntologyResolver::new(std::path::PathBuf::from("/unused"), Default::default());
        let model = tiny_model();
        resolver.install_for_tests(OntologyIndex {
            matcher: Arc::new(TermMatcher::from_model(&model)),
            lookup: Arc::new(EfoLookup::from_model(&model)),
            model: Arc::new(model),
        });
        Arc::new(SubmissionIndexer::new(
            &settings,
            group,
            Arc::new(RegistryHandle::new(registry)),
            Arc::new(resolver),
            Arc::new(StubFileListClient { pages: HashMap::new() }),
            Arc::new(HashMap::new()),
        ))
    }

    #[tokio::test]
    async fn test_found_notification_indexes() {
        let body = json!({
            "accNo": "S-TEST1",
            "attributes": [ { "name": "AttachTo", "value": "BioImages" } ]
        });
        let mut responses = HashMap::new();
        responses.insert("http://up/s1".to_string(), SubmissionFetchResult::found(body, 200));
        let indexer = indexer();
        let listener = Listener::new(Arc::clone(&indexer), Arc::new(StubSubmissionClient { responses }));

        listener
            .handle_notification(json!({ "accNo": "S-TEST1", "extTabUrl": "http://up/s1" }))
            .await;
        assert_eq!(indexer.task_status("S-TEST1").state, TaskState::Completed);
    }

    #[tokio::test]
    async fn test_invalid_message_skipped() {
        let indexer = indexer();
        let listener = Listener::new(
            Arc::clone(&indexer),
            Arc::new(StubSubmissionClient { responses: HashMap::new() }),
        );
        listener.handle_notification(json!({ "accNo": "", "extTabUrl": "" })).await;
        listener.handle_notification(json!({ "something": "else" })).await;
        assert_eq!(indexer.task_status("S-TEST1").state, TaskState::NotFound);
    }

    #[tokio::test]
    async fn test_not_found_deletes() {
        let mut responses = HashMap::new();
        responses.insert("http://up/s1".to_string(), SubmissionFetchResult::not_found(404));
        let indexer = indexer();
        let listener = Listener::new(Arc::clone(&indexer), Arc::new(StubSubmissionClient { responses }));
        // deleting an absent accession is a no-op commit
        listener
            .handle_notification(json!({ "accNo": "S-TEST1", "extTabUrl": "http://up/s1" }))
            .await;
        assert_eq!(indexer.task_status("S-TEST1").state, TaskState::NotFound);
    }
}
