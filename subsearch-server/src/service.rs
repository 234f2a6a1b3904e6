//! Process-wide wiring. Everything is initialized here at startup and
//! handed to components as handles; nothing does global lookups.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use log::warn;

use subsearch_types::{Error, Result};

use crate::client::{load_view_counts, FileListClient, HttpClient};
use crate::facets::FacetService;
use crate::indexer::SubmissionIndexer;
use crate::ontology::{ensure_ontology_file, OntologyResolver};
use crate::registry::{PropertyRegistry, RegistryHandle};
use crate::schema::SubmissionSchema;
use crate::search::builder::{AccessGrantFilter, QueryBuilder};
use crate::settings::Settings;
use crate::writers::IndexWriterGroup;

pub struct ServiceRegistry {
    pub settings: Settings,
    pub registry: Arc<RegistryHandle>,
    pub resolver: Arc<OntologyResolver>,
    pub writers: Arc<IndexWriterGroup>,
    pub indexer: Arc<SubmissionIndexer>,
    pub query_builder: Arc<QueryBuilder>,
    pub facets: Arc<FacetService>,
}

impl ServiceRegistry {
    /// Fail-fast startup: registry validation, ontology availability, and
    /// index directories all resolve here or the process dies.
    pub async fn init(settings: Settings) -> Result<Self> {
        let registry = PropertyRegistry::load(Path::new(&settings.registry_path))?;
        let registry = Arc::new(RegistryHandle::new(registry));
        let snapshot = registry.snapshot();

        ensure_ontology_file(&settings).await?;
        let resolver = Arc::new(OntologyResolver::from_settings(&settings));
        resolver.get()?;

        let writers = Arc::new(IndexWriterGroup::open(&settings, &snapshot)?);

        let view_counts = match load_view_counts(&settings.stats_file()) {
            Ok(counts) => counts,
            Err(e) => {
                warn!("view counts unavailable ({}), continuing without", e);
                HashMap::new()
            }
        };

        let http = Arc::new(HttpClient::new()?);
        let file_list_client: Arc<dyn FileListClient> = http.clone();

        let indexer = Arc::new(SubmissionIndexer::new(
            &settings,
            Arc::clone(&writers),
            Arc::clone(&registry),
            Arc::clone(&resolver),
            file_list_client,
            Arc::new(view_counts),
        ));
        let query_builder = Arc::new(QueryBuilder::new(
            Arc::clone(&registry),
            Arc::clone(&resolver),
            Arc::new(AccessGrantFilter),
            settings.analyzer.clone(),
            settings.excluded_types.clone(),
            settings.expansion_limit,
        ));
        let facets = Arc::new(FacetService::new(Arc::clone(&writers), Arc::clone(&registry)));

        Ok(Self {
            settings,
            registry,
            resolver,
            writers,
            indexer,
            query_builder,
            facets,
        })
    }

    pub fn http_client(&self) -> Result<Arc<HttpClient>> {
        Ok(Arc::new(HttpClient::new()?))
    }

    /// Maintenance operation: swap in a revalidated registry. The active
    /// index schema is derived from the registry, so a swap that would
    /// change the schema is refused; such changes require a reindex into
    /// fresh directories.
    pub fn reload_registry(&self) -> Result<()> {
        let fresh = PropertyRegistry::load(Path::new(&self.settings.registry_path))?;
        let fresh_schema = SubmissionSchema::for_registry(&fresh)?;
        if fresh_schema.schema != self.writers.submission_schema.schema {
            return Err(Error::InvalidConfig(
                "registry change alters the index schema; reindex into a fresh data directory instead".into(),
            ));
        }
        self.registry.swap(fresh);
        Ok(())
    }
}
