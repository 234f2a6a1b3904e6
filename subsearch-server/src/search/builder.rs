//! Assembles the final query: parse, expand, field filters, type
//! exclusion, collection drill-down, and the pluggable security clause.
//! The unsecured variant stops after expansion and is reserved for system
//! operations.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, warn};

use subsearch_types::{BoolQuery, Error, ExactTerm, FacetQuery, Query, Result};

use crate::analyzers::AnalyzerConfig;
use crate::ontology::OntologyResolver;
use crate::registry::RegistryHandle;
use crate::schema::reserved;
use crate::search::expand::expand_query;
use crate::search::parser::QueryStringParser;

/// Field filters must never constrain on this reserved key
pub const QUERY_FILTER_KEY: &str = "query";

/// The parsed and expanded query with everything the caller may inspect
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub query: Query,
    pub expanded_efo_terms: std::collections::BTreeSet<String>,
    pub expanded_synonyms: std::collections::BTreeSet<String>,
    pub too_many_expansion_terms: bool,
    /// Per-field filter failures; recorded, never fatal
    pub field_filter_errors: BTreeMap<String, String>,
}

/// Whether the security clause is required or forbidden on matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityOccur {
    Must,
    MustNot,
}

/// The pluggable predicate wrapping every secured query
pub trait SecurityFilter: Send + Sync {
    fn clause(&self, principal: Option<&str>) -> Option<(SecurityOccur, Query)>;
}

/// Anonymous callers see public grants; authenticated callers also see
/// their own.
pub struct AccessGrantFilter;

impl SecurityFilter for AccessGrantFilter {
    fn clause(&self, principal: Option<&str>) -> Option<(SecurityOccur, Query)> {
        let public = Query::Exact(ExactTerm::with_term("access".into(), "public".into()));
        let query = match principal {
            Some(user) => BoolQuery::builder()
                .should_match(public)
                .should_match(Query::Exact(ExactTerm::with_term("access".into(), user.to_lowercase())))
                .build(),
            None => public,
        };
        Some((SecurityOccur::Must, query))
    }
}

/// A filter that never restricts anything; for deployments without access
/// control.
pub struct AllowAllFilter;

impl SecurityFilter for AllowAllFilter {
    fn clause(&self, _principal: Option<&str>) -> Option<(SecurityOccur, Query)> {
        None
    }
}

pub struct QueryBuilder {
    registry: Arc<RegistryHandle>,
    resolver: Arc<OntologyResolver>,
    security: Arc<dyn SecurityFilter>,
    analyzer: AnalyzerConfig,
    excluded_types: Vec<String>,
    expansion_limit: usize,
}

impl QueryBuilder {
    pub fn new(
        registry: Arc<RegistryHandle>,
        resolver: Arc<OntologyResolver>,
        security: Arc<dyn SecurityFilter>,
        analyzer: AnalyzerConfig,
        excluded_types: Vec<String>,
        expansion_limit: usize,
    ) -> Self {
        Self {
            registry,
            resolver,
            security,
            analyzer,
            excluded_types,
            expansion_limit,
        }
    }

    /// The full pipeline: parse, expand, filter, secure
    pub fn build_query(
        &self,
        query_string: &str,
        collection: Option<&str>,
        field_filters: &BTreeMap<String, String>,
        principal: Option<&str>,
    ) -> Result<QueryResult> {
        let registry = self.registry.snapshot();
        let parser = QueryStringParser::new(&registry, &self.analyzer);
        let parsed = parser.parse(query_string)?;
        let mut result = self.expand(parsed);

        let mut must: Vec<Query> = Vec::new();
        let mut must_not: Vec<Query> = Vec::new();

        for (name, value) in field_filters {
            if name == QUERY_FILTER_KEY || value.trim().is_empty() {
                continue;
            }
            match parser.parse(&format!("{}:{}", name, value)) {
                Ok(filter) => must.push(filter),
                Err(e) => {
                    debug!("field filter '{}' rejected: {}", name, e);
                    result.field_filter_errors.insert(name.clone(), e.to_string());
                }
            }
        }

        if !self.excluded_types.is_empty() && !result.query.constrains_field(reserved::TYPE) {
            for excluded in &self.excluded_types {
                must_not.push(Query::Exact(ExactTerm::with_term(reserved::TYPE.into(), excluded.to_lowercase())));
            }
        }

        if let Some(filter) = self.collection_filter(&registry, collection)? {
            must.push(filter);
        }

        if let Some((occur, clause)) = self.security.clause(principal) {
            match occur {
                SecurityOccur::Must => must.push(clause),
                SecurityOccur::MustNot => must_not.push(clause),
            }
        }

        if !must.is_empty() || !must_not.is_empty() {
            let mut builder = BoolQuery::builder().must_match(result.query.clone());
            for clause in must {
                builder = builder.must_match(clause);
            }
            for clause in must_not {
                builder = builder.must_not_match(clause);
            }
            result.query = builder.build();
        }
        Ok(result)
    }

    /// Build from a facade request body
    pub fn build_from_request(&self, request: &subsearch_types::SearchRequest, principal: Option<&str>) -> Result<QueryResult> {
        self.build_query(request.query_string(), request.collection.as_deref(), &request.filters, principal)
    }

    /// System-only variant: parse and expand, skipping the type filter,
    /// the collection drill-down, and the security clause.
    pub fn build_unsecured_query(&self, query_string: &str) -> Result<QueryResult> {
        let registry = self.registry.snapshot();
        let parsed = QueryStringParser::new(&registry, &self.analyzer).parse(query_string)?;
        Ok(self.expand(parsed))
    }

    /// Expansion failures degrade to the unexpanded query
    fn expand(&self, parsed: Query) -> QueryResult {
        let registry = self.registry.snapshot();
        match self.resolver.get() {
            Ok(ontology) => {
                let expandable = registry.expandable_fields();
                let outcome = expand_query(parsed, &ontology, &expandable, self.expansion_limit);
                QueryResult {
                    query: outcome.query,
                    expanded_efo_terms: outcome.expanded_efo_terms,
                    expanded_synonyms: outcome.expanded_synonyms,
                    too_many_expansion_terms: outcome.too_many_expansion_terms,
                    field_filter_errors: BTreeMap::new(),
                }
            }
            Err(e) => {
                warn!("expansion unavailable, using unexpanded query: {}", e);
                QueryResult {
                    query: parsed,
                    expanded_efo_terms: Default::default(),
                    expanded_synonyms: Default::default(),
                    too_many_expansion_terms: false,
                    field_filter_errors: BTreeMap::new(),
                }
            }
        }
    }

    /// Restrict to the collection and its transitive subcollections via a
    /// facet drill-down. The universal `public` collection never filters.
    fn collection_filter(
        &self,
        registry: &crate::registry::PropertyRegistry,
        collection: Option<&str>,
    ) -> Result<Option<Query>> {
        let collection = match collection.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) if !c.eq_ignore_ascii_case(subsearch_types::PUBLIC_COLLECTION) => c,
            _ => return Ok(None),
        };
        let descriptor = registry
            .property(reserved::COLLECTION_FACET)
            .ok_or_else(|| Error::InvalidConfig("collection facet is not configured".into()))?;

        let mut builder = BoolQuery::builder();
        let mut added = 0usize;
        for name in registry.collection_with_children(collection) {
            let mut value = name.trim().to_string();
            if descriptor.to_lowercase {
                value = value.to_lowercase();
            }
            if value.is_empty() {
                continue;
            }
            builder = builder.should_match(Query::Facet(FacetQuery::from_segments(
                descriptor.name.clone(),
                &[value.as_str()],
            )));
            added += 1;
        }
        if added == 0 {
            return Ok(None);
        }
        Ok(Some(builder.build()))
    }
}
