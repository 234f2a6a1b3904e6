//! Facet counting and drill-down assembly over the submission index.
//! Private dimensions are invisible to anonymous callers; errors degrade
//! to an empty result and the searcher reference is always dropped.

use std::sync::Arc;

use log::warn;
use tantivy::collector::FacetCollector;
use tantivy::schema::Facet;

use subsearch_types::{CreateQuery, FacetQuery, FieldDescriptor, ParserKind, Query};

use crate::registry::RegistryHandle;
use crate::writers::IndexWriterGroup;

/// One counted value of one dimension
#[derive(Debug, Clone, PartialEq)]
pub struct FacetValueCount {
    pub value: String,
    pub count: u64,
}

/// All counted values of one dimension
#[derive(Debug, Clone)]
pub struct FacetResult {
    pub name: String,
    pub values: Vec<FacetValueCount>,
}

/// Caller-selected drill-down values, dimension name to facet values
pub type FacetSelection = Vec<(String, Vec<String>)>;

pub struct FacetService {
    group: Arc<IndexWriterGroup>,
    registry: Arc<RegistryHandle>,
}

impl FacetService {
    pub fn new(group: Arc<IndexWriterGroup>, registry: Arc<RegistryHandle>) -> Self {
        Self { group, registry }
    }

    /// Restrict the base query by every selected facet value. Pure: the
    /// inputs are not mutated, a new query value is returned. Unknown or
    /// non-facet dimensions and blank values contribute nothing.
    pub fn drill_down_filters(&self, base: Query, selected: &FacetSelection) -> Query {
        let registry = self.registry.snapshot();
        let mut clauses: Vec<Query> = Vec::new();
        for (dimension, values) in selected {
            let descriptor = match registry.property(dimension) {
                Some(d) if d.is_facet() => d,
                _ => continue,
            };
            if values.is_empty() {
                continue;
            }
            for value in values {
                let mut value = value.trim().to_string();
                if descriptor.to_lowercase {
                    value = value.to_lowercase();
                }
                if value.is_empty() {
                    continue;
                }
                clauses.push(Query::Facet(FacetQuery::from_segments(descriptor.name.clone(), &[value.as_str()])));
            }
        }
        if clauses.is_empty() {
            return base;
        }
        let mut builder = subsearch_types::BoolQuery::builder().must_match(base);
        for clause in clauses {
            builder = builder.must_match(clause);
        }
        builder.build()
    }

    /// Count every registry facet dimension under the query. The released
    /// year dimension ignores the caller's limit, values the caller has
    /// already selected keep their counts even outside the top-k, and
    /// failures return an empty list.
    pub fn facets_for_query(
        &self,
        query: &Query,
        limit: usize,
        selected: &FacetSelection,
        principal: Option<&str>,
    ) -> Vec<FacetResult> {
        let registry = self.registry.snapshot();
        let mut results = Vec::new();
        for descriptor in registry.global_property_registry().values() {
            if !descriptor.is_facet() {
                continue;
            }
            if descriptor.private && principal.is_none() {
                continue;
            }
            let effective_limit = if descriptor.parser == ParserKind::ReleaseYear {
                usize::MAX
            } else {
                limit
            };
            let selected_values: Vec<String> = selected
                .iter()
                .filter(|(dim, _)| dim == &descriptor.name)
                .flat_map(|(_, values)| values.iter().cloned())
                .collect();
            match self.count_dimension(query, descriptor, None, effective_limit, &selected_values) {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!("facet counting failed for '{}': {}", descriptor.name, e);
                    return Vec::new();
                }
            }
        }
        results
    }

    /// Single-dimension variant; `None` when the dimension is unknown, not
    /// a facet, or private to an anonymous caller.
    pub fn dimension(&self, query: &Query, dim: &str, path: Option<&str>, limit: usize, principal: Option<&str>) -> Option<FacetResult> {
        let registry = self.registry.snapshot();
        let descriptor = registry.property(dim)?.clone();
        if !descriptor.is_facet() {
            return None;
        }
        if descriptor.private && principal.is_none() {
            return None;
        }
        self.count_dimension(query, &descriptor, path, limit, &[]).ok()
    }

    fn count_dimension(
        &self,
        query: &Query,
        descriptor: &FieldDescriptor,
        path: Option<&str>,
        limit: usize,
        selected_values: &[String],
    ) -> subsearch_types::Result<FacetResult> {
        let schema = &self.group.submission_schema;
        let field = schema.field(&descriptor.name)?;
        let root = match path {
            Some(p) => Facet::from_text(p)?,
            None => Facet::root(),
        };
        let mut collector = FacetCollector::for_field(field);
        collector.add_facet(root.clone());

        let searcher = self.group.submissions.searcher();
        let lowered = query.clone().create_query(&schema.schema)?;
        let counts = searcher.search(&*lowered, &collector)?;

        let all: Vec<FacetValueCount> = counts
            .get(root.clone())
            .map(|(facet, count)| FacetValueCount {
                value: facet.to_path_string(),
                count,
            })
            .collect();
        let mut values = all.clone();
        values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        values.truncate(limit);

        for selected in selected_values {
            let mut normalized = selected.trim().to_string();
            if descriptor.to_lowercase {
                normalized = normalized.to_lowercase();
            }
            if normalized.is_empty() {
                continue;
            }
            let as_path = format!("/{}", normalized);
            if values.iter().any(|v| v.value == as_path) {
                continue;
            }
            let count = all.iter().find(|v| v.value == as_path).map(|v| v.count).unwrap_or(0);
            values.push(FacetValueCount { value: as_path, count });
        }

        Ok(FacetResult {
            name: descriptor.name.clone(),
            values,
        })
    }
}
