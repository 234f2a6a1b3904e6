//! The request body the search facade accepts. Only the fields the query
//! builder consumes live here; result mapping belongs to the read side.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SearchRequest {
    /// Free-text query; blank means match-all
    #[serde(default)]
    pub query: Option<String>,
    /// Restrict to one collection and its subcollections
    #[serde(default)]
    pub collection: Option<String>,
    /// Structured field filters, ANDed into the query
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    /// Selected facet values per dimension
    #[serde(default)]
    pub facets: BTreeMap<String, Vec<String>>,
    #[serde(default = "SearchRequest::default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl SearchRequest {
    pub const fn default_limit() -> usize {
        100
    }

    pub fn query_string(&self) -> &str {
        self.query.as_deref().unwrap_or("")
    }

    /// Selected facets in the shape the drill-down builder consumes
    pub fn facet_selection(&self) -> Vec<(String, Vec<String>)> {
        self.facets.iter().map(|(dim, values)| (dim.clone(), values.clone())).collect()
    }
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: None,
            collection: None,
            filters: BTreeMap::new(),
            facets: BTreeMap::new(),
            limit: Self::default_limit(),
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let request: SearchRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.query_string(), "");
        assert_eq!(request.limit, 100);
        assert_eq!(request.offset, 0);
    }

    #[test]
    fn test_full_body() {
        let body = r#"{
            "query": "leukocyte",
            "collection": "BioImages",
            "filters": { "author": "Ada" },
            "facets": { "organism": ["homo sapiens"] },
            "limit": 10,
            "offset": 20
        }"#;
        let request: SearchRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.query_string(), "leukocyte");
        assert_eq!(request.collection.as_deref(), Some("BioImages"));
        assert_eq!(request.filters.get("author"), Some(&"Ada".to_string()));
        assert_eq!(request.facet_selection(), vec![("organism".to_string(), vec!["homo sapiens".to_string()])]);
    }
}
