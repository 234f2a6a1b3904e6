use serde::{Deserialize, Serialize};
use tantivy::query::{Query, TermQuery};
use tantivy::schema::{Facet, IndexRecordOption, Schema};
use tantivy::Term;

use crate::query::{CreateQuery, KeyValue};
use crate::{error::Error, Result};

/// A drill-down leaf restricting results to documents carrying one facet
/// path, e.g. `{"facet": {"collection": "/bioimages"}}`. Hierarchical
/// values drill into a branch: `/efo/experimental factor/sample factor`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FacetQuery {
    facet: KeyValue<String, String>,
}

impl FacetQuery {
    pub fn new(facet: KeyValue<String, String>) -> Self {
        Self { facet }
    }

    pub fn with_path(field: String, path: String) -> Self {
        Self::new(KeyValue::new(field, path))
    }

    /// Build a drill-down from unescaped path segments
    pub fn from_segments(field: String, segments: &[&str]) -> Self {
        let facet = Facet::from_path(segments.iter());
        Self::new(KeyValue::new(field, facet.to_path_string()))
    }

    pub fn field(&self) -> &str {
        &self.facet.field
    }

    pub fn path(&self) -> &str {
        &self.facet.value
    }
}

impl CreateQuery for FacetQuery {
    fn create_query(self, schema: &Schema) -> Result<Box<dyn Query>> {
        let KeyValue { field, value, .. } = self.facet;
        let field = schema
            .get_field(&field)
            .ok_or_else(|| Error::UnknownField(field))?;
        let facet = Facet::from_text(&value)?;
        let term = Term::from_facet(field, &facet);
        Ok(Box::new(TermQuery::new(term, IndexRecordOption::Basic)))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_from_segments_escapes_slashes() {
        let q = FacetQuery::from_segments("efo".into(), &["experimental factor", "in vivo/vitro"]);
        assert_eq!(q.field(), "efo");
        // the slash inside the segment survives as part of a single segment
        let parsed = Facet::from_text(q.path()).unwrap();
        assert_eq!(parsed.to_path().len(), 2);
    }
}
