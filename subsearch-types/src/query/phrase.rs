use serde::{Deserialize, Serialize};
use tantivy::query::{PhraseQuery as TantivyPhraseQuery, Query};
use tantivy::schema::Schema;
use tantivy::Term;

use crate::query::{make_field_value, CreateQuery, KeyValue};
use crate::{error::Error, Result};

/// An ordered multi-term phrase on one field
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PhraseQuery {
    phrase: KeyValue<String, TermGroup>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TermGroup {
    terms: Vec<String>,
}

impl TermGroup {
    pub fn new(terms: Vec<String>) -> Self {
        TermGroup { terms }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}

impl PhraseQuery {
    pub fn new(phrase: KeyValue<String, TermGroup>) -> Self {
        PhraseQuery { phrase }
    }

    /// Split a whitespace-joined value into an ordered phrase
    pub fn from_text(field: String, text: &str) -> Self {
        let terms = text.split_whitespace().map(|t| t.to_lowercase()).collect();
        Self::new(KeyValue::new(field, TermGroup::new(terms)))
    }

    /// Build from already-analyzed terms
    pub fn from_terms(field: String, terms: Vec<String>) -> Self {
        Self::new(KeyValue::new(field, TermGroup::new(terms)))
    }

    pub fn field(&self) -> &str {
        &self.phrase.field
    }

    pub fn terms(&self) -> &[String] {
        self.phrase.value.terms()
    }
}

impl CreateQuery for PhraseQuery {
    fn create_query(self, schema: &Schema) -> Result<Box<dyn Query>> {
        let KeyValue { field, value } = self.phrase;
        if value.terms.len() <= 1 {
            return Err(Error::QueryBuildError("Phrase query must have more than 1 term".into()));
        }
        let terms = value
            .terms
            .into_iter()
            .map(|t| make_field_value(schema, &field, &t))
            .collect::<Result<Vec<Term>>>()?;
        Ok(Box::new(TantivyPhraseQuery::new(terms)))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_single_term_rejected() {
        let phrase = PhraseQuery::from_text("content".into(), "leukocyte");
        let mut schema = tantivy::schema::SchemaBuilder::new();
        schema.add_text_field("content", tantivy::schema::TEXT);
        let built = schema.build();
        let query = phrase.create_query(&built);

        assert_eq!(query.is_err(), true);
    }

    #[test]
    pub fn test_from_text_lowercases() {
        let phrase = PhraseQuery::from_text("content".into(), "Myeloid Leukocyte");
        assert_eq!(phrase.terms(), &["myeloid".to_string(), "leukocyte".to_string()]);
    }
}
