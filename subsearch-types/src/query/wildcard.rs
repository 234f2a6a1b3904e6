use serde::{Deserialize, Serialize};
use tantivy::query::{Query, RegexQuery as TantivyRegexQuery};
use tantivy::schema::Schema;

use crate::query::{CreateQuery, KeyValue};
use crate::{error::Error, Result};

/// A trailing-star prefix clause, e.g. `title:leuk*`. Lowered to a regex
/// query over the field's term dictionary.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WildcardQuery {
    wildcard: KeyValue<String, String>,
}

impl WildcardQuery {
    pub fn new(wildcard: KeyValue<String, String>) -> Self {
        Self { wildcard }
    }

    pub fn with_prefix(field: String, prefix: String) -> Self {
        Self::new(KeyValue::new(field, prefix))
    }

    pub fn field(&self) -> &str {
        &self.wildcard.field
    }

    /// The prefix without the trailing star
    pub fn prefix(&self) -> &str {
        &self.wildcard.value
    }
}

impl CreateQuery for WildcardQuery {
    fn create_query(self, schema: &Schema) -> Result<Box<dyn Query>> {
        let KeyValue { field, value, .. } = self.wildcard;
        let field = schema
            .get_field(&field)
            .ok_or_else(|| Error::UnknownField(field))?;
        let pattern = format!("{}.*", regex_escape(&value.to_lowercase()));
        Ok(Box::new(TantivyRegexQuery::from_pattern(&pattern, field)?))
    }
}

/// Escape regex metacharacters in a literal prefix
fn regex_escape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if "\\.+*?()|[]{}^$#".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
