use std::fmt;
use std::marker::PhantomData;

use serde::de::{DeserializeOwned, Deserializer, Error as SerdeError, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::Serializer;
use serde::{Deserialize, Serialize};
use tantivy::query::Query as TantivyQuery;
use tantivy::schema::Schema;
use tantivy::Term;

use crate::error::Error;
use crate::query::{
    boolean::BoolQuery, facet::FacetQuery, phrase::PhraseQuery, range::RangeQuery, term::ExactTerm, wildcard::WildcardQuery,
};

pub(crate) mod boolean;
pub(crate) mod facet;
pub(crate) mod phrase;
pub(crate) mod range;
pub(crate) mod term;
pub(crate) mod wildcard;

/// Trait that generically lowers a query value into a Tantivy query
pub trait CreateQuery {
    /// Consume the implementing struct to generate a Tantivy query
    fn create_query(self, schema: &Schema) -> crate::Result<Box<dyn TantivyQuery>>;
}

/// The clause tree produced by the query parser and consumed by the
/// expansion engine. Every variant knows how to lower itself against the
/// submission schema.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum Query {
    /// Single-term exact clause
    Exact(ExactTerm),
    /// Multi-term phrase clause
    Phrase(PhraseQuery),
    /// Trailing-star prefix clause; never expanded
    Wildcard(WildcardQuery),
    /// Numeric range clause; never expanded
    Range(RangeQuery),
    /// Facet drill-down leaf restricting to one facet path
    Facet(FacetQuery),
    /// Collection of boolean clauses
    Boolean {
        /// The must/must_not/should branches
        bool: BoolQuery,
    },
    /// Matches every document
    All,
}

impl Query {
    /// Whether any leaf of this tree constrains the given field. Used to
    /// decide if the type-exclusion filter still applies.
    pub fn constrains_field(&self, field: &str) -> bool {
        match self {
            Query::Exact(t) => t.field() == field,
            Query::Phrase(p) => p.field() == field,
            Query::Wildcard(w) => w.field() == field,
            Query::Range(r) => r.field() == field,
            Query::Facet(f) => f.field() == field,
            Query::Boolean { bool } => bool.clauses().any(|q| q.constrains_field(field)),
            Query::All => false,
        }
    }

    /// Every wildcard prefix present in the tree, lowercased. The expansion
    /// engine drops expansion terms shadowed by one of these.
    pub fn wildcard_prefixes(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_wildcard_prefixes(&mut out);
        out
    }

    fn collect_wildcard_prefixes(&self, out: &mut Vec<String>) {
        match self {
            Query::Wildcard(w) => out.push(w.prefix().to_lowercase()),
            Query::Boolean { bool } => {
                for q in bool.clauses() {
                    q.collect_wildcard_prefixes(out);
                }
            }
            _ => {}
        }
    }
}

impl CreateQuery for Query {
    fn create_query(self, schema: &Schema) -> crate::Result<Box<dyn TantivyQuery>> {
        match self {
            Query::Exact(q) => q.create_query(schema),
            Query::Phrase(q) => q.create_query(schema),
            Query::Wildcard(q) => q.create_query(schema),
            Query::Range(q) => q.create_query(schema),
            Query::Facet(q) => q.create_query(schema),
            Query::Boolean { bool } => bool.create_query(schema),
            Query::All => Ok(Box::new(tantivy::query::AllQuery)),
        }
    }
}

pub(crate) fn make_field_value(schema: &Schema, k: &str, v: &str) -> crate::Result<Term> {
    let field = schema.get_field(k).ok_or_else(|| Error::UnknownField(k.into()))?;
    Ok(Term::from_field_text(field, v))
}

/// A single key/value pair, used where a query accepts exactly one
/// field/value mapping and a plain map would allow more.
#[derive(Debug, Clone)]
pub struct KeyValue<K, V>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    /// Key
    pub field: K,
    /// Value
    pub value: V,
}

impl<K, V> KeyValue<K, V>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    /// Construct a key value pair from known values
    pub fn new(field: K, value: V) -> Self {
        Self { field, value }
    }
}

struct KVVisitor<K, V>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    marker: PhantomData<fn() -> KeyValue<K, V>>,
}

impl<K, V> KVVisitor<K, V>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    fn new() -> Self {
        KVVisitor { marker: PhantomData }
    }
}

impl<'de, K, V> Visitor<'de> for KVVisitor<K, V>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    type Value = KeyValue<K, V>;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("an object with a single string value of any key name")
    }

    fn visit_map<M>(self, mut access: M) -> std::result::Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        if let Some((field, value)) = access.next_entry()? {
            if access.next_entry::<String, V>()?.is_some() {
                Err(M::Error::custom("too many values"))
            } else {
                Ok(KeyValue { field, value })
            }
        } else {
            Err(M::Error::custom("not enough values"))
        }
    }
}

impl<'de, K, V> Deserialize<'de> for KeyValue<K, V>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(KVVisitor::new())
    }
}

impl<'de, K, V> Serialize for KeyValue<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut m = serializer.serialize_map(Some(1))?;
        m.serialize_entry(&self.field, &self.value)?;
        m.end()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_kv_serialize() {
        let kv = KeyValue::new("title".to_string(), 1);
        let expected = r#"{"title":1}"#;
        assert_eq!(expected, serde_json::to_string(&kv).unwrap());
    }

    #[test]
    fn test_constrains_field() {
        let q = boolean::BoolQuery::builder()
            .must_match(Query::Exact(ExactTerm::with_term("type".into(), "study".into())))
            .should_match(Query::Exact(ExactTerm::with_term("title".into(), "cell".into())))
            .build();
        assert_eq!(q.constrains_field("type"), true);
        assert_eq!(q.constrains_field("author"), false);
    }

    #[test]
    fn test_wildcard_prefixes() {
        let q = boolean::BoolQuery::builder()
            .should_match(Query::Wildcard(WildcardQuery::with_prefix("content".into(), "Leuk".into())))
            .build();
        assert_eq!(q.wildcard_prefixes(), vec!["leuk".to_string()]);
    }
}
