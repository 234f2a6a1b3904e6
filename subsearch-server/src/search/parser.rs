//! Field-aware parsing of the user query string into the clause tree.
//!
//! Supported shapes: bare terms, quoted phrases, `field:value`,
//! `field:"a phrase"`, numeric ranges `field:[100 TO 200]` with `*` as an
//! open bound, and trailing-star wildcards. A blank query is the
//! match-all. Anything unbalanced or referencing an unknown field is a
//! `QueryBuildError`.

use std::iter::Peekable;
use std::str::Chars;

use subsearch_types::{BoolQuery, Error, ExactTerm, FieldType, KeyValue, PhraseQuery, Query, RangeQuery, Ranges, Result, WildcardQuery};

use crate::analyzers::AnalyzerConfig;
use crate::registry::PropertyRegistry;
use crate::schema::reserved;

#[derive(Debug, Clone)]
struct RawClause {
    field: Option<String>,
    text: String,
    quoted: bool,
}

pub struct QueryStringParser<'a> {
    registry: &'a PropertyRegistry,
    analyzer: &'a AnalyzerConfig,
}

impl<'a> QueryStringParser<'a> {
    pub fn new(registry: &'a PropertyRegistry, analyzer: &'a AnalyzerConfig) -> Self {
        Self { registry, analyzer }
    }

    pub fn parse(&self, query: &str) -> Result<Query> {
        if query.trim().is_empty() {
            return Ok(Query::All);
        }
        let clauses = tokenize(query)?;
        let mut parsed = Vec::with_capacity(clauses.len());
        for clause in clauses {
            parsed.push(self.clause_to_query(clause)?);
        }
        match parsed.len() {
            1 => Ok(parsed.into_iter().next().expect("one clause")),
            _ => {
                let mut builder = BoolQuery::builder();
                for q in parsed {
                    builder = builder.should_match(q);
                }
                Ok(builder.build())
            }
        }
    }

    fn clause_to_query(&self, clause: RawClause) -> Result<Query> {
        let field = match &clause.field {
            Some(name) => {
                let known = self.registry.searchable_fields().iter().any(|f| f == name);
                if !known {
                    return Err(Error::QueryBuildError(format!("unknown field: {}", name)));
                }
                name.clone()
            }
            None => reserved::CONTENT.to_string(),
        };
        let text = clause.text.trim();
        if text.is_empty() {
            return Err(Error::QueryBuildError("empty clause".into()));
        }

        if !clause.quoted && text.starts_with('[') && text.ends_with(']') {
            return self.range_clause(&field, text);
        }

        if !clause.quoted && text.ends_with('*') {
            let prefix = text.trim_end_matches('*');
            if prefix.is_empty() {
                return Err(Error::QueryBuildError("wildcard without a prefix".into()));
            }
            return Ok(Query::Wildcard(WildcardQuery::with_prefix(field, prefix.to_string())));
        }

        let mut terms = self.normalize_for_field(&field, text);
        match terms.len() {
            0 => Err(Error::QueryBuildError(format!("clause '{}' reduced to nothing", text))),
            1 => Ok(Query::Exact(ExactTerm::with_term(field, terms.remove(0)))),
            _ => Ok(Query::Phrase(PhraseQuery::from_terms(field, terms))),
        }
    }

    /// `field:[a TO b]` over a numeric field; `*` leaves a bound open
    fn range_clause(&self, field: &str, text: &str) -> Result<Query> {
        let numeric = self
            .registry
            .property(field)
            .map(|d| d.field_type == FieldType::Long)
            .unwrap_or(false);
        if !numeric {
            return Err(Error::QueryBuildError(format!("range query on non-numeric field: {}", field)));
        }
        let inner = &text[1..text.len() - 1];
        let mut bounds = inner.splitn(2, " TO ");
        let lower = bounds.next().map(str::trim).unwrap_or("");
        let upper = match bounds.next().map(str::trim) {
            Some(u) => u,
            None => return Err(Error::QueryBuildError(format!("range without TO: {}", text))),
        };
        let gte = range_bound(lower)?;
        let lte = range_bound(upper)?;
        let ranges = Ranges::ValueRange {
            gte,
            lte,
            lt: None,
            gt: None,
        };
        Ok(Query::Range(RangeQuery::new(KeyValue::new(field.to_string(), ranges))))
    }

    /// Tokenized fields run through the analyzer chain so query terms
    /// agree with indexed tokens; exact fields keep their spelling.
    fn normalize_for_field(&self, field: &str, text: &str) -> Vec<String> {
        let tokenized = match self.registry.property(field) {
            Some(descriptor) => descriptor.field_type == FieldType::TokenizedText,
            None => true, // reserved text fields
        };
        if tokenized {
            self.analyzer.analyze(text)
        } else {
            vec![text.to_string()]
        }
    }
}

fn tokenize(query: &str) -> Result<Vec<RawClause>> {
    let mut clauses = Vec::new();
    let mut chars = query.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let text = read_quoted(&mut chars)?;
            clauses.push(RawClause {
                field: None,
                text,
                quoted: true,
            });
            continue;
        }
        clauses.push(read_clause(&mut chars)?);
    }
    Ok(clauses)
}

fn read_clause(chars: &mut Peekable<Chars<'_>>) -> Result<RawClause> {
    let mut field: Option<String> = None;
    let mut buf = String::new();
    let mut quoted = false;
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            break;
        }
        if c == ':' && field.is_none() {
            if buf.is_empty() {
                return Err(Error::QueryBuildError("clause with an empty field name".into()));
            }
            field = Some(std::mem::take(&mut buf));
            chars.next();
            if let Some(&'"') = chars.peek() {
                chars.next();
                buf = read_quoted(chars)?;
                quoted = true;
                break;
            }
            if let Some(&'[') = chars.peek() {
                read_bracketed(chars, &mut buf)?;
                break;
            }
            continue;
        }
        if c == '"' {
            return Err(Error::QueryBuildError("unexpected quote inside a term".into()));
        }
        buf.push(c);
        chars.next();
    }
    if field.is_some() && buf.is_empty() {
        return Err(Error::QueryBuildError("field without a value".into()));
    }
    Ok(RawClause { field, text: buf, quoted })
}

/// Consume `[... ]` including any inner whitespace
fn read_bracketed(chars: &mut Peekable<Chars<'_>>, buf: &mut String) -> Result<()> {
    for c in chars.by_ref() {
        buf.push(c);
        if c == ']' {
            return Ok(());
        }
    }
    Err(Error::QueryBuildError("unbalanced range bracket".into()))
}

fn range_bound(raw: &str) -> Result<Option<serde_json::Value>> {
    if raw == "*" {
        return Ok(None);
    }
    raw.parse::<i64>()
        .map(|n| Some(serde_json::Value::from(n)))
        .map_err(|_| Error::QueryBuildError(format!("bad range bound: {}", raw)))
}

fn read_quoted(chars: &mut Peekable<Chars<'_>>) -> Result<String> {
    let mut buf = String::new();
    for c in chars.by_ref() {
        if c == '"' {
            return Ok(buf);
        }
        buf.push(c);
    }
    Err(Error::QueryBuildError("unbalanced quote".into()))
}
