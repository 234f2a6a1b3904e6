//! Query expansion: leaves over expandable fields pick up synonyms and
//! ontology-derived terms. The whole expansion is dropped when the term
//! budget is exceeded, leaving the original query untouched but keeping
//! the discovered sets for the caller to inspect.

use std::collections::BTreeSet;

use log::debug;

use subsearch_types::{BoolQuery, ExactTerm, PhraseQuery, Query};

use crate::ontology::{OntologyIndex, TermSelector};

/// What the expansion walk produced
#[derive(Debug, Clone)]
pub struct ExpansionOutcome {
    pub query: Query,
    pub expanded_efo_terms: BTreeSet<String>,
    pub expanded_synonyms: BTreeSet<String>,
    pub too_many_expansion_terms: bool,
}

pub fn expand_query(query: Query, ontology: &OntologyIndex, expandable_fields: &[String], limit: usize) -> ExpansionOutcome {
    let original = query.clone();
    let wildcard_prefixes = query.wildcard_prefixes();
    let mut walk = Walk {
        ontology,
        expandable_fields,
        wildcard_prefixes,
        seen: BTreeSet::new(),
        synonyms: BTreeSet::new(),
        efo_terms: BTreeSet::new(),
    };
    let expanded = walk.visit(query);

    let total = walk.synonyms.len() + walk.efo_terms.len();
    if total > limit {
        debug!("expansion over budget: {} terms > {}", total, limit);
        return ExpansionOutcome {
            query: original,
            expanded_efo_terms: walk.efo_terms,
            expanded_synonyms: walk.synonyms,
            too_many_expansion_terms: true,
        };
    }
    ExpansionOutcome {
        query: expanded,
        expanded_efo_terms: walk.efo_terms,
        expanded_synonyms: walk.synonyms,
        too_many_expansion_terms: false,
    }
}

struct Walk<'a> {
    ontology: &'a OntologyIndex,
    expandable_fields: &'a [String],
    wildcard_prefixes: Vec<String>,
    /// Case-insensitive dedup across sibling clauses
    seen: BTreeSet<String>,
    synonyms: BTreeSet<String>,
    efo_terms: BTreeSet<String>,
}

impl<'a> Walk<'a> {
    fn visit(&mut self, query: Query) -> Query {
        match query {
            Query::Boolean { bool } => {
                let must = bool.must().iter().cloned().map(|q| self.visit(q)).collect();
                let must_not = bool.must_not().to_vec();
                let should = bool.should().iter().cloned().map(|q| self.visit(q)).collect();
                Query::Boolean {
                    bool: BoolQuery::new(must, must_not, should),
                }
            }
            Query::Exact(term) => {
                let field = term.field().to_string();
                let value = term.value().to_string();
                self.expand_leaf(Query::Exact(term), &field, &value)
            }
            Query::Phrase(phrase) => {
                let field = phrase.field().to_string();
                let value = phrase.terms().join(" ");
                self.expand_leaf(Query::Phrase(phrase), &field, &value)
            }
            // match-all, wildcard and range leaves pass through untouched
            other => other,
        }
    }

    fn expand_leaf(&mut self, leaf: Query, field: &str, value: &str) -> Query {
        if !self.expandable_fields.iter().any(|f| f == field) {
            return leaf;
        }
        let entry = match self.ontology.lookup.lookup(value) {
            Some(entry) => entry.clone(),
            None => return leaf,
        };

        let mut additions: Vec<Query> = Vec::new();
        let value_lc = value.to_lowercase();
        self.seen.insert(value_lc);

        for synonym in &entry.alt_terms {
            if self.admit(synonym) {
                self.synonyms.insert(synonym.clone());
                additions.push(sub_query(field, synonym));
            }
        }
        for id in &entry.efo_ids {
            for term in self.ontology.model.terms_for(id, TermSelector::expansion()) {
                if self.admit(&term) {
                    self.efo_terms.insert(term.clone());
                    additions.push(sub_query(field, &term));
                }
            }
        }
        if additions.is_empty() {
            return leaf;
        }

        let mut builder = BoolQuery::builder().should_match(leaf);
        for addition in additions {
            builder = builder.should_match(addition);
        }
        builder.build()
    }

    /// Redundancy rules: exact duplicates of anything already admitted and
    /// terms shadowed by a wildcard prefix are dropped.
    fn admit(&mut self, candidate: &str) -> bool {
        let lc = candidate.to_lowercase();
        if self.wildcard_prefixes.iter().any(|prefix| lc.starts_with(prefix.as_str())) {
            return false;
        }
        self.seen.insert(lc)
    }
}

/// Multi-word expansion values become phrases, single words exact terms
fn sub_query(field: &str, value: &str) -> Query {
    if value.split_whitespace().count() > 1 {
        Query::Phrase(PhraseQuery::from_text(field.to_string(), value))
    } else {
        Query::Exact(ExactTerm::with_term(field.to_string(), value.to_lowercase()))
    }
}
