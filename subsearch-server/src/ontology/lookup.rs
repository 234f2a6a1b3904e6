//! The query-time expansion index: for each known term, its synonyms and
//! the ontology ids it resolves to. Derived from the model and rebuilt
//! with it.

use std::collections::{BTreeSet, HashMap};

use super::model::OntologyModel;

#[derive(Debug, Clone, Default)]
pub struct EfoEntry {
    /// The canonical spelling of the looked-up term
    pub term: String,
    /// Synonyms of the term, the primary included when looking up an alt
    pub alt_terms: BTreeSet<String>,
    /// Ontology ids whose primary or alternative label equals the term
    pub efo_ids: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct EfoLookup {
    entries: HashMap<String, EfoEntry>,
}

impl EfoLookup {
    pub fn from_model(model: &OntologyModel) -> Self {
        let mut entries: HashMap<String, EfoEntry> = HashMap::new();
        for (term, _primary) in model.all_terms() {
            let id = match model.id_for(term) {
                Some(id) => id.to_string(),
                None => continue,
            };
            let node = match model.node(&id) {
                Some(n) => n,
                None => continue,
            };
            let entry = entries.entry(term.to_lowercase()).or_insert_with(|| EfoEntry {
                term: term.to_string(),
                ..EfoEntry::default()
            });
            entry.efo_ids.insert(id.clone());
            // synonyms of the looked-up spelling: every other label of the node
            if !node.term.eq_ignore_ascii_case(term) {
                entry.alt_terms.insert(node.term.clone());
            }
            for alt in &node.alt_terms {
                if !alt.eq_ignore_ascii_case(term) {
                    entry.alt_terms.insert(alt.clone());
                }
            }
        }
        Self { entries }
    }

    pub fn lookup(&self, term: &str) -> Option<&EfoEntry> {
        self.entries.get(&term.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
