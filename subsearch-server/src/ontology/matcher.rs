//! Whole-word, case-insensitive scanning of free text for ontology terms.
//! Longest match wins on overlap, alternative terms resolve back to their
//! primary, and results are order- and whitespace-insensitive. Built once
//! from the model and safe for concurrent use.

use std::collections::{BTreeSet, HashMap};

use super::model::OntologyModel;

#[derive(Debug, Clone)]
struct Candidate {
    tokens: Vec<String>,
    primary: String,
}

#[derive(Debug, Default)]
pub struct TermMatcher {
    /// First token of a term to its candidates, longest token run first
    by_first_token: HashMap<String, Vec<Candidate>>,
}

impl TermMatcher {
    pub fn from_model(model: &OntologyModel) -> Self {
        let mut by_first_token: HashMap<String, Vec<Candidate>> = HashMap::new();
        for (term, primary) in model.all_terms() {
            let tokens = tokenize(term);
            if tokens.is_empty() {
                continue;
            }
            let first = tokens[0].clone();
            by_first_token.entry(first).or_default().push(Candidate {
                tokens,
                primary: primary.to_string(),
            });
        }
        for candidates in by_first_token.values_mut() {
            candidates.sort_by(|a, b| b.tokens.len().cmp(&a.tokens.len()).then_with(|| a.primary.cmp(&b.primary)));
            candidates.dedup_by(|a, b| a.tokens == b.tokens && a.primary == b.primary);
        }
        Self { by_first_token }
    }

    /// Primary terms occurring in the content as whole-word matches
    pub fn find_terms(&self, content: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        if content.trim().is_empty() {
            return found;
        }
        let tokens = tokenize(content);
        let mut i = 0;
        while i < tokens.len() {
            let mut advanced = false;
            if let Some(candidates) = self.by_first_token.get(&tokens[i]) {
                for candidate in candidates {
                    let end = i + candidate.tokens.len();
                    if end <= tokens.len() && tokens[i..end] == candidate.tokens[..] {
                        found.insert(candidate.primary.clone());
                        i = end;
                        advanced = true;
                        break;
                    }
                }
            }
            if !advanced {
                i += 1;
            }
        }
        found
    }
}

/// Lowercased alphanumeric token runs; everything else is a boundary
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
