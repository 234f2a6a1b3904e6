//! The in-memory ontology: a DAG of labeled nodes with `subClassOf` and
//! `part_of` edges. Built once, replaced atomically on rebuild, never
//! mutated in place, so readers need no locking.

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct OntologyNode {
    /// IRI of the class
    pub id: String,
    /// Primary label
    pub term: String,
    /// Synonyms and demoted labels
    pub alt_terms: BTreeSet<String>,
    /// Direct super-classes, by id
    pub parents: BTreeSet<String>,
    /// Direct sub-classes, by id
    pub children: BTreeSet<String>,
    /// Organizational classes are traversed but excluded from drill-down
    pub organizational: bool,
}

/// Which terms a [`OntologyModel::terms_for`] call collects
#[derive(Debug, Clone, Copy, Default)]
pub struct TermSelector {
    pub self_term: bool,
    pub alt_terms: bool,
    pub children: bool,
    pub child_alt_terms: bool,
    pub part_of: bool,
}

impl TermSelector {
    /// Everything the query expander wants: the subtree below a node,
    /// synonyms included, following part-of edges.
    pub fn expansion() -> Self {
        Self {
            self_term: false,
            alt_terms: false,
            children: true,
            child_alt_terms: true,
            part_of: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct OntologyModel {
    nodes: HashMap<String, OntologyNode>,
    /// `part_of` edges, child id to parent ids
    part_of: HashMap<String, BTreeSet<String>>,
    /// Reverse `part_of` edges for descent
    part_of_children: HashMap<String, BTreeSet<String>>,
    /// Case-insensitive term text (primary and alternative) to node id
    term_index: HashMap<String, String>,
}

impl OntologyModel {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&OntologyNode> {
        self.nodes.get(id)
    }

    /// Exact-id lookup of the primary term
    pub fn term_for(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).map(|n| n.term.as_str())
    }

    /// Case-insensitive term lookup
    pub fn id_for(&self, term: &str) -> Option<&str> {
        self.term_index.get(&term.trim().to_lowercase()).map(String::as_str)
    }

    pub fn is_term(&self, text: &str) -> bool {
        self.id_for(text).is_some()
    }

    /// `part_of` parents of a node, when it has any
    pub fn part_of_parents(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.part_of.get(id)
    }

    /// Every known term with the primary it resolves to
    pub fn all_terms(&self) -> impl Iterator<Item = (&str, &str)> {
        self.nodes.values().flat_map(|node| {
            std::iter::once((node.term.as_str(), node.term.as_str()))
                .chain(node.alt_terms.iter().map(move |alt| (alt.as_str(), node.term.as_str())))
        })
    }

    /// Collect terms reachable from `id` under the selector. Child and
    /// part-of recursion is transitive; the alt flag propagates downward.
    pub fn terms_for(&self, id: &str, selector: TermSelector) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let node = match self.nodes.get(id) {
            Some(n) => n,
            None => return out,
        };
        if selector.self_term {
            out.insert(node.term.clone());
        }
        if selector.alt_terms {
            out.extend(node.alt_terms.iter().cloned());
        }
        if selector.children || selector.part_of {
            let mut visited = BTreeSet::new();
            self.descend(id, &selector, &mut visited, &mut out);
        }
        out
    }

    fn descend(&self, id: &str, selector: &TermSelector, visited: &mut BTreeSet<String>, out: &mut BTreeSet<String>) {
        let mut next: Vec<&str> = Vec::new();
        if selector.children {
            if let Some(node) = self.nodes.get(id) {
                next.extend(node.children.iter().map(String::as_str));
            }
        }
        if selector.part_of {
            if let Some(members) = self.part_of_children.get(id) {
                next.extend(members.iter().map(String::as_str));
            }
        }
        for child_id in next {
            if !visited.insert(child_id.to_string()) {
                continue;
            }
            if let Some(child) = self.nodes.get(child_id) {
                out.insert(child.term.clone());
                if selector.child_alt_terms {
                    out.extend(child.alt_terms.iter().cloned());
                }
            }
            self.descend(child_id, selector, visited, out);
        }
    }

    /// Ordered ancestry `[root, .., parent]` of a term, excluding the term
    /// itself. The DAG may give a node several parents; the walk follows
    /// the lexicographically smallest parent id for a deterministic path.
    /// Organizational classes are traversed but not reported.
    pub fn ancestors_of(&self, term: &str) -> Vec<String> {
        let mut path = Vec::new();
        let id = match self.id_for(term) {
            Some(id) => id,
            None => return path,
        };
        let mut visited = BTreeSet::new();
        let mut current = self.nodes.get(id);
        while let Some(node) = current {
            let parent_id = match node.parents.iter().next() {
                Some(p) => p,
                None => break,
            };
            if !visited.insert(parent_id.clone()) {
                break;
            }
            current = self.nodes.get(parent_id);
            if let Some(parent) = current {
                if !parent.organizational {
                    path.push(parent.term.clone());
                }
            }
        }
        path.reverse();
        path
    }
}

/// Accumulates raw classes from the loader, then links the DAG
#[derive(Debug, Default)]
pub struct OntologyModelBuilder {
    nodes: HashMap<String, OntologyNode>,
    part_of: HashMap<String, BTreeSet<String>>,
}

impl OntologyModelBuilder {
    pub fn add_class(
        &mut self,
        id: String,
        term: String,
        alt_terms: BTreeSet<String>,
        parents: BTreeSet<String>,
        part_of: BTreeSet<String>,
        organizational: bool,
    ) {
        if !part_of.is_empty() {
            self.part_of.entry(id.clone()).or_default().extend(part_of);
        }
        self.nodes.insert(
            id.clone(),
            OntologyNode {
                id,
                term,
                alt_terms,
                parents,
                children: BTreeSet::new(),
                organizational,
            },
        );
    }

    /// Link children to parents, strip ignored classes from nodes and
    /// relations, and freeze the model.
    pub fn build(mut self, ignored: &BTreeSet<String>) -> OntologyModel {
        for id in ignored {
            self.nodes.remove(id);
            self.part_of.remove(id);
        }
        for node in self.nodes.values_mut() {
            node.parents.retain(|p| !ignored.contains(p));
        }
        for targets in self.part_of.values_mut() {
            targets.retain(|p| !ignored.contains(p));
        }

        let child_links: Vec<(String, String)> = self
            .nodes
            .values()
            .flat_map(|node| node.parents.iter().map(move |p| (p.clone(), node.id.clone())))
            .collect();
        for (parent, child) in child_links {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.insert(child);
            }
        }

        let mut part_of_children: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (child, parents) in &self.part_of {
            if !self.nodes.contains_key(child) {
                continue;
            }
            for parent in parents {
                part_of_children.entry(parent.clone()).or_default().insert(child.clone());
            }
        }

        let mut term_index = HashMap::new();
        for node in self.nodes.values() {
            term_index.insert(node.term.to_lowercase(), node.id.clone());
            for alt in &node.alt_terms {
                term_index.entry(alt.to_lowercase()).or_insert_with(|| node.id.clone());
            }
        }

        OntologyModel {
            nodes: self.nodes,
            part_of: self.part_of,
            part_of_children,
            term_index,
        }
    }
}
