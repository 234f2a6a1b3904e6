//! The ontology subsystem: the immutable DAG model, the OWL loader with
//! its atomic-rebuild resolver, the free-text term matcher, and the
//! query-time expansion lookup.

pub mod loader;
pub mod lookup;
pub mod matcher;
pub mod model;

pub use loader::{ensure_ontology_file, OntologyIndex, OntologyResolver};
pub use lookup::{EfoEntry, EfoLookup};
pub use matcher::TermMatcher;
pub use model::{OntologyModel, OntologyNode, TermSelector};
