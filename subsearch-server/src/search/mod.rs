//! The query side: string parsing, synonym/ontology expansion, and final
//! query assembly with filters and the security clause.

pub mod builder;
pub mod expand;
pub mod parser;

pub use builder::{AccessGrantFilter, AllowAllFilter, QueryBuilder, QueryResult, SecurityFilter, SecurityOccur};
pub use expand::{expand_query, ExpansionOutcome};
pub use parser::QueryStringParser;
