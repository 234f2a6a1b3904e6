use serde::{Deserialize, Serialize};
use tantivy::query::{BooleanQuery, Occur, Query as TQuery};
use tantivy::schema::Schema;

use crate::query::{CreateQuery, Query};
use crate::Result;

/// A boolean query parallel to Tantivy's [`tantivy::query::BooleanQuery`]: BooleanQuery
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BoolQuery {
    #[serde(default = "Vec::new")]
    must: Vec<Query>,
    #[serde(default = "Vec::new")]
    must_not: Vec<Query>,
    #[serde(default = "Vec::new")]
    should: Vec<Query>,
}

impl BoolQuery {
    pub fn new(must: Vec<Query>, must_not: Vec<Query>, should: Vec<Query>) -> Self {
        Self { must, must_not, should }
    }

    /// Create a builder instance for a BoolQuery
    pub fn builder() -> BoolQueryBuilder {
        BoolQueryBuilder::default()
    }

    pub fn must(&self) -> &[Query] {
        &self.must
    }

    pub fn must_not(&self) -> &[Query] {
        &self.must_not
    }

    pub fn should(&self) -> &[Query] {
        &self.should
    }

    /// Iterate every clause regardless of occurrence
    pub fn clauses(&self) -> impl Iterator<Item = &Query> {
        self.must.iter().chain(self.must_not.iter()).chain(self.should.iter())
    }
}

impl CreateQuery for BoolQuery {
    fn create_query(self, schema: &Schema) -> Result<Box<dyn TQuery>> {
        let mut all_queries: Vec<(Occur, Box<dyn TQuery>)> = Vec::new();
        if !self.must.is_empty() {
            all_queries.append(&mut lower_clauses(schema, Occur::Must, self.must)?);
        }
        if !self.must_not.is_empty() {
            all_queries.append(&mut lower_clauses(schema, Occur::MustNot, self.must_not)?);
        }
        if !self.should.is_empty() {
            all_queries.append(&mut lower_clauses(schema, Occur::Should, self.should)?);
        }
        Ok(Box::new(BooleanQuery::from(all_queries)))
    }
}

fn lower_clauses(schema: &Schema, occur: Occur, queries: Vec<Query>) -> Result<Vec<(Occur, Box<dyn TQuery>)>> {
    queries
        .into_iter()
        .map(|q| Ok((occur, q.create_query(schema)?)))
        .collect::<Result<Vec<(Occur, Box<dyn TQuery>)>>>()
}

#[derive(Debug, Default)]
pub struct BoolQueryBuilder {
    must: Vec<Query>,
    must_not: Vec<Query>,
    should: Vec<Query>,
}

impl BoolQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must_match(mut self, query: Query) -> Self {
        self.must.push(query);
        self
    }

    pub fn must_not_match(mut self, query: Query) -> Self {
        self.must_not.push(query);
        self
    }

    pub fn should_match(mut self, query: Query) -> Self {
        self.should.push(query);
        self
    }

    pub fn build(self) -> Query {
        Query::Boolean {
            bool: BoolQuery::new(self.must, self.must_not, self.should),
        }
    }
}
