//! SPARQL query execution
//!
//! The repository issues read-only SELECT queries with a single projected variable (by
//! convention `?s`) against one named graph inside an already open transaction.
//!
//! # Example
//!
//! ```rust
//! use repograph::rdf::{Dataset, NamedNode, RdfPredicate, RdfSubject, StoreError, Triple};
//! use repograph::sparql::{execute, QueryOptions};
//!
//! let dataset = Dataset::in_memory();
//! let model = NamedNode::new("http://imeji.org/collection").unwrap();
//! dataset
//!     .write(|tx| {
//!         let child = RdfSubject::iri("http://example.org/collection/2").unwrap();
//!         let parent = NamedNode::new("http://example.org/collection/1").unwrap();
//!         let predicate = RdfPredicate::new("http://imeji.org/terms/collection").unwrap();
//!         tx.insert(&model, Triple::new(child, predicate, parent.into()))?;
//!         Ok::<_, StoreError>(())
//!     })
//!     .unwrap();
//!
//! let query = "SELECT ?s WHERE { <http://example.org/collection/2> <http://imeji.org/terms/collection>+ ?s }";
//! let parents = dataset
//!     .read(|tx| execute(tx, query, Some(&model), &QueryOptions::default()))
//!     .unwrap();
//! assert_eq!(parents, vec!["http://example.org/collection/1".to_string()]);
//! ```

mod executor;
mod parser;
mod results;

pub use parser::{SelectQuery, SparqlParser};
pub use results::QuerySolution;

use crate::rdf::{NamedNode, Transaction};
use executor::{Deadline, Evaluator};
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Query errors
#[derive(Error, Debug)]
pub enum QueryError {
    /// Syntax error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Only SELECT queries are executed
    #[error("Only SELECT queries are supported")]
    NotSelect,

    /// Exactly one variable must be projected
    #[error("Expected exactly one projected variable, found {0}")]
    Projection(usize),

    /// Unsupported algebra
    #[error("Unsupported query feature: {0}")]
    Unsupported(String),

    /// Evaluation exceeded its time limit
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),
}

pub type QueryResult<T> = Result<T, QueryError>;

/// Execution options
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    /// When no named graph is given, treat the union of all graphs as the default graph
    pub union_default_graph: bool,
    /// Abort evaluation after this long. `None` runs to completion.
    pub timeout: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            union_default_graph: true,
            timeout: None,
        }
    }
}

/// Handle for one running query; released when dropped on every exit path
struct QueryExecution<'q> {
    query: &'q str,
    rows: usize,
}

impl Drop for QueryExecution<'_> {
    fn drop(&mut self) {
        trace!("Released query execution ({} rows): {}", self.rows, self.query);
    }
}

/// Run a SELECT query and return the bound values of its projected variable in store order.
///
/// IRIs are returned as their IRI string, literals as their lexical form and blank nodes as
/// `_:id`. Rows that leave the variable unbound are skipped.
pub fn execute(
    tx: &Transaction,
    query: &str,
    named_graph: Option<&NamedNode>,
    options: &QueryOptions,
) -> QueryResult<Vec<String>> {
    let mut execution = QueryExecution { query, rows: 0 };

    let select = SparqlParser::parse_select(query)?;
    let evaluator = Evaluator::new(tx, Deadline::after(options.timeout));
    let active = evaluator.default_graph(named_graph, options.union_default_graph);
    let solutions = evaluator.evaluate(&select.pattern, &active)?;
    execution.rows = solutions.len();

    Ok(solutions
        .iter()
        .filter_map(|s| s.get(&select.variable))
        .map(|term| term.to_result_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::{Dataset, Literal, RdfPredicate, RdfSubject, StoreError, Triple};

    fn item_graph() -> NamedNode {
        NamedNode::new("http://imeji.org/item").unwrap()
    }

    fn seeded() -> Dataset {
        let dataset = Dataset::in_memory();
        dataset
            .write(|tx| {
                let item = RdfSubject::iri("http://example.org/item/1").unwrap();
                tx.insert(
                    &item_graph(),
                    Triple::new(
                        item.clone(),
                        RdfPredicate::new("http://imeji.org/terms/collection").unwrap(),
                        NamedNode::new("http://example.org/collection/1").unwrap().into(),
                    ),
                )?;
                tx.insert(
                    &item_graph(),
                    Triple::new(
                        item,
                        RdfPredicate::new("http://imeji.org/terms/filename").unwrap(),
                        Literal::new_simple_literal("a.png").into(),
                    ),
                )?;
                Ok::<_, StoreError>(())
            })
            .unwrap();
        dataset
    }

    #[test]
    fn test_iri_and_literal_results() {
        let dataset = seeded();
        dataset
            .read(|tx| {
                let parents = execute(
                    tx,
                    "SELECT ?s WHERE { <http://example.org/item/1> <http://imeji.org/terms/collection> ?s }",
                    Some(&item_graph()),
                    &QueryOptions::default(),
                )?;
                assert_eq!(parents, vec!["http://example.org/collection/1"]);

                let names = execute(
                    tx,
                    "SELECT ?s WHERE { ?x <http://imeji.org/terms/filename> ?s }",
                    Some(&item_graph()),
                    &QueryOptions::default(),
                )?;
                assert_eq!(names, vec!["a.png"]);
                Ok::<_, QueryError>(())
            })
            .unwrap();
    }

    #[test]
    fn test_union_default_graph() {
        let dataset = seeded();
        let query = "SELECT ?s WHERE { ?s <http://imeji.org/terms/filename> ?o }";
        dataset
            .read(|tx| {
                let union = execute(tx, query, None, &QueryOptions::default())?;
                assert_eq!(union.len(), 1);

                let options = QueryOptions {
                    union_default_graph: false,
                    ..QueryOptions::default()
                };
                assert!(execute(tx, query, None, &options)?.is_empty());

                let other = NamedNode::new("http://imeji.org/collection").unwrap();
                assert!(execute(tx, query, Some(&other), &QueryOptions::default())?.is_empty());
                Ok::<_, QueryError>(())
            })
            .unwrap();
    }

    #[test]
    fn test_unsupported_filter() {
        let dataset = seeded();
        let result = dataset.read(|tx| {
            execute(
                tx,
                "SELECT ?s WHERE { ?s ?p ?o FILTER(?o = 1) }",
                None,
                &QueryOptions::default(),
            )
        });
        assert!(matches!(result, Err(QueryError::Unsupported(_))));
    }

    #[test]
    fn test_zero_timeout_fails() {
        let dataset = seeded();
        let options = QueryOptions {
            union_default_graph: true,
            timeout: Some(Duration::ZERO),
        };
        let result = dataset.read(|tx| execute(tx, "SELECT ?s WHERE { ?s ?p ?o }", None, &options));
        assert!(matches!(result, Err(QueryError::Timeout(_))));
    }
}
