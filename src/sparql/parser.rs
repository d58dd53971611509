//! SPARQL parser using spargebra library

use super::{QueryError, QueryResult};
use spargebra::algebra::GraphPattern;
use spargebra::Query;

/// A parsed SELECT query with its single projected variable
#[derive(Debug, Clone)]
pub struct SelectQuery {
    /// Algebra of the WHERE clause including solution modifiers
    pub pattern: GraphPattern,
    /// Name of the projected variable, without the `?`
    pub variable: String,
}

/// SPARQL parser
pub struct SparqlParser;

impl SparqlParser {
    /// Parse a SELECT query with exactly one projected variable
    pub fn parse_select(query: &str) -> QueryResult<SelectQuery> {
        let parsed =
            Query::parse(query, None).map_err(|e| QueryError::Parse(e.to_string()))?;

        match parsed {
            Query::Select {
                dataset, pattern, ..
            } => {
                if dataset.is_some() {
                    return Err(QueryError::Unsupported("FROM clause".to_string()));
                }
                let variable = projected_variable(&pattern)?;
                Ok(SelectQuery { pattern, variable })
            }
            _ => Err(QueryError::NotSelect),
        }
    }
}

/// Find the projection under the solution modifiers and return its only variable
fn projected_variable(pattern: &GraphPattern) -> QueryResult<String> {
    match pattern {
        GraphPattern::Project { variables, .. } => match variables.as_slice() {
            [single] => Ok(single.as_str().to_string()),
            _ => Err(QueryError::Projection(variables.len())),
        },
        GraphPattern::Distinct { inner }
        | GraphPattern::Reduced { inner }
        | GraphPattern::Slice { inner, .. } => projected_variable(inner),
        GraphPattern::OrderBy { inner, .. } => projected_variable(inner),
        _ => Err(QueryError::Projection(0)),
    }
}
