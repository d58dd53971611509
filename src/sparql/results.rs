//! SPARQL query solutions

use crate::rdf::RdfObject;
use std::collections::HashMap;

/// Query solution (variable bindings)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySolution {
    /// Variable name → RDF term bindings
    pub bindings: HashMap<String, RdfObject>,
}

impl QuerySolution {
    /// Create a new query solution
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a binding
    pub fn get(&self, variable: &str) -> Option<&RdfObject> {
        self.bindings.get(variable)
    }

    /// Bind a variable, failing if it is already bound to a different term
    pub fn bind(&self, variable: &str, term: RdfObject) -> Option<QuerySolution> {
        match self.bindings.get(variable) {
            Some(existing) if existing != &term => None,
            Some(_) => Some(self.clone()),
            None => {
                let mut next = self.clone();
                next.bindings.insert(variable.to_string(), term);
                Some(next)
            }
        }
    }

    /// Whether two solutions agree on every shared variable
    pub fn is_compatible(&self, other: &QuerySolution) -> bool {
        self.bindings
            .iter()
            .all(|(var, term)| other.bindings.get(var).map_or(true, |t| t == term))
    }

    /// Whether the solutions share at least one variable
    pub fn shares_variable(&self, other: &QuerySolution) -> bool {
        self.bindings.keys().any(|var| other.bindings.contains_key(var))
    }

    /// Union of two compatible solutions
    pub fn merge(&self, other: &QuerySolution) -> QuerySolution {
        let mut merged = self.clone();
        for (var, term) in &other.bindings {
            merged
                .bindings
                .entry(var.clone())
                .or_insert_with(|| term.clone());
        }
        merged
    }

    /// Keep only the given variables
    pub fn project(&self, variables: &[String]) -> QuerySolution {
        QuerySolution {
            bindings: variables
                .iter()
                .filter_map(|v| self.bindings.get(v).map(|t| (v.clone(), t.clone())))
                .collect(),
        }
    }

    /// Order-independent key for duplicate elimination
    pub fn distinct_key(&self) -> Vec<(String, RdfObject)> {
        let mut key: Vec<(String, RdfObject)> = self
            .bindings
            .iter()
            .map(|(v, t)| (v.clone(), t.clone()))
            .collect();
        key.sort_by(|a, b| a.0.cmp(&b.0));
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::NamedNode;

    fn iri(s: &str) -> RdfObject {
        NamedNode::new(s).unwrap().into()
    }

    #[test]
    fn test_bind_conflict() {
        let solution = QuerySolution::new()
            .bind("s", iri("http://example.org/a"))
            .unwrap();
        assert!(solution.bind("s", iri("http://example.org/a")).is_some());
        assert!(solution.bind("s", iri("http://example.org/b")).is_none());
    }

    #[test]
    fn test_compatible_merge() {
        let left = QuerySolution::new()
            .bind("s", iri("http://example.org/a"))
            .unwrap();
        let right = QuerySolution::new()
            .bind("s", iri("http://example.org/a"))
            .unwrap()
            .bind("o", iri("http://example.org/b"))
            .unwrap();
        assert!(left.is_compatible(&right));
        assert!(left.shares_variable(&right));
        assert_eq!(left.merge(&right).bindings.len(), 2);
        assert_eq!(left.merge(&right).project(&["o".to_string()]).bindings.len(), 1);
    }
}
