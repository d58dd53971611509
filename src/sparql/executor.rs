//! SPARQL query executor
//!
//! Evaluates the spargebra algebra of a SELECT query against the graphs of an open
//! [`Transaction`]. Only the subset of the algebra the repository layer issues is supported;
//! anything else fails with [`QueryError::Unsupported`].

use super::results::QuerySolution;
use super::{QueryError, QueryResult};
use crate::rdf::{
    GraphView, Literal, NamedNode, RdfObject, RdfPredicate, Transaction, Triple, TriplePattern,
};
use spargebra::algebra::{GraphPattern, PropertyPathExpression};
use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern as AlgebraTriplePattern};
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::trace;

/// Absolute evaluation deadline
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Option<(Instant, Duration)>,
}

impl Deadline {
    pub(crate) fn after(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.map(|t| (Instant::now() + t, t)),
        }
    }

    fn check(&self) -> QueryResult<()> {
        match self.at {
            Some((at, timeout)) if Instant::now() >= at => Err(QueryError::Timeout(timeout)),
            _ => Ok(()),
        }
    }
}

/// The graphs a pattern is matched against
#[derive(Clone)]
pub(crate) struct ActiveGraph<'a> {
    graphs: Vec<GraphView<'a>>,
}

impl<'a> ActiveGraph<'a> {
    fn query(&self, pattern: &TriplePattern) -> Vec<&'a Triple> {
        match self.graphs.as_slice() {
            [single] => single.query(pattern),
            graphs => {
                let mut seen = HashSet::new();
                graphs
                    .iter()
                    .flat_map(|g| g.query(pattern))
                    .filter(|t| seen.insert(*t))
                    .collect()
            }
        }
    }

    fn nodes(&self) -> Vec<RdfObject> {
        let mut seen = HashSet::new();
        self.graphs
            .iter()
            .flat_map(|g| g.nodes())
            .filter(|n| seen.insert(n.clone()))
            .collect()
    }
}

/// Evaluator over one transaction
pub(crate) struct Evaluator<'a> {
    tx: &'a Transaction,
    deadline: Deadline,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(tx: &'a Transaction, deadline: Deadline) -> Self {
        Self { tx, deadline }
    }

    /// Default graph: one named graph, the union of all graphs, or nothing
    pub(crate) fn default_graph(
        &self,
        named_graph: Option<&NamedNode>,
        union_default_graph: bool,
    ) -> ActiveGraph<'a> {
        let graphs = match named_graph {
            Some(name) => self.tx.graph(name).into_iter().collect(),
            None if union_default_graph => {
                self.tx.graphs().into_iter().map(|(_, g)| g).collect()
            }
            None => Vec::new(),
        };
        ActiveGraph { graphs }
    }

    pub(crate) fn evaluate(
        &self,
        pattern: &GraphPattern,
        active: &ActiveGraph<'a>,
    ) -> QueryResult<Vec<QuerySolution>> {
        self.eval(pattern, active)
    }

    fn eval(&self, pattern: &GraphPattern, active: &ActiveGraph<'a>) -> QueryResult<Vec<QuerySolution>> {
        self.deadline.check()?;
        match pattern {
            GraphPattern::Bgp { patterns } => {
                let mut solutions = vec![QuerySolution::new()];
                for triple_pattern in patterns {
                    solutions = self.eval_triple_pattern(triple_pattern, solutions, active)?;
                    if solutions.is_empty() {
                        break;
                    }
                }
                Ok(solutions)
            }
            GraphPattern::Path {
                subject,
                path,
                object,
            } => self.eval_path_pattern(subject, path, object, active),
            GraphPattern::Join { left, right } => {
                let left = self.eval(left, active)?;
                let right = self.eval(right, active)?;
                Ok(join(&left, &right))
            }
            GraphPattern::LeftJoin {
                left,
                right,
                expression: None,
            } => {
                let left = self.eval(left, active)?;
                let right = self.eval(right, active)?;
                let mut solutions = Vec::new();
                for l in &left {
                    let matched: Vec<QuerySolution> = right
                        .iter()
                        .filter(|r| l.is_compatible(r))
                        .map(|r| l.merge(r))
                        .collect();
                    if matched.is_empty() {
                        solutions.push(l.clone());
                    } else {
                        solutions.extend(matched);
                    }
                }
                Ok(solutions)
            }
            GraphPattern::Union { left, right } => {
                let mut solutions = self.eval(left, active)?;
                solutions.extend(self.eval(right, active)?);
                Ok(solutions)
            }
            GraphPattern::Minus { left, right } => {
                let left = self.eval(left, active)?;
                let right = self.eval(right, active)?;
                Ok(left
                    .into_iter()
                    .filter(|l| {
                        !right
                            .iter()
                            .any(|r| l.shares_variable(r) && l.is_compatible(r))
                    })
                    .collect())
            }
            GraphPattern::Graph { name, inner } => match name {
                NamedNodePattern::NamedNode(n) => {
                    let graph = ActiveGraph {
                        graphs: self.tx.graph(&NamedNode::from(n.clone())).into_iter().collect(),
                    };
                    self.eval(inner, &graph)
                }
                NamedNodePattern::Variable(v) => {
                    let mut solutions = Vec::new();
                    for (graph_name, graph) in self.tx.graphs() {
                        let name_term = match NamedNode::new(graph_name) {
                            Ok(n) => RdfObject::NamedNode(n),
                            Err(_) => continue,
                        };
                        let scoped = ActiveGraph {
                            graphs: vec![graph],
                        };
                        for solution in self.eval(inner, &scoped)? {
                            if let Some(bound) = solution.bind(v.as_str(), name_term.clone()) {
                                solutions.push(bound);
                            }
                        }
                    }
                    Ok(solutions)
                }
            },
            GraphPattern::Project { inner, variables } => {
                let names: Vec<String> = variables.iter().map(|v| v.as_str().to_string()).collect();
                Ok(self
                    .eval(inner, active)?
                    .iter()
                    .map(|s| s.project(&names))
                    .collect())
            }
            GraphPattern::Distinct { inner } | GraphPattern::Reduced { inner } => {
                let mut seen = HashSet::new();
                Ok(self
                    .eval(inner, active)?
                    .into_iter()
                    .filter(|s| seen.insert(s.distinct_key()))
                    .collect())
            }
            GraphPattern::Slice {
                inner,
                start,
                length,
            } => {
                let solutions = self.eval(inner, active)?.into_iter().skip(*start);
                Ok(match length {
                    Some(length) => solutions.take(*length).collect(),
                    None => solutions.collect(),
                })
            }
            GraphPattern::LeftJoin { .. } => {
                Err(QueryError::Unsupported("OPTIONAL with FILTER".to_string()))
            }
            GraphPattern::Filter { .. } => Err(QueryError::Unsupported("FILTER".to_string())),
            GraphPattern::Extend { .. } => Err(QueryError::Unsupported("BIND".to_string())),
            GraphPattern::Values { .. } => Err(QueryError::Unsupported("VALUES".to_string())),
            GraphPattern::OrderBy { .. } => Err(QueryError::Unsupported("ORDER BY".to_string())),
            GraphPattern::Group { .. } => Err(QueryError::Unsupported("GROUP BY".to_string())),
            GraphPattern::Service { .. } => Err(QueryError::Unsupported("SERVICE".to_string())),
            #[allow(unreachable_patterns)]
            _ => Err(QueryError::Unsupported("graph pattern".to_string())),
        }
    }

    fn eval_triple_pattern(
        &self,
        pattern: &AlgebraTriplePattern,
        input: Vec<QuerySolution>,
        active: &ActiveGraph<'a>,
    ) -> QueryResult<Vec<QuerySolution>> {
        let mut output = Vec::new();
        for solution in input {
            self.deadline.check()?;

            let subject = match resolve(&pattern.subject, &solution)? {
                Resolved::Bound(term) => match term.as_subject() {
                    Some(s) => Some(s),
                    None => continue,
                },
                Resolved::Free(_) => None,
            };
            let predicate = match &pattern.predicate {
                NamedNodePattern::NamedNode(n) => Some(RdfPredicate::from(NamedNode::from(n.clone()))),
                NamedNodePattern::Variable(v) => match solution.get(v.as_str()) {
                    Some(RdfObject::NamedNode(n)) => Some(RdfPredicate::from(n.clone())),
                    Some(_) => continue,
                    None => None,
                },
            };
            let object = match resolve(&pattern.object, &solution)? {
                Resolved::Bound(term) => Some(term),
                Resolved::Free(_) => None,
            };

            let lookup = TriplePattern::new(subject, predicate, object);
            for triple in active.query(&lookup) {
                let mut next = Some(solution.clone());
                if let Resolved::Free(var) = resolve(&pattern.subject, &solution)? {
                    next = next.and_then(|s| s.bind(&var, triple.subject.clone().into()));
                }
                if let NamedNodePattern::Variable(v) = &pattern.predicate {
                    next = next.and_then(|s| {
                        s.bind(v.as_str(), triple.predicate.as_named_node().clone().into())
                    });
                }
                if let Resolved::Free(var) = resolve(&pattern.object, &solution)? {
                    next = next.and_then(|s| s.bind(&var, triple.object.clone()));
                }
                if let Some(next) = next {
                    output.push(next);
                }
            }
        }
        Ok(output)
    }

    fn eval_path_pattern(
        &self,
        subject: &TermPattern,
        path: &PropertyPathExpression,
        object: &TermPattern,
        active: &ActiveGraph<'a>,
    ) -> QueryResult<Vec<QuerySolution>> {
        let start = QuerySolution::new();
        let mut solutions = Vec::new();

        match (resolve(subject, &start)?, resolve(object, &start)?) {
            (Resolved::Bound(s), Resolved::Bound(o)) => {
                if self.eval_path(path, &s, true, active)?.contains(&o) {
                    solutions.push(start);
                }
            }
            (Resolved::Bound(s), Resolved::Free(o_var)) => {
                for end in self.eval_path(path, &s, true, active)? {
                    solutions.extend(start.bind(&o_var, end));
                }
            }
            (Resolved::Free(s_var), Resolved::Bound(o)) => {
                for end in self.eval_path(path, &o, false, active)? {
                    solutions.extend(start.bind(&s_var, end));
                }
            }
            (Resolved::Free(s_var), Resolved::Free(o_var)) => {
                for node in active.nodes() {
                    for end in self.eval_path(path, &node, true, active)? {
                        solutions.extend(
                            start
                                .bind(&s_var, node.clone())
                                .and_then(|s| s.bind(&o_var, end)),
                        );
                    }
                }
            }
        }
        Ok(solutions)
    }

    /// Nodes reachable from `start` along `path`, forward or reverse, in evaluation order
    fn eval_path(
        &self,
        path: &PropertyPathExpression,
        start: &RdfObject,
        forward: bool,
        active: &ActiveGraph<'a>,
    ) -> QueryResult<Vec<RdfObject>> {
        self.deadline.check()?;
        match path {
            PropertyPathExpression::NamedNode(p) => {
                let predicate = RdfPredicate::from(NamedNode::from(p.clone()));
                Ok(step(active, start, Some(&predicate), forward, &[]))
            }
            PropertyPathExpression::Reverse(inner) => self.eval_path(inner, start, !forward, active),
            PropertyPathExpression::Sequence(a, b) => {
                let (first, second) = if forward { (a, b) } else { (b, a) };
                let mut ends = Vec::new();
                for middle in self.eval_path(first, start, forward, active)? {
                    ends.extend(self.eval_path(second, &middle, forward, active)?);
                }
                Ok(ends)
            }
            PropertyPathExpression::Alternative(a, b) => {
                let mut ends = self.eval_path(a, start, forward, active)?;
                ends.extend(self.eval_path(b, start, forward, active)?);
                Ok(ends)
            }
            PropertyPathExpression::ZeroOrMore(inner) => {
                self.closure(inner, start, forward, true, active)
            }
            PropertyPathExpression::OneOrMore(inner) => {
                self.closure(inner, start, forward, false, active)
            }
            PropertyPathExpression::ZeroOrOne(inner) => {
                let mut ends = vec![start.clone()];
                for end in self.eval_path(inner, start, forward, active)? {
                    if !ends.contains(&end) {
                        ends.push(end);
                    }
                }
                Ok(ends)
            }
            PropertyPathExpression::NegatedPropertySet(excluded) => {
                let excluded: Vec<RdfPredicate> = excluded
                    .iter()
                    .map(|p| RdfPredicate::from(NamedNode::from(p.clone())))
                    .collect();
                Ok(step(active, start, None, forward, &excluded))
            }
        }
    }

    /// Breadth-first transitive closure. Results come nearest first.
    fn closure(
        &self,
        inner: &PropertyPathExpression,
        start: &RdfObject,
        forward: bool,
        include_start: bool,
        active: &ActiveGraph<'a>,
    ) -> QueryResult<Vec<RdfObject>> {
        let mut visited = HashSet::new();
        let mut results = Vec::new();
        let mut queue = VecDeque::new();

        if include_start {
            visited.insert(start.clone());
            results.push(start.clone());
        }
        queue.push_back(start.clone());

        while let Some(node) = queue.pop_front() {
            for next in self.eval_path(inner, &node, forward, active)? {
                if visited.insert(next.clone()) {
                    results.push(next.clone());
                    queue.push_back(next);
                }
            }
        }
        trace!("Path closure from {} reached {} nodes", start, results.len());
        Ok(results)
    }
}

/// One hop along `predicate` (or any predicate not in `excluded` when `predicate` is None)
fn step(
    active: &ActiveGraph<'_>,
    node: &RdfObject,
    predicate: Option<&RdfPredicate>,
    forward: bool,
    excluded: &[RdfPredicate],
) -> Vec<RdfObject> {
    let keep = |t: &&Triple| !excluded.contains(&t.predicate);
    if forward {
        let subject = match node.as_subject() {
            Some(s) => s,
            None => return Vec::new(),
        };
        let pattern = TriplePattern::new(Some(subject), predicate.cloned(), None);
        active
            .query(&pattern)
            .into_iter()
            .filter(keep)
            .map(|t| t.object.clone())
            .collect()
    } else {
        let pattern = TriplePattern::new(None, predicate.cloned(), Some(node.clone()));
        active
            .query(&pattern)
            .into_iter()
            .filter(keep)
            .map(|t| RdfObject::from(t.subject.clone()))
            .collect()
    }
}

fn join(left: &[QuerySolution], right: &[QuerySolution]) -> Vec<QuerySolution> {
    let mut solutions = Vec::new();
    for l in left {
        for r in right {
            if l.is_compatible(r) {
                solutions.push(l.merge(r));
            }
        }
    }
    solutions
}

/// A term position after substituting the current bindings
enum Resolved {
    Bound(RdfObject),
    Free(String),
}

fn resolve(term: &TermPattern, solution: &QuerySolution) -> QueryResult<Resolved> {
    let variable = match term {
        TermPattern::NamedNode(n) => {
            return Ok(Resolved::Bound(NamedNode::from(n.clone()).into()))
        }
        TermPattern::Literal(l) => return Ok(Resolved::Bound(Literal::from(l.clone()).into())),
        TermPattern::BlankNode(b) => format!("_:{}", b.as_str()),
        TermPattern::Variable(v) => v.as_str().to_string(),
        #[allow(unreachable_patterns)]
        _ => return Err(QueryError::Unsupported("quoted triple pattern".to_string())),
    };
    Ok(match solution.get(&variable) {
        Some(term) => Resolved::Bound(term.clone()),
        None => Resolved::Free(variable),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::{Dataset, RdfSubject, StoreError};

    const COLLECTION: &str = "http://imeji.org/terms/collection";

    fn link(tx: &mut Transaction, graph: &NamedNode, child: &str, parent: &str) {
        tx.insert(
            graph,
            Triple::new(
                RdfSubject::iri(child).unwrap(),
                RdfPredicate::new(COLLECTION).unwrap(),
                NamedNode::new(parent).unwrap().into(),
            ),
        )
        .unwrap();
    }

    #[test]
    fn test_transitive_path_is_nearest_first() {
        let dataset = Dataset::in_memory();
        let graph = NamedNode::new("http://imeji.org/collection").unwrap();
        dataset
            .write(|tx| {
                link(tx, &graph, "http://ex.org/c3", "http://ex.org/c2");
                link(tx, &graph, "http://ex.org/c2", "http://ex.org/c1");
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let query = crate::sparql::SparqlParser::parse_select(&format!(
            "SELECT ?s WHERE {{ <http://ex.org/c3> <{COLLECTION}>+ ?s }}"
        ))
        .unwrap();

        dataset
            .read(|tx| {
                let evaluator = Evaluator::new(tx, Deadline::after(None));
                let active = evaluator.default_graph(Some(&graph), true);
                let solutions = evaluator.evaluate(&query.pattern, &active).unwrap();
                let values: Vec<String> = solutions
                    .iter()
                    .filter_map(|s| s.get("s").map(|t| t.to_result_string()))
                    .collect();
                assert_eq!(values, vec!["http://ex.org/c2", "http://ex.org/c1"]);
                Ok::<_, StoreError>(())
            })
            .unwrap();
    }

    #[test]
    fn test_closure_terminates_on_cycle() {
        let dataset = Dataset::in_memory();
        let graph = NamedNode::new("http://imeji.org/collection").unwrap();
        dataset
            .write(|tx| {
                link(tx, &graph, "http://ex.org/a", "http://ex.org/b");
                link(tx, &graph, "http://ex.org/b", "http://ex.org/a");
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let query = crate::sparql::SparqlParser::parse_select(&format!(
            "SELECT ?s WHERE {{ <http://ex.org/a> <{COLLECTION}>* ?s }}"
        ))
        .unwrap();
        dataset
            .read(|tx| {
                let evaluator = Evaluator::new(tx, Deadline::after(None));
                let active = evaluator.default_graph(Some(&graph), true);
                assert_eq!(evaluator.evaluate(&query.pattern, &active).unwrap().len(), 2);
                Ok::<_, StoreError>(())
            })
            .unwrap();
    }

    #[test]
    fn test_write_transaction_sees_its_own_changes() {
        let dataset = Dataset::in_memory();
        let graph = NamedNode::new("http://imeji.org/collection").unwrap();
        dataset
            .write(|tx| {
                link(tx, &graph, "http://ex.org/c2", "http://ex.org/c1");
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let query = crate::sparql::SparqlParser::parse_select(&format!(
            "SELECT ?s WHERE {{ <http://ex.org/c2> <{COLLECTION}>+ ?s }}"
        ))
        .unwrap();
        dataset
            .write(|tx| {
                let old = Triple::new(
                    RdfSubject::iri("http://ex.org/c2").unwrap(),
                    RdfPredicate::new(COLLECTION).unwrap(),
                    NamedNode::new("http://ex.org/c1").unwrap().into(),
                );
                tx.remove(&graph, &old)?;
                link(tx, &graph, "http://ex.org/c2", "http://ex.org/c3");

                let evaluator = Evaluator::new(tx, Deadline::after(None));
                let active = evaluator.default_graph(Some(&graph), true);
                let values: Vec<String> = evaluator
                    .evaluate(&query.pattern, &active)
                    .unwrap()
                    .iter()
                    .filter_map(|s| s.get("s").map(|t| t.to_result_string()))
                    .collect();
                assert_eq!(values, vec!["http://ex.org/c3"]);
                Ok::<_, StoreError>(())
            })
            .unwrap();
    }
}
