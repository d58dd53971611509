//! Named graph triple store
//!
//! One `Graph` holds the triples of one named graph ("model"). Triples keep their insertion
//! order, which is the store order reported by queries.

use super::types::{RdfObject, RdfPredicate, RdfSubject, Triple, TriplePattern};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Triple store for a single named graph with multiple indices for efficient lookups
///
/// Implements:
/// - SPO index (Subject -> triples)
/// - POS index (Predicate -> triples)
/// - OSP index (Object -> triples)
///
/// Every index stores insertion sequence numbers, so any lookup yields triples in store order.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    /// Next insertion sequence number
    next_seq: u64,

    /// All triples (primary storage) keyed by insertion sequence
    triples: BTreeMap<u64, Triple>,

    /// Reverse lookup: triple -> sequence
    seq_of: HashMap<Triple, u64>,

    /// SPO index: Subject -> sequences
    spo_index: HashMap<RdfSubject, BTreeSet<u64>>,

    /// POS index: Predicate -> sequences
    pos_index: HashMap<RdfPredicate, BTreeSet<u64>>,

    /// OSP index: Object -> sequences
    osp_index: HashMap<RdfObject, BTreeSet<u64>>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a triple. Returns false if it was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        if self.seq_of.contains_key(&triple) {
            return false;
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        self.spo_index
            .entry(triple.subject.clone())
            .or_default()
            .insert(seq);
        self.pos_index
            .entry(triple.predicate.clone())
            .or_default()
            .insert(seq);
        self.osp_index
            .entry(triple.object.clone())
            .or_default()
            .insert(seq);

        self.seq_of.insert(triple.clone(), seq);
        self.triples.insert(seq, triple);
        true
    }

    /// Remove a triple. Returns false if it was not present.
    pub fn remove(&mut self, triple: &Triple) -> bool {
        let seq = match self.seq_of.remove(triple) {
            Some(seq) => seq,
            None => return false,
        };
        self.triples.remove(&seq);

        remove_from_index(&mut self.spo_index, &triple.subject, seq);
        remove_from_index(&mut self.pos_index, &triple.predicate, seq);
        remove_from_index(&mut self.osp_index, &triple.object, seq);
        true
    }

    /// Check if a triple exists in the graph
    pub fn contains(&self, triple: &Triple) -> bool {
        self.seq_of.contains_key(triple)
    }

    /// Check if the subject has at least one triple
    pub fn contains_subject(&self, subject: &RdfSubject) -> bool {
        self.spo_index.contains_key(subject)
    }

    /// Get the total number of triples
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// Check if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Query triples matching a pattern, in store order.
    ///
    /// The most selective bound position picks the index to scan.
    pub fn query(&self, pattern: &TriplePattern) -> Vec<&Triple> {
        let candidates = if let Some(ref s) = pattern.subject {
            self.spo_index.get(s)
        } else if let Some(ref o) = pattern.object {
            self.osp_index.get(o)
        } else if let Some(ref p) = pattern.predicate {
            self.pos_index.get(p)
        } else {
            return self
                .triples
                .values()
                .filter(|t| pattern.matches(t))
                .collect();
        };

        match candidates {
            Some(seqs) => seqs
                .iter()
                .filter_map(|seq| self.triples.get(seq))
                .filter(|t| pattern.matches(t))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Get an iterator over all triples in store order
    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.values()
    }
}

fn remove_from_index<K: std::hash::Hash + Eq>(
    index: &mut HashMap<K, BTreeSet<u64>>,
    key: &K,
    seq: u64,
) {
    if let Some(seqs) = index.get_mut(key) {
        seqs.remove(&seq);
        if seqs.is_empty() {
            index.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::types::{Literal, NamedNode};

    fn name_triple(who: &str, name: &str) -> Triple {
        let subject = NamedNode::new(&format!("http://example.org/{who}")).unwrap();
        let predicate = RdfPredicate::new("http://xmlns.com/foaf/0.1/name").unwrap();
        Triple::new(
            subject.into(),
            predicate,
            Literal::new_simple_literal(name).into(),
        )
    }

    #[test]
    fn test_insert_and_query() {
        let mut graph = Graph::new();
        let triple = name_triple("alice", "Alice");

        assert!(graph.insert(triple.clone()));
        assert_eq!(graph.len(), 1);
        assert!(graph.contains(&triple));
        assert!(graph.contains_subject(&triple.subject));
    }

    #[test]
    fn test_duplicate_insert() {
        let mut graph = Graph::new();
        let triple = name_triple("alice", "Alice");

        assert!(graph.insert(triple.clone()));
        assert!(!graph.insert(triple));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut graph = Graph::new();
        let triple = name_triple("alice", "Alice");

        graph.insert(triple.clone());
        assert!(graph.remove(&triple));
        assert!(!graph.remove(&triple));
        assert!(graph.is_empty());
        assert!(!graph.contains_subject(&triple.subject));
    }

    #[test]
    fn test_store_order_survives_removal() {
        let mut graph = Graph::new();
        let a = name_triple("alice", "A");
        let b = name_triple("alice", "B");
        let c = name_triple("alice", "C");
        graph.insert(a.clone());
        graph.insert(b.clone());
        graph.insert(c.clone());
        graph.remove(&b);
        graph.insert(b.clone());

        let pattern = TriplePattern::new(Some(a.subject.clone()), None, None);
        let found: Vec<Triple> = graph.query(&pattern).into_iter().cloned().collect();
        assert_eq!(found, vec![a, c, b]);
    }

    #[test]
    fn test_pattern_query_uses_object_index() {
        let mut graph = Graph::new();
        graph.insert(name_triple("alice", "Alice"));
        graph.insert(name_triple("bob", "Bob"));

        let pattern = TriplePattern::new(
            None,
            None,
            Some(Literal::new_simple_literal("Bob").into()),
        );
        let results = graph.query(&pattern);
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].subject.as_iri(),
            Some("http://example.org/bob")
        );
    }
}
