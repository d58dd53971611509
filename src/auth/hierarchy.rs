//! Containment hierarchy resolution
//!
//! Items point at their collection and collections at their parent through the
//! `imeji:collection` predicate. The top-level parent of an object is its outermost ancestor,
//! or the object itself.

use super::{ResourceKind, SecurityTarget};
use crate::error::RepoResult;
use crate::mapping::MappingRegistry;
use crate::model::{Collection, Item};
use crate::rdf::{vocab, NamedNode, RdfPredicate, Snapshot, Transaction, TriplePattern};
use crate::sparql::{self, QueryOptions};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Strategy for finding the top-level container of an object
pub trait HierarchyResolver: Send + Sync {
    fn top_level_parent(&self, tx: &Transaction, target: &SecurityTarget) -> RepoResult<String>;
}

impl<R: HierarchyResolver + ?Sized> HierarchyResolver for Arc<R> {
    fn top_level_parent(&self, tx: &Transaction, target: &SecurityTarget) -> RepoResult<String> {
        (**self).top_level_parent(tx, target)
    }
}

/// Resolves the hierarchy with queries inside the open transaction, so it sees writes made
/// earlier in the same transaction
#[derive(Debug, Clone)]
pub struct TransactionalHierarchy {
    item_graph: NamedNode,
    collection_graph: NamedNode,
}

impl TransactionalHierarchy {
    pub fn new(registry: &MappingRegistry) -> Self {
        Self {
            item_graph: registry.describe::<Item>().mapping().graph.clone(),
            collection_graph: registry.describe::<Collection>().mapping().graph.clone(),
        }
    }

    /// Collection directly containing an item
    pub fn parent_of_item(&self, tx: &Transaction, item: &str) -> RepoResult<Option<String>> {
        let query = format!(
            "SELECT ?s WHERE {{ <{}> <{}> ?s }}",
            item,
            vocab::IMEJI_COLLECTION
        );
        let parents = sparql::execute(tx, &query, Some(&self.item_graph), &QueryOptions::default())?;
        Ok(parents.into_iter().next())
    }

    /// Outermost ancestor of a collection, or the collection itself
    pub fn top_level_collection(&self, tx: &Transaction, collection: &str) -> RepoResult<String> {
        let query = format!(
            "SELECT ?s WHERE {{ <{}> <{}>+ ?s }}",
            collection,
            vocab::IMEJI_COLLECTION
        );
        let mut ancestors =
            sparql::execute(tx, &query, Some(&self.collection_graph), &QueryOptions::default())?;
        Ok(ancestors.pop().unwrap_or_else(|| collection.to_string()))
    }
}

impl HierarchyResolver for TransactionalHierarchy {
    fn top_level_parent(&self, tx: &Transaction, target: &SecurityTarget) -> RepoResult<String> {
        match target.kind {
            ResourceKind::Item => {
                let parent = match self.parent_of_item(tx, &target.uri)? {
                    Some(parent) => Some(parent),
                    None => target.parent.clone(),
                };
                match parent {
                    Some(parent) => self.top_level_collection(tx, &parent),
                    None => Ok(target.uri.clone()),
                }
            }
            ResourceKind::Collection => self.top_level_collection(tx, &target.uri),
            ResourceKind::Other => Ok(target.uri.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct Links {
    parents: HashMap<String, String>,
    children: HashMap<String, Vec<String>>,
}

/// Service-level view of the hierarchy built from a committed snapshot.
///
/// Does not see uncommitted writes; call [`HierarchyIndex::rebuild`] after commits.
#[derive(Debug)]
pub struct HierarchyIndex {
    graphs: Vec<NamedNode>,
    links: RwLock<Links>,
}

impl HierarchyIndex {
    pub fn new(registry: &MappingRegistry) -> Self {
        Self {
            graphs: vec![
                registry.describe::<Collection>().mapping().graph.clone(),
                registry.describe::<Item>().mapping().graph.clone(),
            ],
            links: RwLock::new(Links::default()),
        }
    }

    /// Replace the view with the containment links of `snapshot`
    pub fn rebuild(&self, snapshot: &Snapshot) {
        let pattern = TriplePattern::new(
            None,
            Some(RdfPredicate::from(NamedNode::new_unchecked(vocab::IMEJI_COLLECTION))),
            None,
        );

        let mut links = Links::default();
        for graph in self.graphs.iter().filter_map(|g| snapshot.graph(g.as_str())) {
            for triple in graph.query(&pattern) {
                let (Some(child), Some(parent)) = (
                    triple.subject.as_iri(),
                    triple.object.as_subject().and_then(|s| s.as_iri().map(str::to_string)),
                ) else {
                    continue;
                };
                links.parents.insert(child.to_string(), parent.clone());
                links.children.entry(parent).or_default().push(child.to_string());
            }
        }
        debug!("Hierarchy index rebuilt with {} links", links.parents.len());
        *self.links.write().unwrap() = links;
    }

    /// Ancestors of `uri`, nearest first
    pub fn ancestors(&self, uri: &str) -> Vec<String> {
        let links = self.links.read().unwrap();
        let mut ancestors = Vec::new();
        let mut seen = HashSet::from([uri.to_string()]);
        let mut current = uri;
        while let Some(parent) = links.parents.get(current) {
            if !seen.insert(parent.clone()) {
                break;
            }
            ancestors.push(parent.clone());
            current = parent;
        }
        ancestors
    }

    /// Every object below `uri`, breadth-first
    pub fn descendants(&self, uri: &str) -> Vec<String> {
        let links = self.links.read().unwrap();
        let mut descendants = Vec::new();
        let mut seen = HashSet::from([uri.to_string()]);
        let mut queue = VecDeque::from([uri.to_string()]);
        while let Some(node) = queue.pop_front() {
            for child in links.children.get(&node).into_iter().flatten() {
                if seen.insert(child.clone()) {
                    descendants.push(child.clone());
                    queue.push_back(child.clone());
                }
            }
        }
        descendants
    }

    /// Outermost ancestor of `uri`, or `uri` itself
    pub fn top_level_parent(&self, uri: &str) -> String {
        self.ancestors(uri)
            .pop()
            .unwrap_or_else(|| uri.to_string())
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.links.read().unwrap().parents.contains_key(uri)
    }
}

impl HierarchyResolver for HierarchyIndex {
    fn top_level_parent(&self, _tx: &Transaction, target: &SecurityTarget) -> RepoResult<String> {
        let start = match (&target.kind, &target.parent) {
            (ResourceKind::Other, _) => return Ok(target.uri.clone()),
            (_, Some(parent)) if !self.contains(&target.uri) => parent.as_str(),
            _ => target.uri.as_str(),
        };
        Ok(HierarchyIndex::top_level_parent(self, start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::{Dataset, RdfObject, RdfSubject, StoreError, Triple};

    const ITEMS: &str = "http://imeji.org/item";
    const COLLECTIONS: &str = "http://imeji.org/collection";

    fn link(tx: &mut Transaction, graph: &str, child: &str, parent: &str) {
        tx.insert(
            &NamedNode::new(graph).unwrap(),
            Triple::new(
                RdfSubject::iri(child).unwrap(),
                RdfPredicate::new(vocab::IMEJI_COLLECTION).unwrap(),
                RdfObject::NamedNode(NamedNode::new(parent).unwrap()),
            ),
        )
        .unwrap();
    }

    fn seeded() -> Dataset {
        let dataset = Dataset::in_memory();
        dataset
            .write(|tx| {
                link(tx, COLLECTIONS, "http://imeji.org/collection/c3", "http://imeji.org/collection/c2");
                link(tx, COLLECTIONS, "http://imeji.org/collection/c2", "http://imeji.org/collection/c1");
                link(tx, ITEMS, "http://imeji.org/item/i1", "http://imeji.org/collection/c3");
                Ok::<_, StoreError>(())
            })
            .unwrap();
        dataset
    }

    fn item(uri: &str) -> SecurityTarget {
        SecurityTarget {
            uri: uri.into(),
            kind: ResourceKind::Item,
            parent: None,
            status: None,
        }
    }

    #[test]
    fn test_transactional_top_level_parent() {
        let registry = MappingRegistry::new("http://imeji.org/");
        let hierarchy = TransactionalHierarchy::new(&registry);
        let dataset = seeded();
        dataset
            .read(|tx| {
                assert_eq!(
                    hierarchy.top_level_parent(tx, &item("http://imeji.org/item/i1"))?,
                    "http://imeji.org/collection/c1"
                );
                let root = SecurityTarget::collection("http://imeji.org/collection/c1");
                assert_eq!(hierarchy.top_level_parent(tx, &root)?, "http://imeji.org/collection/c1");
                Ok::<_, crate::error::RepoError>(())
            })
            .unwrap();
    }

    #[test]
    fn test_transactional_sees_uncommitted_links() {
        let registry = MappingRegistry::new("http://imeji.org/");
        let hierarchy = TransactionalHierarchy::new(&registry);
        let dataset = seeded();
        dataset
            .write(|tx| {
                link(tx, COLLECTIONS, "http://imeji.org/collection/c1", "http://imeji.org/collection/c0");
                let target = SecurityTarget::collection("http://imeji.org/collection/c3");
                assert_eq!(hierarchy.top_level_parent(tx, &target)?, "http://imeji.org/collection/c0");
                Ok::<_, crate::error::RepoError>(())
            })
            .unwrap();
    }

    #[test]
    fn test_index_lookups() {
        let registry = MappingRegistry::new("http://imeji.org/");
        let index = HierarchyIndex::new(&registry);
        let dataset = seeded();
        index.rebuild(&dataset.snapshot());

        assert_eq!(
            index.ancestors("http://imeji.org/item/i1"),
            vec![
                "http://imeji.org/collection/c3",
                "http://imeji.org/collection/c2",
                "http://imeji.org/collection/c1"
            ]
        );
        assert_eq!(
            index.descendants("http://imeji.org/collection/c2"),
            vec!["http://imeji.org/collection/c3", "http://imeji.org/item/i1"]
        );
        assert_eq!(
            index.top_level_parent("http://imeji.org/collection/c1"),
            "http://imeji.org/collection/c1"
        );

        let new_item = SecurityTarget {
            parent: Some("http://imeji.org/collection/c2".into()),
            ..item("http://imeji.org/item/new")
        };
        dataset
            .read(|tx| {
                assert_eq!(
                    HierarchyResolver::top_level_parent(&index, tx, &new_item)?,
                    "http://imeji.org/collection/c1"
                );
                Ok::<_, crate::error::RepoError>(())
            })
            .unwrap();
    }
}
