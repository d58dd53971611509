//! Process-scoped descriptor registry
//!
//! Descriptors are built once per type from [`Mapped::mapping`] and published in an immutable
//! map that is swapped atomically, so readers never wait on a build.

use super::descriptor::{short_type_name, Descriptor, Mapped};
use super::{MappingError, MappingResult};
use crate::rdf::{NamedNode, NamespaceManager, RdfPredicate};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

type DescriptorMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

thread_local! {
    /// Types whose descriptor is being built on this thread
    static BUILDING: RefCell<Vec<TypeId>> = const { RefCell::new(Vec::new()) };
}

struct BuildGuard;

impl BuildGuard {
    fn enter(id: TypeId, type_name: &'static str) -> MappingResult<Self> {
        BUILDING.with(|building| {
            let mut building = building.borrow_mut();
            if building.contains(&id) {
                return Err(MappingError::Cycle(type_name));
            }
            building.push(id);
            Ok(BuildGuard)
        })
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        BUILDING.with(|building| {
            building.borrow_mut().pop();
        });
    }
}

/// Registry of mapping descriptors
pub struct MappingRegistry {
    base_uri: String,
    namespaces: NamespaceManager,
    descriptors: RwLock<Arc<DescriptorMap>>,
}

impl MappingRegistry {
    /// Create an empty registry; identifiers and graphs are placed under `base_uri`
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self::with_namespaces(base_uri, NamespaceManager::new())
    }

    /// Create an empty registry with custom prefixes for predicate declarations
    pub fn with_namespaces(base_uri: impl Into<String>, namespaces: NamespaceManager) -> Self {
        Self {
            base_uri: base_uri.into(),
            namespaces,
            descriptors: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Base IRI
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Named graph IRI of a model
    pub fn graph_iri(&self, model: &str) -> String {
        format!("{}{}", self.base_uri, model)
    }

    fn lookup<T: Mapped>(&self) -> Option<Arc<Descriptor<T>>> {
        let descriptors = self.descriptors.read().unwrap().clone();
        descriptors
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|any| any.downcast::<Descriptor<T>>().ok())
    }

    /// Build and publish the descriptor of `T` unless it is already registered.
    ///
    /// Declaration errors (duplicate predicates, unresolvable references, cycles between
    /// nested types) are reported here.
    pub fn register<T: Mapped>(&self) -> MappingResult<Arc<Descriptor<T>>> {
        if let Some(descriptor) = self.lookup::<T>() {
            return Ok(descriptor);
        }

        let id = TypeId::of::<T>();
        let type_name = short_type_name::<T>();
        let descriptor = {
            let _guard = BuildGuard::enter(id, type_name)?;
            Arc::new(T::mapping().build(self)?)
        };

        let mut published = self.descriptors.write().unwrap();
        if let Some(existing) = published
            .get(&id)
            .cloned()
            .and_then(|any| any.downcast::<Descriptor<T>>().ok())
        {
            return Ok(existing);
        }
        let mut next = DescriptorMap::clone(&published);
        next.insert(id, descriptor.clone());
        *published = Arc::new(next);

        info!(
            "Registered mapping for {} ({} fields, graph {})",
            type_name,
            descriptor.mapping().fields.len(),
            descriptor.mapping().graph
        );
        Ok(descriptor)
    }

    /// Descriptor of `T`, building it on first use.
    ///
    /// # Panics
    /// When the declaration of `T` is invalid. Call [`MappingRegistry::register`] at startup to
    /// surface such errors as values.
    pub fn describe<T: Mapped>(&self) -> Arc<Descriptor<T>> {
        self.register::<T>()
            .unwrap_or_else(|e| panic!("invalid mapping for {}: {}", short_type_name::<T>(), e))
    }

    /// Whether `T` has a published descriptor
    pub fn is_registered<T: Mapped>(&self) -> bool {
        self.lookup::<T>().is_some()
    }

    /// Number of published descriptors
    pub fn len(&self) -> usize {
        self.descriptors.read().unwrap().len()
    }

    /// Whether nothing is published
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every published descriptor; they are rebuilt on next use
    pub fn invalidate(&self) {
        *self.descriptors.write().unwrap() = Arc::new(HashMap::new());
        debug!("Mapping registry invalidated");
    }

    /// Resolve an IRI written as a full IRI, `prefix:local`, or a bare local name under
    /// `namespace`
    pub(crate) fn resolve_iri(
        &self,
        namespace: &str,
        iri: &str,
        type_name: &'static str,
    ) -> MappingResult<NamedNode> {
        let expanded = if iri.contains(':') {
            self.namespaces
                .resolve(iri)
                .map_err(|e| MappingError::InvalidIri(iri.to_string(), e.to_string()))?
        } else {
            format!("{}{}", namespace, iri)
        };
        NamedNode::new(&expanded).map_err(|e| {
            MappingError::InvalidIri(expanded.clone(), format!("{} (on {})", e, type_name))
        })
    }

    pub(crate) fn resolve_predicate(
        &self,
        namespace: &str,
        predicate: &str,
        type_name: &'static str,
    ) -> MappingResult<RdfPredicate> {
        self.resolve_iri(namespace, predicate, type_name)
            .map(RdfPredicate::from)
    }
}

impl std::fmt::Debug for MappingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingRegistry")
            .field("base_uri", &self.base_uri)
            .field("descriptors", &self.len())
            .finish()
    }
}
