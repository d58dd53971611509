//! Mapping descriptors
//!
//! A [`Descriptor`] is the compiled graph representation of one domain type: its resource type,
//! the named graph it lives in, the identity accessors and an ordered list of fields. The
//! type-erased half ([`TypeMapping`]) is what the reader and writer walk; the typed accessors
//! move values between a domain object and a [`Record`].

use super::registry::MappingRegistry;
use super::value::{FieldValue, Value};
use super::{MappingError, MappingResult};
use crate::rdf::{vocab, NamedNode, RdfPredicate};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// How a field is represented in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// One triple per non-empty value
    Literal,
    /// Like `Literal`, skipped by lazy reads and by updates that do not merge lazy fields
    LazyLiteral,
    /// Nested object flattened under the owning subject
    EmbeddedObject,
    /// One triple per element, each element an independent resource
    ObjectList,
    /// Like `ObjectList`, skipped by lazy reads and by updates that do not merge lazy fields
    LazyObjectList,
    /// Read-only value taken from another resource, never written
    ReferencedLiteral,
}

impl FieldKind {
    /// Whether lazy reads skip this field
    pub fn is_lazy(self) -> bool {
        matches!(self, FieldKind::LazyLiteral | FieldKind::LazyObjectList)
    }

    /// Whether values are stored as triples of the owning subject
    pub fn is_literal(self) -> bool {
        matches!(self, FieldKind::Literal | FieldKind::LazyLiteral)
    }

    /// Whether the field holds a list of resources
    pub fn is_list(self) -> bool {
        matches!(self, FieldKind::ObjectList | FieldKind::LazyObjectList)
    }
}

/// Resolves the mapping of a referenced type through the registry
pub type TargetMapping = fn(&MappingRegistry) -> MappingResult<Arc<TypeMapping>>;

/// Derived relationship of a `ReferencedLiteral` field
///
/// The target is resolved when the field is read, so a type may reference a type that nests it.
#[derive(Debug, Clone)]
pub struct Reference {
    /// Index of the owning type's field holding the referenced IRI
    pub source_field: usize,
    /// Mapping of the referenced type
    pub target: TargetMapping,
    /// Name of the referenced type's literal field to read
    pub target_field: &'static str,
}

/// One persisted field
#[derive(Debug, Clone)]
pub struct FieldMapping {
    /// Field name
    pub name: &'static str,
    /// Predicate, absent for embedded and referenced fields
    pub predicate: Option<RdfPredicate>,
    /// Representation
    pub kind: FieldKind,
    /// Mapping of the embedded object or of the list elements
    pub nested: Option<Arc<TypeMapping>>,
    /// Resolution rule of a referenced literal
    pub reference: Option<Reference>,
}

impl FieldMapping {
    /// Predicate of a field that is stored as triples of the owning subject
    ///
    /// # Panics
    /// When called on an embedded or referenced field.
    pub fn predicate(&self) -> &RdfPredicate {
        self.predicate
            .as_ref()
            .unwrap_or_else(|| panic!("field `{}` has no predicate", self.name))
    }

    /// Mapping of the embedded object or list elements
    ///
    /// # Panics
    /// When called on a field that does not nest another type.
    pub fn nested(&self) -> &Arc<TypeMapping> {
        self.nested
            .as_ref()
            .unwrap_or_else(|| panic!("field `{}` does not nest a mapped type", self.name))
    }
}

/// Type-erased mapping metadata
#[derive(Debug)]
pub struct TypeMapping {
    /// Rust type name
    pub type_name: &'static str,
    /// Base IRI for the type's properties
    pub namespace: String,
    /// `rdf:type` of every instance
    pub resource_type: NamedNode,
    /// Model name, e.g. `item`
    pub model: String,
    /// Named graph of the model
    pub graph: NamedNode,
    /// Prefix for newly minted identifiers: `{base}{model}/`
    pub id_prefix: String,
    /// Fields in declaration order
    pub fields: Vec<FieldMapping>,
}

impl TypeMapping {
    /// Index of a field by name
    ///
    /// # Panics
    /// When the field is not mapped. That is a mapping/domain mismatch, not a runtime condition.
    pub fn field_index(&self, name: &str) -> usize {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .unwrap_or_else(|| panic!("field `{}` is not mapped on {}", name, self.type_name))
    }

    /// Field by name, if mapped
    pub fn find_field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field by name, panicking like [`TypeMapping::field_index`]
    pub fn field(&self, name: &str) -> &FieldMapping {
        &self.fields[self.field_index(name)]
    }

    /// Fresh identifier `{base}{model}/{uuid}`
    pub fn mint_iri(&self) -> String {
        format!("{}{}", self.id_prefix, Uuid::new_v4())
    }

    /// Every predicate written under the subject, with embedded fields flattened
    fn flattened_predicates(&self) -> Vec<&RdfPredicate> {
        let mut predicates = Vec::new();
        for field in &self.fields {
            match field.kind {
                FieldKind::EmbeddedObject => {
                    predicates.extend(field.nested().flattened_predicates())
                }
                _ => predicates.extend(field.predicate.as_ref()),
            }
        }
        predicates
    }
}

/// Field contents of one object, in the order of its mapping's fields
#[derive(Debug, Clone)]
pub struct Record {
    /// Identifier, if assigned
    pub id: Option<String>,
    /// Mapping the slots follow
    pub mapping: Arc<TypeMapping>,
    /// One slot per field
    pub slots: Vec<Slot>,
}

/// Content of one field
#[derive(Debug, Clone)]
pub enum Slot {
    /// Literal payloads
    Values(Vec<Value>),
    /// Embedded object
    Embedded(Record),
    /// List elements
    Objects(Vec<Record>),
    /// Not loaded; decoding leaves the field at its default
    Unloaded,
}

impl Record {
    /// Record with every slot unloaded
    pub fn unloaded(id: Option<String>, mapping: Arc<TypeMapping>) -> Self {
        let slots = vec![Slot::Unloaded; mapping.fields.len()];
        Self { id, mapping, slots }
    }

    /// Literal payloads of a field, empty when not loaded
    pub fn values(&self, name: &str) -> &[Value] {
        match &self.slots[self.mapping.field_index(name)] {
            Slot::Values(values) => values,
            _ => &[],
        }
    }
}

type Getter<T> = Box<dyn Fn(&T) -> Vec<Value> + Send + Sync>;
type Setter<T> = Box<dyn Fn(&mut T, Vec<Value>) + Send + Sync>;

/// Typed access to one field
pub(crate) enum Accessor<T> {
    Values {
        get: Getter<T>,
        set: Setter<T>,
    },
    Embedded {
        encode: Box<dyn Fn(&T) -> Record + Send + Sync>,
        decode: Box<dyn Fn(&mut T, Record) + Send + Sync>,
    },
    Objects {
        encode: Box<dyn Fn(&T) -> Vec<Record> + Send + Sync>,
        decode: Box<dyn Fn(&mut T, Vec<Record>) + Send + Sync>,
    },
}

type IdGetter<T> = Arc<dyn Fn(&T) -> &Option<String> + Send + Sync>;
type IdSetter<T> = Arc<dyn Fn(&mut T) -> &mut Option<String> + Send + Sync>;

/// Compiled mapping of a domain type
pub struct Descriptor<T> {
    mapping: Arc<TypeMapping>,
    identity: Option<(IdGetter<T>, IdSetter<T>)>,
    accessors: Vec<Accessor<T>>,
}

impl<T> fmt::Debug for Descriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("mapping", &self.mapping)
            .finish()
    }
}

impl<T: Mapped> Descriptor<T> {
    /// Type-erased metadata
    pub fn mapping(&self) -> &Arc<TypeMapping> {
        &self.mapping
    }

    fn identity(&self) -> &(IdGetter<T>, IdSetter<T>) {
        self.identity.as_ref().unwrap_or_else(|| {
            panic!("{} declares no identity", self.mapping.type_name)
        })
    }

    /// Identifier of an object
    pub fn id<'a>(&self, object: &'a T) -> Option<&'a str> {
        (self.identity().0)(object).as_deref()
    }

    /// Assign an identifier
    pub fn set_id(&self, object: &mut T, id: String) {
        *(self.identity().1)(object) = Some(id);
    }

    /// Copy every field into a record
    pub fn encode(&self, object: &T) -> Record {
        let slots = self
            .accessors
            .iter()
            .map(|accessor| match accessor {
                Accessor::Values { get, .. } => Slot::Values(get(object)),
                Accessor::Embedded { encode, .. } => Slot::Embedded(encode(object)),
                Accessor::Objects { encode, .. } => Slot::Objects(encode(object)),
            })
            .collect();
        Record {
            id: self.identity.as_ref().and_then(|(get, _)| get(object).clone()),
            mapping: self.mapping.clone(),
            slots,
        }
    }

    /// Build an object from a record; unloaded slots keep their default
    pub fn decode(&self, record: Record) -> T {
        let mut object = T::default();
        if let (Some(id), Some((_, set))) = (record.id, &self.identity) {
            *set(&mut object) = Some(id);
        }
        for (accessor, slot) in self.accessors.iter().zip(record.slots) {
            match (accessor, slot) {
                (_, Slot::Unloaded) => {}
                (Accessor::Values { set, .. }, Slot::Values(values)) => set(&mut object, values),
                (Accessor::Embedded { decode, .. }, Slot::Embedded(nested)) => {
                    decode(&mut object, nested)
                }
                (Accessor::Objects { decode, .. }, Slot::Objects(elements)) => {
                    decode(&mut object, elements)
                }
                (_, slot) => panic!(
                    "record slot {:?} does not fit the field accessor of {}",
                    slot, self.mapping.type_name
                ),
            }
        }
        object
    }
}

/// A domain type with a declared graph representation
pub trait Mapped: Default + Send + Sync + 'static {
    /// Declaration of the type's mapping
    fn mapping() -> MappingBuilder<Self>;
}

type Declaration<T> = Box<dyn FnOnce(&MappingRegistry) -> MappingResult<(FieldMapping, Accessor<T>)>>;

struct PendingReference {
    field: usize,
    source: &'static str,
    target: TargetMapping,
    target_field: &'static str,
}

/// Declarative mapping of a type
///
/// ```rust
/// use repograph::mapping::{Mapped, MappingBuilder, MappingRegistry};
///
/// #[derive(Default)]
/// struct Tag {
///     id: Option<String>,
///     label: String,
/// }
///
/// impl Mapped for Tag {
///     fn mapping() -> MappingBuilder<Self> {
///         MappingBuilder::<Self>::new("http://example.org/terms/", "http://example.org/terms/Tag", "tag")
///             .identity(|t| &t.id, |t| &mut t.id)
///             .literal("label", "label", |t| &t.label, |t| &mut t.label)
///     }
/// }
///
/// let registry = MappingRegistry::new("http://example.org/");
/// let descriptor = registry.register::<Tag>().unwrap();
/// assert_eq!(descriptor.mapping().graph.as_str(), "http://example.org/tag");
/// ```
pub struct MappingBuilder<T> {
    namespace: &'static str,
    resource_type: &'static str,
    model: &'static str,
    identity: Option<(IdGetter<T>, IdSetter<T>)>,
    declarations: Vec<Declaration<T>>,
    references: Vec<PendingReference>,
}

impl<T: Mapped> MappingBuilder<T> {
    /// Start a declaration. Predicates without a scheme or prefix are resolved against
    /// `namespace`.
    pub fn new(namespace: &'static str, resource_type: &'static str, model: &'static str) -> Self {
        Self {
            namespace,
            resource_type,
            model,
            identity: None,
            declarations: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Identity accessor pair
    pub fn identity<G, S>(mut self, get: G, set: S) -> Self
    where
        G: Fn(&T) -> &Option<String> + Send + Sync + 'static,
        S: Fn(&mut T) -> &mut Option<String> + Send + Sync + 'static,
    {
        self.identity = Some((Arc::new(get), Arc::new(set)));
        self
    }

    #[allow(clippy::too_many_arguments)]
    fn values<F, G, S>(
        self,
        name: &'static str,
        predicate: &'static str,
        kind: FieldKind,
        iri: bool,
        get: G,
        set: S,
    ) -> Self
    where
        F: FieldValue + 'static,
        G: Fn(&T) -> &F + Send + Sync + 'static,
        S: Fn(&mut T) -> &mut F + Send + Sync + 'static,
    {
        let namespace = self.namespace;
        self.declare(move |registry| {
            let predicate = registry.resolve_predicate(namespace, predicate, short_type_name::<T>())?;
            let field = FieldMapping {
                name,
                predicate: Some(predicate),
                kind,
                nested: None,
                reference: None,
            };
            let accessor = Accessor::Values {
                get: Box::new(move |t: &T| {
                    let values = get(t).to_values();
                    if iri {
                        values.into_iter().map(Value::into_iri).collect()
                    } else {
                        values
                    }
                }),
                set: Box::new(move |t: &mut T, values| *set(t) = F::from_values(values)),
            };
            Ok((field, accessor))
        })
    }

    fn declare(
        mut self,
        declaration: impl FnOnce(&MappingRegistry) -> MappingResult<(FieldMapping, Accessor<T>)> + 'static,
    ) -> Self {
        self.declarations.push(Box::new(declaration));
        self
    }

    /// Scalar or multi-valued literal with native typing
    pub fn literal<F, G, S>(self, name: &'static str, predicate: &'static str, get: G, set: S) -> Self
    where
        F: FieldValue + 'static,
        G: Fn(&T) -> &F + Send + Sync + 'static,
        S: Fn(&mut T) -> &mut F + Send + Sync + 'static,
    {
        self.values(name, predicate, FieldKind::Literal, false, get, set)
    }

    /// Literal whose string values are resource IRIs
    pub fn iri<F, G, S>(self, name: &'static str, predicate: &'static str, get: G, set: S) -> Self
    where
        F: FieldValue + 'static,
        G: Fn(&T) -> &F + Send + Sync + 'static,
        S: Fn(&mut T) -> &mut F + Send + Sync + 'static,
    {
        self.values(name, predicate, FieldKind::Literal, true, get, set)
    }

    /// Literal skipped by lazy reads
    pub fn lazy_literal<F, G, S>(self, name: &'static str, predicate: &'static str, get: G, set: S) -> Self
    where
        F: FieldValue + 'static,
        G: Fn(&T) -> &F + Send + Sync + 'static,
        S: Fn(&mut T) -> &mut F + Send + Sync + 'static,
    {
        self.values(name, predicate, FieldKind::LazyLiteral, false, get, set)
    }

    /// Nested object whose fields are written under the owning subject
    pub fn embedded<U, G, S>(self, name: &'static str, get: G, set: S) -> Self
    where
        U: Mapped,
        G: Fn(&T) -> &U + Send + Sync + 'static,
        S: Fn(&mut T) -> &mut U + Send + Sync + 'static,
    {
        self.declare(move |registry| {
            let descriptor = registry.register::<U>()?;
            let field = FieldMapping {
                name,
                predicate: None,
                kind: FieldKind::EmbeddedObject,
                nested: Some(descriptor.mapping().clone()),
                reference: None,
            };
            let decoder = descriptor.clone();
            let accessor = Accessor::Embedded {
                encode: Box::new(move |t: &T| descriptor.encode(get(t))),
                decode: Box::new(move |t: &mut T, record| *set(t) = decoder.decode(record)),
            };
            Ok((field, accessor))
        })
    }

    fn list<U, G, S>(
        self,
        name: &'static str,
        predicate: &'static str,
        kind: FieldKind,
        get: G,
        set: S,
    ) -> Self
    where
        U: Mapped,
        G: Fn(&T) -> &Vec<U> + Send + Sync + 'static,
        S: Fn(&mut T) -> &mut Vec<U> + Send + Sync + 'static,
    {
        let namespace = self.namespace;
        self.declare(move |registry| {
            let predicate = registry.resolve_predicate(namespace, predicate, short_type_name::<T>())?;
            let descriptor = registry.register::<U>()?;
            if descriptor.identity.is_none() {
                return Err(MappingError::MissingIdentity(short_type_name::<U>()));
            }
            let field = FieldMapping {
                name,
                predicate: Some(predicate),
                kind,
                nested: Some(descriptor.mapping().clone()),
                reference: None,
            };
            let decoder = descriptor.clone();
            let accessor = Accessor::Objects {
                encode: Box::new(move |t: &T| get(t).iter().map(|u| descriptor.encode(u)).collect()),
                decode: Box::new(move |t: &mut T, records: Vec<Record>| {
                    *set(t) = records.into_iter().map(|r| decoder.decode(r)).collect()
                }),
            };
            Ok((field, accessor))
        })
    }

    /// List of independent resources, loaded by every read
    pub fn objects<U, G, S>(self, name: &'static str, predicate: &'static str, get: G, set: S) -> Self
    where
        U: Mapped,
        G: Fn(&T) -> &Vec<U> + Send + Sync + 'static,
        S: Fn(&mut T) -> &mut Vec<U> + Send + Sync + 'static,
    {
        self.list(name, predicate, FieldKind::ObjectList, get, set)
    }

    /// List of independent resources, skipped by lazy reads
    pub fn lazy_objects<U, G, S>(self, name: &'static str, predicate: &'static str, get: G, set: S) -> Self
    where
        U: Mapped,
        G: Fn(&T) -> &Vec<U> + Send + Sync + 'static,
        S: Fn(&mut T) -> &mut Vec<U> + Send + Sync + 'static,
    {
        self.list(name, predicate, FieldKind::LazyObjectList, get, set)
    }

    /// Read-only field copied from `target_field` of the `U` resource named by `source`
    pub fn referenced<U, F, S>(
        mut self,
        name: &'static str,
        source: &'static str,
        target_field: &'static str,
        set: S,
    ) -> Self
    where
        U: Mapped,
        F: FieldValue + 'static,
        S: Fn(&mut T) -> &mut F + Send + Sync + 'static,
    {
        self.references.push(PendingReference {
            field: self.declarations.len(),
            source,
            target: |registry| Ok(registry.register::<U>()?.mapping().clone()),
            target_field,
        });
        self.declare(move |_| {
            let field = FieldMapping {
                name,
                predicate: None,
                kind: FieldKind::ReferencedLiteral,
                nested: None,
                reference: None,
            };
            let accessor = Accessor::Values {
                get: Box::new(|_: &T| Vec::new()),
                set: Box::new(move |t: &mut T, values| *set(t) = F::from_values(values)),
            };
            Ok((field, accessor))
        })
    }

    /// Compile the declaration
    pub(crate) fn build(self, registry: &MappingRegistry) -> MappingResult<Descriptor<T>> {
        let type_name = short_type_name::<T>();
        let resource_type = registry.resolve_iri(self.namespace, self.resource_type, type_name)?;

        let mut fields = Vec::with_capacity(self.declarations.len());
        let mut accessors = Vec::with_capacity(self.declarations.len());
        for declaration in self.declarations {
            let (field, accessor) = declaration(registry)?;
            if fields.iter().any(|f: &FieldMapping| f.name == field.name) {
                return Err(MappingError::DuplicateField {
                    type_name,
                    field: field.name,
                });
            }
            fields.push(field);
            accessors.push(accessor);
        }

        for pending in self.references {
            let source_field = fields
                .iter()
                .position(|f| f.name == pending.source && f.kind.is_literal())
                .ok_or(MappingError::UnknownField {
                    type_name,
                    field: pending.source,
                })?;
            match (pending.target)(registry) {
                Ok(target) => {
                    if !target
                        .fields
                        .iter()
                        .any(|f| f.name == pending.target_field && f.kind.is_literal())
                    {
                        return Err(MappingError::UnknownField {
                            type_name: target.type_name,
                            field: pending.target_field,
                        });
                    }
                }
                // The target is still being built further up; it is checked on first read
                Err(MappingError::Cycle(_)) => {}
                Err(e) => return Err(e),
            }
            fields[pending.field].reference = Some(Reference {
                source_field,
                target: pending.target,
                target_field: pending.target_field,
            });
        }

        let graph_iri = registry.graph_iri(self.model);
        let mapping = TypeMapping {
            type_name,
            namespace: self.namespace.to_string(),
            resource_type,
            model: self.model.to_string(),
            graph: NamedNode::new(&graph_iri)
                .map_err(|e| MappingError::InvalidIri(graph_iri.clone(), e.to_string()))?,
            id_prefix: format!("{}/", graph_iri),
            fields,
        };

        let mut seen = HashSet::new();
        seen.insert(vocab::RDF_TYPE);
        for predicate in mapping.flattened_predicates() {
            if !seen.insert(predicate.as_str()) {
                return Err(MappingError::DuplicatePredicate {
                    type_name,
                    predicate: predicate.as_str().to_string(),
                });
            }
        }

        Ok(Descriptor {
            mapping: Arc::new(mapping),
            identity: self.identity,
            accessors,
        })
    }
}

/// Short type name used in diagnostics
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
