//! Graph serializer
//!
//! Turns objects into triples of their type's named graph. List elements are written as
//! independent resources in the owner's graph and linked from the owner by one triple each.

use crate::error::{RepoError, RepoResult};
use crate::mapping::{
    FieldKind, FieldMapping, Mapped, MappingRegistry, Record, Slot, TypeMapping, Value,
};
use crate::rdf::{vocab, NamedNode, RdfObject, RdfPredicate, RdfSubject, Transaction, Triple};
use std::sync::Arc;
use tracing::debug;

/// Targeted mutation of one multi-valued field
#[derive(Debug, Clone)]
pub enum ElementChange {
    /// Assert one literal value
    Add(Value),
    /// Retract one literal value
    Remove(Value),
    /// Replace every literal value
    Set(Vec<Value>),
    /// Write a list element and link it
    AddObject(Record),
    /// Unlink a list element and retract its resource
    RemoveObject(String),
}

impl ElementChange {
    /// `AddObject` for a domain object
    pub fn add_object<U: Mapped>(registry: &MappingRegistry, element: &U) -> Self {
        ElementChange::AddObject(registry.describe::<U>().encode(element))
    }
}

/// Graph serializer
#[derive(Debug, Clone)]
pub struct Writer {
    registry: Arc<MappingRegistry>,
}

impl Writer {
    pub fn new(registry: Arc<MappingRegistry>) -> Self {
        Self { registry }
    }

    /// Write new objects.
    ///
    /// Objects without an identifier get `{base}{model}/{uuid}`; identifiers minted for the
    /// object or its list elements are written back into `objects`.
    pub fn create<T: Mapped>(&self, tx: &mut Transaction, objects: &mut [T]) -> RepoResult<()> {
        let descriptor = self.registry.describe::<T>();
        let mapping = descriptor.mapping();

        for object in objects.iter_mut() {
            if descriptor.id(object).is_none() {
                descriptor.set_id(object, mapping.mint_iri());
            }
            let mut record = descriptor.encode(object);
            let uri = record.id.clone().unwrap_or_default();
            let subject = subject(&uri)?;
            if tx.contains_subject(&mapping.graph, &subject) {
                return Err(RepoError::AlreadyExists(uri));
            }

            insert_type(tx, &mapping.graph, &subject, mapping)?;
            assert_fields(tx, &mapping.graph, &subject, &mut record, true)?;
            debug!("Created {} {}", mapping.type_name, uri);
            *object = descriptor.decode(record);
        }
        Ok(())
    }

    /// Rewrite stored objects.
    ///
    /// Lazy fields are left untouched unless `merge_lazy` is set, whatever their in-memory value.
    /// Referenced fields come back empty; read the object again to resolve them.
    pub fn update<T: Mapped>(
        &self,
        tx: &mut Transaction,
        objects: &mut [T],
        merge_lazy: bool,
    ) -> RepoResult<()> {
        let descriptor = self.registry.describe::<T>();
        let mapping = descriptor.mapping();

        for object in objects.iter_mut() {
            let mut record = descriptor.encode(object);
            let uri = record
                .id
                .clone()
                .ok_or_else(|| RepoError::NotFound(format!("{} without identifier", mapping.type_name)))?;
            let subject = subject(&uri)?;
            if !tx.contains_subject(&mapping.graph, &subject) {
                return Err(RepoError::NotFound(uri));
            }

            retract_fields(tx, &mapping.graph, &subject, mapping, merge_lazy)?;
            assert_fields(tx, &mapping.graph, &subject, &mut record, merge_lazy)?;
            debug!("Updated {} {} (merge lazy: {})", mapping.type_name, uri, merge_lazy);

            *object = descriptor.decode(record);
        }
        Ok(())
    }

    /// Retract every triple of each object's subject. Nothing else is touched.
    pub fn delete<T: Mapped>(&self, tx: &mut Transaction, objects: &[T]) -> RepoResult<()> {
        let descriptor = self.registry.describe::<T>();
        let mapping = descriptor.mapping();

        for object in objects {
            let uri = descriptor
                .id(object)
                .ok_or_else(|| RepoError::NotFound(format!("{} without identifier", mapping.type_name)))?;
            let removed = tx.remove_subject(&mapping.graph, &subject(uri)?)?;
            debug!("Deleted {} {} ({} triples)", mapping.type_name, uri, removed);
        }
        Ok(())
    }

    /// Apply one change to a multi-valued field of the stored `T` at `owner`.
    ///
    /// Returns the identifier of the element written by `AddObject`. A field that is not mapped
    /// on `T`, or a change that does not fit its kind, fails with [`RepoError::InvalidChange`].
    pub fn change_element<T: Mapped>(
        &self,
        tx: &mut Transaction,
        owner: &str,
        field: &str,
        change: ElementChange,
    ) -> RepoResult<Option<String>> {
        let descriptor = self.registry.describe::<T>();
        let mapping = descriptor.mapping();
        let graph = &mapping.graph;
        let invalid = |reason: String| RepoError::InvalidChange {
            type_name: mapping.type_name,
            field: field.to_string(),
            reason,
        };
        let field = mapping
            .find_field(field)
            .ok_or_else(|| invalid("field is not mapped".to_string()))?;
        let subject = subject(owner)?;
        if !tx.contains_subject(graph, &subject) {
            return Err(RepoError::NotFound(owner.to_string()));
        }

        let fits = match &change {
            ElementChange::Add(_) | ElementChange::Remove(_) | ElementChange::Set(_) => {
                field.kind.is_literal()
            }
            ElementChange::AddObject(element) => {
                field.kind.is_list() && element.mapping.type_name == field.nested().type_name
            }
            ElementChange::RemoveObject(_) => field.kind.is_list(),
        };
        if !fits {
            return Err(invalid(format!("change does not fit a {:?} field", field.kind)));
        }

        let predicate = field.predicate();
        let mut added = None;
        match change {
            ElementChange::Add(value) => {
                if !value.is_empty() {
                    tx.insert(graph, triple(&subject, predicate, value.to_object()?))?;
                }
            }
            ElementChange::Remove(value) => {
                tx.remove(graph, &triple(&subject, predicate, value.to_object()?))?;
            }
            ElementChange::Set(values) => {
                retract_predicate(tx, graph, &subject, predicate)?;
                for value in values.iter().filter(|v| !v.is_empty()) {
                    tx.insert(graph, triple(&subject, predicate, value.to_object()?))?;
                }
            }
            ElementChange::AddObject(mut element) => {
                added = Some(write_element(tx, graph, &subject, field, &mut element)?);
            }
            ElementChange::RemoveObject(uri) => {
                let element = subject_node(&uri)?;
                tx.remove(
                    graph,
                    &triple(&subject, predicate, RdfObject::NamedNode(element.clone())),
                )?;
                retract_resource(tx, graph, &RdfSubject::NamedNode(element), field.nested())?;
            }
        }
        debug!("Changed {} of {} {}", field.name, mapping.type_name, owner);
        Ok(added)
    }
}

fn subject_node(uri: &str) -> RepoResult<NamedNode> {
    NamedNode::new(uri).map_err(|_| RepoError::NotFound(uri.to_string()))
}

fn subject(uri: &str) -> RepoResult<RdfSubject> {
    subject_node(uri).map(RdfSubject::NamedNode)
}

fn triple(subject: &RdfSubject, predicate: &RdfPredicate, object: RdfObject) -> Triple {
    Triple::new(subject.clone(), predicate.clone(), object)
}

fn insert_type(
    tx: &mut Transaction,
    graph: &NamedNode,
    subject: &RdfSubject,
    mapping: &TypeMapping,
) -> RepoResult<()> {
    let rdf_type = RdfPredicate::from(NamedNode::new_unchecked(vocab::RDF_TYPE));
    tx.insert(
        graph,
        triple(subject, &rdf_type, RdfObject::NamedNode(mapping.resource_type.clone())),
    )?;
    Ok(())
}

/// Assert the fields of `record` under `subject`, assigning identifiers to new list elements
fn assert_fields(
    tx: &mut Transaction,
    graph: &NamedNode,
    subject: &RdfSubject,
    record: &mut Record,
    include_lazy: bool,
) -> RepoResult<()> {
    let mapping = record.mapping.clone();
    for (field, slot) in mapping.fields.iter().zip(record.slots.iter_mut()) {
        if field.kind.is_lazy() && !include_lazy {
            continue;
        }
        match (field.kind, slot) {
            (_, Slot::Unloaded) | (FieldKind::ReferencedLiteral, _) => {}
            (FieldKind::Literal | FieldKind::LazyLiteral, Slot::Values(values)) => {
                for value in values.iter().filter(|v| !v.is_empty()) {
                    tx.insert(graph, triple(subject, field.predicate(), value.to_object()?))?;
                }
            }
            (FieldKind::EmbeddedObject, Slot::Embedded(nested)) => {
                assert_fields(tx, graph, subject, nested, include_lazy)?;
            }
            (FieldKind::ObjectList | FieldKind::LazyObjectList, Slot::Objects(elements)) => {
                for element in elements.iter_mut() {
                    write_element(tx, graph, subject, field, element)?;
                }
            }
            (kind, slot) => panic!(
                "slot {:?} does not fit field `{}` ({:?}) of {}",
                slot, field.name, kind, mapping.type_name
            ),
        }
    }
    Ok(())
}

/// Write a list element as its own resource (replacing any previous one) and link it
fn write_element(
    tx: &mut Transaction,
    graph: &NamedNode,
    owner: &RdfSubject,
    field: &FieldMapping,
    element: &mut Record,
) -> RepoResult<String> {
    if element.id.is_none() {
        element.id = Some(element.mapping.mint_iri());
    }
    let uri = element.id.clone().unwrap_or_default();
    let node = subject_node(&uri)?;
    let element_subject = RdfSubject::NamedNode(node.clone());

    retract_resource(tx, graph, &element_subject, &element.mapping)?;
    insert_type(tx, graph, &element_subject, &element.mapping)?;
    assert_fields(tx, graph, &element_subject, element, true)?;
    tx.insert(graph, triple(owner, field.predicate(), RdfObject::NamedNode(node)))?;
    Ok(uri)
}

/// Retract the stored fields of `subject`, including the resources of its list elements
fn retract_fields(
    tx: &mut Transaction,
    graph: &NamedNode,
    subject: &RdfSubject,
    mapping: &TypeMapping,
    include_lazy: bool,
) -> RepoResult<()> {
    for field in &mapping.fields {
        if field.kind.is_lazy() && !include_lazy {
            continue;
        }
        match field.kind {
            FieldKind::Literal | FieldKind::LazyLiteral => {
                retract_predicate(tx, graph, subject, field.predicate())?;
            }
            FieldKind::EmbeddedObject => {
                retract_fields(tx, graph, subject, field.nested(), include_lazy)?;
            }
            FieldKind::ObjectList | FieldKind::LazyObjectList => {
                for element in retract_predicate(tx, graph, subject, field.predicate())? {
                    if let Some(element) = element.as_subject() {
                        retract_resource(tx, graph, &element, field.nested())?;
                    }
                }
            }
            FieldKind::ReferencedLiteral => {}
        }
    }
    Ok(())
}

/// Retract an element resource together with the resources of its own lists
fn retract_resource(
    tx: &mut Transaction,
    graph: &NamedNode,
    subject: &RdfSubject,
    mapping: &TypeMapping,
) -> RepoResult<()> {
    if !tx.contains_subject(graph, subject) {
        return Ok(());
    }
    retract_fields(tx, graph, subject, mapping, true)?;
    tx.remove_subject(graph, subject)?;
    Ok(())
}

/// Retract every `subject predicate ?o` triple, returning the retracted objects
fn retract_predicate(
    tx: &mut Transaction,
    graph: &NamedNode,
    subject: &RdfSubject,
    predicate: &RdfPredicate,
) -> RepoResult<Vec<RdfObject>> {
    let objects = tx.objects_for(graph, subject, predicate);
    for object in &objects {
        tx.remove(graph, &triple(subject, predicate, object.clone()))?;
    }
    Ok(objects)
}
