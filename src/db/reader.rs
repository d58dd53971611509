//! Graph deserializer
//!
//! Loads the triples of one subject from its type's named graph and rebuilds the object field by
//! field. Lazy reads leave `LazyLiteral` and `LazyObjectList` fields at their default.

use crate::error::{RepoError, RepoResult};
use crate::mapping::{FieldKind, Mapped, MappingRegistry, Record, Reference, Slot, TypeMapping, Value};
use crate::rdf::{vocab, NamedNode, RdfObject, RdfSubject, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Objects of one subject grouped by predicate, in store order
type Statements = HashMap<String, Vec<RdfObject>>;

/// Graph deserializer
#[derive(Debug, Clone)]
pub struct Reader {
    registry: Arc<MappingRegistry>,
}

impl Reader {
    pub fn new(registry: Arc<MappingRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MappingRegistry> {
        &self.registry
    }

    /// Read every field of the object identified by `uri`
    pub fn read<T: Mapped>(&self, tx: &Transaction, uri: &str) -> RepoResult<T> {
        self.read_object(tx, uri, false)
    }

    /// Read the object identified by `uri`, skipping lazy fields
    pub fn read_lazy<T: Mapped>(&self, tx: &Transaction, uri: &str) -> RepoResult<T> {
        self.read_object(tx, uri, true)
    }

    fn read_object<T: Mapped>(&self, tx: &Transaction, uri: &str, lazy: bool) -> RepoResult<T> {
        let descriptor = self.registry.describe::<T>();
        let mapping = descriptor.mapping();
        let record = self
            .load(tx, mapping, &mapping.graph, uri, lazy)?
            .ok_or_else(|| RepoError::NotFound(uri.to_string()))?;
        debug!("Read {} {} (lazy: {})", mapping.type_name, uri, lazy);
        Ok(descriptor.decode(record))
    }

    /// Record of `uri` in `graph`, or `None` when the subject has no triples there
    fn load(
        &self,
        tx: &Transaction,
        mapping: &Arc<TypeMapping>,
        graph: &NamedNode,
        uri: &str,
        lazy: bool,
    ) -> RepoResult<Option<Record>> {
        let subject = match RdfSubject::iri(uri) {
            Ok(subject) => subject,
            Err(e) => {
                debug!("Cannot read {}: {}", uri, e);
                return Ok(None);
            }
        };
        let triples = tx.triples_for_subject(graph, &subject);
        if triples.is_empty() {
            return Ok(None);
        }

        let mut statements = Statements::new();
        for triple in triples {
            statements
                .entry(triple.predicate.as_str().to_string())
                .or_default()
                .push(triple.object);
        }

        let typed = statements
            .get(vocab::RDF_TYPE)
            .map(|types| {
                types.iter().any(|t| match t {
                    RdfObject::NamedNode(n) => n == &mapping.resource_type,
                    _ => false,
                })
            })
            .unwrap_or(false);
        if !typed {
            return Err(RepoError::NotFound(format!(
                "{} is not a {}",
                uri, mapping.resource_type
            )));
        }

        let mut record = self.fill(tx, mapping, graph, &statements, lazy)?;
        record.id = Some(uri.to_string());
        Ok(Some(record))
    }

    fn fill(
        &self,
        tx: &Transaction,
        mapping: &Arc<TypeMapping>,
        graph: &NamedNode,
        statements: &Statements,
        lazy: bool,
    ) -> RepoResult<Record> {
        let mut record = Record::unloaded(None, mapping.clone());

        for (index, field) in mapping.fields.iter().enumerate() {
            if lazy && field.kind.is_lazy() {
                continue;
            }
            let slot = match field.kind {
                FieldKind::Literal | FieldKind::LazyLiteral => Slot::Values(
                    objects(statements, field.predicate().as_str())
                        .iter()
                        .filter_map(Value::from_object)
                        .collect(),
                ),
                FieldKind::EmbeddedObject => {
                    Slot::Embedded(self.fill(tx, field.nested(), graph, statements, lazy)?)
                }
                FieldKind::ObjectList | FieldKind::LazyObjectList => {
                    let mut elements = Vec::new();
                    for object in objects(statements, field.predicate().as_str()) {
                        let RdfObject::NamedNode(element) = object else {
                            warn!("Skipping non-IRI element of {} on {}", field.name, mapping.type_name);
                            continue;
                        };
                        match self.load(tx, field.nested(), graph, element.as_str(), lazy) {
                            Ok(Some(record)) => elements.push(record),
                            Ok(None) => warn!("Skipping dangling element {} of {}", element, field.name),
                            Err(RepoError::NotFound(reason)) => {
                                warn!("Skipping element of {}: {}", field.name, reason)
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    Slot::Objects(elements)
                }
                // Resolved once every stored field is in place
                FieldKind::ReferencedLiteral => continue,
            };
            record.slots[index] = slot;
        }

        for (index, field) in mapping.fields.iter().enumerate() {
            if let Some(reference) = &field.reference {
                record.slots[index] = Slot::Values(self.dereference(tx, &record, reference)?);
            }
        }

        Ok(record)
    }

    /// One point lookup in the referenced type's graph
    fn dereference(
        &self,
        tx: &Transaction,
        record: &Record,
        reference: &Reference,
    ) -> RepoResult<Vec<Value>> {
        let source = match &record.slots[reference.source_field] {
            Slot::Values(values) => values.first().map(Value::lexical),
            _ => None,
        };
        let Some(Ok(subject)) = source.map(|iri| RdfSubject::iri(&iri)) else {
            return Ok(Vec::new());
        };

        let target = (reference.target)(&self.registry)?;
        let field = target.field(reference.target_field);
        Ok(tx
            .objects_for(&target.graph, &subject, field.predicate())
            .iter()
            .filter_map(Value::from_object)
            .collect())
    }
}

fn objects<'a>(statements: &'a Statements, predicate: &str) -> &'a [RdfObject] {
    statements.get(predicate).map(Vec::as_slice).unwrap_or(&[])
}
