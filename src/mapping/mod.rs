//! Object/graph mapping
//!
//! Domain types declare their graph representation by implementing [`Mapped`]. The
//! [`MappingRegistry`] compiles each declaration once into a [`Descriptor`], which moves field
//! values between objects and [`Record`]s that the reader and writer turn into triples.
//!
//! Field kinds:
//! - `Literal`: one triple per non-empty value
//! - `EmbeddedObject`: nested fields flattened under the owning subject
//! - `ObjectList` / `LazyObjectList`: one triple per element pointing at the element resource
//! - `LazyLiteral`: a literal skipped by lazy reads
//! - `ReferencedLiteral`: computed at read time from another resource

mod descriptor;
mod registry;
mod value;

pub use descriptor::{
    Descriptor, FieldKind, FieldMapping, Mapped, MappingBuilder, Record, Reference, Slot,
    TargetMapping, TypeMapping,
};
pub use registry::MappingRegistry;
pub use value::{FieldValue, Value};

use thiserror::Error;

/// Mapping declaration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// An IRI in the declaration does not resolve
    #[error("Invalid IRI {0}: {1}")]
    InvalidIri(String, String),

    /// Two fields write the same predicate under one subject
    #[error("Duplicate predicate {predicate} on {type_name}")]
    DuplicatePredicate {
        type_name: &'static str,
        predicate: String,
    },

    /// Two fields share a name
    #[error("Duplicate field {field} on {type_name}")]
    DuplicateField {
        type_name: &'static str,
        field: &'static str,
    },

    /// A reference names a field that is not a mapped literal
    #[error("Unknown literal field {field} on {type_name}")]
    UnknownField {
        type_name: &'static str,
        field: &'static str,
    },

    /// List elements must be identifiable resources
    #[error("{0} is used as a list element but declares no identity")]
    MissingIdentity(&'static str),

    /// Nested declarations refer back to a type being built
    #[error("Cyclic nesting through {0}")]
    Cycle(&'static str),

    /// A value cannot be represented in the graph
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

pub type MappingResult<T> = Result<T, MappingError>;
