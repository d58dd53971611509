//! Literal payloads
//!
//! Every scalar that crosses the mapping boundary is a [`Value`]. Serializer and deserializer
//! match on it exhaustively, and [`FieldValue`] adapts plain Rust field types to it.

use super::{MappingError, MappingResult};
use crate::rdf::{vocab, Literal, NamedNode, RdfObject};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

/// Literal payload of a mapped field
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Plain string (xsd:string)
    String(String),
    /// Integer (xsd:long)
    Integer(i64),
    /// Floating point (xsd:double)
    Double(f64),
    /// Boolean (xsd:boolean)
    Boolean(bool),
    /// Timestamp (xsd:dateTime)
    DateTime(DateTime<Utc>),
    /// Resource reference
    Iri(String),
}

impl Value {
    /// Empty values are never written: empty strings and NaN
    pub fn is_empty(&self) -> bool {
        match self {
            Value::String(s) | Value::Iri(s) => s.is_empty(),
            Value::Double(d) => d.is_nan(),
            Value::Integer(_) | Value::Boolean(_) | Value::DateTime(_) => false,
        }
    }

    /// Reinterpret a string as an IRI reference
    pub fn into_iri(self) -> Value {
        match self {
            Value::String(s) => Value::Iri(s),
            other => other,
        }
    }

    /// Lexical form
    pub fn lexical(&self) -> String {
        match self {
            Value::String(s) | Value::Iri(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Double(d) => d.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::DateTime(dt) => dt.to_rfc3339(),
        }
    }

    /// RDF term carrying this value with native xsd typing
    pub fn to_object(&self) -> MappingResult<RdfObject> {
        let typed = |lexical: String, datatype: &str| {
            RdfObject::Literal(Literal::new_typed_literal(
                lexical,
                NamedNode::new_unchecked(datatype),
            ))
        };

        Ok(match self {
            Value::String(s) => RdfObject::Literal(Literal::new_simple_literal(s.clone())),
            Value::Integer(i) => typed(i.to_string(), vocab::XSD_LONG),
            Value::Double(d) => typed(d.to_string(), vocab::XSD_DOUBLE),
            Value::Boolean(b) => typed(b.to_string(), vocab::XSD_BOOLEAN),
            Value::DateTime(dt) => typed(dt.to_rfc3339(), vocab::XSD_DATE_TIME),
            Value::Iri(iri) => RdfObject::NamedNode(
                NamedNode::new(iri).map_err(|e| MappingError::InvalidValue(e.to_string()))?,
            ),
        })
    }

    /// Value of an RDF term. Blank nodes carry no value.
    pub fn from_object(object: &RdfObject) -> Option<Value> {
        match object {
            RdfObject::NamedNode(n) => Some(Value::Iri(n.as_str().to_string())),
            RdfObject::BlankNode(b) => {
                debug!("Ignoring blank node {} in value position", b);
                None
            }
            RdfObject::Literal(l) => Some(Self::from_literal(l)),
        }
    }

    fn from_literal(literal: &Literal) -> Value {
        let lexical = literal.value();
        let datatype = literal.datatype();
        let parsed = match datatype.as_str() {
            vocab::XSD_LONG | vocab::XSD_INT | vocab::XSD_INTEGER => {
                lexical.parse().ok().map(Value::Integer)
            }
            vocab::XSD_DOUBLE | vocab::XSD_FLOAT | vocab::XSD_DECIMAL => {
                lexical.parse().ok().map(Value::Double)
            }
            vocab::XSD_BOOLEAN => match lexical {
                "true" | "1" => Some(Value::Boolean(true)),
                "false" | "0" => Some(Value::Boolean(false)),
                _ => None,
            },
            vocab::XSD_DATE_TIME => DateTime::parse_from_rfc3339(lexical)
                .ok()
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc))),
            _ => Some(Value::String(lexical.to_string())),
        };

        parsed.unwrap_or_else(|| {
            debug!("Literal {} does not parse as its datatype, keeping it as a string", literal);
            Value::String(lexical.to_string())
        })
    }
}

/// Conversion between a Rust field type and its literal payloads
///
/// `from_values` is lenient: values of another variant are converted through their lexical
/// form where possible and dropped otherwise. A graph holds each triple once, so multi-valued
/// fields have set semantics: `to_values` keeps the first of repeated values.
pub trait FieldValue: Sized {
    /// Payloads to write, empty ones included (the writer skips them)
    fn to_values(&self) -> Vec<Value>;

    /// Field value rebuilt from the payloads found in the graph, in store order
    fn from_values(values: Vec<Value>) -> Self;
}

fn first<T>(values: Vec<Value>, convert: impl Fn(Value) -> Option<T>) -> Option<T> {
    values.into_iter().find_map(convert)
}

fn as_string(value: Value) -> Option<String> {
    Some(match value {
        Value::String(s) | Value::Iri(s) => s,
        other => other.lexical(),
    })
}

fn as_i64(value: Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(i),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_f64(value: Value) -> Option<f64> {
    match value {
        Value::Double(d) => Some(d),
        Value::Integer(i) => Some(i as f64),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_bool(value: Value) -> Option<bool> {
    match value {
        Value::Boolean(b) => Some(b),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_datetime(value: Value) -> Option<DateTime<Utc>> {
    match value {
        Value::DateTime(dt) => Some(dt),
        Value::String(s) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

impl FieldValue for String {
    fn to_values(&self) -> Vec<Value> {
        vec![Value::String(self.clone())]
    }

    fn from_values(values: Vec<Value>) -> Self {
        first(values, as_string).unwrap_or_default()
    }
}

impl FieldValue for Option<String> {
    fn to_values(&self) -> Vec<Value> {
        self.iter().map(|s| Value::String(s.clone())).collect()
    }

    fn from_values(values: Vec<Value>) -> Self {
        first(values, as_string)
    }
}

impl FieldValue for Vec<String> {
    fn to_values(&self) -> Vec<Value> {
        let mut seen = HashSet::new();
        self.iter()
            .filter(|s| seen.insert(s.as_str()))
            .map(|s| Value::String(s.clone()))
            .collect()
    }

    fn from_values(values: Vec<Value>) -> Self {
        values.into_iter().filter_map(as_string).collect()
    }
}

impl FieldValue for i64 {
    fn to_values(&self) -> Vec<Value> {
        vec![Value::Integer(*self)]
    }

    fn from_values(values: Vec<Value>) -> Self {
        first(values, as_i64).unwrap_or_default()
    }
}

impl FieldValue for Option<i64> {
    fn to_values(&self) -> Vec<Value> {
        self.iter().map(|i| Value::Integer(*i)).collect()
    }

    fn from_values(values: Vec<Value>) -> Self {
        first(values, as_i64)
    }
}

impl FieldValue for f64 {
    fn to_values(&self) -> Vec<Value> {
        vec![Value::Double(*self)]
    }

    fn from_values(values: Vec<Value>) -> Self {
        first(values, as_f64).unwrap_or(f64::NAN)
    }
}

impl FieldValue for Option<f64> {
    fn to_values(&self) -> Vec<Value> {
        self.iter().map(|d| Value::Double(*d)).collect()
    }

    fn from_values(values: Vec<Value>) -> Self {
        first(values, as_f64)
    }
}

impl FieldValue for bool {
    fn to_values(&self) -> Vec<Value> {
        vec![Value::Boolean(*self)]
    }

    fn from_values(values: Vec<Value>) -> Self {
        first(values, as_bool).unwrap_or_default()
    }
}

impl FieldValue for Option<DateTime<Utc>> {
    fn to_values(&self) -> Vec<Value> {
        self.iter().map(|dt| Value::DateTime(*dt)).collect()
    }

    fn from_values(values: Vec<Value>) -> Self {
        first(values, as_datetime)
    }
}

impl FieldValue for Vec<Value> {
    fn to_values(&self) -> Vec<Value> {
        let mut values: Vec<Value> = Vec::with_capacity(self.len());
        for value in self {
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
        values
    }

    fn from_values(values: Vec<Value>) -> Self {
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_repeated_values_are_written_once() {
        let types = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(
            types.to_values(),
            vec![Value::String("a".into()), Value::String("b".into())]
        );
        let values = vec![Value::Integer(1), Value::Integer(1)];
        assert_eq!(values.to_values(), vec![Value::Integer(1)]);
    }

    #[test]
    fn test_empty_values() {
        assert!(Value::String(String::new()).is_empty());
        assert!(Value::Double(f64::NAN).is_empty());
        assert!(!Value::Integer(0).is_empty());
        assert!(!Value::String("a".into()).is_empty());
    }

    #[test]
    fn test_native_typing() {
        let object = Value::Integer(42).to_object().unwrap();
        match &object {
            RdfObject::Literal(l) => assert_eq!(l.datatype().as_str(), vocab::XSD_LONG),
            other => panic!("expected literal, got {other}"),
        }
        assert_eq!(Value::from_object(&object), Some(Value::Integer(42)));

        let when = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let object = Value::DateTime(when).to_object().unwrap();
        assert_eq!(Value::from_object(&object), Some(Value::DateTime(when)));

        let object = Value::Iri("http://example.org/c/1".into()).to_object().unwrap();
        assert!(object.is_named_node());
    }

    #[test]
    fn test_invalid_iri() {
        assert!(matches!(
            Value::Iri("not an iri".into()).to_object(),
            Err(MappingError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_malformed_typed_literal_falls_back_to_string() {
        let literal = Literal::new_typed_literal("abc", NamedNode::new_unchecked(vocab::XSD_LONG));
        assert_eq!(
            Value::from_object(&RdfObject::Literal(literal)),
            Some(Value::String("abc".into()))
        );
    }

    #[test]
    fn test_field_value_leniency() {
        assert_eq!(String::from_values(vec![Value::Iri("http://x.org/a".into())]), "http://x.org/a");
        assert_eq!(i64::from_values(vec![Value::String("7".into())]), 7);
        assert!(f64::from_values(Vec::new()).is_nan());
        assert_eq!(
            Vec::<String>::from_values(vec![Value::String("a".into()), Value::String("b".into())]),
            vec!["a", "b"]
        );
        assert_eq!(Option::<String>::None.to_values(), Vec::<Value>::new());
    }
}
