//! Row buffer exchanged between a record reader and its consumer.
//!
//! A [`GenericRow`] is reused across iterations: readers clear and refill the
//! same instance for every record, so consumers copy out what they need before
//! asking for the next row.

use std::fmt;
use std::hash::{Hash, Hasher};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use indexmap::IndexMap;

use crate::error::MismatchError;
use crate::schema::DataType;

/// A single type-tagged scalar.
///
/// Floats compare and hash by bit pattern so that two rows are equal exactly
/// when they are byte-identical.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::String(_) => DataType::String,
            Value::Boolean(_) => DataType::Boolean,
            Value::Bytes(_) => DataType::Bytes,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Parse the text form of a value of `data_type`.
    ///
    /// Booleans accept `true`/`false` in any case, bytes are base64.
    pub fn parse(field: &str, data_type: DataType, text: &str) -> Result<Value, MismatchError> {
        let unparseable = || MismatchError::Unparseable {
            field: field.to_string(),
            value: text.to_string(),
            expected: data_type.to_string(),
        };

        let value = match data_type {
            DataType::Int => Value::Int(text.trim().parse().map_err(|_| unparseable())?),
            DataType::Float => Value::Float(text.trim().parse().map_err(|_| unparseable())?),
            DataType::String => Value::String(text.to_string()),
            DataType::Boolean => match text.trim() {
                t if t.eq_ignore_ascii_case("true") => Value::Boolean(true),
                t if t.eq_ignore_ascii_case("false") => Value::Boolean(false),
                _ => return Err(unparseable()),
            },
            DataType::Bytes => Value::Bytes(BASE64.decode(text.trim()).map_err(|_| unparseable())?),
        };
        Ok(value)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::String(v) => v.hash(state),
            Value::Boolean(v) => v.hash(state),
            Value::Bytes(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Bytes(v) => write!(f, "{}", BASE64.encode(v)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// The value of one field: absent, a single scalar, or an ordered sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldValue {
    #[default]
    Null,
    Single(Value),
    Multi(Vec<Value>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// All scalars carried by this value, in order. Empty for `Null`.
    pub fn values(&self) -> &[Value] {
        match self {
            FieldValue::Null => &[],
            FieldValue::Single(v) => std::slice::from_ref(v),
            FieldValue::Multi(vs) => vs,
        }
    }
}

macro_rules! single_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    FieldValue::Single(v.into())
                }
            }
        )*
    };
}

single_from!(Value, i64, f64, bool, &str, String, Vec<u8>);

impl<T: Into<Value>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, |v| FieldValue::Single(v.into()))
    }
}

/// One record's field values keyed by field name.
#[derive(Debug, PartialEq, Eq, Default)]
pub struct GenericRow {
    values: IndexMap<String, FieldValue>,
}

impl Clone for GenericRow {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.values.clone_from(&source.values);
    }
}

impl GenericRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(fields: usize) -> Self {
        Self {
            values: IndexMap::with_capacity(fields),
        }
    }

    /// Remove every value while keeping the allocated capacity.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn put(&mut self, field: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        match self.values.get_mut(field) {
            Some(slot) => *slot = value,
            None => {
                self.values.insert(field.to_string(), value);
            }
        }
    }

    pub fn put_multi<I, V>(&mut self, field: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.put(
            field,
            FieldValue::Multi(values.into_iter().map(Into::into).collect()),
        );
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
