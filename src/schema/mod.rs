//! Schema descriptor shared by every pass over a source.
//!
//! A [`Schema`] is an ordered list of [`FieldSpec`]s with unique names. It is
//! immutable once built and passed around as a [`SchemaRef`].

mod compat;

pub use compat::{reconcile, schema_from_arrow, spec_from_arrow};

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::MismatchError;
use crate::row::{FieldValue, GenericRow};

pub type SchemaRef = Arc<Schema>;

/// Errors raised while building or loading a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema has no fields")]
    Empty,

    #[error("field '{0}' is declared more than once")]
    DuplicateField(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid schema document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int,
    Float,
    String,
    Boolean,
    Bytes,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// Declaration of a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub multi_valued: bool,
    #[serde(default)]
    pub nullable: bool,
}

impl FieldSpec {
    /// A required, single-valued field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            multi_valued: false,
            nullable: false,
        }
    }

    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Check a value against this declaration.
    pub fn check(&self, value: &FieldValue) -> Result<(), MismatchError> {
        match value {
            FieldValue::Null if self.nullable => return Ok(()),
            FieldValue::Null => {
                return Err(MismatchError::UnexpectedNull {
                    field: self.name.clone(),
                })
            }
            FieldValue::Single(_) if self.multi_valued => {
                return Err(self.cardinality_error());
            }
            FieldValue::Multi(_) if !self.multi_valued => {
                return Err(self.cardinality_error());
            }
            _ => {}
        }

        for v in value.values() {
            if v.data_type() != self.data_type {
                return Err(MismatchError::TypeMismatch {
                    field: self.name.clone(),
                    expected: self.data_type.to_string(),
                    got: v.data_type().to_string(),
                });
            }
        }
        Ok(())
    }

    fn cardinality_error(&self) -> MismatchError {
        MismatchError::Cardinality {
            field: self.name.clone(),
            multi_valued: self.multi_valued,
        }
    }
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data_type)?;
        if self.multi_valued {
            f.write_str("[]")?;
        }
        if self.nullable {
            f.write_str("?")?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct SchemaDocument {
    fields: Vec<FieldSpec>,
}

/// Ordered, immutable set of field declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SchemaDocument", into = "SchemaDocument")]
pub struct Schema {
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for Schema {}

impl TryFrom<SchemaDocument> for Schema {
    type Error = SchemaError;

    fn try_from(doc: SchemaDocument) -> Result<Self, Self::Error> {
        Schema::new(doc.fields)
    }
}

impl From<Schema> for SchemaDocument {
    fn from(schema: Schema) -> Self {
        SchemaDocument {
            fields: schema.fields,
        }
    }
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut index = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if index.insert(field.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }

        Ok(Self { fields, index })
    }

    /// Load a schema from a JSON document of the form `{"fields": [...]}`.
    pub fn from_path(path: &Path) -> Result<Self, SchemaError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Verify that `row` carries exactly the declared fields with conforming values.
    pub fn validate_row(&self, row: &GenericRow) -> Result<(), MismatchError> {
        for field in &self.fields {
            let value = row
                .get(&field.name)
                .ok_or_else(|| MismatchError::MissingField {
                    field: field.name.clone(),
                })?;
            field.check(value)?;
        }

        if row.len() != self.fields.len() {
            if let Some(extra) = row.field_names().find(|name| !self.index.contains_key(*name)) {
                return Err(MismatchError::UnknownField {
                    field: extra.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", field.name, field)?;
        }
        Ok(())
    }
}
