//! Newline-delimited JSON input.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Value as Json};

use crate::error::{MismatchError, ReaderError, SourceError};
use crate::reader::RecordSource;
use crate::row::{FieldValue, GenericRow, Value};
use crate::schema::{DataType, FieldSpec, SchemaRef};

enum Input {
    Path {
        path: PathBuf,
        lines: Option<BufReader<File>>,
    },
    /// A one-shot stream; cannot be read twice.
    Stream(Box<dyn BufRead + Send>),
}

/// One JSON object per line.
///
/// Keys map to schema fields by name, arrays to multi-valued fields. A
/// missing key and an explicit `null` are both null. Keys the schema does
/// not declare are ignored. Blank lines are skipped.
pub struct JsonLinesSource {
    input: Input,
    schema: SchemaRef,
    line: String,
    /// Lines read in this pass, blank ones included.
    line_number: u64,
    open: bool,
}

impl JsonLinesSource {
    /// Read from a file. Rewinding reopens it.
    pub fn from_path(path: impl Into<PathBuf>, schema: SchemaRef) -> Self {
        Self::with_input(
            Input::Path {
                path: path.into(),
                lines: None,
            },
            schema,
        )
    }

    /// Read from an already open stream. Such a source is forward-only.
    pub fn from_reader(reader: impl BufRead + Send + 'static, schema: SchemaRef) -> Self {
        Self::with_input(Input::Stream(Box::new(reader)), schema)
    }

    fn with_input(input: Input, schema: SchemaRef) -> Self {
        Self {
            input,
            schema,
            line: String::new(),
            line_number: 0,
            open: false,
        }
    }

    fn open_path(path: &Path) -> Result<BufReader<File>, ReaderError> {
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(BufReader::new(file))
    }

    /// Read the next non-blank line into `self.line`.
    fn next_line(&mut self) -> Result<bool, ReaderError> {
        let lines: &mut dyn BufRead = match &mut self.input {
            Input::Path {
                lines: Some(lines), ..
            } => lines,
            Input::Path { lines: None, .. } => {
                return Err(SourceError::Unavailable("json source is not open".into()).into())
            }
            Input::Stream(stream) => stream.as_mut(),
        };

        loop {
            self.line.clear();
            if lines.read_line(&mut self.line)? == 0 {
                return Ok(false);
            }
            self.line_number += 1;
            if !self.line.trim().is_empty() {
                return Ok(true);
            }
        }
    }

    fn decode(&self, row: &mut GenericRow) -> Result<(), MismatchError> {
        let malformed = |reason: String| MismatchError::Malformed {
            record: self.line_number,
            reason,
        };

        let object: Map<String, Json> = match serde_json::from_str(&self.line) {
            Ok(Json::Object(object)) => object,
            Ok(other) => return Err(malformed(format!("expected an object, found {}", kind(&other)))),
            Err(err) => return Err(malformed(err.to_string())),
        };

        for spec in self.schema.fields() {
            let value = match object.get(&spec.name) {
                None | Some(Json::Null) => FieldValue::Null,
                Some(Json::Array(elements)) if spec.multi_valued => FieldValue::Multi(
                    elements
                        .iter()
                        .map(|element| convert(spec, element))
                        .collect::<Result<_, _>>()?,
                ),
                Some(Json::Array(_)) => {
                    return Err(MismatchError::Cardinality {
                        field: spec.name.clone(),
                        multi_valued: false,
                    })
                }
                Some(_) if spec.multi_valued => {
                    return Err(MismatchError::Cardinality {
                        field: spec.name.clone(),
                        multi_valued: true,
                    })
                }
                Some(scalar) => FieldValue::Single(convert(spec, scalar)?),
            };
            row.put(&spec.name, value);
        }
        Ok(())
    }
}

fn kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Convert one scalar JSON value to the declared type of `spec`.
fn convert(spec: &FieldSpec, json: &Json) -> Result<Value, MismatchError> {
    let type_mismatch = || MismatchError::TypeMismatch {
        field: spec.name.clone(),
        expected: spec.data_type.to_string(),
        got: kind(json).to_string(),
    };
    let unparseable = || MismatchError::Unparseable {
        field: spec.name.clone(),
        value: json.to_string(),
        expected: spec.data_type.to_string(),
    };

    match (spec.data_type, json) {
        (DataType::Int, Json::Number(n)) => n.as_i64().map(Value::Int).ok_or_else(unparseable),
        (DataType::Float, Json::Number(n)) => n.as_f64().map(Value::Float).ok_or_else(unparseable),
        (DataType::String, Json::String(s)) => Ok(Value::String(s.clone())),
        (DataType::Boolean, Json::Bool(b)) => Ok(Value::Boolean(*b)),
        (DataType::Bytes, Json::String(s)) => BASE64
            .decode(s)
            .map(Value::Bytes)
            .map_err(|_| unparseable()),
        // A null element inside an array.
        (_, Json::Null) => Err(MismatchError::UnexpectedNull {
            field: spec.name.clone(),
        }),
        _ => Err(type_mismatch()),
    }
}

impl RecordSource for JsonLinesSource {
    fn open(&mut self) -> Result<SchemaRef, ReaderError> {
        if let Input::Path { path, lines } = &mut self.input {
            *lines = Some(Self::open_path(path)?);
        }
        self.line_number = 0;
        self.open = true;
        Ok(Arc::clone(&self.schema))
    }

    fn read_into(&mut self, row: &mut GenericRow) -> Result<bool, ReaderError> {
        if !self.open {
            return Err(SourceError::Unavailable("json source is not open".into()).into());
        }
        if !self.next_line()? {
            return Ok(false);
        }
        self.decode(row)?;
        Ok(true)
    }

    fn reset(&mut self) -> Result<(), ReaderError> {
        match &mut self.input {
            Input::Path { path, lines } => {
                *lines = Some(Self::open_path(path)?);
                self.line_number = 0;
                Ok(())
            }
            Input::Stream(_) => Err(ReaderError::RewindUnsupported),
        }
    }

    fn release(&mut self) -> Result<(), ReaderError> {
        if let Input::Path { lines, .. } = &mut self.input {
            *lines = None;
        }
        self.open = false;
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.input {
            Input::Path { path, .. } => format!("json({})", path.display()),
            Input::Stream(_) => "json(stream)".to_string(),
        }
    }
}
