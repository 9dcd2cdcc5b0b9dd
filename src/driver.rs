//! Two-pass segment creation.
//!
//! The first pass collects the distinct values of every column into a
//! dictionary. The reader is then rewound and the second pass replaces
//! each value with its dictionary id. Because a reader yields the same rows
//! on every pass, every value met in the second pass must already be in the
//! dictionary, and every column must produce the same id sequence as in the
//! first pass. Anything else means the source is not deterministic and the
//! segment is rejected.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use indexmap::IndexSet;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::ReaderError;
use crate::reader::{ReaderState, RecordReader};
use crate::row::{FieldValue, GenericRow, Value};
use crate::schema::{FieldSpec, SchemaRef};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Reader(#[from] ReaderError),

    /// The second pass disagreed with the first. `row` is where that was
    /// noticed; a reordering is only noticed at the end of the pass.
    #[error("source is not deterministic: column '{column}', row {row}: {reason}")]
    NonDeterministic {
        column: String,
        row: u64,
        reason: String,
    },

    #[error(
        "passes disagree: first pass read {first_rows} rows ({first_skipped} skipped), \
         second pass read {second_rows} rows ({second_skipped} skipped)"
    )]
    RowCountMismatch {
        first_rows: u64,
        first_skipped: u64,
        second_rows: u64,
        second_skipped: u64,
    },
}

/// Distinct values of one column. Ids are assigned in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    values: IndexSet<Value>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` if it is new and return its id.
    pub fn insert(&mut self, value: &Value) -> u32 {
        let index = match self.values.get_index_of(value) {
            Some(index) => index,
            None => self.values.insert_full(value.clone()).0,
        };
        index as u32
    }

    /// Id of `value`, if it has been inserted.
    pub fn id(&self, value: &Value) -> Option<u32> {
        self.values.get_index_of(value).map(|index| index as u32)
    }

    /// The value behind `id`.
    pub fn value(&self, id: u32) -> Option<&Value> {
        self.values.get_index(id as usize)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values in id order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }
}

/// Order-sensitive digest of the ids one pass produced for a column.
#[derive(Default)]
struct Fingerprint(DefaultHasher);

impl Fingerprint {
    fn add(&mut self, ids: Option<&[u32]>) {
        match ids {
            None => self.0.write_u8(0),
            Some(ids) => {
                self.0.write_u8(1);
                ids.hash(&mut self.0);
            }
        }
    }

    fn finish(&self) -> u64 {
        self.0.finish()
    }
}

/// Dictionary ids of one column, one entry per row. `None` is null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedColumn {
    Single(Vec<Option<u32>>),
    Multi(Vec<Option<Vec<u32>>>),
}

impl EncodedColumn {
    fn with_capacity(field: &FieldSpec, rows: usize) -> Self {
        if field.multi_valued {
            EncodedColumn::Multi(Vec::with_capacity(rows))
        } else {
            EncodedColumn::Single(Vec::with_capacity(rows))
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EncodedColumn::Single(ids) => ids.len(),
            EncodedColumn::Multi(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append the ids of `value`, which must all be in `dictionary`.
    fn push(
        &mut self,
        value: &FieldValue,
        dictionary: &Dictionary,
        fingerprint: &mut Fingerprint,
    ) -> Result<(), String> {
        let lookup = |v: &Value| {
            dictionary
                .id(v)
                .ok_or_else(|| format!("value '{v}' was not seen in the first pass"))
        };

        match (self, value) {
            (EncodedColumn::Single(ids), FieldValue::Null) => {
                ids.push(None);
                fingerprint.add(None);
            }
            (EncodedColumn::Multi(ids), FieldValue::Null) => {
                ids.push(None);
                fingerprint.add(None);
            }
            (EncodedColumn::Single(ids), FieldValue::Single(v)) => {
                let id = lookup(v)?;
                ids.push(Some(id));
                fingerprint.add(Some(std::slice::from_ref(&id)));
            }
            (EncodedColumn::Multi(ids), FieldValue::Multi(values)) => {
                let encoded: Vec<u32> = values.iter().map(lookup).collect::<Result<_, _>>()?;
                fingerprint.add(Some(encoded.as_slice()));
                ids.push(Some(encoded));
            }
            _ => return Err("cardinality changed between passes".to_string()),
        }
        Ok(())
    }

    fn decode(&self, row: usize, dictionary: &Dictionary) -> Option<FieldValue> {
        let value = match self {
            EncodedColumn::Single(ids) => match ids.get(row)? {
                None => FieldValue::Null,
                Some(id) => FieldValue::Single(dictionary.value(*id)?.clone()),
            },
            EncodedColumn::Multi(ids) => match ids.get(row)? {
                None => FieldValue::Null,
                Some(ids) => FieldValue::Multi(
                    ids.iter()
                        .map(|&id| dictionary.value(id).cloned())
                        .collect::<Option<_>>()?,
                ),
            },
        };
        Some(value)
    }
}

/// Output of a two-pass build.
#[derive(Debug, Clone)]
pub struct EncodedSegment {
    pub schema: SchemaRef,
    /// One dictionary per schema field, in schema order.
    pub dictionaries: Vec<Dictionary>,
    /// One column per schema field, in schema order.
    pub columns: Vec<EncodedColumn>,
    pub num_rows: u64,
    /// Records dropped by the reader under the skip policy, per pass.
    pub skipped: u64,
}

impl EncodedSegment {
    pub fn dictionary(&self, field: &str) -> Option<&Dictionary> {
        self.schema.index_of(field).and_then(|i| self.dictionaries.get(i))
    }

    pub fn column(&self, field: &str) -> Option<&EncodedColumn> {
        self.schema.index_of(field).and_then(|i| self.columns.get(i))
    }

    /// Rebuild row `index` from the dictionaries.
    pub fn row(&self, index: usize) -> Option<GenericRow> {
        let mut row = GenericRow::with_capacity(self.schema.len());
        for ((field, column), dictionary) in self
            .schema
            .fields()
            .iter()
            .zip(&self.columns)
            .zip(&self.dictionaries)
        {
            row.put(&field.name, column.decode(index, dictionary)?);
        }
        Some(row)
    }
}

/// Build a segment from `reader` with a dictionary pass and an encoding pass.
///
/// An uninitialized reader is initialized first. The reader is closed when
/// this returns, whether the build succeeded or not.
pub fn build_segment(reader: &mut dyn RecordReader) -> Result<EncodedSegment, DriverError> {
    let result = run_passes(reader);
    let closed = reader.close();
    let segment = result?;
    closed?;
    Ok(segment)
}

fn run_passes(reader: &mut dyn RecordReader) -> Result<EncodedSegment, DriverError> {
    if reader.state() == ReaderState::Uninitialized {
        reader.init()?;
    } else {
        reader.rewind()?;
    }
    let schema = reader.schema()?;
    let fields = schema.fields();

    let mut dictionaries = vec![Dictionary::new(); fields.len()];
    let mut expected: Vec<Fingerprint> = fields.iter().map(|_| Fingerprint::default()).collect();
    let mut ids = Vec::new();
    while reader.has_next()? {
        let row = reader.next_row()?;
        for ((field, dictionary), fingerprint) in
            fields.iter().zip(&mut dictionaries).zip(&mut expected)
        {
            match row.get(&field.name) {
                None | Some(FieldValue::Null) => fingerprint.add(None),
                Some(value) => {
                    ids.clear();
                    ids.extend(value.values().iter().map(|v| dictionary.insert(v)));
                    fingerprint.add(Some(ids.as_slice()));
                }
            }
        }
    }
    let first = reader.stats();
    debug!(
        rows = first.rows,
        skipped = first.skipped,
        "dictionary pass complete"
    );

    reader.rewind()?;

    let capacity = usize::try_from(first.rows).unwrap_or(0);
    let mut columns: Vec<EncodedColumn> = fields
        .iter()
        .map(|field| EncodedColumn::with_capacity(field, capacity))
        .collect();
    let mut actual: Vec<Fingerprint> = fields.iter().map(|_| Fingerprint::default()).collect();
    let mut row_index = 0u64;
    while reader.has_next()? {
        let row = reader.next_row()?;
        for (((field, dictionary), column), fingerprint) in fields
            .iter()
            .zip(&dictionaries)
            .zip(&mut columns)
            .zip(&mut actual)
        {
            let value = row.get(&field.name).unwrap_or(&FieldValue::Null);
            column
                .push(value, dictionary, fingerprint)
                .map_err(|reason| DriverError::NonDeterministic {
                    column: field.name.clone(),
                    row: row_index,
                    reason,
                })?;
        }
        row_index += 1;
    }
    let second = reader.stats();

    if first.rows != second.rows || first.skipped != second.skipped {
        return Err(DriverError::RowCountMismatch {
            first_rows: first.rows,
            first_skipped: first.skipped,
            second_rows: second.rows,
            second_skipped: second.skipped,
        });
    }

    for ((field, expected), actual) in fields.iter().zip(&expected).zip(&actual) {
        if expected.finish() != actual.finish() {
            return Err(DriverError::NonDeterministic {
                column: field.name.clone(),
                row: row_index,
                reason: "values came back in a different order".to_string(),
            });
        }
    }

    info!(
        fields = fields.len(),
        rows = second.rows,
        skipped = second.skipped,
        distinct = dictionaries.iter().map(Dictionary::len).sum::<usize>(),
        "segment built"
    );

    Ok(EncodedSegment {
        schema,
        dictionaries,
        columns,
        num_rows: second.rows,
        skipped: second.skipped,
    })
}

/// Build one segment per reader on the rayon thread pool.
///
/// Results come back in the order of `readers`.
pub fn build_segments(
    readers: Vec<Box<dyn RecordReader + Send>>,
) -> Vec<Result<EncodedSegment, DriverError>> {
    readers
        .into_par_iter()
        .map(|mut reader| build_segment(reader.as_mut()))
        .collect()
}
