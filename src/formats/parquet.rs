//! Parquet input.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::Schema as ArrowSchema;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::arrow::ProjectionMask;

use crate::columnar;
use crate::config::ReaderConfig;
use crate::error::{MismatchError, ReaderError, SourceError};
use crate::reader::RecordSource;
use crate::row::GenericRow;
use crate::schema::{reconcile, schema_from_arrow, spec_from_arrow, Schema, SchemaRef};

/// A single Parquet file.
///
/// The file is self-describing: without a supplied schema every column is
/// read and the schema is derived from the file. With one, only the
/// requested columns are read and their definitions must agree with it.
pub struct ParquetSource {
    path: PathBuf,
    expected: Option<SchemaRef>,
    config: ReaderConfig,
    schema: Option<SchemaRef>,
    /// Root column read for each schema field, in schema order.
    roots: Vec<usize>,
    /// Position of each schema field's column within a projected batch.
    columns: Vec<usize>,
    reader: Option<ParquetRecordBatchReader>,
    batch: Option<RecordBatch>,
    row: usize,
}

impl ParquetSource {
    pub fn new(path: impl Into<PathBuf>, expected: Option<SchemaRef>, config: &ReaderConfig) -> Self {
        Self {
            path: path.into(),
            expected,
            config: config.clone(),
            schema: None,
            roots: Vec::new(),
            columns: Vec::new(),
            reader: None,
            batch: None,
            row: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn builder(&self) -> Result<ParquetRecordBatchReaderBuilder<File>, ReaderError> {
        let file = File::open(&self.path).map_err(|source| SourceError::Open {
            path: self.path.clone(),
            source,
        })?;
        Ok(ParquetRecordBatchReaderBuilder::try_new(file)?)
    }

    /// Work out the schema of the rows and the root columns backing it.
    fn resolve(&self, file_schema: &ArrowSchema) -> Result<(SchemaRef, Vec<usize>), ReaderError> {
        let Some(expected) = &self.expected else {
            let derived = schema_from_arrow(file_schema)?;
            return Ok((Arc::new(derived), (0..file_schema.fields().len()).collect()));
        };

        let mut roots = Vec::with_capacity(expected.len());
        let mut found = Vec::with_capacity(expected.len());
        for field in expected.fields() {
            let index = file_schema
                .index_of(&field.name)
                .map_err(|_| MismatchError::MissingField {
                    field: field.name.clone(),
                })?;
            found.push(spec_from_arrow(file_schema.field(index))?);
            roots.push(index);
        }

        let derived = Schema::new(found).map_err(|e| MismatchError::InvalidSchema {
            reason: e.to_string(),
        })?;
        reconcile(expected, &derived)?;
        Ok((Arc::clone(expected), roots))
    }

    fn build_reader(&self) -> Result<ParquetRecordBatchReader, ReaderError> {
        let builder = self.builder()?;
        let mask = ProjectionMask::roots(builder.parquet_schema(), self.roots.iter().copied());
        let reader = builder
            .with_projection(mask)
            .with_batch_size(self.config.batch_size)
            .build()?;
        Ok(reader)
    }

    fn decode_row(&self, batch: &RecordBatch, index: usize, row: &mut GenericRow) -> Result<(), ReaderError> {
        let schema = self.schema.as_ref().ok_or(ReaderError::NotInitialized)?;
        for (spec, &column) in schema.fields().iter().zip(&self.columns) {
            let value = columnar::read_value(batch.column(column), index, spec)?;
            row.put(&spec.name, value);
        }
        Ok(())
    }
}

impl RecordSource for ParquetSource {
    fn open(&mut self) -> Result<SchemaRef, ReaderError> {
        self.config.validate()?;
        let file_schema = Arc::clone(self.builder()?.schema());
        let (schema, roots) = self.resolve(&file_schema)?;

        // A projected batch keeps the file's column order.
        let mut sorted = roots.clone();
        sorted.sort_unstable();
        self.columns = roots
            .iter()
            .map(|root| sorted.partition_point(|r| r < root))
            .collect();
        self.roots = roots;

        self.reader = Some(self.build_reader()?);
        self.batch = None;
        self.row = 0;
        self.schema = Some(Arc::clone(&schema));
        Ok(schema)
    }

    fn read_into(&mut self, row: &mut GenericRow) -> Result<bool, ReaderError> {
        loop {
            if let Some(batch) = self.batch.take() {
                if self.row < batch.num_rows() {
                    let index = self.row;
                    self.row += 1;
                    let decoded = self.decode_row(&batch, index, row);
                    self.batch = Some(batch);
                    return decoded.map(|()| true);
                }
            }

            let reader = self
                .reader
                .as_mut()
                .ok_or_else(|| SourceError::Unavailable("parquet source is not open".into()))?;
            match reader.next() {
                Some(batch) => {
                    self.batch = Some(batch?);
                    self.row = 0;
                }
                None => return Ok(false),
            }
        }
    }

    fn reset(&mut self) -> Result<(), ReaderError> {
        if self.schema.is_none() {
            return Err(SourceError::Unavailable("parquet source is not open".into()).into());
        }
        self.reader = Some(self.build_reader()?);
        self.batch = None;
        self.row = 0;
        Ok(())
    }

    fn release(&mut self) -> Result<(), ReaderError> {
        self.reader = None;
        self.batch = None;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("parquet({})", self.path.display())
    }
}
