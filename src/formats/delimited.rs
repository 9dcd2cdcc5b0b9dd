//! Delimited text input (CSV, TSV).

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, RecordBatch, StringArray};
use arrow::csv::reader::Format;
use arrow::csv::{Reader as CsvReader, ReaderBuilder};
use arrow::datatypes::{DataType as ArrowType, Field, Schema as ArrowSchema};

use crate::config::ReaderConfig;
use crate::error::{MismatchError, ReaderError, SourceError};
use crate::reader::RecordSource;
use crate::row::{FieldValue, GenericRow, Value};
use crate::schema::{FieldSpec, SchemaRef};

/// Delimited text with a header row.
///
/// The header names the columns; every schema field must appear in it,
/// extra columns are ignored. Cells are read as text and converted to the
/// declared type. A multi-valued cell holds its elements separated by
/// `multi_value_delimiter`. Empty cells and cells equal to `null_token` are
/// null, so an empty multi-valued cell is null rather than an empty list.
///
/// The configuration is validated when the source is opened.
pub struct DelimitedSource {
    path: PathBuf,
    schema: SchemaRef,
    config: ReaderConfig,
    /// Header column backing each schema field, in schema order.
    columns: Vec<usize>,
    header: Option<Arc<ArrowSchema>>,
    reader: Option<CsvReader<File>>,
    batch: Option<RecordBatch>,
    /// Next row of `batch` to decode.
    row: usize,
}

impl DelimitedSource {
    pub fn new(path: impl Into<PathBuf>, schema: SchemaRef, config: &ReaderConfig) -> Self {
        Self {
            path: path.into(),
            schema,
            config: config.clone(),
            columns: Vec::new(),
            header: None,
            reader: None,
            batch: None,
            row: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_file(&self) -> Result<File, ReaderError> {
        File::open(&self.path).map_err(|source| {
            SourceError::Open {
                path: self.path.clone(),
                source,
            }
            .into()
        })
    }

    /// Read the header row and map every schema field to its column.
    fn read_header(&mut self) -> Result<Arc<ArrowSchema>, ReaderError> {
        let format = Format::default()
            .with_header(true)
            .with_delimiter(self.config.delimiter_byte());
        let (inferred, _) = format.infer_schema(self.open_file()?, Some(0))?;

        let names: Vec<&str> = inferred.fields().iter().map(|f| f.name().as_str()).collect();
        self.columns = self
            .schema
            .fields()
            .iter()
            .map(|spec| {
                names
                    .iter()
                    .position(|name| *name == spec.name)
                    .ok_or_else(|| MismatchError::MissingField {
                        field: spec.name.clone(),
                    })
            })
            .collect::<Result<_, _>>()?;

        // Every column is read as text and converted per field afterwards.
        let fields: Vec<Field> = names
            .iter()
            .map(|name| Field::new(*name, ArrowType::Utf8, true))
            .collect();
        Ok(Arc::new(ArrowSchema::new(fields)))
    }

    fn build_reader(&self, header: Arc<ArrowSchema>) -> Result<CsvReader<File>, ReaderError> {
        let reader = ReaderBuilder::new(header)
            .with_header(true)
            .with_delimiter(self.config.delimiter_byte())
            .with_batch_size(self.config.batch_size)
            .build(self.open_file()?)?;
        Ok(reader)
    }

    fn decode_cell(&self, spec: &FieldSpec, cell: Option<&str>) -> Result<FieldValue, MismatchError> {
        let Some(text) = cell.filter(|text| *text != self.config.null_token) else {
            return Ok(FieldValue::Null);
        };

        if !spec.multi_valued {
            return Value::parse(&spec.name, spec.data_type, text).map(FieldValue::Single);
        }
        text.split(self.config.multi_value_delimiter)
            .map(|element| Value::parse(&spec.name, spec.data_type, element))
            .collect::<Result<Vec<_>, _>>()
            .map(FieldValue::Multi)
    }

    fn decode_row(&self, batch: &RecordBatch, index: usize, row: &mut GenericRow) -> Result<(), ReaderError> {
        for (spec, &column) in self.schema.fields().iter().zip(&self.columns) {
            let cells = batch
                .column(column)
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| {
                    SourceError::Unavailable(format!("column '{}' was not read as text", spec.name))
                })?;
            let cell = (!cells.is_null(index)).then(|| cells.value(index));
            let value = self.decode_cell(spec, cell)?;
            row.put(&spec.name, value);
        }
        Ok(())
    }
}

impl RecordSource for DelimitedSource {
    fn open(&mut self) -> Result<SchemaRef, ReaderError> {
        self.config.validate()?;
        let header = self.read_header()?;
        self.reader = Some(self.build_reader(Arc::clone(&header))?);
        self.header = Some(header);
        self.batch = None;
        self.row = 0;
        Ok(Arc::clone(&self.schema))
    }

    fn read_into(&mut self, row: &mut GenericRow) -> Result<bool, ReaderError> {
        loop {
            if let Some(batch) = self.batch.take() {
                if self.row < batch.num_rows() {
                    let index = self.row;
                    // Consume the record before decoding so a bad one is skipped past.
                    self.row += 1;
                    let decoded = self.decode_row(&batch, index, row);
                    self.batch = Some(batch);
                    return decoded.map(|()| true);
                }
            }

            let reader = self
                .reader
                .as_mut()
                .ok_or_else(|| SourceError::Unavailable("delimited source is not open".into()))?;
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
        let header = self
            .header
            .clone()
            .ok_or_else(|| SourceError::Unavailable("delimited source is not open".into()))?;
        self.reader = Some(self.build_reader(header)?);
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
        format!("delimited({})", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::MismatchPolicy;
    use crate::error::ErrorKind;
    use crate::reader::{Reader, RecordReader};
    use crate::schema::{DataType, Schema};

    fn fixture(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn schema() -> SchemaRef {
        Arc::new(
            Schema::new(vec![
                FieldSpec::new("name", DataType::String),
                FieldSpec::new("age", DataType::Int),
                FieldSpec::new("tags", DataType::String).multi_valued(),
                FieldSpec::new("score", DataType::Float).nullable(),
            ])
            .unwrap(),
        )
    }

    fn reader(file: &NamedTempFile, config: &ReaderConfig) -> Reader<DelimitedSource> {
        Reader::new(DelimitedSource::new(file.path(), schema(), config), config)
    }

    mod decoding {
        use super::*;

        #[test]
        fn test_reads_typed_rows() {
            let file = fixture("name,age,tags,score\nana,31,a;b,0.5\nbo,7,,\n");
            let mut reader = reader(&file, &ReaderConfig::default());
            reader.init().unwrap();

            let first = reader.next_row().unwrap().clone();
            assert_eq!(first.get("name"), Some(&FieldValue::from("ana")));
            assert_eq!(first.get("age"), Some(&FieldValue::from(31i64)));
            assert_eq!(
                first.get("tags"),
                Some(&FieldValue::Multi(vec![Value::from("a"), Value::from("b")]))
            );
            assert_eq!(first.get("score"), Some(&FieldValue::from(0.5)));

            // An empty cell is null, even in a multi-valued column, which is
            // not nullable here.
            let err = reader.next_row().unwrap_err();
            assert!(matches!(
                err,
                ReaderError::SchemaMismatch(MismatchError::UnexpectedNull { ref field }) if field == "tags"
            ));
        }

        #[test]
        fn test_column_order_follows_header() {
            let file = fixture("score,tags,extra,age,name\n1.5,x,ignored,3,cy\n");
            let mut reader = reader(&file, &ReaderConfig::default());
            reader.init().unwrap();

            let row = reader.next_row().unwrap();
            assert_eq!(row.field_names().collect::<Vec<_>>(), ["name", "age", "tags", "score"]);
            assert_eq!(row.get("age"), Some(&FieldValue::from(3i64)));
            assert!(row.get("extra").is_none());
            assert!(!reader.has_next().unwrap());
        }

        #[test]
        fn test_custom_delimiters_and_null_token() {
            let file = fixture("name\tage\ttags\tscore\nana\t31\ta|b|c\tNA\n");
            let mut config = ReaderConfig::default().with_delimiter('\t');
            config.multi_value_delimiter = '|';
            config.null_token = "NA".into();
            let mut reader = reader(&file, &config);
            reader.init().unwrap();

            let row = reader.next_row().unwrap();
            assert_eq!(row.get("tags").unwrap().values().len(), 3);
            assert_eq!(row.get("score"), Some(&FieldValue::Null));
        }
    }

    mod mismatches {
        use super::*;

        #[test]
        fn test_missing_header_column_fails_init() {
            let file = fixture("name,age,score\nana,31,1.0\n");
            let mut reader = reader(&file, &ReaderConfig::default());
            let err = reader.init().unwrap_err();
            assert!(matches!(
                err,
                ReaderError::SchemaMismatch(MismatchError::MissingField { ref field }) if field == "tags"
            ));
            assert_eq!(reader.state(), crate::reader::ReaderState::Uninitialized);
        }

        #[test]
        fn test_unparseable_cell_aborts() {
            let file = fixture("name,age,tags,score\nana,31,a,\nbo,old,b,\ncy,5,c,\n");
            let mut reader = reader(&file, &ReaderConfig::default());
            reader.init().unwrap();
            reader.next_row().unwrap();
            assert!(matches!(
                reader.next_row().unwrap_err(),
                ReaderError::SchemaMismatch(MismatchError::Unparseable { .. })
            ));
            assert!(!reader.has_next().unwrap());
        }

        #[test]
        fn test_unparseable_cell_skipped() {
            let file = fixture("name,age,tags,score\nana,31,a,\nbo,old,b,\ncy,5,c,\n");
            let config = ReaderConfig::default().with_policy(MismatchPolicy::Skip);
            let mut reader = reader(&file, &config);
            reader.init().unwrap();

            let mut names = Vec::new();
            while reader.has_next().unwrap() {
                let row = reader.next_row().unwrap();
                names.push(row.get("name").unwrap().values()[0].to_string());
            }
            assert_eq!(names, ["ana", "cy"]);
            assert_eq!(reader.stats().skipped, 1);
        }
    }

    mod passes {
        use super::*;

        #[test]
        fn test_rewind_reopens_file() {
            let file = fixture("name,age,tags,score\na,1,x,\nb,2,y,\nc,3,z,\n");
            // A small batch size makes the pass span several batches.
            let config = ReaderConfig::default().with_batch_size(2);
            let mut reader = reader(&file, &config);
            reader.init().unwrap();

            let mut passes = Vec::new();
            for _ in 0..2 {
                let mut rows = Vec::new();
                while reader.has_next().unwrap() {
                    rows.push(reader.next_row().unwrap().clone());
                }
                passes.push(rows);
                reader.rewind().unwrap();
            }
            assert_eq!(passes[0].len(), 3);
            assert_eq!(passes[0], passes[1]);
            reader.close().unwrap();
        }

        #[test]
        fn test_missing_file() {
            let config = ReaderConfig::default();
            let source = DelimitedSource::new("/nonexistent/input.csv", schema(), &config);
            assert_eq!(source.path(), Path::new("/nonexistent/input.csv"));
            let mut reader = Reader::new(source, &config);
            assert_eq!(reader.init().unwrap_err().kind(), ErrorKind::SourceUnavailable);
        }

        #[test]
        fn test_zero_batch_size_fails_init() {
            let file = fixture("name,age,tags,score
a,1,x,
b,2,y,
");
            let mut reader = reader(&file, &ReaderConfig::default().with_batch_size(0));
            assert!(matches!(
                reader.init().unwrap_err(),
                ReaderError::SourceUnavailable(SourceError::Config(_))
            ));
            assert_eq!(reader.state(), crate::reader::ReaderState::Uninitialized);
        }

        #[test]
        fn test_header_only_file() {
            let file = fixture("name,age,tags,score\n");
            let mut reader = reader(&file, &ReaderConfig::default());
            reader.init().unwrap();
            assert!(!reader.has_next().unwrap());
            reader.rewind().unwrap();
            assert!(!reader.has_next().unwrap());
        }
    }
}
