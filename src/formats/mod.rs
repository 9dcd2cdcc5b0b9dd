//! Record sources for the supported input formats.
//!
//! Each format implements [`RecordSource`](crate::reader::RecordSource) and
//! is wrapped in a [`Reader`] to get the full reader lifecycle. Use
//! [`open_reader`] to pick the source for a file by format.

pub mod delimited;
pub mod json;
pub mod memory;
pub mod parquet;
pub mod replay;

use std::path::Path;

pub use delimited::DelimitedSource;
pub use json::JsonLinesSource;
pub use memory::MemorySource;
pub use parquet::ParquetSource;
pub use replay::ReplaySource;

use crate::config::ReaderConfig;
use crate::error::{MismatchError, ReaderError};
use crate::reader::{Reader, RecordReader};
use crate::schema::SchemaRef;

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Text with a header row and one record per line.
    Delimited,
    /// One JSON object per line.
    JsonLines,
    Parquet,
}

impl InputFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "csv" | "tsv" | "txt" => Some(InputFormat::Delimited),
            "json" | "jsonl" | "ndjson" => Some(InputFormat::JsonLines),
            "parquet" => Some(InputFormat::Parquet),
            _ => None,
        }
    }

    /// Whether files of this format carry their own schema.
    pub fn is_self_describing(self) -> bool {
        matches!(self, InputFormat::Parquet)
    }

    pub fn name(self) -> &'static str {
        match self {
            InputFormat::Delimited => "delimited",
            InputFormat::JsonLines => "json lines",
            InputFormat::Parquet => "parquet",
        }
    }
}

/// Create an uninitialized reader for `path`.
///
/// Text formats need `schema`. For Parquet it is optional and, when given,
/// selects and checks the columns to read. A `.tsv` file read with the
/// default comma delimiter is split on tabs instead. An invalid `config` is
/// rejected here, before any file is touched.
pub fn open_reader(
    format: InputFormat,
    path: &Path,
    schema: Option<SchemaRef>,
    config: &ReaderConfig,
) -> Result<Box<dyn RecordReader + Send>, ReaderError> {
    config.validate()?;

    let required = || {
        ReaderError::from(MismatchError::SchemaRequired {
            format: format.name().to_string(),
        })
    };

    match format {
        InputFormat::Delimited => {
            let schema = schema.ok_or_else(required)?;
            let is_tsv = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("tsv"));
            let config = if is_tsv && config.delimiter == ',' {
                config.clone().with_delimiter('\t')
            } else {
                config.clone()
            };
            let source = DelimitedSource::new(path, schema, &config);
            Ok(Box::new(Reader::new(source, &config)))
        }
        InputFormat::JsonLines => {
            let schema = schema.ok_or_else(required)?;
            let source = JsonLinesSource::from_path(path, schema);
            Ok(Box::new(Reader::new(source, config)))
        }
        InputFormat::Parquet => {
            let source = ParquetSource::new(path, schema, config);
            Ok(Box::new(Reader::new(source, config)))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::config::ConfigError;
    use crate::error::{ErrorKind, SourceError};
    use crate::reader::ReaderState;
    use crate::schema::{DataType, FieldSpec, Schema};

    #[test]
    fn test_format_from_extension() {
        let cases = [
            ("data.csv", Some(InputFormat::Delimited)),
            ("data.TSV", Some(InputFormat::Delimited)),
            ("events.jsonl", Some(InputFormat::JsonLines)),
            ("events.ndjson", Some(InputFormat::JsonLines)),
            ("table.parquet", Some(InputFormat::Parquet)),
            ("archive.tar", None),
            ("no_extension", None),
        ];
        for (name, expected) in cases {
            assert_eq!(InputFormat::from_path(&PathBuf::from(name)), expected, "{name}");
        }
    }

    #[test]
    fn test_text_formats_require_schema() {
        for format in [InputFormat::Delimited, InputFormat::JsonLines] {
            let err = open_reader(format, Path::new("in"), None, &ReaderConfig::default())
                .err()
                .unwrap();
            assert!(matches!(
                err,
                ReaderError::SchemaMismatch(MismatchError::SchemaRequired { .. })
            ));
        }
    }

    #[test]
    fn test_tsv_splits_on_tabs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("people.tsv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"name\tage\nana\t31\n").unwrap();

        let schema = Arc::new(
            Schema::new(vec![
                FieldSpec::new("name", DataType::String),
                FieldSpec::new("age", DataType::Int),
            ])
            .unwrap(),
        );
        let mut reader =
            open_reader(InputFormat::Delimited, &path, Some(schema), &ReaderConfig::default())
                .unwrap();
        assert_eq!(reader.state(), ReaderState::Uninitialized);
        reader.init().unwrap();
        let row = reader.next_row().unwrap();
        assert_eq!(row.get("age").unwrap().values()[0].as_i64(), Some(31));
        reader.close().unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let schema = Arc::new(Schema::new(vec![FieldSpec::new("name", DataType::String)]).unwrap());
        let configs = [
            ReaderConfig::default().with_batch_size(0),
            ReaderConfig::default().with_delimiter(';'),
        ];
        for format in [InputFormat::Delimited, InputFormat::JsonLines, InputFormat::Parquet] {
            for config in &configs {
                let err = open_reader(format, Path::new("in"), Some(Arc::clone(&schema)), config)
                    .err()
                    .unwrap();
                assert!(matches!(
                    err,
                    ReaderError::SourceUnavailable(SourceError::Config(ConfigError::Invalid(_)))
                ));
            }
        }
    }

    #[test]
    fn test_missing_file_fails_on_init() {
        let mut reader = open_reader(
            InputFormat::Parquet,
            Path::new("/nonexistent/table.parquet"),
            None,
            &ReaderConfig::default(),
        )
        .unwrap();
        assert_eq!(reader.init().unwrap_err().kind(), ErrorKind::SourceUnavailable);
    }
}
