//! Record readers for two-pass segment ingestion.
//!
//! A [`RecordReader`] exposes a file or stream as a finite, restartable
//! sequence of rows that conform to a [`Schema`]. Segment creation scans a
//! source twice, building per-column dictionaries on the first pass and
//! encoding rows on the second, so readers must yield the same rows in the
//! same order on every pass. [`driver::build_segment`] runs that protocol
//! over any reader.

pub mod columnar;
pub mod config;
pub mod driver;
pub mod error;
pub mod formats;
pub mod reader;
pub mod row;
pub mod schema;

pub use config::{MismatchPolicy, ReaderConfig};
pub use driver::{build_segment, build_segments, DriverError, EncodedSegment};
pub use error::{ErrorKind, MismatchError, ReaderError, SourceError};
pub use formats::{open_reader, InputFormat};
pub use reader::{PassStats, Reader, ReaderState, RecordReader, RecordSource};
pub use row::{FieldValue, GenericRow, Value};
pub use schema::{DataType, FieldSpec, Schema, SchemaRef};
