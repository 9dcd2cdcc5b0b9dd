//! In-memory rows.

use std::sync::Arc;

use crate::error::{ReaderError, SourceError};
use crate::reader::RecordSource;
use crate::row::GenericRow;
use crate::schema::SchemaRef;

/// Source over rows already held in memory.
///
/// Rows are yielded as given; the reader validates them against the schema.
/// [`MemorySource::forward_only`] turns off rewinding, which is how a
/// single-pass stream behaves.
#[derive(Debug, Clone)]
pub struct MemorySource {
    schema: SchemaRef,
    rows: Arc<[GenericRow]>,
    position: usize,
    rewindable: bool,
    open: bool,
}

impl MemorySource {
    pub fn new(schema: SchemaRef, rows: Vec<GenericRow>) -> Self {
        Self {
            schema,
            rows: rows.into(),
            position: 0,
            rewindable: true,
            open: false,
        }
    }

    pub fn forward_only(mut self) -> Self {
        self.rewindable = false;
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RecordSource for MemorySource {
    fn open(&mut self) -> Result<SchemaRef, ReaderError> {
        self.open = true;
        self.position = 0;
        Ok(Arc::clone(&self.schema))
    }

    fn read_into(&mut self, row: &mut GenericRow) -> Result<bool, ReaderError> {
        if !self.open {
            return Err(SourceError::Unavailable("memory source is not open".into()).into());
        }
        let Some(next) = self.rows.get(self.position) else {
            return Ok(false);
        };
        row.clone_from(next);
        self.position += 1;
        Ok(true)
    }

    fn reset(&mut self) -> Result<(), ReaderError> {
        if !self.rewindable {
            return Err(ReaderError::RewindUnsupported);
        }
        self.position = 0;
        Ok(())
    }

    fn release(&mut self) -> Result<(), ReaderError> {
        self.open = false;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory({} rows)", self.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::{DataType, FieldSpec, Schema};

    fn source() -> MemorySource {
        let schema = Arc::new(Schema::new(vec![FieldSpec::new("n", DataType::Int)]).unwrap());
        let rows = (0..3)
            .map(|i| {
                let mut row = GenericRow::new();
                row.put("n", i as i64);
                row
            })
            .collect();
        MemorySource::new(schema, rows)
    }

    #[test]
    fn test_reads_in_order_and_resets() {
        let mut source = source();
        source.open().unwrap();
        let mut row = GenericRow::new();
        let mut seen = Vec::new();
        while source.read_into(&mut row).unwrap() {
            seen.push(row.get("n").unwrap().values()[0].as_i64().unwrap());
        }
        assert_eq!(seen, vec![0, 1, 2]);

        source.reset().unwrap();
        assert!(source.read_into(&mut row).unwrap());
        assert_eq!(row.get("n").unwrap().values()[0].as_i64(), Some(0));
    }

    #[test]
    fn test_forward_only() {
        let mut source = source().forward_only();
        source.open().unwrap();
        assert_eq!(source.reset().unwrap_err().kind(), ErrorKind::RewindUnsupported);
    }

    #[test]
    fn test_read_requires_open() {
        let mut source = source();
        let mut row = GenericRow::new();
        assert_eq!(
            source.read_into(&mut row).unwrap_err().kind(),
            ErrorKind::SourceUnavailable
        );
    }
}
