//! Format-specific half of a record reader.
//!
//! A `RecordSource` knows how to open one kind of input and decode its
//! records into a [`GenericRow`]. It does not track lifecycle state; that is
//! the job of [`super::Reader`], which drives every source through the same
//! state machine.

use crate::error::ReaderError;
use crate::row::GenericRow;
use crate::schema::SchemaRef;

/// A decoder for one source format.
///
/// # Example flow for a two-pass scan over a three-record source:
/// ```ignore
/// let schema = source.open()?;          // acquire the file, describe records
/// while source.read_into(&mut row)? {}  // pass 1
/// source.reset()?;                      // back to the first record
/// while source.read_into(&mut row)? {}  // pass 2, same records in the same order
/// source.release()?;
/// ```
pub trait RecordSource: Send {
    /// Acquire the underlying resource and return the schema of its records.
    ///
    /// Called once. On error the caller still invokes [`Self::release`].
    fn open(&mut self) -> Result<SchemaRef, ReaderError>;

    /// Decode the next record into `row`, which arrives cleared.
    ///
    /// Returns `Ok(false)` at end of source. A record that fails to decode
    /// with `SchemaMismatch` is still consumed, so the following call moves on
    /// to the next record.
    fn read_into(&mut self, row: &mut GenericRow) -> Result<bool, ReaderError>;

    /// Position the source before its first record again.
    ///
    /// Sources that cannot be re-read keep this default.
    fn reset(&mut self) -> Result<(), ReaderError> {
        Err(ReaderError::RewindUnsupported)
    }

    /// Release the underlying resource. Must tolerate being called on a
    /// source that was never opened or whose `open` failed.
    fn release(&mut self) -> Result<(), ReaderError>;

    /// Short human-readable name used in log messages.
    fn describe(&self) -> String {
        "source".to_string()
    }
}

impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    fn open(&mut self) -> Result<SchemaRef, ReaderError> {
        (**self).open()
    }

    fn read_into(&mut self, row: &mut GenericRow) -> Result<bool, ReaderError> {
        (**self).read_into(row)
    }

    fn reset(&mut self) -> Result<(), ReaderError> {
        (**self).reset()
    }

    fn release(&mut self) -> Result<(), ReaderError> {
        (**self).release()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
