//! The record reader contract.
//!
//! Consumers talk to every input format through [`RecordReader`]. The call
//! order is fixed:
//!
//! ```text
//! init → (has_next / next_row)* → rewind → (has_next / next_row)* → close
//! ```
//!
//! and any deviation is reported as a typed [`ReaderError`] rather than
//! ignored. Between two rewinds a reader yields the same rows in the same
//! order, which is what makes dictionary-then-encode two-pass scans sound.

mod lifecycle;
mod source;

pub use lifecycle::Reader;
pub use source::RecordSource;

use std::fmt;

use crate::error::ReaderError;
use crate::row::GenericRow;
use crate::schema::SchemaRef;

/// Lifecycle state of a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReaderState {
    Uninitialized,
    /// Initialized or rewound; no row of the current pass returned yet.
    Ready,
    Iterating,
    /// End of the current pass has been observed.
    Exhausted,
    Closed,
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReaderState::Uninitialized => "uninitialized",
            ReaderState::Ready => "ready",
            ReaderState::Iterating => "iterating",
            ReaderState::Exhausted => "exhausted",
            ReaderState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Counters for the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassStats {
    /// 1 for the pass after `init`, incremented by every successful rewind.
    pub pass: u32,
    /// Rows returned by `next_row`.
    pub rows: u64,
    /// Records dropped under the skip policy.
    pub skipped: u64,
}

impl PassStats {
    pub(crate) fn start(pass: u32) -> Self {
        Self {
            pass,
            rows: 0,
            skipped: 0,
        }
    }
}

/// A finite, restartable sequence of rows conforming to one schema.
///
/// Methods take `&mut self`: a reader is driven by exactly one caller at a
/// time. Independent readers may live on different threads.
pub trait RecordReader: Send {
    /// Acquire the source and resolve its schema.
    fn init(&mut self) -> Result<(), ReaderError>;

    /// The schema of every row. Returns the same `Arc` until close.
    fn schema(&self) -> Result<SchemaRef, ReaderError>;

    /// Whether another row is available in the current pass.
    ///
    /// Never advances the cursor. Once it returns `false` it keeps returning
    /// `false` until [`Self::rewind`].
    fn has_next(&mut self) -> Result<bool, ReaderError>;

    /// Advance to the next row.
    ///
    /// The returned buffer is owned by the reader and overwritten by the
    /// following call; clone it to keep it.
    fn next_row(&mut self) -> Result<&GenericRow, ReaderError>;

    /// Restart iteration from the first row.
    fn rewind(&mut self) -> Result<(), ReaderError>;

    /// Release the source. Later calls other than `close` fail with
    /// `ReaderClosed`.
    fn close(&mut self) -> Result<(), ReaderError>;

    fn state(&self) -> ReaderState;

    fn stats(&self) -> PassStats;
}

impl<R: RecordReader + ?Sized> RecordReader for Box<R> {
    fn init(&mut self) -> Result<(), ReaderError> {
        (**self).init()
    }

    fn schema(&self) -> Result<SchemaRef, ReaderError> {
        (**self).schema()
    }

    fn has_next(&mut self) -> Result<bool, ReaderError> {
        (**self).has_next()
    }

    fn next_row(&mut self) -> Result<&GenericRow, ReaderError> {
        (**self).next_row()
    }

    fn rewind(&mut self) -> Result<(), ReaderError> {
        (**self).rewind()
    }

    fn close(&mut self) -> Result<(), ReaderError> {
        (**self).close()
    }

    fn state(&self) -> ReaderState {
        (**self).state()
    }

    fn stats(&self) -> PassStats {
        (**self).stats()
    }
}
