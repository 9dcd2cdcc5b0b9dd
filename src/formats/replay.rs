//! Replay buffer that makes any source deterministic and rewindable.
//!
//! The first pass reads through the wrapped source and records every
//! outcome: decoded rows and per-record schema mismatches alike. Later passes
//! replay the recording, so each pass observes the same sequence even when
//! the wrapped source is a one-shot stream or enumerates records in an
//! unstable order.

use tracing::debug;

use crate::error::{MismatchError, ReaderError};
use crate::reader::RecordSource;
use crate::row::GenericRow;
use crate::schema::SchemaRef;

#[derive(Debug, Clone)]
enum Recorded {
    Row(GenericRow),
    Mismatch(MismatchError),
}

enum Mode {
    /// Reading from the wrapped source, appending to the recording.
    Recording,
    /// Serving the recording; the wrapped source is complete.
    Replaying { position: usize },
}

pub struct ReplaySource<S> {
    inner: S,
    recorded: Vec<Recorded>,
    mode: Mode,
    /// The wrapped source reported end of input.
    complete: bool,
}

impl<S: RecordSource> ReplaySource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            recorded: Vec::new(),
            mode: Mode::Recording,
            complete: false,
        }
    }

    /// Number of outcomes recorded so far.
    pub fn recorded(&self) -> usize {
        self.recorded.len()
    }

    /// Read one record from the wrapped source and record the outcome.
    fn record_next(&mut self, row: &mut GenericRow) -> Result<bool, ReaderError> {
        match self.inner.read_into(row) {
            Ok(true) => {
                self.recorded.push(Recorded::Row(row.clone()));
                Ok(true)
            }
            Ok(false) => {
                self.complete = true;
                Ok(false)
            }
            Err(ReaderError::SchemaMismatch(err)) => {
                self.recorded.push(Recorded::Mismatch(err.clone()));
                Err(err.into())
            }
            Err(err) => Err(err),
        }
    }
}

impl<S: RecordSource> RecordSource for ReplaySource<S> {
    fn open(&mut self) -> Result<SchemaRef, ReaderError> {
        self.inner.open()
    }

    fn read_into(&mut self, row: &mut GenericRow) -> Result<bool, ReaderError> {
        match &mut self.mode {
            Mode::Recording => self.record_next(row),
            Mode::Replaying { position } => {
                let Some(outcome) = self.recorded.get(*position) else {
                    return Ok(false);
                };
                *position += 1;
                match outcome {
                    Recorded::Row(recorded) => {
                        row.clone_from(recorded);
                        Ok(true)
                    }
                    Recorded::Mismatch(err) => Err(err.clone().into()),
                }
            }
        }
    }

    fn reset(&mut self) -> Result<(), ReaderError> {
        if !self.complete {
            // Finish recording so the replay covers the whole source.
            let mut scratch = GenericRow::new();
            loop {
                scratch.clear();
                match self.record_next(&mut scratch) {
                    Ok(true) | Err(ReaderError::SchemaMismatch(_)) => {}
                    Ok(false) => break,
                    Err(err) => return Err(err),
                }
            }
            debug!(
                source = %self.inner.describe(),
                records = self.recorded.len(),
                "replay buffer complete"
            );
        }
        self.mode = Mode::Replaying { position: 0 };
        Ok(())
    }

    fn release(&mut self) -> Result<(), ReaderError> {
        self.recorded = Vec::new();
        self.inner.release()
    }

    fn describe(&self) -> String {
        format!("replay({})", self.inner.describe())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::MismatchPolicy;
    use crate::formats::MemorySource;
    use crate::reader::{Reader, RecordReader};
    use crate::schema::{DataType, FieldSpec, Schema};

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![FieldSpec::new("v", DataType::String)]).unwrap())
    }

    fn rows(values: &[&str]) -> Vec<GenericRow> {
        values
            .iter()
            .map(|v| {
                let mut row = GenericRow::new();
                row.put("v", *v);
                row
            })
            .collect()
    }

    fn drain<R: RecordReader>(reader: &mut R) -> Vec<GenericRow> {
        let mut out = Vec::new();
        while reader.has_next().unwrap() {
            out.push(reader.next_row().unwrap().clone());
        }
        out
    }

    /// Yields its records in a different order every time it is reset.
    struct Shuffling {
        inner: MemorySource,
        schema: SchemaRef,
        rows: Vec<GenericRow>,
        resets: usize,
    }

    impl RecordSource for Shuffling {
        fn open(&mut self) -> Result<SchemaRef, ReaderError> {
            self.inner.open()
        }

        fn read_into(&mut self, row: &mut GenericRow) -> Result<bool, ReaderError> {
            self.inner.read_into(row)
        }

        fn reset(&mut self) -> Result<(), ReaderError> {
            self.resets += 1;
            let mut rows = self.rows.clone();
            let n = rows.len();
            rows.rotate_left(self.resets % n);
            self.inner = MemorySource::new(Arc::clone(&self.schema), rows);
            self.inner.open()?;
            Ok(())
        }

        fn release(&mut self) -> Result<(), ReaderError> {
            self.inner.release()
        }
    }

    #[test]
    fn test_forward_only_source_becomes_rewindable() {
        let inner = MemorySource::new(schema(), rows(&["a", "b", "a"])).forward_only();
        let mut reader = Reader::with_policy(ReplaySource::new(inner), MismatchPolicy::Abort);
        reader.init().unwrap();

        let first = drain(&mut reader);
        assert_eq!(reader.source().recorded(), 3);
        reader.rewind().unwrap();
        let second = drain(&mut reader);
        reader.rewind().unwrap();
        let third = drain(&mut reader);
        assert_eq!(reader.source().recorded(), 3);

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn test_unstable_source_is_stabilized() {
        let values = rows(&["x", "y", "z"]);
        let unstable = Shuffling {
            inner: MemorySource::new(schema(), values.clone()),
            schema: schema(),
            rows: values,
            resets: 0,
        };

        let mut bare = Reader::with_policy(
            Shuffling {
                inner: MemorySource::new(schema(), rows(&["x", "y", "z"])),
                schema: schema(),
                rows: rows(&["x", "y", "z"]),
                resets: 0,
            },
            MismatchPolicy::Abort,
        );
        bare.init().unwrap();
        let first = drain(&mut bare);
        bare.rewind().unwrap();
        assert_ne!(first, drain(&mut bare));

        let mut stable = Reader::with_policy(ReplaySource::new(unstable), MismatchPolicy::Abort);
        stable.init().unwrap();
        let first = drain(&mut stable);
        stable.rewind().unwrap();
        assert_eq!(first, drain(&mut stable));
    }

    #[test]
    fn test_rewind_mid_pass_drains_the_rest() {
        let inner = MemorySource::new(schema(), rows(&["a", "b", "c"])).forward_only();
        let mut reader = Reader::with_policy(ReplaySource::new(inner), MismatchPolicy::Abort);
        reader.init().unwrap();
        reader.next_row().unwrap();
        reader.rewind().unwrap();
        assert_eq!(drain(&mut reader), rows(&["a", "b", "c"]));
    }

    #[test]
    fn test_mismatches_replayed_under_skip() {
        let mut mixed = rows(&["a"]);
        let mut bad = GenericRow::new();
        bad.put("v", 5i64);
        mixed.push(bad);
        mixed.extend(rows(&["c"]));

        // Type errors are found by the reader, so wrap a source that reports
        // its own mismatches to exercise the recording of failures.
        struct Failing(MemorySource);
        impl RecordSource for Failing {
            fn open(&mut self) -> Result<SchemaRef, ReaderError> {
                self.0.open()
            }
            fn read_into(&mut self, row: &mut GenericRow) -> Result<bool, ReaderError> {
                if !self.0.read_into(row)? {
                    return Ok(false);
                }
                if row.get("v").and_then(|v| v.values().first()).and_then(|v| v.as_str()).is_none() {
                    return Err(MismatchError::Malformed {
                        record: 2,
                        reason: "not text".into(),
                    }
                    .into());
                }
                Ok(true)
            }
            fn release(&mut self) -> Result<(), ReaderError> {
                self.0.release()
            }
        }

        let inner = Failing(MemorySource::new(schema(), mixed).forward_only());
        let mut reader = Reader::with_policy(ReplaySource::new(inner), MismatchPolicy::Skip);
        reader.init().unwrap();
        let first = drain(&mut reader);
        reader.rewind().unwrap();
        let second = drain(&mut reader);

        assert_eq!(first, rows(&["a", "c"]));
        assert_eq!(first, second);
        // The mismatch is part of the recording.
        assert_eq!(reader.source().recorded(), 3);
        assert_eq!(reader.stats().skipped, 1);
    }
}
