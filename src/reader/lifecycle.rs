//! Lifecycle state machine shared by every record source.

use std::mem;

use tracing::{debug, warn};

use super::{PassStats, ReaderState, RecordReader, RecordSource};
use crate::config::{MismatchPolicy, ReaderConfig};
use crate::error::ReaderError;
use crate::row::GenericRow;
use crate::schema::SchemaRef;

/// Outcome of decoding one record ahead of the cursor.
enum Lookahead {
    Empty,
    /// A validated row is waiting in `Reader::pending`.
    Row,
    Failed(ReaderError),
    End,
}

/// Drives a [`RecordSource`] through the reader state machine.
///
/// `Reader` owns two row buffers that it swaps: `current` is what the last
/// `next_row` returned, `pending` receives the record decoded ahead of the
/// cursor. Neither is reallocated between rows.
pub struct Reader<S: RecordSource> {
    source: S,
    policy: MismatchPolicy,
    state: ReaderState,
    schema: Option<SchemaRef>,
    current: GenericRow,
    pending: GenericRow,
    lookahead: Lookahead,
    stats: PassStats,
    /// Whether the source has been read since init or the last rewind.
    touched: bool,
}

impl<S: RecordSource> Reader<S> {
    /// Wrap `source`, taking the mismatch policy from `config`.
    pub fn new(source: S, config: &ReaderConfig) -> Self {
        Self::with_policy(source, config.on_mismatch)
    }

    /// Wrap `source` with an explicit mismatch policy. The source is not
    /// touched until [`RecordReader::init`].
    pub fn with_policy(source: S, policy: MismatchPolicy) -> Self {
        Self {
            source,
            policy,
            state: ReaderState::Uninitialized,
            schema: None,
            current: GenericRow::new(),
            pending: GenericRow::new(),
            lookahead: Lookahead::Empty,
            stats: PassStats::default(),
            touched: false,
        }
    }

    /// The wrapped source.
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn policy(&self) -> MismatchPolicy {
        self.policy
    }

    fn ensure_open(&self) -> Result<(), ReaderError> {
        match self.state {
            ReaderState::Closed => Err(ReaderError::ReaderClosed),
            ReaderState::Uninitialized => Err(ReaderError::NotInitialized),
            _ => Ok(()),
        }
    }

    /// Decode one record into `pending` and validate it against the schema.
    fn pull(&mut self) -> Result<bool, ReaderError> {
        self.pending.clear();
        self.touched = true;
        if !self.source.read_into(&mut self.pending)? {
            return Ok(false);
        }

        let schema = self.schema.as_ref().ok_or(ReaderError::NotInitialized)?;
        schema.validate_row(&self.pending)?;
        Ok(true)
    }

    /// Make sure the lookahead slot holds the outcome of the next record.
    fn fill(&mut self) {
        if !matches!(self.lookahead, Lookahead::Empty) {
            return;
        }

        self.lookahead = loop {
            match self.pull() {
                Ok(true) => break Lookahead::Row,
                Ok(false) => break Lookahead::End,
                Err(ReaderError::SchemaMismatch(err)) if self.policy == MismatchPolicy::Skip => {
                    self.stats.skipped += 1;
                    warn!(
                        source = %self.source.describe(),
                        pass = self.stats.pass,
                        record = self.stats.rows + self.stats.skipped,
                        "skipping record: {err}"
                    );
                }
                Err(err) => break Lookahead::Failed(err),
            }
        };
    }

    fn finish_pass(&mut self) {
        self.state = ReaderState::Exhausted;
        self.lookahead = Lookahead::Empty;
        debug!(
            source = %self.source.describe(),
            pass = self.stats.pass,
            rows = self.stats.rows,
            skipped = self.stats.skipped,
            "pass complete"
        );
    }
}

impl<S: RecordSource> RecordReader for Reader<S> {
    fn init(&mut self) -> Result<(), ReaderError> {
        match self.state {
            ReaderState::Uninitialized => {}
            ReaderState::Closed => return Err(ReaderError::ReaderClosed),
            _ => return Err(ReaderError::AlreadyInitialized),
        }

        match self.source.open() {
            Ok(schema) => {
                self.current = GenericRow::with_capacity(schema.len());
                self.pending = GenericRow::with_capacity(schema.len());
                debug!(
                    source = %self.source.describe(),
                    fields = schema.len(),
                    "reader initialized"
                );
                self.schema = Some(schema);
                self.stats = PassStats::start(1);
                self.state = ReaderState::Ready;
                Ok(())
            }
            Err(err) => {
                if let Err(release_err) = self.source.release() {
                    warn!(
                        source = %self.source.describe(),
                        "failed to release source after init error: {release_err}"
                    );
                }
                Err(err)
            }
        }
    }

    fn schema(&self) -> Result<SchemaRef, ReaderError> {
        self.ensure_open()?;
        self.schema.clone().ok_or(ReaderError::NotInitialized)
    }

    fn has_next(&mut self) -> Result<bool, ReaderError> {
        self.ensure_open()?;
        if self.state == ReaderState::Exhausted {
            return Ok(false);
        }

        self.fill();
        if matches!(self.lookahead, Lookahead::End) {
            self.finish_pass();
            return Ok(false);
        }
        Ok(true)
    }

    fn next_row(&mut self) -> Result<&GenericRow, ReaderError> {
        self.ensure_open()?;
        if self.state == ReaderState::Exhausted {
            return Err(ReaderError::IterationExhausted);
        }

        self.fill();
        match mem::replace(&mut self.lookahead, Lookahead::Empty) {
            Lookahead::Row => {
                mem::swap(&mut self.current, &mut self.pending);
                self.stats.rows += 1;
                self.state = ReaderState::Iterating;

                // Look one record ahead so the last row leaves the reader exhausted.
                self.fill();
                if matches!(self.lookahead, Lookahead::End) {
                    self.finish_pass();
                }
                Ok(&self.current)
            }
            Lookahead::Failed(err) => {
                // No further rows until the caller rewinds.
                self.state = ReaderState::Exhausted;
                debug!(
                    source = %self.source.describe(),
                    pass = self.stats.pass,
                    rows = self.stats.rows,
                    "pass halted: {err}"
                );
                Err(err)
            }
            Lookahead::End | Lookahead::Empty => {
                self.finish_pass();
                Err(ReaderError::IterationExhausted)
            }
        }
    }

    fn rewind(&mut self) -> Result<(), ReaderError> {
        self.ensure_open()?;
        if !self.touched {
            return Ok(());
        }

        self.source.reset()?;

        self.lookahead = Lookahead::Empty;
        self.current.clear();
        self.pending.clear();
        self.touched = false;
        self.stats = PassStats::start(self.stats.pass + 1);
        self.state = ReaderState::Ready;
        debug!(
            source = %self.source.describe(),
            pass = self.stats.pass,
            "reader rewound"
        );
        Ok(())
    }

    fn close(&mut self) -> Result<(), ReaderError> {
        let previous = mem::replace(&mut self.state, ReaderState::Closed);
        match previous {
            ReaderState::Closed | ReaderState::Uninitialized => return Ok(()),
            _ => {}
        }

        self.lookahead = Lookahead::Empty;
        self.schema = None;
        self.current.clear();
        self.pending.clear();
        debug!(source = %self.source.describe(), "reader closed");
        self.source.release()
    }

    fn state(&self) -> ReaderState {
        self.state
    }

    fn stats(&self) -> PassStats {
        self.stats
    }
}

impl<S: RecordSource> Drop for Reader<S> {
    fn drop(&mut self) {
        if matches!(
            self.state,
            ReaderState::Uninitialized | ReaderState::Closed
        ) {
            return;
        }
        if let Err(err) = self.close() {
            warn!(
                source = %self.source.describe(),
                "failed to release source on drop: {err}"
            );
        }
    }
}
