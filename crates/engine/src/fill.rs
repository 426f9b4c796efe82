//! Chunked ingestion of parsed records into a [`Table`].
//!
//! A [`TableFill`] pulls every record from a [`RecordSource`], creates the
//! columns, then adds rows `ingest.batchSize` at a time, one chunk per
//! [`TableFill::step`], so the host can yield between frames. Nothing is
//! recorded in the history and modified-status notifications stay locked
//! until the last chunk; the table then starts clean.

use std::error::Error;
use std::fmt;

use tabula_config::Settings;

use crate::error::TableError;
use crate::table::SharedTable;
use crate::value::{Row, Value};

// =============================================================================
// Record sources
// =============================================================================

/// How far a source has read through its input.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReadProgress {
    pub bytes_read: u64,
    pub total_bytes: u64,
    pub ratio: f64,
}

impl ReadProgress {
    pub fn new(bytes_read: u64, total_bytes: u64) -> Self {
        let ratio = if total_bytes == 0 { 1.0 } else { bytes_read as f64 / total_bytes as f64 };
        Self { bytes_read, total_bytes, ratio }
    }
}

/// Pull-style reader of parsed records. `Ok(None)` marks the end of input.
pub trait RecordSource {
    type Error: Error + 'static;

    fn read(&mut self) -> Result<Option<Vec<String>>, Self::Error>;

    fn progress(&self) -> ReadProgress;
}

/// The first records of `source`, for showing a sample before a full load.
/// The header row, if any, does not count toward `limit`.
pub fn preview<S: RecordSource>(source: &mut S, limit: usize, has_header: bool) -> Result<Vec<Vec<String>>, S::Error> {
    let limit = if has_header { limit + 1 } else { limit };
    let mut records = Vec::new();
    while records.len() < limit {
        match source.read()? {
            Some(record) => records.push(record),
            None => break,
        }
    }
    Ok(records)
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum FillError {
    /// The record source failed; rows added so far stay in the table.
    Source(Box<dyn Error>),
    Table(TableError),
    /// The fill was cancelled or its table destroyed.
    Cancelled,
    /// An earlier step failed; the fill can't continue.
    Failed,
}

impl fmt::Display for FillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(e) => write!(f, "failed to read records: {e}"),
            Self::Table(e) => write!(f, "failed to fill table: {e}"),
            Self::Cancelled => write!(f, "table fill was cancelled"),
            Self::Failed => write!(f, "table fill already failed"),
        }
    }
}

impl Error for FillError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Source(e) => Some(e.as_ref()),
            Self::Table(e) => Some(e),
            Self::Cancelled | Self::Failed => None,
        }
    }
}

impl From<TableError> for FillError {
    fn from(e: TableError) -> Self {
        match e {
            TableError::Destroyed => Self::Cancelled,
            e => Self::Table(e),
        }
    }
}

// =============================================================================
// TableFill
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillState {
    /// Nothing read yet.
    Pending,
    /// Columns exist, rows are being added.
    Filling,
    Done,
    Cancelled,
    Failed,
}

/// Rows added so far against the total to add.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillProgress {
    pub length: usize,
    pub total: usize,
    pub ratio: f64,
}

impl FillProgress {
    fn new(length: usize, total: usize) -> Self {
        let ratio = if total == 0 { 1.0 } else { length as f64 / total as f64 };
        Self { length, total, ratio }
    }
}

pub struct TableFill<S> {
    source: S,
    table: SharedTable,
    has_header: bool,
    batch_size: usize,
    pending: Vec<Row>,
    total: usize,
    filled: usize,
    state: FillState,
}

impl<S: RecordSource> TableFill<S> {
    /// Fill `table`, which is expected to be empty, from `source`.
    pub fn new(source: S, table: SharedTable, settings: &Settings, has_header: bool) -> Self {
        Self {
            source,
            table,
            has_header,
            batch_size: settings.ingest_batch_size.max(1),
            pending: Vec::new(),
            total: 0,
            filled: 0,
            state: FillState::Pending,
        }
    }

    pub fn state(&self) -> FillState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, FillState::Done | FillState::Cancelled | FillState::Failed)
    }

    pub fn progress(&self) -> FillProgress {
        FillProgress::new(self.filled, self.total)
    }

    pub fn read_progress(&self) -> ReadProgress {
        self.source.progress()
    }

    pub fn table(&self) -> &SharedTable {
        &self.table
    }

    /// Stop before the next chunk. Rows already added stay in the table.
    pub fn cancel(&mut self) {
        if self.is_finished() {
            return;
        }
        log::debug!("fill: cancelled after {} of {} rows", self.filled, self.total);
        self.stop(FillState::Cancelled);
    }

    /// Enter a terminal state and release the modified-status lock.
    fn stop(&mut self, state: FillState) {
        self.state = state;
        self.pending.clear();
        let mut table = self.table.borrow_mut();
        if !table.is_destroyed() {
            table.unlock_modified_status();
        }
    }

    fn fail(&mut self, error: FillError) -> FillError {
        let state = match error {
            FillError::Cancelled => FillState::Cancelled,
            _ => FillState::Failed,
        };
        if state == FillState::Failed {
            log::warn!("fill: {} after {} of {} rows", error, self.filled, self.total);
        }
        self.stop(state);
        error
    }

    /// Do one unit of work: read and create columns on the first call, then
    /// add one chunk of rows per call.
    pub fn step(&mut self) -> Result<FillProgress, FillError> {
        match self.state {
            FillState::Done => return Ok(self.progress()),
            FillState::Cancelled => return Err(FillError::Cancelled),
            FillState::Failed => return Err(FillError::Failed),
            FillState::Pending | FillState::Filling => {}
        }
        if self.table.borrow().is_destroyed() {
            return Err(self.fail(FillError::Cancelled));
        }

        if self.state == FillState::Pending {
            if let Err(e) = self.prepare() {
                return Err(self.fail(e));
            }
            self.state = FillState::Filling;
        }

        let take = self.batch_size.min(self.pending.len());
        let chunk: Vec<Row> = self.pending.drain(..take).collect();
        if !chunk.is_empty() {
            let added = self.table.borrow_mut().untracked(|table| table.add_rows(chunk));
            if let Err(e) = added {
                return Err(self.fail(e.into()));
            }
            self.filled += take;
            log::debug!("fill: chunk of {} rows, {}/{}", take, self.filled, self.total);
        }

        if self.pending.is_empty() {
            self.finish();
        }
        Ok(self.progress())
    }

    /// Step until finished.
    pub fn run(&mut self) -> Result<FillProgress, FillError> {
        loop {
            let progress = self.step()?;
            if self.state == FillState::Done {
                return Ok(progress);
            }
        }
    }

    fn prepare(&mut self) -> Result<(), FillError> {
        let mut records = Vec::new();
        let mut width = 0;
        while let Some(record) = self.source.read().map_err(|e| FillError::Source(Box::new(e)))? {
            width = width.max(record.len());
            records.push(record);
        }
        log::debug!("fill: read {} records, {} columns wide", records.len(), width);

        let mut records = records.into_iter();
        let header = if self.has_header { records.next() } else { None };

        let mut table = self.table.borrow_mut();
        table.lock_modified_status();
        table.untracked(|table| -> Result<(), TableError> {
            let names = header.unwrap_or_default();
            for index in 0..width.max(names.len()) {
                let name = names.get(index).map(String::as_str).filter(|name| !name.is_empty());
                table.add_column(name)?;
            }
            Ok(())
        })?;
        drop(table);

        self.pending = records.map(|record| record.into_iter().map(Value::from).collect()).collect();
        self.total = self.pending.len();
        Ok(())
    }

    fn finish(&mut self) {
        let mut table = self.table.borrow_mut();
        table.initialize_after_setup();
        table.unlock_modified_status();
        self.state = FillState::Done;
        log::debug!("fill: table {} filled with {} rows", table.id(), self.filled);
    }
}
