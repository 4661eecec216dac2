//! # Relational Engine Boundary
//!
//! The marshaling pipeline is engine-agnostic: everything it needs from the
//! backing relational engine is the statement life cycle below. Any engine
//! that can prepare a statement, step it, bind parameters, and read typed
//! columns can sit behind these traits.
//!
//! | Operation | Here | Notes |
//! |-----------|------|-------|
//! | prepare   | [`Connection::prepare`] | SQL text to statement |
//! | step      | [`Statement::step`] | `Row` / `Done`, errors propagate |
//! | bind      | [`Statement::bind_*`] | 1-based parameter index |
//! | column    | [`Statement::column_*`] | 0-based column index |
//! | finalize  | dropping the statement | |
//!
//! Engine failures are ordinary recoverable errors: they surface as
//! `eyre::Result` values and propagate to the immediate caller. Statement
//! finalization rides on `Drop`, so an error path that discards the
//! statement has finalized it.
//!
//! The connection also hands out the vault encoder, if one is configured
//! for it; `None` means column encoding is a no-op for that connection.

use eyre::Result;

use crate::marshal::EncoderRef;
use crate::types::{BlobRef, TextRef};

/// Outcome of a successful step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// A row is available for column reads.
    Row,
    /// The statement is exhausted.
    Done,
}

/// A prepared statement. Column indexes are 0-based, parameter indexes
/// 1-based, matching the conventions of every mainstream SQL engine.
pub trait Statement {
    fn step(&mut self) -> Result<StepResult>;

    /// True when the current row's column holds SQL NULL.
    fn column_is_null(&self, col: usize) -> bool;
    fn column_i32(&self, col: usize) -> i32;
    fn column_i64(&self, col: usize) -> i64;
    fn column_f64(&self, col: usize) -> f64;
    /// `None` for SQL NULL.
    fn column_text(&self, col: usize) -> Option<TextRef>;
    /// `None` for SQL NULL.
    fn column_blob(&self, col: usize) -> Option<BlobRef>;

    fn bind_i32(&mut self, idx: usize, value: i32) -> Result<()>;
    fn bind_i64(&mut self, idx: usize, value: i64) -> Result<()>;
    fn bind_f64(&mut self, idx: usize, value: f64) -> Result<()>;
    fn bind_text(&mut self, idx: usize, value: &str) -> Result<()>;
    fn bind_blob(&mut self, idx: usize, value: &[u8]) -> Result<()>;
    fn bind_null(&mut self, idx: usize) -> Result<()>;
}

/// A connection to the backing engine.
pub trait Connection {
    fn prepare<'a>(&'a self, sql: &str) -> Result<Box<dyn Statement + 'a>>;

    /// The vault encoder configured for this connection, if any.
    fn encoder(&self) -> Option<EncoderRef> {
        None
    }
}
