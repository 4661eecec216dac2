//! In-memory fake of the relational-engine boundary.
//!
//! The fake serves canned rows through the `Statement` trait, records every
//! bind it receives, counts statement finalizations (drops), and can be
//! told to fail at a chosen step or bind. That is enough to exercise the
//! whole marshaling pipeline without a real engine.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use eyre::{bail, Result};
use rowcore::marshal::{Encoder, EncoderRef};
use rowcore::types::{BlobRef, TextRef, Value};
use rowcore::{Connection, Statement, StepResult};

/// One engine-level cell. Text and blob cells hand out clones of a shared
/// allocation so tests can watch reference counts.
#[derive(Debug, Clone)]
pub enum EngineCell {
    Null,
    Int(i64),
    Float(f64),
    Text(TextRef),
    Blob(BlobRef),
}

pub fn text(s: &str) -> EngineCell {
    EngineCell::Text(Rc::from(s))
}

pub fn blob(b: &[u8]) -> EngineCell {
    EngineCell::Blob(Rc::from(b))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

#[derive(Default)]
pub struct FakeDb {
    pub rows: Vec<Vec<EngineCell>>,
    pub encoder: Option<EncoderRef>,
    /// 0-based step index at which `step` reports an engine failure.
    pub fail_step_at: Option<usize>,
    /// 1-based parameter index at which `bind_*` fails.
    pub fail_bind_at: Option<usize>,
    pub finalized: Rc<Cell<usize>>,
    pub bound: Rc<RefCell<Vec<Bound>>>,
}

impl FakeDb {
    pub fn with_rows(rows: Vec<Vec<EngineCell>>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }
}

pub struct FakeStmt {
    rows: Vec<Vec<EngineCell>>,
    cursor: Option<usize>,
    steps: usize,
    fail_step_at: Option<usize>,
    fail_bind_at: Option<usize>,
    finalized: Rc<Cell<usize>>,
    bound: Rc<RefCell<Vec<Bound>>>,
}

impl Drop for FakeStmt {
    fn drop(&mut self) {
        self.finalized.set(self.finalized.get() + 1);
    }
}

impl FakeStmt {
    fn cell(&self, col: usize) -> &EngineCell {
        let row = self.cursor.expect("column read without a current row");
        &self.rows[row][col]
    }

    fn record(&mut self, idx: usize, value: Bound) -> Result<()> {
        if self.fail_bind_at == Some(idx) {
            bail!("bind rejected at parameter {}", idx);
        }
        self.bound.borrow_mut().push(value);
        Ok(())
    }
}

impl Statement for FakeStmt {
    fn step(&mut self) -> Result<StepResult> {
        if self.fail_step_at == Some(self.steps) {
            bail!("engine failure at step {}", self.steps);
        }
        let next = match self.cursor {
            None => 0,
            Some(i) => i + 1,
        };
        self.steps += 1;
        if next < self.rows.len() {
            self.cursor = Some(next);
            Ok(StepResult::Row)
        } else {
            Ok(StepResult::Done)
        }
    }

    fn column_is_null(&self, col: usize) -> bool {
        matches!(self.cell(col), EngineCell::Null)
    }

    fn column_i32(&self, col: usize) -> i32 {
        match self.cell(col) {
            EngineCell::Int(v) => *v as i32,
            _ => 0,
        }
    }

    fn column_i64(&self, col: usize) -> i64 {
        match self.cell(col) {
            EngineCell::Int(v) => *v,
            _ => 0,
        }
    }

    fn column_f64(&self, col: usize) -> f64 {
        match self.cell(col) {
            EngineCell::Float(v) => *v,
            _ => 0.0,
        }
    }

    fn column_text(&self, col: usize) -> Option<TextRef> {
        match self.cell(col) {
            EngineCell::Text(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn column_blob(&self, col: usize) -> Option<BlobRef> {
        match self.cell(col) {
            EngineCell::Blob(b) => Some(b.clone()),
            _ => None,
        }
    }

    fn bind_i32(&mut self, idx: usize, value: i32) -> Result<()> {
        self.record(idx, Bound::Int(value as i64))
    }

    fn bind_i64(&mut self, idx: usize, value: i64) -> Result<()> {
        self.record(idx, Bound::Int(value))
    }

    fn bind_f64(&mut self, idx: usize, value: f64) -> Result<()> {
        self.record(idx, Bound::Float(value))
    }

    fn bind_text(&mut self, idx: usize, value: &str) -> Result<()> {
        self.record(idx, Bound::Text(value.to_string()))
    }

    fn bind_blob(&mut self, idx: usize, value: &[u8]) -> Result<()> {
        self.record(idx, Bound::Blob(value.to_vec()))
    }

    fn bind_null(&mut self, idx: usize) -> Result<()> {
        self.record(idx, Bound::Null)
    }
}

impl Connection for FakeDb {
    fn prepare<'a>(&'a self, _sql: &str) -> Result<Box<dyn Statement + 'a>> {
        Ok(Box::new(FakeStmt {
            rows: self.rows.clone(),
            cursor: None,
            steps: 0,
            fail_step_at: self.fail_step_at,
            fail_bind_at: self.fail_bind_at,
            finalized: self.finalized.clone(),
            bound: self.bound.clone(),
        }))
    }

    fn encoder(&self) -> Option<EncoderRef> {
        self.encoder.clone()
    }
}

/// Reversible toy vault: xors scalars and reverses text/blob bytes, mixing
/// in the context value so per-row determinism is observable.
pub struct XorVault;

fn context_key(context: Option<&Value>) -> i64 {
    match context {
        Some(Value::Int32(v)) => *v as i64,
        Some(Value::Int64(v)) => *v,
        Some(Value::Text(s)) => s.len() as i64,
        _ => 0,
    }
}

impl Encoder for XorVault {
    fn encode_i32(&self, value: i32, context: Option<&Value>) -> i32 {
        value ^ 0x5A5A ^ context_key(context) as i32
    }

    fn decode_i32(&self, value: i32, context: Option<&Value>) -> i32 {
        value ^ 0x5A5A ^ context_key(context) as i32
    }

    fn encode_i64(&self, value: i64, context: Option<&Value>) -> i64 {
        value ^ 0x5A5A_5A5A ^ context_key(context)
    }

    fn decode_i64(&self, value: i64, context: Option<&Value>) -> i64 {
        value ^ 0x5A5A_5A5A ^ context_key(context)
    }

    fn encode_f64(&self, value: f64, _context: Option<&Value>) -> f64 {
        -value
    }

    fn decode_f64(&self, value: f64, _context: Option<&Value>) -> f64 {
        -value
    }

    fn encode_bool(&self, value: bool, _context: Option<&Value>) -> bool {
        !value
    }

    fn decode_bool(&self, value: bool, _context: Option<&Value>) -> bool {
        !value
    }

    fn encode_text(&self, value: &TextRef, _context: Option<&Value>) -> TextRef {
        value.chars().rev().collect::<String>().into()
    }

    fn decode_text(&self, value: &TextRef, _context: Option<&Value>) -> TextRef {
        value.chars().rev().collect::<String>().into()
    }

    fn encode_blob(&self, value: &BlobRef, _context: Option<&Value>) -> BlobRef {
        value.iter().map(|b| b ^ 0x5A).collect::<Vec<_>>().into()
    }

    fn decode_blob(&self, value: &BlobRef, _context: Option<&Value>) -> BlobRef {
        value.iter().map(|b| b ^ 0x5A).collect::<Vec<_>>().into()
    }
}
