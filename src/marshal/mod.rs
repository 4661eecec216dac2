//! # Marshaling Pipeline
//!
//! The drivers that move typed columns between the relational engine and
//! descriptor-shaped row storage. One generic fetch routine and one generic
//! bind routine serve every row shape, so generated code carries only a
//! descriptor and a value list.
//!
//! ## Directions
//!
//! ```text
//! engine row ──fetch_all_rows──▶ ResultSet      (vault-encodes flagged columns)
//! engine row ──fetch_row───────▶ Cursor         (locals/out-params, never encoded)
//! ResultSet  ──copy_out_row────▶ Cursor         (vault-decodes flagged columns)
//! in-memory  ──RowSetBuilder───▶ ResultSet      (vault-encodes flagged columns)
//! values     ──bind_all────────▶ statement      (null-binds logical nulls)
//! ```
//!
//! Two fetch entry points exist on purpose: `fetch_all_rows` encodes because
//! it materializes user-visible result-set output; `fetch_row` does not,
//! because it fills ordinary locals that never leave the process as wire
//! data.
//!
//! ## Failure discipline
//!
//! Engine errors are recoverable and propagate as `eyre` results. A failure
//! mid row-set construction first releases every reference accumulated so
//! far and frees the buffer; partial result sets are never exposed.

mod encoder;

pub use encoder::{Encoder, EncoderRef};

use std::rc::Rc;

use eyre::Result;

use crate::buffer::ByteBuf;
use crate::engine::{Connection, Statement, StepResult};
use crate::rows::access;
use crate::rows::{Cursor, ResultSet, RowDescriptor, RowView};
use crate::types::{ColumnType, CoreType, Nullable, RefValue, Value};

/// Reads one engine column as a typed [`Value`] per the descriptor's tag.
/// Reference columns always read through the nullable accessors; the engine
/// reports SQL NULL, the row storage decides what that means.
fn read_column_value(stmt: &dyn Statement, col: usize, ty: ColumnType) -> Value {
    match ty.core {
        CoreType::Int32 => {
            if ty.nullable {
                if stmt.column_is_null(col) {
                    Value::NullableInt32(Nullable::null())
                } else {
                    Value::NullableInt32(Nullable::of(stmt.column_i32(col)))
                }
            } else {
                Value::Int32(stmt.column_i32(col))
            }
        }
        CoreType::Int64 => {
            if ty.nullable {
                if stmt.column_is_null(col) {
                    Value::NullableInt64(Nullable::null())
                } else {
                    Value::NullableInt64(Nullable::of(stmt.column_i64(col)))
                }
            } else {
                Value::Int64(stmt.column_i64(col))
            }
        }
        CoreType::Double => {
            if ty.nullable {
                if stmt.column_is_null(col) {
                    Value::NullableDouble(Nullable::null())
                } else {
                    Value::NullableDouble(Nullable::of(stmt.column_f64(col)))
                }
            } else {
                Value::Double(stmt.column_f64(col))
            }
        }
        CoreType::Bool => {
            if ty.nullable {
                if stmt.column_is_null(col) {
                    Value::NullableBool(Nullable::null())
                } else {
                    Value::NullableBool(Nullable::of(stmt.column_i32(col) != 0))
                }
            } else {
                Value::Bool(stmt.column_i32(col) != 0)
            }
        }
        CoreType::Text => Value::NullableText(stmt.column_text(col)),
        CoreType::Blob => Value::NullableBlob(stmt.column_blob(col)),
        CoreType::Object => panic!("object columns cannot be fetched from a statement"),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Transform {
    Encode,
    Decode,
}

/// Applies the vault transform to one value. Logical nulls pass through.
fn transform_value(
    encoder: &dyn Encoder,
    value: &Value,
    context: Option<&Value>,
    direction: Transform,
) -> Value {
    let decode = direction == Transform::Decode;
    match value {
        Value::Int32(v) => Value::Int32(if decode {
            encoder.decode_i32(*v, context)
        } else {
            encoder.encode_i32(*v, context)
        }),
        Value::Int64(v) => Value::Int64(if decode {
            encoder.decode_i64(*v, context)
        } else {
            encoder.encode_i64(*v, context)
        }),
        Value::Double(v) => Value::Double(if decode {
            encoder.decode_f64(*v, context)
        } else {
            encoder.encode_f64(*v, context)
        }),
        Value::Bool(v) => Value::Bool(if decode {
            encoder.decode_bool(*v, context)
        } else {
            encoder.encode_bool(*v, context)
        }),
        Value::Text(s) => Value::Text(if decode {
            encoder.decode_text(s, context)
        } else {
            encoder.encode_text(s, context)
        }),
        Value::Blob(b) => Value::Blob(if decode {
            encoder.decode_blob(b, context)
        } else {
            encoder.encode_blob(b, context)
        }),
        Value::NullableInt32(v) => Value::NullableInt32(match v.get() {
            Some(v) => Nullable::of(if decode {
                encoder.decode_i32(v, context)
            } else {
                encoder.encode_i32(v, context)
            }),
            None => Nullable::null(),
        }),
        Value::NullableInt64(v) => Value::NullableInt64(match v.get() {
            Some(v) => Nullable::of(if decode {
                encoder.decode_i64(v, context)
            } else {
                encoder.encode_i64(v, context)
            }),
            None => Nullable::null(),
        }),
        Value::NullableDouble(v) => Value::NullableDouble(match v.get() {
            Some(v) => Nullable::of(if decode {
                encoder.decode_f64(v, context)
            } else {
                encoder.encode_f64(v, context)
            }),
            None => Nullable::null(),
        }),
        Value::NullableBool(v) => Value::NullableBool(match v.get() {
            Some(v) => Nullable::of(if decode {
                encoder.decode_bool(v, context)
            } else {
                encoder.encode_bool(v, context)
            }),
            None => Nullable::null(),
        }),
        Value::NullableText(s) => Value::NullableText(s.as_ref().map(|s| {
            if decode {
                encoder.decode_text(s, context)
            } else {
                encoder.encode_text(s, context)
            }
        })),
        Value::NullableBlob(b) => Value::NullableBlob(b.as_ref().map(|b| {
            if decode {
                encoder.decode_blob(b, context)
            } else {
                encoder.encode_blob(b, context)
            }
        })),
        Value::Object(_) | Value::NullableObject(_) => {
            unreachable!("object columns are never vault-encoded")
        }
    }
}

/// Reads the encode-context value for one row, if the descriptor names one.
/// The context column itself is stored raw, so this is a plain read.
fn context_value(
    desc: &RowDescriptor,
    scalars: &[u8],
    refs: &[Option<RefValue>],
) -> Option<Value> {
    desc.encode_context()
        .map(|col| access::get_value(desc, scalars, refs, col))
}

/// Fetches every column of the engine's current row into one row of
/// storage, vault-encoding flagged columns when an encoder is present.
/// The context column, if any, is fetched first and never encoded.
fn fetch_row_storage(
    stmt: &dyn Statement,
    desc: &RowDescriptor,
    scalars: &mut [u8],
    refs: &mut [Option<RefValue>],
    encoder: Option<&EncoderRef>,
) {
    let context_col = desc.encode_context();
    if let Some(col) = context_col {
        let value = read_column_value(stmt, col, desc.column(col).ty);
        access::set_value(desc, scalars, refs, col, &value);
    }
    let context = context_value(desc, scalars, refs);

    for col in 0..desc.column_count() {
        if Some(col) == context_col {
            continue;
        }
        let ty = desc.column(col).ty;
        let mut value = read_column_value(stmt, col, ty);
        if ty.encoded {
            if let Some(encoder) = encoder {
                value = transform_value(encoder.as_ref(), &value, context.as_ref(), Transform::Encode);
            }
        }
        access::set_value(desc, scalars, refs, col, &value);
    }
}

/// Steps the statement to completion, materializing every row into a result
/// set. Flagged columns are vault-encoded because this output is the
/// user-visible materialization of the query.
///
/// On any engine failure the rows accumulated so far have their references
/// released and their buffer freed before the error propagates; a partial
/// result set is never exposed.
pub fn fetch_all_rows<'a>(
    conn: &dyn Connection,
    mut stmt: Box<dyn Statement + 'a>,
    desc: &Rc<RowDescriptor>,
) -> Result<ResultSet> {
    let encoder = if desc.has_encoded_columns() {
        conn.encoder()
    } else {
        None
    };

    let scalar_size = desc.scalar_size();
    let ref_count = desc.ref_count();
    let mut buf = ByteBuf::open();
    let mut refs: Vec<Option<RefValue>> = Vec::new();
    let mut count = 0usize;

    loop {
        match stmt.step() {
            Ok(StepResult::Done) => break,
            Ok(StepResult::Row) => {
                let scalar_range = buf.alloc(scalar_size);
                let ref_start = refs.len();
                refs.resize(ref_start + ref_count, None);
                fetch_row_storage(
                    stmt.as_ref(),
                    desc,
                    buf.slice_mut(scalar_range),
                    &mut refs[ref_start..],
                    encoder.as_ref(),
                );
                count += 1;
            }
            Err(err) => {
                tracing::error!(rows = count, error = %err, "fetch failed mid result set");
                // release every accumulated reference, then the buffer
                refs.clear();
                buf.close();
                return Err(err);
            }
        }
    }

    tracing::debug!(rows = count, "result set materialized");
    Ok(ResultSet::from_parts(desc.clone(), buf.into_vec(), refs, count))
}

/// Fills a cursor from the engine's current row, given the step outcome the
/// caller already has in hand. No encoding happens here: the outputs are
/// ordinary locals, not result-set output.
///
/// When there is no current row, every output is put into its canonical
/// zero/null state so the caller can consume outputs unconditionally.
pub fn fetch_row(step: StepResult, stmt: &dyn Statement, cursor: &mut Cursor) {
    if step != StepResult::Row {
        cursor.set_no_row();
        return;
    }

    let desc = cursor.descriptor().clone();
    let (scalars, refs) = cursor.storage_mut();
    fetch_row_storage(stmt, &desc, scalars, refs, None);
    cursor.set_has_row(true);
}

/// Copies one row's values out of a result set into a cursor, vault-decoding
/// flagged columns when the connection has an encoder. This is the read-back
/// path for previously materialized values.
///
/// A row index past the end puts the cursor into the canonical no-row state
/// rather than failing, matching the end-of-cursor contract of `fetch_row`.
pub fn copy_out_row(
    conn: Option<&dyn Connection>,
    rs: &ResultSet,
    row: usize,
    cursor: &mut Cursor,
) {
    assert!(
        cursor.descriptor().layout_eq(rs.descriptor()),
        "cursor shape does not match the result set"
    );

    if row >= rs.count() {
        cursor.set_no_row();
        return;
    }

    let decoder = conn.and_then(|c| {
        if rs.descriptor().has_encoded_columns() {
            c.encoder()
        } else {
            None
        }
    });

    let view = rs.row_view(row);
    let desc = rs.descriptor();
    let context = desc.encode_context().map(|col| view.value(col));

    for col in 0..desc.column_count() {
        let ty = desc.column(col).ty;
        let mut value = view.value(col);
        if ty.encoded {
            if let Some(decoder) = decoder.as_ref() {
                value =
                    transform_value(decoder.as_ref(), &value, context.as_ref(), Transform::Decode);
            }
        }
        cursor.set_value(col, &value);
    }
    cursor.set_has_row(true);
}

/// Binds a value list into a statement's parameter slots (1-based), skipping
/// positions whose predicate is false and null-binding logical nulls. The
/// first failure finalizes the statement and short-circuits the rest.
pub fn bind_all<'a>(
    mut stmt: Box<dyn Statement + 'a>,
    args: &[Value],
    preds: Option<&[bool]>,
) -> Result<Box<dyn Statement + 'a>> {
    if let Some(preds) = preds {
        assert_eq!(preds.len(), args.len(), "predicate mask length mismatch");
    }

    let mut param = 1usize;
    for (i, arg) in args.iter().enumerate() {
        if let Some(preds) = preds {
            if !preds[i] {
                continue;
            }
        }
        if let Err(err) = bind_one(stmt.as_mut(), param, arg) {
            tracing::debug!(param, error = %err, "bind failed, finalizing statement");
            drop(stmt);
            return Err(err);
        }
        param += 1;
    }
    Ok(stmt)
}

fn bind_one(stmt: &mut dyn Statement, idx: usize, arg: &Value) -> Result<()> {
    match arg {
        Value::Int32(v) => stmt.bind_i32(idx, *v),
        Value::Int64(v) => stmt.bind_i64(idx, *v),
        Value::Double(v) => stmt.bind_f64(idx, *v),
        Value::Bool(v) => stmt.bind_i32(idx, *v as i32),
        Value::Text(s) => stmt.bind_text(idx, s),
        Value::Blob(b) => stmt.bind_blob(idx, b),
        Value::NullableInt32(v) => match v.get() {
            Some(v) => stmt.bind_i32(idx, v),
            None => stmt.bind_null(idx),
        },
        Value::NullableInt64(v) => match v.get() {
            Some(v) => stmt.bind_i64(idx, v),
            None => stmt.bind_null(idx),
        },
        Value::NullableDouble(v) => match v.get() {
            Some(v) => stmt.bind_f64(idx, v),
            None => stmt.bind_null(idx),
        },
        Value::NullableBool(v) => match v.get() {
            Some(v) => stmt.bind_i32(idx, v as i32),
            None => stmt.bind_null(idx),
        },
        Value::NullableText(s) => match s {
            Some(s) => stmt.bind_text(idx, s),
            None => stmt.bind_null(idx),
        },
        Value::NullableBlob(b) => match b {
            Some(b) => stmt.bind_blob(idx, b),
            None => stmt.bind_null(idx),
        },
        Value::Object(_) | Value::NullableObject(_) => {
            panic!("object values cannot cross the engine boundary")
        }
    }
}

/// Accumulates rows built in memory (duplicating and retaining each one)
/// and wraps them as a result set, applying the vault-encode pass that any
/// materialization gets.
#[derive(Debug)]
pub struct RowSetBuilder {
    desc: Rc<RowDescriptor>,
    buf: ByteBuf,
    refs: Vec<Option<RefValue>>,
    count: usize,
}

impl RowSetBuilder {
    pub fn new(desc: Rc<RowDescriptor>) -> Self {
        Self {
            desc,
            buf: ByteBuf::open(),
            refs: Vec::new(),
            count: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Appends a retained duplicate of the viewed row.
    pub fn push_row(&mut self, row: &RowView<'_>) {
        assert!(row.has_row(), "cannot append a cursor with no row");
        assert!(
            self.desc.layout_eq(row.descriptor()),
            "row shape does not match the builder"
        );
        let range = self.buf.alloc(self.desc.scalar_size());
        self.buf.slice_mut(range).copy_from_slice(row.scalars());
        // cloning the slots is the retain sweep
        self.refs.extend(row.refs().iter().cloned());
        self.count += 1;
    }

    /// Wraps the accumulated rows as a result set. When the connection has
    /// an encoder, flagged columns are vault-encoded first: this is the
    /// materialization point for in-memory row construction.
    pub fn into_result_set(self, conn: Option<&dyn Connection>) -> ResultSet {
        let mut rs = ResultSet::from_parts(self.desc, self.buf.into_vec(), self.refs, self.count);
        if let Some(conn) = conn {
            if rs.descriptor().has_encoded_columns() {
                if let Some(encoder) = conn.encoder() {
                    encode_result_set(&mut rs, &encoder);
                }
            }
        }
        rs
    }
}

/// The encode pass over a freshly materialized result set.
fn encode_result_set(rs: &mut ResultSet, encoder: &EncoderRef) {
    let desc = rs.descriptor().clone();
    for row in 0..rs.count() {
        let (scalars, refs) = rs.row_storage_mut(row);
        let context = context_value(&desc, scalars, refs);
        for col in 0..desc.column_count() {
            let ty = desc.column(col).ty;
            if !ty.encoded || Some(col) == desc.encode_context() {
                continue;
            }
            let value = access::get_value(&desc, scalars, refs, col);
            let encoded =
                transform_value(encoder.as_ref(), &value, context.as_ref(), Transform::Encode);
            access::set_value(&desc, scalars, refs, col, &encoded);
        }
    }
}
