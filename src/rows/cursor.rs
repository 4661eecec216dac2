//! # Dynamic Cursor
//!
//! A descriptor-driven view over a single row, used where an algorithm must
//! work generically over "whatever row shape the caller has" without a full
//! result set: partition keys and values, single-row serialization, fetching
//! into locals, and diagnostics formatting.
//!
//! [`Cursor`] owns one row's storage plus a has-row flag. [`RowView`] is the
//! borrowed form handed to generic algorithms; both a cursor and a result
//! set row can produce one.

use std::fmt::Write;
use std::rc::Rc;

use crate::types::{BlobRef, CoreType, Nullable, ObjectRef, RefValue, TextRef, Value};

use super::access;
use super::descriptor::RowDescriptor;

/// Borrowed, non-owning view over one row's storage.
#[derive(Clone, Copy)]
pub struct RowView<'a> {
    pub(crate) desc: &'a Rc<RowDescriptor>,
    pub(crate) scalars: &'a [u8],
    pub(crate) refs: &'a [Option<RefValue>],
    pub(crate) has_row: bool,
}

impl<'a> RowView<'a> {
    pub(crate) fn new(
        desc: &'a Rc<RowDescriptor>,
        scalars: &'a [u8],
        refs: &'a [Option<RefValue>],
        has_row: bool,
    ) -> Self {
        Self {
            desc,
            scalars,
            refs,
            has_row,
        }
    }

    pub fn descriptor(&self) -> &Rc<RowDescriptor> {
        self.desc
    }

    pub fn has_row(&self) -> bool {
        self.has_row
    }

    /// Reads any column as a typed [`Value`].
    pub fn value(&self, col: usize) -> Value {
        access::get_value(self.desc, self.scalars, self.refs, col)
    }

    pub(crate) fn scalars(&self) -> &'a [u8] {
        self.scalars
    }

    pub(crate) fn refs(&self) -> &'a [Option<RefValue>] {
        self.refs
    }

    /// Hash of the viewed row; a view with no row hashes to zero.
    pub fn hash(&self) -> u64 {
        if !self.has_row {
            return 0;
        }
        access::hash_row(self.desc, self.scalars, self.refs)
    }
}

/// Equality of two row views. The layouts must match and both must have (or
/// both lack) a current row; two no-row views of the same shape are equal.
pub fn row_views_equal(a: &RowView<'_>, b: &RowView<'_>) -> bool {
    if !a.desc.layout_eq(b.desc) || a.has_row != b.has_row {
        return false;
    }
    if !a.has_row {
        return true;
    }
    access::rows_equal_raw(a.scalars, a.refs, b.scalars, b.refs)
}

/// One row of descriptor-shaped storage with a has-row flag.
#[derive(Debug)]
pub struct Cursor {
    desc: Rc<RowDescriptor>,
    scalars: Vec<u8>,
    refs: Vec<Option<RefValue>>,
    has_row: bool,
}

impl Cursor {
    /// A cursor in the no-row state.
    pub fn new(desc: Rc<RowDescriptor>) -> Self {
        let mut scalars = vec![0; desc.scalar_size()];
        let mut refs = vec![None; desc.ref_count()];
        access::set_no_row_state(&desc, &mut scalars, &mut refs);
        Self {
            desc,
            scalars,
            refs,
            has_row: false,
        }
    }

    pub fn descriptor(&self) -> &Rc<RowDescriptor> {
        &self.desc
    }

    pub fn has_row(&self) -> bool {
        self.has_row
    }

    pub fn set_has_row(&mut self, has_row: bool) {
        self.has_row = has_row;
    }

    /// Borrowed view of the cursor's row.
    pub fn view(&self) -> RowView<'_> {
        RowView::new(&self.desc, &self.scalars, &self.refs, self.has_row)
    }

    /// Clears to the canonical no-row state: references released, not-null
    /// scalars zeroed, nullable scalars null. Callers can consume every
    /// column unconditionally afterwards.
    pub fn set_no_row(&mut self) {
        self.has_row = false;
        access::set_no_row_state(&self.desc, &mut self.scalars, &mut self.refs);
    }

    /// Releases the cursor's references without touching the scalars.
    pub(crate) fn clear_references(&mut self) {
        for slot in self.refs.iter_mut() {
            *slot = None;
        }
    }

    cursor_scalar_accessors! {
        i32 => i32,
        i64 => i64,
        f64 => f64,
        bool => bool,
    }

    pub fn get_nullable_i32(&self, col: usize) -> Nullable<i32> {
        access::get_nullable(&self.desc, &self.scalars, col)
    }

    pub fn get_nullable_i64(&self, col: usize) -> Nullable<i64> {
        access::get_nullable(&self.desc, &self.scalars, col)
    }

    pub fn get_nullable_f64(&self, col: usize) -> Nullable<f64> {
        access::get_nullable(&self.desc, &self.scalars, col)
    }

    pub fn get_nullable_bool(&self, col: usize) -> Nullable<bool> {
        access::get_nullable(&self.desc, &self.scalars, col)
    }

    pub fn get_text(&self, col: usize) -> Option<TextRef> {
        match access::get_ref(&self.desc, &self.refs, col, CoreType::Text) {
            Some(RefValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_blob(&self, col: usize) -> Option<BlobRef> {
        match access::get_ref(&self.desc, &self.refs, col, CoreType::Blob) {
            Some(RefValue::Blob(b)) => Some(b),
            _ => None,
        }
    }

    pub fn get_object(&self, col: usize) -> Option<ObjectRef> {
        match access::get_ref(&self.desc, &self.refs, col, CoreType::Object) {
            Some(RefValue::Object(o)) => Some(o),
            _ => None,
        }
    }

    pub fn set_text(&mut self, col: usize, value: Option<TextRef>) {
        access::set_ref_col(&self.desc, &mut self.refs, col, value.map(RefValue::Text).as_ref());
    }

    pub fn set_blob(&mut self, col: usize, value: Option<BlobRef>) {
        access::set_ref_col(&self.desc, &mut self.refs, col, value.map(RefValue::Blob).as_ref());
    }

    pub fn set_object(&mut self, col: usize, value: Option<ObjectRef>) {
        access::set_ref_col(&self.desc, &mut self.refs, col, value.map(RefValue::Object).as_ref());
    }

    pub fn is_null(&self, col: usize) -> bool {
        access::is_null(&self.desc, &self.scalars, &self.refs, col)
    }

    pub fn set_null(&mut self, col: usize) {
        access::set_null(&self.desc, &mut self.scalars, col);
    }

    /// Reads any column as a typed [`Value`].
    pub fn value(&self, col: usize) -> Value {
        access::get_value(&self.desc, &self.scalars, &self.refs, col)
    }

    /// Writes any column from a typed [`Value`].
    pub fn set_value(&mut self, col: usize, value: &Value) {
        access::set_value(&self.desc, &mut self.scalars, &mut self.refs, col, value);
    }

    pub(crate) fn scalars(&self) -> &[u8] {
        &self.scalars
    }

    pub(crate) fn scalars_mut(&mut self) -> &mut [u8] {
        &mut self.scalars
    }

    pub(crate) fn refs(&self) -> &[Option<RefValue>] {
        &self.refs
    }

    pub(crate) fn refs_mut(&mut self) -> &mut [Option<RefValue>] {
        &mut self.refs
    }

    /// Both halves of the row's storage, borrowed together.
    pub(crate) fn storage_mut(&mut self) -> (&mut [u8], &mut [Option<RefValue>]) {
        (&mut self.scalars, &mut self.refs)
    }

    /// Renders the row as `name:value|name:value|...` for diagnostics.
    /// Null columns render as `null`, booleans as `true`/`false`, blobs as
    /// `length N blob`.
    pub fn format(&self) -> String {
        let mut out = String::new();
        for col in 0..self.desc.column_count() {
            if col != 0 {
                out.push('|');
            }
            let column = self.desc.column(col);
            let _ = write!(out, "{}:", column.name);
            match self.value(col) {
                Value::Int32(v) => {
                    let _ = write!(out, "{}", v);
                }
                Value::Int64(v) => {
                    let _ = write!(out, "{}", v);
                }
                Value::Double(v) => {
                    let _ = write!(out, "{}", v);
                }
                Value::Bool(v) => {
                    let _ = write!(out, "{}", v);
                }
                Value::Text(s) => {
                    let _ = write!(out, "{}", s);
                }
                Value::Blob(b) => {
                    let _ = write!(out, "length {} blob", b.len());
                }
                Value::Object(_) => {
                    let _ = write!(out, "object");
                }
                Value::NullableInt32(v) => write_nullable(&mut out, v.get()),
                Value::NullableInt64(v) => write_nullable(&mut out, v.get()),
                Value::NullableDouble(v) => write_nullable(&mut out, v.get()),
                Value::NullableBool(v) => write_nullable(&mut out, v.get()),
                Value::NullableText(v) => match v {
                    Some(s) => {
                        let _ = write!(out, "{}", s);
                    }
                    None => out.push_str("null"),
                },
                Value::NullableBlob(v) => match v {
                    Some(b) => {
                        let _ = write!(out, "length {} blob", b.len());
                    }
                    None => out.push_str("null"),
                },
                Value::NullableObject(v) => match v {
                    Some(_) => out.push_str("object"),
                    None => out.push_str("null"),
                },
            }
        }
        out
    }
}

fn write_nullable<T: std::fmt::Display>(out: &mut String, value: Option<T>) {
    match value {
        Some(v) => {
            let _ = write!(out, "{}", v);
        }
        None => out.push_str("null"),
    }
}

/// Row-content hash of a cursor; a cursor with no row hashes to zero.
pub fn cursor_hash(cursor: &Cursor) -> u64 {
    cursor.view().hash()
}

/// Equality of two cursors, metadata first: mismatched layouts or has-row
/// flags are unequal, two empty cursors of one shape are equal.
pub fn cursors_equal(a: &Cursor, b: &Cursor) -> bool {
    row_views_equal(&a.view(), &b.view())
}
