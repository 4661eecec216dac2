//! # Generic Result Set
//!
//! An owned, contiguous array of rows sharing one [`RowDescriptor`]. The
//! result set exclusively owns its backing buffers and one reference-count
//! unit on every reference value embedded in every row.
//!
//! ## Storage
//!
//! ```text
//! scalars: [row 0 scalar bytes][row 1 scalar bytes]...   (count * scalar_size)
//! refs:    [row 0 ref slots   ][row 1 ref slots   ]...   (count * ref_count)
//! ```
//!
//! One set of generic operations serves every row shape: typed accessors,
//! djb2 row hashing, strict equality, identity-column "sameness", sub-range
//! copy, and teardown. Teardown releases each row's references in row order,
//! left to right within the reference block, before the buffers go away.
//! A registered custom teardown hook runs instead of the release sweep.
//!
//! Contract violations (bad row/column index, type mismatch, descriptor
//! mismatch between compared sets) panic: they indicate a bug in the caller
//! or the generator, not a runtime condition.

use std::ops::Range;
use std::rc::Rc;

use crate::types::{BlobRef, CoreType, Nullable, ObjectRef, RefValue, TextRef};

use super::access;
use super::cursor::RowView;
use super::descriptor::RowDescriptor;

/// Shared handle to a result set; clone to retain, drop to release.
pub type ResultSetRef = Rc<ResultSet>;

type TeardownFn = Box<dyn FnOnce(&mut ResultSet)>;

pub struct ResultSet {
    desc: Rc<RowDescriptor>,
    scalars: Vec<u8>,
    refs: Vec<Option<RefValue>>,
    count: usize,
    custom_teardown: Option<TeardownFn>,
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("columns", &self.desc.column_count())
            .field("rows", &self.count)
            .finish()
    }
}

impl ResultSet {
    /// Wraps already-built row storage. The buffers must hold exactly
    /// `count` rows of the descriptor's shape.
    pub fn from_parts(
        desc: Rc<RowDescriptor>,
        scalars: Vec<u8>,
        refs: Vec<Option<RefValue>>,
        count: usize,
    ) -> Self {
        assert_eq!(scalars.len(), count * desc.scalar_size(), "scalar buffer size mismatch");
        assert_eq!(refs.len(), count * desc.ref_count(), "reference buffer size mismatch");
        Self {
            desc,
            scalars,
            refs,
            count,
            custom_teardown: None,
        }
    }

    /// An empty result set of the given shape.
    pub fn empty(desc: Rc<RowDescriptor>) -> Self {
        Self::from_parts(desc, Vec::new(), Vec::new(), 0)
    }

    pub fn descriptor(&self) -> &Rc<RowDescriptor> {
        &self.desc
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn check_row(&self, row: usize) {
        assert!(row < self.count, "row {} out of range ({} rows)", row, self.count);
    }

    pub(crate) fn scalar_range(&self, row: usize) -> Range<usize> {
        self.check_row(row);
        let size = self.desc.scalar_size();
        row * size..(row + 1) * size
    }

    /// Both halves of one row's storage, borrowed together.
    pub(crate) fn row_storage_mut(&mut self, row: usize) -> (&mut [u8], &mut [Option<RefValue>]) {
        let scalar_range = self.scalar_range(row);
        let ref_range = self.ref_range(row);
        (&mut self.scalars[scalar_range], &mut self.refs[ref_range])
    }

    fn ref_range(&self, row: usize) -> Range<usize> {
        self.check_row(row);
        let count = self.desc.ref_count();
        row * count..(row + 1) * count
    }

    pub(crate) fn row_scalars(&self, row: usize) -> &[u8] {
        &self.scalars[self.scalar_range(row)]
    }

    fn row_refs(&self, row: usize) -> &[Option<RefValue>] {
        &self.refs[self.ref_range(row)]
    }

    /// Borrowed view over one row, for generic algorithms.
    pub fn row_view(&self, row: usize) -> RowView<'_> {
        RowView::new(&self.desc, self.row_scalars(row), self.row_refs(row), true)
    }

    result_set_scalar_accessors! {
        i32 => i32,
        i64 => i64,
        f64 => f64,
        bool => bool,
    }

    /// Reads a nullable scalar through its `{is_null, value}` representation.
    pub fn get_nullable_i32_col(&self, row: usize, col: usize) -> Nullable<i32> {
        access::get_nullable(&self.desc, self.row_scalars(row), col)
    }

    pub fn get_nullable_i64_col(&self, row: usize, col: usize) -> Nullable<i64> {
        access::get_nullable(&self.desc, self.row_scalars(row), col)
    }

    pub fn get_nullable_f64_col(&self, row: usize, col: usize) -> Nullable<f64> {
        access::get_nullable(&self.desc, self.row_scalars(row), col)
    }

    pub fn get_nullable_bool_col(&self, row: usize, col: usize) -> Nullable<bool> {
        access::get_nullable(&self.desc, self.row_scalars(row), col)
    }

    pub fn get_text_col(&self, row: usize, col: usize) -> Option<TextRef> {
        match access::get_ref(&self.desc, self.row_refs(row), col, CoreType::Text) {
            Some(RefValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_blob_col(&self, row: usize, col: usize) -> Option<BlobRef> {
        match access::get_ref(&self.desc, self.row_refs(row), col, CoreType::Blob) {
            Some(RefValue::Blob(b)) => Some(b),
            _ => None,
        }
    }

    pub fn get_object_col(&self, row: usize, col: usize) -> Option<ObjectRef> {
        match access::get_ref(&self.desc, self.row_refs(row), col, CoreType::Object) {
            Some(RefValue::Object(o)) => Some(o),
            _ => None,
        }
    }

    pub fn set_text_col(&mut self, row: usize, col: usize, value: Option<TextRef>) {
        let range = self.ref_range(row);
        access::set_ref_col(
            &self.desc,
            &mut self.refs[range],
            col,
            value.map(RefValue::Text).as_ref(),
        );
    }

    pub fn set_blob_col(&mut self, row: usize, col: usize, value: Option<BlobRef>) {
        let range = self.ref_range(row);
        access::set_ref_col(
            &self.desc,
            &mut self.refs[range],
            col,
            value.map(RefValue::Blob).as_ref(),
        );
    }

    pub fn set_object_col(&mut self, row: usize, col: usize, value: Option<ObjectRef>) {
        let range = self.ref_range(row);
        access::set_ref_col(
            &self.desc,
            &mut self.refs[range],
            col,
            value.map(RefValue::Object).as_ref(),
        );
    }

    /// True when the stored value is logically null.
    pub fn is_null_col(&self, row: usize, col: usize) -> bool {
        access::is_null(&self.desc, self.row_scalars(row), self.row_refs(row), col)
    }

    /// Forces a nullable scalar column to null. Rejected for reference
    /// columns (store `None` through the setter) and not-null columns.
    pub fn set_null_col(&mut self, row: usize, col: usize) {
        let range = self.scalar_range(row);
        access::set_null(&self.desc, &mut self.scalars[range], col);
    }

    /// True when the column is flagged for vault encoding.
    pub fn is_encoded_col(&self, col: usize) -> bool {
        assert!(col < self.desc.column_count(), "column {} out of range", col);
        self.desc.column(col).ty.encoded
    }

    /// djb2 hash over the row's scalar region (zero padding included) folded
    /// with each reference value's content hash. Stable across calls on
    /// unmodified storage; rows that compare equal hash equal.
    pub fn row_hash(&self, row: usize) -> u64 {
        access::hash_row(&self.desc, self.row_scalars(row), self.row_refs(row))
    }

    /// Byte-exact equality over the scalar region plus per-reference content
    /// equality. Both sets must share one physical layout.
    pub fn rows_equal(&self, row1: usize, other: &ResultSet, row2: usize) -> bool {
        assert!(
            self.desc.layout_eq(&other.desc),
            "rows_equal across mismatched descriptors"
        );
        access::rows_equal_raw(
            self.row_scalars(row1),
            self.row_refs(row1),
            other.row_scalars(row2),
            other.row_refs(row2),
        )
    }

    /// Equality restricted to the descriptor's identity columns. The two
    /// sets must share byte-identical metadata.
    pub fn rows_same(&self, row1: usize, other: &ResultSet, row2: usize) -> bool {
        assert!(
            self.desc.meta_eq(&other.desc),
            "rows_same across mismatched descriptors"
        );
        access::rows_same_raw(
            &self.desc,
            self.row_scalars(row1),
            self.row_refs(row1),
            other.row_scalars(row2),
            other.row_refs(row2),
        )
    }

    /// Copies `count` rows starting at `from` into an independent result set
    /// sharing the same descriptor. Scalars are copied bytewise; every
    /// reference in the copied range is retained.
    pub fn copy(&self, from: usize, count: usize) -> ResultSet {
        assert!(from + count <= self.count, "copy range out of bounds");
        let scalar_size = self.desc.scalar_size();
        let ref_count = self.desc.ref_count();
        let scalars = self.scalars[from * scalar_size..(from + count) * scalar_size].to_vec();
        // cloning the slots is the retain sweep
        let refs = self.refs[from * ref_count..(from + count) * ref_count].to_vec();
        ResultSet::from_parts(self.desc.clone(), scalars, refs, count)
    }

    /// Registers a teardown hook that runs instead of the default release
    /// sweep when the result set is dropped.
    pub fn set_custom_teardown(&mut self, teardown: impl FnOnce(&mut ResultSet) + 'static) {
        self.custom_teardown = Some(Box::new(teardown));
    }

    /// Hands the storage back out, consuming the set without releasing the
    /// embedded references. Used by custom teardown hooks that re-home rows.
    pub fn into_parts(mut self) -> (Rc<RowDescriptor>, Vec<u8>, Vec<Option<RefValue>>, usize) {
        self.custom_teardown = None;
        let desc = self.desc.clone();
        let scalars = std::mem::take(&mut self.scalars);
        let refs = std::mem::take(&mut self.refs);
        let count = self.count;
        self.count = 0;
        (desc, scalars, refs, count)
    }
}

impl Drop for ResultSet {
    fn drop(&mut self) {
        if let Some(teardown) = self.custom_teardown.take() {
            teardown(self);
            return;
        }
        // release embedded references in row order, left to right within
        // each row's reference block, before the buffers are freed
        for slot in self.refs.drain(..) {
            drop(slot);
        }
    }
}

/// The canonical zero-row result set: one not-null int32 column, no rows.
/// No column getter can ever succeed against it no matter the shape the
/// caller expected.
pub fn no_rows_result_set() -> ResultSet {
    use crate::types::ColumnType;
    let desc = Rc::new(RowDescriptor::new(vec![(
        "x",
        ColumnType::not_null(CoreType::Int32),
    )]));
    ResultSet::empty(desc)
}
