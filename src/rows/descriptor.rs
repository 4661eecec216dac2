//! # Row Descriptor
//!
//! Compiler-generated metadata describing one row shape. The descriptor is
//! the single source of truth for a row's physical layout; every generic
//! algorithm in the crate (accessors, hashing, equality, copying, the codec,
//! the partitioner) is driven by it.
//!
//! ## Layout rules
//!
//! Scalar columns are packed in declaration order at naturally aligned
//! offsets (alignment = value size, capped at 8). Nullable scalars store
//! `[is_null: u8][pad][value]` so a null can be tested with one byte read.
//! Reference columns occupy a contiguous block of slots at the row's tail,
//! in declaration order.
//!
//! Padding bytes are zero when a row is allocated and no accessor ever
//! writes them, so the whole scalar region can be hashed and compared as a
//! flat byte run.

use smallvec::SmallVec;

use crate::types::{ColumnType, CoreType};

/// Where a column's storage lives within a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnLoc {
    /// Byte offset into the scalar region.
    Scalar { offset: usize },
    /// Index into the reference block at the row's tail.
    Ref { index: usize },
}

/// One column of a row shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDesc {
    pub name: String,
    pub ty: ColumnType,
    pub loc: ColumnLoc,
}

/// Static metadata for one row shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDescriptor {
    columns: Vec<ColumnDesc>,
    scalar_size: usize,
    ref_count: usize,
    identity: SmallVec<[u16; 8]>,
    encode_context: Option<usize>,
}

fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

impl RowDescriptor {
    /// Lays out a row shape from `(name, type)` pairs in declaration order.
    pub fn new<N: Into<String>>(columns: Vec<(N, ColumnType)>) -> Self {
        let mut out = Vec::with_capacity(columns.len());
        let mut offset = 0usize;
        let mut ref_index = 0usize;

        for (name, ty) in columns {
            let loc = if ty.core.is_ref() {
                let index = ref_index;
                ref_index += 1;
                ColumnLoc::Ref { index }
            } else {
                let size = ty.core.scalar_size();
                let start = if ty.nullable {
                    // is_null byte, padding, then the aligned value
                    let start = offset;
                    offset = align_up(start + 1, size) + size;
                    start
                } else {
                    let start = align_up(offset, size);
                    offset = start + size;
                    start
                };
                ColumnLoc::Scalar { offset: start }
            };
            out.push(ColumnDesc {
                name: name.into(),
                ty,
                loc,
            });
        }

        Self {
            columns: out,
            scalar_size: offset,
            ref_count: ref_index,
            identity: SmallVec::new(),
            encode_context: None,
        }
    }

    /// Designates the identity-column subset used by row "sameness".
    pub fn with_identity(mut self, columns: &[usize]) -> Self {
        for &col in columns {
            assert!(col < self.columns.len(), "identity column out of range");
        }
        self.identity = columns.iter().map(|&c| c as u16).collect();
        self
    }

    /// Designates one column as the vault encoding context. The context
    /// column itself is never encoded; its value is handed to the encoder
    /// alongside every other encoded column of the same row.
    pub fn with_encode_context(mut self, col: usize) -> Self {
        assert!(col < self.columns.len(), "context column out of range");
        assert!(
            self.columns[col].ty.core != CoreType::Object,
            "object columns cannot be an encoding context"
        );
        self.encode_context = Some(col);
        self
    }

    /// Toggles the encoded flag on one column after construction, letting a
    /// caller opt columns out of (or into) vaulting at runtime.
    pub fn set_encoded(&mut self, col: usize, encoded: bool) {
        assert!(col < self.columns.len(), "column out of range");
        let ty = &mut self.columns[col].ty;
        if encoded {
            assert!(
                ty.core != CoreType::Object,
                "object columns cannot be encoded"
            );
        }
        ty.encoded = encoded;
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, col: usize) -> &ColumnDesc {
        &self.columns[col]
    }

    pub fn columns(&self) -> &[ColumnDesc] {
        &self.columns
    }

    /// Byte size of the scalar region of one row.
    pub fn scalar_size(&self) -> usize {
        self.scalar_size
    }

    /// Number of reference slots in the row's tail block.
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub fn identity_columns(&self) -> &[u16] {
        &self.identity
    }

    pub fn encode_context(&self) -> Option<usize> {
        self.encode_context
    }

    pub fn has_encoded_columns(&self) -> bool {
        self.columns.iter().any(|c| c.ty.encoded)
    }

    /// Two descriptors describe interchangeable physical layouts: same
    /// scalar size, same reference block, same per-column type and location.
    /// Names, identity columns, and the encoded flag do not affect layout.
    pub fn layout_eq(&self, other: &RowDescriptor) -> bool {
        self.scalar_size == other.scalar_size
            && self.ref_count == other.ref_count
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.ty.core == b.ty.core && a.ty.nullable == b.ty.nullable && a.loc == b.loc)
    }

    /// Full metadata equality, required for identity comparison across two
    /// result sets.
    pub fn meta_eq(&self, other: &RowDescriptor) -> bool {
        self == other
    }
}
