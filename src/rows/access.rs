//! Descriptor-driven access to one row's storage.
//!
//! All row storage in the crate is the pair (scalar bytes, reference slots).
//! The free functions here are the one place that knows how to read, write,
//! hash, and compare that storage; result sets, cursors, the partitioner,
//! and the codec all route through them.
//!
//! Contract checks live here too: a caller asking for the wrong core type,
//! an out-of-range column, or a null store into a not-null column is a
//! generator bug and panics immediately.

use crate::types::{djb2, slot_hash, slots_equal, CoreType, Nullable, RefValue, Value};

use super::descriptor::{ColumnDesc, ColumnLoc, RowDescriptor};

/// Scalar kinds that can live in the scalar region of a row.
pub(crate) trait ScalarType: Copy + Default {
    const CORE: CoreType;
    fn read(buf: &[u8], offset: usize) -> Self;
    fn write(self, buf: &mut [u8], offset: usize);
}

impl ScalarType for i32 {
    const CORE: CoreType = CoreType::Int32;

    fn read(buf: &[u8], offset: usize) -> Self {
        i32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
    }

    fn write(self, buf: &mut [u8], offset: usize) {
        buf[offset..offset + 4].copy_from_slice(&self.to_le_bytes());
    }
}

impl ScalarType for i64 {
    const CORE: CoreType = CoreType::Int64;

    fn read(buf: &[u8], offset: usize) -> Self {
        i64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap())
    }

    fn write(self, buf: &mut [u8], offset: usize) {
        buf[offset..offset + 8].copy_from_slice(&self.to_le_bytes());
    }
}

impl ScalarType for f64 {
    const CORE: CoreType = CoreType::Double;

    fn read(buf: &[u8], offset: usize) -> Self {
        f64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap())
    }

    fn write(self, buf: &mut [u8], offset: usize) {
        buf[offset..offset + 8].copy_from_slice(&self.to_le_bytes());
    }
}

impl ScalarType for bool {
    const CORE: CoreType = CoreType::Bool;

    fn read(buf: &[u8], offset: usize) -> Self {
        buf[offset] != 0
    }

    fn write(self, buf: &mut [u8], offset: usize) {
        buf[offset] = self as u8;
    }
}

fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

/// Offset of the value within nullable scalar storage beginning at `offset`.
fn nullable_value_offset(offset: usize, size: usize) -> usize {
    align_up(offset + 1, size)
}

/// Contract check: the column exists and has the requested core type.
fn checked_column(desc: &RowDescriptor, col: usize, core: CoreType) -> &ColumnDesc {
    assert!(
        col < desc.column_count(),
        "column {} out of range ({} columns)",
        col,
        desc.column_count()
    );
    let column = desc.column(col);
    assert!(
        column.ty.core == core,
        "column {} is {:?}, accessed as {:?}",
        col,
        column.ty.core,
        core
    );
    column
}

fn scalar_offset(column: &ColumnDesc) -> usize {
    match column.loc {
        ColumnLoc::Scalar { offset } => offset,
        ColumnLoc::Ref { .. } => unreachable!("scalar access on reference column"),
    }
}

fn ref_index(column: &ColumnDesc) -> usize {
    match column.loc {
        ColumnLoc::Ref { index } => index,
        ColumnLoc::Scalar { .. } => unreachable!("reference access on scalar column"),
    }
}

/// Reads a scalar column; a null nullable reads as the type's zero.
pub(crate) fn get_scalar<T: ScalarType>(desc: &RowDescriptor, scalars: &[u8], col: usize) -> T {
    let column = checked_column(desc, col, T::CORE);
    let offset = scalar_offset(column);
    if column.ty.nullable {
        T::read(scalars, nullable_value_offset(offset, T::CORE.scalar_size()))
    } else {
        T::read(scalars, offset)
    }
}

/// Writes a scalar column; nullable storage is marked present.
pub(crate) fn set_scalar<T: ScalarType>(
    desc: &RowDescriptor,
    scalars: &mut [u8],
    col: usize,
    value: T,
) {
    let column = checked_column(desc, col, T::CORE);
    let offset = scalar_offset(column);
    if column.ty.nullable {
        scalars[offset] = 0;
        value.write(scalars, nullable_value_offset(offset, T::CORE.scalar_size()));
    } else {
        value.write(scalars, offset);
    }
}

/// Reads a nullable scalar through its `{is_null, value}` representation.
pub(crate) fn get_nullable<T: ScalarType>(
    desc: &RowDescriptor,
    scalars: &[u8],
    col: usize,
) -> Nullable<T> {
    let column = checked_column(desc, col, T::CORE);
    let offset = scalar_offset(column);
    if !column.ty.nullable {
        return Nullable::of(T::read(scalars, offset));
    }
    if scalars[offset] != 0 {
        Nullable::null()
    } else {
        Nullable::of(T::read(scalars, nullable_value_offset(offset, T::CORE.scalar_size())))
    }
}

/// True when the column's stored value is logically null. Not-null scalars
/// are never null; reference columns are null when their slot is empty.
pub(crate) fn is_null(
    desc: &RowDescriptor,
    scalars: &[u8],
    refs: &[Option<RefValue>],
    col: usize,
) -> bool {
    assert!(col < desc.column_count(), "column {} out of range", col);
    let column = desc.column(col);
    match column.loc {
        ColumnLoc::Ref { index } => refs[index].is_none(),
        ColumnLoc::Scalar { offset } => column.ty.nullable && scalars[offset] != 0,
    }
}

/// Forces a nullable scalar column to null, zeroing its value bytes so the
/// row remains hashable as a flat byte run. Reference columns reject this:
/// store an empty slot through the normal setter instead.
pub(crate) fn set_null(desc: &RowDescriptor, scalars: &mut [u8], col: usize) {
    assert!(col < desc.column_count(), "column {} out of range", col);
    let column = desc.column(col);
    assert!(
        !column.ty.core.is_ref(),
        "set_null on reference column {}; store an empty reference instead",
        col
    );
    assert!(column.ty.nullable, "set_null on not-null column {}", col);
    let offset = scalar_offset(column);
    let size = column.ty.core.scalar_size();
    scalars[offset] = 1;
    let value_offset = nullable_value_offset(offset, size);
    scalars[value_offset..value_offset + size].fill(0);
}

/// Reads a reference column's slot, retaining the value for the caller.
pub(crate) fn get_ref(
    desc: &RowDescriptor,
    refs: &[Option<RefValue>],
    col: usize,
    core: CoreType,
) -> Option<RefValue> {
    let column = checked_column(desc, col, core);
    refs[ref_index(column)].clone()
}

/// Stores into a reference column's slot, retaining the new value before
/// the old one is released.
pub(crate) fn set_ref_col(
    desc: &RowDescriptor,
    refs: &mut [Option<RefValue>],
    col: usize,
    value: Option<&RefValue>,
) {
    assert!(col < desc.column_count(), "column {} out of range", col);
    let column = desc.column(col);
    if let Some(v) = value {
        assert!(
            v.core_type() == column.ty.core,
            "column {} is {:?}, stored {:?}",
            col,
            column.ty.core,
            v.core_type()
        );
    } else {
        assert!(column.ty.core.is_ref(), "column {} is not a reference", col);
    }
    crate::types::set_ref(&mut refs[ref_index(column)], value);
}

/// Reads any column as a [`Value`] matching the column's declared type.
pub(crate) fn get_value(
    desc: &RowDescriptor,
    scalars: &[u8],
    refs: &[Option<RefValue>],
    col: usize,
) -> Value {
    assert!(col < desc.column_count(), "column {} out of range", col);
    let column = desc.column(col);
    let ty = column.ty;
    match (ty.core, ty.nullable) {
        (CoreType::Int32, false) => Value::Int32(get_scalar(desc, scalars, col)),
        (CoreType::Int32, true) => Value::NullableInt32(get_nullable(desc, scalars, col)),
        (CoreType::Int64, false) => Value::Int64(get_scalar(desc, scalars, col)),
        (CoreType::Int64, true) => Value::NullableInt64(get_nullable(desc, scalars, col)),
        (CoreType::Double, false) => Value::Double(get_scalar(desc, scalars, col)),
        (CoreType::Double, true) => Value::NullableDouble(get_nullable(desc, scalars, col)),
        (CoreType::Bool, false) => Value::Bool(get_scalar(desc, scalars, col)),
        (CoreType::Bool, true) => Value::NullableBool(get_nullable(desc, scalars, col)),
        (CoreType::Text, nullable) => {
            let text = match refs[ref_index(column)].clone() {
                Some(RefValue::Text(s)) => Some(s),
                None => None,
                _ => unreachable!("text column holds non-text reference"),
            };
            if nullable {
                Value::NullableText(text)
            } else {
                Value::Text(text.expect("not-null text column holds empty slot"))
            }
        }
        (CoreType::Blob, nullable) => {
            let blob = match refs[ref_index(column)].clone() {
                Some(RefValue::Blob(b)) => Some(b),
                None => None,
                _ => unreachable!("blob column holds non-blob reference"),
            };
            if nullable {
                Value::NullableBlob(blob)
            } else {
                Value::Blob(blob.expect("not-null blob column holds empty slot"))
            }
        }
        (CoreType::Object, nullable) => {
            let object = match refs[ref_index(column)].clone() {
                Some(RefValue::Object(o)) => Some(o),
                None => None,
                _ => unreachable!("object column holds non-object reference"),
            };
            if nullable {
                Value::NullableObject(object)
            } else {
                Value::Object(object.expect("not-null object column holds empty slot"))
            }
        }
    }
}

/// Writes any column from a [`Value`]; the value's type must match the
/// column's declared core type, with nullability resolved by the storage.
pub(crate) fn set_value(
    desc: &RowDescriptor,
    scalars: &mut [u8],
    refs: &mut [Option<RefValue>],
    col: usize,
    value: &Value,
) {
    assert!(col < desc.column_count(), "column {} out of range", col);
    let column = desc.column(col);
    assert!(
        value.column_type().core == column.ty.core,
        "column {} is {:?}, stored {:?}",
        col,
        column.ty.core,
        value.column_type().core
    );
    match value {
        Value::Int32(v) => set_scalar(desc, scalars, col, *v),
        Value::Int64(v) => set_scalar(desc, scalars, col, *v),
        Value::Double(v) => set_scalar(desc, scalars, col, *v),
        Value::Bool(v) => set_scalar(desc, scalars, col, *v),
        Value::NullableInt32(v) => set_nullable(desc, scalars, col, *v),
        Value::NullableInt64(v) => set_nullable(desc, scalars, col, *v),
        Value::NullableDouble(v) => set_nullable(desc, scalars, col, *v),
        Value::NullableBool(v) => set_nullable(desc, scalars, col, *v),
        Value::Text(s) => set_ref_col(desc, refs, col, Some(&RefValue::Text(s.clone()))),
        Value::Blob(b) => set_ref_col(desc, refs, col, Some(&RefValue::Blob(b.clone()))),
        Value::Object(o) => set_ref_col(desc, refs, col, Some(&RefValue::Object(o.clone()))),
        Value::NullableText(s) => {
            set_ref_col(desc, refs, col, s.clone().map(RefValue::Text).as_ref())
        }
        Value::NullableBlob(b) => {
            set_ref_col(desc, refs, col, b.clone().map(RefValue::Blob).as_ref())
        }
        Value::NullableObject(o) => {
            set_ref_col(desc, refs, col, o.clone().map(RefValue::Object).as_ref())
        }
    }
}

fn set_nullable<T: ScalarType>(
    desc: &RowDescriptor,
    scalars: &mut [u8],
    col: usize,
    value: Nullable<T>,
) {
    if value.is_null {
        set_null(desc, scalars, col);
    } else {
        set_scalar(desc, scalars, col, value.value);
    }
}

/// djb2 over the scalar region (padding included; it is always zero),
/// folded with each reference slot's content hash.
pub(crate) fn hash_row(desc: &RowDescriptor, scalars: &[u8], refs: &[Option<RefValue>]) -> u64 {
    debug_assert_eq!(scalars.len(), desc.scalar_size());
    debug_assert_eq!(refs.len(), desc.ref_count());
    let mut hash = djb2(5381, scalars);
    for slot in refs {
        hash = hash.wrapping_mul(33).wrapping_add(slot_hash(slot));
    }
    hash
}

/// Byte-exact scalar comparison plus per-reference content equality.
pub(crate) fn rows_equal_raw(
    s1: &[u8],
    r1: &[Option<RefValue>],
    s2: &[u8],
    r2: &[Option<RefValue>],
) -> bool {
    s1 == s2 && r1.iter().zip(r2).all(|(a, b)| slots_equal(a, b))
}

/// Identity-column comparison: scalar columns compare their full storage
/// span (null byte, zeroed padding, value), reference columns by content.
pub(crate) fn rows_same_raw(
    desc: &RowDescriptor,
    s1: &[u8],
    r1: &[Option<RefValue>],
    s2: &[u8],
    r2: &[Option<RefValue>],
) -> bool {
    let identity = desc.identity_columns();
    assert!(!identity.is_empty(), "descriptor has no identity columns");

    for &col in identity {
        let column = desc.column(col as usize);
        match column.loc {
            ColumnLoc::Ref { index } => {
                if !slots_equal(&r1[index], &r2[index]) {
                    return false;
                }
            }
            ColumnLoc::Scalar { offset } => {
                let size = column.ty.core.scalar_size();
                let len = if column.ty.nullable {
                    nullable_value_offset(offset, size) - offset + size
                } else {
                    size
                };
                if s1[offset..offset + len] != s2[offset..offset + len] {
                    return false;
                }
            }
        }
    }
    true
}

/// Puts one row's storage into the canonical no-row state: zeros for
/// not-null scalars, null for nullable scalars, empty reference slots.
pub(crate) fn set_no_row_state(
    desc: &RowDescriptor,
    scalars: &mut [u8],
    refs: &mut [Option<RefValue>],
) {
    scalars.fill(0);
    for slot in refs.iter_mut() {
        *slot = None;
    }
    for col in 0..desc.column_count() {
        let column = desc.column(col);
        if column.ty.nullable && !column.ty.core.is_ref() {
            if let ColumnLoc::Scalar { offset } = column.loc {
                scalars[offset] = 1;
            }
        }
    }
}
