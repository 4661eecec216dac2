//! # Versioned Row Serialization
//!
//! Encodes one cursor row into an opaque, self-describing blob and decodes
//! it back, tolerating schema evolution between writer and reader.
//!
//! ## Blob Layout
//!
//! ```text
//! +-----------+------+--------------+------------------+
//! | tag bytes | 0x00 | bit-vector   | payload values   |
//! +-----------+------+--------------+------------------+
//! ```
//!
//! | Component | Contents |
//! |-----------|----------|
//! | tag bytes | one per column: `I L D F S B` (int32, int64, double, bool, string, blob), lower-cased when nullable |
//! | bit-vector | one presence bit per nullable column, then one value bit per bool column |
//! | payload | present values in column order |
//!
//! Payload encodings: int32/int64 as zigzag varints (7 bits per byte, high
//! bit continues), doubles as 8 raw little-endian bytes, strings as
//! null-terminated bytes, blobs as a little-endian u32 byte count plus raw
//! bytes. Bools carry no payload; their values ride in the bit-vector, which
//! costs one bit instead of a byte per flag.
//!
//! ## Schema Evolution
//!
//! - blob has extra trailing fields: they are scanned (the bit-vector is
//!   sized from the blob's own tag list) but not validated or decoded. This
//!   is a newer producer talking to an older consumer.
//! - blob is missing trailing fields: every missing field must be nullable
//!   and decodes as null. This is an older producer talking to a newer
//!   consumer.
//! - a not-null field in the blob may decode into a nullable column; the
//!   reverse is a hard failure, as is any core-type mismatch.
//!
//! Any read past the end of the blob fails. Decode failures leave the
//! cursor in the no-row state with its references already released.

use eyre::{bail, ensure, Result};

use crate::buffer::ByteBuf;
use crate::rows::Cursor;
use crate::types::{CoreType, Value};

const CASE_BIT: u8 = b'a' - b'A';

fn tag_byte(core: CoreType) -> Option<u8> {
    match core {
        CoreType::Int32 => Some(b'I'),
        CoreType::Int64 => Some(b'L'),
        CoreType::Double => Some(b'D'),
        CoreType::Bool => Some(b'F'),
        CoreType::Text => Some(b'S'),
        CoreType::Blob => Some(b'B'),
        CoreType::Object => None,
    }
}

// ---------------------------------------------------------------------------
// zigzag varints

fn zigzag_encode_32(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

fn zigzag_decode_32(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

fn zigzag_encode_64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn zigzag_decode_64(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

fn write_varint_32(buf: &mut ByteBuf, value: i32) {
    let mut v = zigzag_encode_32(value);
    loop {
        let mut byte = (v & 0x7f) as u8;
        v >>= 7;
        if v != 0 {
            byte |= 0x80;
        }
        buf.append(&[byte]);
        if v == 0 {
            break;
        }
    }
}

fn write_varint_64(buf: &mut ByteBuf, value: i64) {
    let mut v = zigzag_encode_64(value);
    loop {
        let mut byte = (v & 0x7f) as u8;
        v >>= 7;
        if v != 0 {
            byte |= 0x80;
        }
        buf.append(&[byte]);
        if v == 0 {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// input scanning

struct InputBuf<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> InputBuf<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        ensure!(
            self.pos + count <= self.data.len(),
            "blob truncated: wanted {} bytes, {} remain",
            count,
            self.data.len() - self.pos
        );
        let out = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Reads up to the next zero byte, consuming it; the terminator is not
    /// part of the returned bytes.
    fn read_terminated(&mut self) -> Result<&'a [u8]> {
        let remaining = &self.data[self.pos..];
        match remaining.iter().position(|&b| b == 0) {
            Some(end) => {
                let out = &remaining[..end];
                self.pos += end + 1;
                Ok(out)
            }
            None => bail!("blob truncated: unterminated string"),
        }
    }

    fn read_varint_32(&mut self) -> Result<i32> {
        let mut result = 0u32;
        let mut offset = 0u32;
        // 5 bytes is the most a 32-bit varint needs
        for _ in 0..5 {
            let byte = self.read_u8()?;
            result |= ((byte & 0x7f) as u32) << offset;
            if byte & 0x80 == 0 {
                return Ok(zigzag_decode_32(result));
            }
            offset += 7;
        }
        bail!("malformed 32-bit varint")
    }

    fn read_varint_64(&mut self) -> Result<i64> {
        let mut result = 0u64;
        let mut offset = 0u32;
        // 10 bytes is the most a 64-bit varint needs
        for _ in 0..10 {
            let byte = self.read_u8()?;
            result |= ((byte & 0x7f) as u64) << offset;
            if byte & 0x80 == 0 {
                return Ok(zigzag_decode_64(result));
            }
            offset += 7;
        }
        bail!("malformed 64-bit varint")
    }
}

// ---------------------------------------------------------------------------
// bit-vector

fn set_bit(bits: &mut [u8], index: usize) {
    bits[index / 8] |= 1 << (index % 8);
}

fn get_bit(bits: &[u8], index: usize) -> bool {
    bits[index / 8] & (1 << (index % 8)) != 0
}

// ---------------------------------------------------------------------------
// encoding

/// Serializes the cursor's row into a versioned blob. A cursor with no
/// current row is not serializable; object columns never are.
pub fn serialize_row(cursor: &Cursor) -> Result<Vec<u8>> {
    ensure!(cursor.has_row(), "cannot serialize a cursor with no row");

    let desc = cursor.descriptor();
    let mut out = ByteBuf::open();

    let mut nullable_count = 0usize;
    let mut bool_count = 0usize;

    for col in 0..desc.column_count() {
        let ty = desc.column(col).ty;
        let base = tag_byte(ty.core)
            .unwrap_or_else(|| panic!("object column {} cannot be serialized", col));
        let code = if ty.nullable {
            nullable_count += 1;
            base + CASE_BIT
        } else {
            base
        };
        if ty.core == CoreType::Bool {
            bool_count += 1;
        }
        out.append(&[code]);
    }
    out.append_null();

    let bits_len = (nullable_count + bool_count + 7) / 8;
    let bits_range = out.alloc(bits_len);
    let bits_start = bits_range.start;

    let mut nullable_index = 0usize;
    let mut bool_index = 0usize;

    for col in 0..desc.column_count() {
        match cursor.value(col) {
            Value::Int32(v) => write_varint_32(&mut out, v),
            Value::Int64(v) => write_varint_64(&mut out, v),
            Value::Double(v) => {
                out.append(&v.to_le_bytes());
            }
            Value::Bool(v) => {
                if v {
                    set_bit(
                        out.slice_mut(bits_start..bits_start + bits_len),
                        nullable_count + bool_index,
                    );
                }
                bool_index += 1;
            }
            Value::Text(s) => {
                out.append(s.as_bytes());
                out.append_null();
            }
            Value::Blob(b) => {
                out.append(&(b.len() as u32).to_le_bytes());
                out.append(&b);
            }
            Value::NullableInt32(v) => {
                if let Some(v) = v.get() {
                    set_bit(
                        out.slice_mut(bits_start..bits_start + bits_len),
                        nullable_index,
                    );
                    write_varint_32(&mut out, v);
                }
                nullable_index += 1;
            }
            Value::NullableInt64(v) => {
                if let Some(v) = v.get() {
                    set_bit(
                        out.slice_mut(bits_start..bits_start + bits_len),
                        nullable_index,
                    );
                    write_varint_64(&mut out, v);
                }
                nullable_index += 1;
            }
            Value::NullableDouble(v) => {
                if let Some(v) = v.get() {
                    set_bit(
                        out.slice_mut(bits_start..bits_start + bits_len),
                        nullable_index,
                    );
                    out.append(&v.to_le_bytes());
                }
                nullable_index += 1;
            }
            Value::NullableBool(v) => {
                if let Some(v) = v.get() {
                    let bits = out.slice_mut(bits_start..bits_start + bits_len);
                    set_bit(bits, nullable_index);
                    if v {
                        set_bit(bits, nullable_count + bool_index);
                    }
                }
                nullable_index += 1;
                bool_index += 1;
            }
            Value::NullableText(s) => {
                if let Some(s) = s {
                    set_bit(
                        out.slice_mut(bits_start..bits_start + bits_len),
                        nullable_index,
                    );
                    out.append(s.as_bytes());
                    out.append_null();
                }
                nullable_index += 1;
            }
            Value::NullableBlob(b) => {
                if let Some(b) = b {
                    set_bit(
                        out.slice_mut(bits_start..bits_start + bits_len),
                        nullable_index,
                    );
                    out.append(&(b.len() as u32).to_le_bytes());
                    out.append(&b);
                }
                nullable_index += 1;
            }
            Value::Object(_) | Value::NullableObject(_) => {
                panic!("object column {} cannot be serialized", col)
            }
        }
    }

    debug_assert_eq!(nullable_index, nullable_count);
    Ok(out.into_vec())
}

// ---------------------------------------------------------------------------
// decoding

/// Deserializes a blob into the cursor, honoring the schema-evolution rules
/// in the module docs. The cursor's existing references are released up
/// front (it may be reused across calls); on failure it is left in the
/// no-row state.
pub fn deserialize_row(blob: &[u8], cursor: &mut Cursor) -> Result<()> {
    cursor.set_has_row(false);
    cursor.clear_references();

    match decode_into(blob, cursor) {
        Ok(()) => {
            cursor.set_has_row(true);
            Ok(())
        }
        Err(err) => {
            cursor.set_no_row();
            Err(err)
        }
    }
}

fn decode_into(blob: &[u8], cursor: &mut Cursor) -> Result<()> {
    let desc = cursor.descriptor().clone();
    let needed_count = desc.column_count();
    let mut input = InputBuf::new(blob);

    // scan the tag list; extra trailing fields are counted (the bit-vector
    // is sized from what the blob actually carries) but not validated
    let mut tags: Vec<u8> = Vec::with_capacity(needed_count);
    let mut nullable_count = 0usize;
    let mut bool_count = 0usize;

    loop {
        let code = input.read_u8()?;
        if code == 0 {
            break;
        }
        let nullable_code = code.is_ascii_lowercase();
        if nullable_code {
            nullable_count += 1;
        }
        if code == b'F' || code == b'f' {
            bool_count += 1;
        }
        tags.push(code);

        let field = tags.len() - 1;
        if field < needed_count {
            let ty = desc.column(field).ty;
            ensure!(
                ty.nullable || !nullable_code,
                "field {}: nullable value cannot decode into a not-null column",
                field
            );
            let Some(expected) = tag_byte(ty.core) else {
                bail!("field {}: object columns cannot be deserialized", field);
            };
            let normalized = if nullable_code { code - CASE_BIT } else { code };
            ensure!(
                normalized == expected,
                "field {}: blob tag {:?} does not match column type {:?}",
                field,
                code as char,
                ty.core
            );
        }
    }
    let actual_count = tags.len();

    // a short blob is an old producer: everything it lacks must be nullable
    for field in actual_count..needed_count {
        ensure!(
            desc.column(field).ty.nullable,
            "field {}: not-null column missing from blob",
            field
        );
    }

    let bits = input.read_bytes((nullable_count + bool_count + 7) / 8)?;

    let mut nullable_index = 0usize;
    let mut bool_index = 0usize;

    for col in 0..needed_count {
        let ty = desc.column(col).ty;
        let in_blob = col < actual_count;

        let fetch = if !in_blob {
            false
        } else if tags[col].is_ascii_uppercase() {
            // not-null in the blob means always present
            true
        } else {
            let present = get_bit(bits, nullable_index);
            nullable_index += 1;
            present
        };

        // every bool the blob carries owns a value bit, present or not
        let bool_bit = nullable_count + bool_index;
        if in_blob && ty.core == CoreType::Bool {
            bool_index += 1;
        }

        if fetch {
            let value = match ty.core {
                CoreType::Int32 => {
                    let v = input.read_varint_32()?;
                    Value::NullableInt32(crate::types::Nullable::of(v))
                }
                CoreType::Int64 => {
                    let v = input.read_varint_64()?;
                    Value::NullableInt64(crate::types::Nullable::of(v))
                }
                CoreType::Double => {
                    let raw = input.read_bytes(8)?;
                    let v = f64::from_le_bytes(raw.try_into().unwrap());
                    Value::NullableDouble(crate::types::Nullable::of(v))
                }
                CoreType::Bool => {
                    Value::NullableBool(crate::types::Nullable::of(get_bit(bits, bool_bit)))
                }
                CoreType::Text => {
                    let raw = input.read_terminated()?;
                    let s = std::str::from_utf8(raw)
                        .map_err(|e| eyre::eyre!("field {}: invalid UTF-8 in string: {}", col, e))?;
                    Value::NullableText(Some(s.into()))
                }
                CoreType::Blob => {
                    let len = input.read_bytes(4)?;
                    let len = u32::from_le_bytes(len.try_into().unwrap()) as usize;
                    let raw = input.read_bytes(len)?;
                    Value::NullableBlob(Some(raw.into()))
                }
                CoreType::Object => unreachable!("object tags are rejected during the scan"),
            };
            cursor.set_value(col, &value);
        } else {
            // absent: logical null (validation guarantees the column is
            // nullable whenever this branch is reached)
            if ty.core.is_ref() {
                match ty.core {
                    CoreType::Text => cursor.set_text(col, None),
                    CoreType::Blob => cursor.set_blob(col, None),
                    _ => unreachable!(),
                }
            } else {
                cursor.set_null(col);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::RowDescriptor;
    use crate::types::{ColumnType, CoreType};
    use std::rc::Rc;

    fn single_i32_desc() -> Rc<RowDescriptor> {
        Rc::new(RowDescriptor::new(vec![(
            "x",
            ColumnType::not_null(CoreType::Int32),
        )]))
    }

    #[test]
    fn zigzag_maps_small_magnitudes_to_small_codes() {
        assert_eq!(zigzag_encode_32(0), 0);
        assert_eq!(zigzag_encode_32(-1), 1);
        assert_eq!(zigzag_encode_32(1), 2);
        assert_eq!(zigzag_encode_32(-2), 3);
        assert_eq!(zigzag_encode_32(42), 84);
    }

    #[test]
    fn zigzag_roundtrips_extremes() {
        for v in [0, 1, -1, i32::MAX, i32::MIN] {
            assert_eq!(zigzag_decode_32(zigzag_encode_32(v)), v);
        }
        for v in [0i64, 1, -1, i64::MAX, i64::MIN] {
            assert_eq!(zigzag_decode_64(zigzag_encode_64(v)), v);
        }
    }

    #[test]
    fn varint_roundtrips_boundary_values() {
        for v in [0, 1, -1, 63, 64, -64, -65, 8191, i32::MAX, i32::MIN] {
            let mut buf = ByteBuf::open();
            write_varint_32(&mut buf, v);
            let bytes = buf.into_vec();
            let mut input = InputBuf::new(&bytes);
            assert_eq!(input.read_varint_32().unwrap(), v);
            assert_eq!(input.pos, bytes.len());
        }
        for v in [0i64, -1, i64::MAX, i64::MIN, 1 << 40] {
            let mut buf = ByteBuf::open();
            write_varint_64(&mut buf, v);
            let bytes = buf.into_vec();
            let mut input = InputBuf::new(&bytes);
            assert_eq!(input.read_varint_64().unwrap(), v);
        }
    }

    #[test]
    fn truncated_varint_fails() {
        let mut input = InputBuf::new(&[0x80]);
        assert!(input.read_varint_32().is_err());
        // five continuation bytes overflow a 32-bit varint
        let mut input = InputBuf::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        assert!(input.read_varint_32().is_err());
    }

    #[test]
    fn not_null_int32_42_has_the_documented_wire_shape() {
        let mut c = Cursor::new(single_i32_desc());
        c.set_i32(0, 42);
        c.set_has_row(true);

        let blob = serialize_row(&c).unwrap();
        // tag 'I', terminator, empty bit-vector, zigzag varint of 42
        assert_eq!(blob, vec![b'I', 0, 0x54]);

        let mut back = Cursor::new(single_i32_desc());
        deserialize_row(&blob, &mut back).unwrap();
        assert!(back.has_row());
        assert_eq!(back.get_i32(0), 42);
    }

    #[test]
    fn bools_ride_in_the_bit_vector_without_payload() {
        let desc = Rc::new(RowDescriptor::new(vec![
            ("a", ColumnType::not_null(CoreType::Bool)),
            ("b", ColumnType::not_null(CoreType::Bool)),
            ("c", ColumnType::nullable(CoreType::Bool)),
        ]));
        let mut c = Cursor::new(desc.clone());
        c.set_bool(0, true);
        c.set_bool(1, false);
        c.set_bool(2, true);
        c.set_has_row(true);

        let blob = serialize_row(&c).unwrap();
        // tags FFf + terminator + one bit-vector byte, no payload bytes
        assert_eq!(blob.len(), 5);
        assert_eq!(&blob[..4], b"FFf\0");

        let mut back = Cursor::new(desc);
        deserialize_row(&blob, &mut back).unwrap();
        assert!(back.get_bool(0));
        assert!(!back.get_bool(1));
        assert_eq!(back.get_nullable_bool(2).get(), Some(true));
    }

    #[test]
    fn null_bool_keeps_later_bool_bits_aligned() {
        let desc = Rc::new(RowDescriptor::new(vec![
            ("maybe", ColumnType::nullable(CoreType::Bool)),
            ("always", ColumnType::not_null(CoreType::Bool)),
        ]));
        let mut c = Cursor::new(desc.clone());
        c.set_null(0);
        c.set_bool(1, true);
        c.set_has_row(true);

        let blob = serialize_row(&c).unwrap();
        let mut back = Cursor::new(desc);
        deserialize_row(&blob, &mut back).unwrap();
        assert!(back.is_null(0));
        assert!(back.get_bool(1));
    }

    #[test]
    fn serializing_without_a_row_is_an_error() {
        let c = Cursor::new(single_i32_desc());
        assert!(serialize_row(&c).is_err());
    }
}
