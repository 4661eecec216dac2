//! # Type System
//!
//! Canonical column type tags and runtime values shared by every component:
//!
//! - `data_type`: [`CoreType`] and [`ColumnType`] (nullability + encoded flag)
//! - `value`: reference-counted [`RefValue`] payloads, [`Nullable<T>`], and
//!   the full [`Value`] union

mod data_type;
mod value;

pub use data_type::{ColumnType, CoreType};
pub use value::{
    set_ref, slot_hash, slots_equal, BlobRef, Nullable, ObjectRef, RefValue, TextRef, Value,
};

pub(crate) use value::djb2;
