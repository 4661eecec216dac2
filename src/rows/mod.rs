//! # Row Storage Engine
//!
//! Metadata-driven rows and the generic result set built on them. One set of
//! descriptor-driven routines serves every row shape the compiler emits, so
//! generated code carries only type tags and offsets, never per-shape logic.
//!
//! ## Module Structure
//!
//! - `descriptor`: [`RowDescriptor`]: column types, offsets, reference
//!   block, identity columns, encode context
//! - `access`: the single implementation of read/write/hash/compare over a
//!   row's storage
//! - `cursor`: [`Cursor`] / [`RowView`], single-row storage and views
//! - `result_set`: [`ResultSet`], owned row arrays with accessors, hashing,
//!   equality, copy, and teardown
//!
//! ## Storage invariants
//!
//! - scalar columns sit at descriptor-computed offsets; padding is zero and
//!   stays zero, so hashing and equality run over flat byte runs
//! - null scalars are normalized: `is_null` set implies zero value bytes
//! - references live in a contiguous per-row slot block, swept in order on
//!   retain/release

pub(crate) mod access;
mod cursor;
mod descriptor;
mod result_set;


pub use cursor::{cursor_hash, cursors_equal, row_views_equal, Cursor, RowView};
pub use descriptor::{ColumnDesc, ColumnLoc, RowDescriptor};
pub use result_set::{no_rows_result_set, ResultSet, ResultSetRef};
