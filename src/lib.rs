//! # rowcore - Runtime Support for Generated SQL Code
//!
//! rowcore is the runtime layer underneath a SQL-to-native compiler.
//! Generated code produces rows whose shape (column types, nullability,
//! offsets, embedded reference slots) is described by small metadata tables;
//! this crate turns those metadata-described buffers into a generic,
//! introspectable result-set abstraction.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │    Generated code (descriptors + calls)    │
//! ├───────────────┬───────────────┬───────────┤
//! │   Marshaling  │  Partitioning │ Row codec │
//! │ (fetch/bind)  │  (key→rows)   │ (blob)    │
//! ├───────────────┴───────┬───────┴───────────┤
//! │  Row engine (descriptor, cursor, result   │
//! │  set, hashing, equality, copy, teardown)  │
//! ├───────────────┬───────────────────────────┤
//! │  Hash table   │  Value model (refcounted) │
//! ├───────────────┴───────────────────────────┤
//! │            Growable byte buffer           │
//! └───────────────────────────────────────────┘
//! ```
//!
//! The backing relational engine sits behind the traits in [`engine`]; any
//! engine with prepare/step/bind/column primitives plugs in. The optional
//! vault encoder sits behind [`marshal::Encoder`].
//!
//! ## Design Notes
//!
//! - One generic routine per operation handles every row shape: accessors,
//!   hashing, equality, copying, and serialization are all driven by the
//!   [`rows::RowDescriptor`], so generated code stays small.
//! - Reference-counted values use `Rc`, making retain/release balance a
//!   property of ownership instead of a calling convention.
//! - The crate is single-threaded by design: every object is owned by one
//!   logical thread of control, and ownership moves only through explicit
//!   handle hand-off (e.g. a [`rows::ResultSetRef`] returned from partition
//!   extraction).
//!
//! ## Module Overview
//!
//! - [`buffer`]: append-only byte arena backing all row storage
//! - [`types`]: column type tags and runtime values
//! - [`rows`]: descriptors, cursors, result sets
//! - [`marshal`]: engine↔row fetch and bind drivers, vault encoding hook
//! - [`engine`]: the relational-engine boundary traits
//! - [`hashtab`]: open-addressing hash table and string dictionary
//! - [`partition`]: key-based row partitioning for parent/child flattening
//! - [`codec`]: versioned single-row binary serialization

#[macro_use]
mod macros;

pub mod buffer;
pub mod codec;
pub mod engine;
pub mod hashtab;
pub mod marshal;
pub mod partition;
pub mod rows;
pub mod types;

pub use engine::{Connection, Statement, StepResult};
pub use marshal::{bind_all, copy_out_row, fetch_all_rows, fetch_row, RowSetBuilder};
pub use partition::Partition;
pub use rows::{Cursor, ResultSet, ResultSetRef, RowDescriptor};
pub use types::{ColumnType, CoreType, Nullable, Value};
