//! # Vault Encoding Hook
//!
//! A pluggable, reversible transform applied to flagged columns' values when
//! a result set is materialized and reversed when values are copied back out
//! for consumption. The pipeline is agnostic to what the transform means
//! (typically obfuscation of sensitive columns); it only decides *when* to
//! call it, from the column's encoded flag and the call site.
//!
//! Each call receives the optional per-row context value (the column the
//! descriptor designates as encode context, e.g. the row's primary key), so
//! an encoder can derive a deterministic per-row transform.

use std::rc::Rc;

use crate::types::{BlobRef, TextRef, Value};

/// Reversible per-type transform, parameterized by the row's context value.
pub trait Encoder {
    fn encode_i32(&self, value: i32, context: Option<&Value>) -> i32;
    fn decode_i32(&self, value: i32, context: Option<&Value>) -> i32;

    fn encode_i64(&self, value: i64, context: Option<&Value>) -> i64;
    fn decode_i64(&self, value: i64, context: Option<&Value>) -> i64;

    fn encode_f64(&self, value: f64, context: Option<&Value>) -> f64;
    fn decode_f64(&self, value: f64, context: Option<&Value>) -> f64;

    fn encode_bool(&self, value: bool, context: Option<&Value>) -> bool;
    fn decode_bool(&self, value: bool, context: Option<&Value>) -> bool;

    fn encode_text(&self, value: &TextRef, context: Option<&Value>) -> TextRef;
    fn decode_text(&self, value: &TextRef, context: Option<&Value>) -> TextRef;

    fn encode_blob(&self, value: &BlobRef, context: Option<&Value>) -> BlobRef;
    fn decode_blob(&self, value: &BlobRef, context: Option<&Value>) -> BlobRef;
}

/// Shared encoder handle; read-mostly across an entire fetch or copy pass.
pub type EncoderRef = Rc<dyn Encoder>;
