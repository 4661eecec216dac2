//! # Row Partitioning
//!
//! Groups child rows under parent keys so that parent/child query results
//! can be flattened: run the child query once, add every `(key, row)` pair
//! while building, then let each parent row extract its children with an
//! amortized O(1) lookup instead of one child query per parent row.
//!
//! ## Phases
//!
//! ```text
//! building ──(first extract)──▶ extracting
//! ```
//!
//! The transition is irreversible; adding after any extraction is a contract
//! violation. While building, each distinct key owns an append-only row
//! buffer. On first extraction of a key the buffer is wrapped as a result
//! set and the handle is cached in the table entry, so later extractions of
//! the same key hand back the same set. Keys never seen share one lazily
//! created zero-row result set per partition.
//!
//! All keys must share one row shape, as must all values; both shapes are
//! locked in by the first `add`.

use std::rc::Rc;

use crate::buffer::ByteBuf;
use crate::hashtab::{HashTab, KeyOps};
use crate::rows::{access, no_rows_result_set, Cursor, ResultSet, ResultSetRef, RowDescriptor};
use crate::types::RefValue;

/// An owned, retained duplicate of one key row.
struct RowKey {
    scalars: Vec<u8>,
    refs: Vec<Option<RefValue>>,
}

/// Per-key state: rows still accumulating, or the cached materialization.
enum Bucket {
    Rows(RowAccum),
    Materialized(ResultSetRef),
}

/// Append-only row storage for one key.
struct RowAccum {
    buf: ByteBuf,
    refs: Vec<Option<RefValue>>,
    count: usize,
}

impl RowAccum {
    fn new() -> Self {
        Self {
            buf: ByteBuf::open(),
            refs: Vec::new(),
            count: 0,
        }
    }

    fn append(&mut self, desc: &RowDescriptor, scalars: &[u8], refs: &[Option<RefValue>]) {
        let range = self.buf.alloc(desc.scalar_size());
        self.buf.slice_mut(range).copy_from_slice(scalars);
        // cloning the slots is the retain sweep
        self.refs.extend(refs.iter().cloned());
        self.count += 1;
    }
}

/// Content hash and equality over key rows of one locked-in shape.
struct KeyRowOps {
    desc: Rc<RowDescriptor>,
}

impl KeyOps<RowKey> for KeyRowOps {
    fn hash(&self, key: &RowKey) -> u64 {
        access::hash_row(&self.desc, &key.scalars, &key.refs)
    }

    fn eq(&self, a: &RowKey, b: &RowKey) -> bool {
        access::rows_equal_raw(&a.scalars, &a.refs, &b.scalars, &b.refs)
    }
}

#[derive(Default)]
pub struct Partition {
    tab: Option<HashTab<RowKey, Bucket, KeyRowOps>>,
    key_desc: Option<Rc<RowDescriptor>>,
    val_desc: Option<Rc<RowDescriptor>>,
    empty_result: Option<ResultSetRef>,
    did_extract: bool,
}

impl Partition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct keys seen so far.
    pub fn key_count(&self) -> usize {
        self.tab.as_ref().map_or(0, HashTab::len)
    }

    fn lock_shapes(&mut self, key: &Cursor, val: &Cursor) {
        match (&self.key_desc, &self.val_desc) {
            (Some(kd), Some(vd)) => {
                // every add after the first must match the locked-in shapes
                assert!(
                    kd.layout_eq(key.descriptor()),
                    "partition key shape does not match the first add"
                );
                assert!(
                    vd.layout_eq(val.descriptor()),
                    "partition value shape does not match the first add"
                );
            }
            _ => {
                self.key_desc = Some(key.descriptor().clone());
                self.val_desc = Some(val.descriptor().clone());
                self.tab = Some(HashTab::with_ops(KeyRowOps {
                    desc: key.descriptor().clone(),
                }));
            }
        }
    }

    /// Appends a retained duplicate of the value row under the key row's
    /// content. A cursor with no current row makes the call a no-op.
    pub fn add(&mut self, key: &Cursor, val: &Cursor) -> bool {
        assert!(
            !self.did_extract,
            "partition add after extraction has begun"
        );

        self.lock_shapes(key, val);

        if !key.has_row() || !val.has_row() {
            return false;
        }

        let val_desc = self.val_desc.as_ref().unwrap().clone();
        // the duplicate is retained up front; if the key already exists the
        // temporary is released on drop
        let probe = RowKey {
            scalars: key.scalars().to_vec(),
            refs: key.refs().to_vec(),
        };

        let tab = self.tab.as_mut().unwrap();
        match tab.find_mut(&probe) {
            Some(entry) => match &mut entry.value {
                Bucket::Rows(accum) => {
                    accum.append(&val_desc, val.scalars(), val.refs());
                }
                Bucket::Materialized(_) => {
                    unreachable!("materialized bucket while still building")
                }
            },
            None => {
                let mut accum = RowAccum::new();
                accum.append(&val_desc, val.scalars(), val.refs());
                let added = tab.add(probe, Bucket::Rows(accum));
                debug_assert!(added);
            }
        }
        true
    }

    /// Looks up the key's rows, materializing them as a result set on first
    /// extraction and handing back a retained handle. Unknown keys share
    /// the partition's single empty result set.
    pub fn extract(&mut self, key: &Cursor) -> ResultSetRef {
        self.did_extract = true;

        if let (Some(key_desc), Some(tab)) = (&self.key_desc, &mut self.tab) {
            assert!(
                key_desc.layout_eq(key.descriptor()),
                "partition key shape does not match the first add"
            );

            if key.has_row() {
                let probe = RowKey {
                    scalars: key.scalars().to_vec(),
                    refs: key.refs().to_vec(),
                };
                if let Some(entry) = tab.find_mut(&probe) {
                    let val_desc = self.val_desc.as_ref().unwrap();
                    match &mut entry.value {
                        Bucket::Materialized(rs) => return rs.clone(),
                        Bucket::Rows(accum) => {
                            let accum = std::mem::replace(accum, RowAccum::new());
                            let rs: ResultSetRef = Rc::new(ResultSet::from_parts(
                                val_desc.clone(),
                                accum.buf.into_vec(),
                                accum.refs,
                                accum.count,
                            ));
                            tracing::debug!(rows = rs.count(), "partition bucket materialized");
                            entry.value = Bucket::Materialized(rs.clone());
                            return rs;
                        }
                    }
                }
            }
        }

        self.empty_result
            .get_or_insert_with(|| Rc::new(no_rows_result_set()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnType, CoreType};

    fn key_desc() -> Rc<RowDescriptor> {
        Rc::new(RowDescriptor::new(vec![(
            "parent_id",
            ColumnType::not_null(CoreType::Int64),
        )]))
    }

    fn val_desc() -> Rc<RowDescriptor> {
        Rc::new(RowDescriptor::new(vec![
            ("parent_id", ColumnType::not_null(CoreType::Int64)),
            ("label", ColumnType::not_null(CoreType::Text)),
        ]))
    }

    fn key(id: i64) -> Cursor {
        let mut c = Cursor::new(key_desc());
        c.set_i64(0, id);
        c.set_has_row(true);
        c
    }

    fn val(id: i64, label: &str) -> Cursor {
        let mut c = Cursor::new(val_desc());
        c.set_i64(0, id);
        c.set_text(1, Some(Rc::from(label)));
        c.set_has_row(true);
        c
    }

    #[test]
    fn extraction_preserves_insertion_order() {
        let mut p = Partition::new();
        assert!(p.add(&key(1), &val(1, "first")));
        assert!(p.add(&key(1), &val(1, "second")));

        let rs = p.extract(&key(1));
        assert_eq!(rs.count(), 2);
        assert_eq!(rs.get_text_col(0, 1).as_deref(), Some("first"));
        assert_eq!(rs.get_text_col(1, 1).as_deref(), Some("second"));
    }

    #[test]
    fn repeated_extraction_returns_the_cached_set() {
        let mut p = Partition::new();
        p.add(&key(3), &val(3, "only"));
        let a = p.extract(&key(3));
        let b = p.extract(&key(3));
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn absent_keys_share_one_empty_result_set() {
        let mut p = Partition::new();
        p.add(&key(1), &val(1, "x"));
        let a = p.extract(&key(98));
        let b = p.extract(&key(99));
        assert_eq!(a.count(), 0);
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn keys_group_by_content_not_handle() {
        let mut p = Partition::new();
        p.add(&key(7), &val(7, "a"));
        // a fresh cursor with equal content reaches the same bucket
        p.add(&key(7), &val(7, "b"));
        p.add(&key(8), &val(8, "c"));
        assert_eq!(p.key_count(), 2);
        assert_eq!(p.extract(&key(7)).count(), 2);
        assert_eq!(p.extract(&key(8)).count(), 1);
    }

    #[test]
    fn cursor_without_row_is_a_no_op() {
        let mut p = Partition::new();
        let mut empty_key = key(1);
        empty_key.set_no_row();
        assert!(!p.add(&empty_key, &val(1, "x")));
        assert_eq!(p.key_count(), 0);
    }

    #[test]
    #[should_panic(expected = "add after extraction")]
    fn add_after_extract_is_a_contract_violation() {
        let mut p = Partition::new();
        p.add(&key(1), &val(1, "x"));
        let _ = p.extract(&key(1));
        p.add(&key(2), &val(2, "y"));
    }

    #[test]
    #[should_panic(expected = "key shape does not match")]
    fn mismatched_key_shape_is_a_contract_violation() {
        let mut p = Partition::new();
        p.add(&key(1), &val(1, "x"));
        let mut odd = Cursor::new(val_desc());
        odd.set_i64(0, 1);
        odd.set_text(1, Some(Rc::from("k")));
        odd.set_has_row(true);
        p.add(&odd, &val(1, "y"));
    }

    #[test]
    fn extracted_rows_survive_partition_teardown() {
        let mut p = Partition::new();
        p.add(&key(5), &val(5, "kept"));
        let rs = p.extract(&key(5));
        drop(p);
        assert_eq!(rs.get_text_col(0, 1).as_deref(), Some("kept"));
    }
}
