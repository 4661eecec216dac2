//! # Open-Addressing Hash Table
//!
//! A small closed hash table with pluggable hashing and equality, used two
//! ways: as a general dictionary (see [`StringDict`]) and as the index
//! underneath row partitioning, where keys are whole rows hashed by content.
//!
//! ## Shape
//!
//! - linear probing with wraparound
//! - capacity always a power of two, initial capacity 4
//! - grows by doubling (reinserting every entry at its new position) when
//!   the load passes 75%
//! - never shrinks; entries are never removed individually; only dropping
//!   the whole table releases them
//!
//! Ownership of keys and values moves into the table on `add` and is dropped
//! with the table, so retain/release stays balanced across rehashing without
//! any bookkeeping: entries are moved, not copied.

use crate::types::djb2;
use crate::types::TextRef;

const INIT_CAPACITY: usize = 4;

/// Pluggable hash and equality for the key type.
pub trait KeyOps<K> {
    fn hash(&self, key: &K) -> u64;
    fn eq(&self, a: &K, b: &K) -> bool;
}

/// One occupied slot; `find_mut` exposes it for in-place value replacement.
#[derive(Debug)]
pub struct Entry<K, V> {
    pub key: K,
    pub value: V,
}

#[derive(Debug)]
pub struct HashTab<K, V, O: KeyOps<K>> {
    ops: O,
    slots: Vec<Option<Entry<K, V>>>,
    count: usize,
}

impl<K, V, O: KeyOps<K>> HashTab<K, V, O> {
    pub fn with_ops(ops: O) -> Self {
        let mut slots = Vec::with_capacity(INIT_CAPACITY);
        slots.resize_with(INIT_CAPACITY, || None);
        Self {
            ops,
            slots,
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn probe_start(&self, key: &K) -> usize {
        (self.ops.hash(key) as usize) & (self.slots.len() - 1)
    }

    /// Inserts the pair if the key is absent. Returns false (and drops the
    /// offered pair) when an equal key is already present.
    pub fn add(&mut self, key: K, value: V) -> bool {
        let mut offset = self.probe_start(&key);
        loop {
            match &self.slots[offset] {
                None => {
                    self.slots[offset] = Some(Entry { key, value });
                    self.count += 1;
                    if self.count * 4 > self.slots.len() * 3 {
                        self.rehash();
                    }
                    return true;
                }
                Some(entry) => {
                    if self.ops.eq(&entry.key, &key) {
                        return false;
                    }
                }
            }
            offset += 1;
            if offset >= self.slots.len() {
                offset = 0;
            }
        }
    }

    /// Probes to the slot holding `key`, or `None` when an empty slot is
    /// reached first.
    fn find_index(&self, key: &K) -> Option<usize> {
        let mut offset = self.probe_start(key);
        loop {
            match &self.slots[offset] {
                None => return None,
                Some(entry) => {
                    if self.ops.eq(&entry.key, key) {
                        return Some(offset);
                    }
                }
            }
            offset += 1;
            if offset >= self.slots.len() {
                offset = 0;
            }
        }
    }

    pub fn find(&self, key: &K) -> Option<&Entry<K, V>> {
        let index = self.find_index(key)?;
        self.slots[index].as_ref()
    }

    /// Mutable lookup, permitting in-place value replacement.
    pub fn find_mut(&mut self, key: &K) -> Option<&mut Entry<K, V>> {
        let index = self.find_index(key)?;
        self.slots[index].as_mut()
    }

    /// Doubles capacity and reinserts every entry, recomputing positions
    /// from the new capacity. Entries are moved, so ownership stays with
    /// the table throughout.
    fn rehash(&mut self) {
        let new_capacity = self.slots.len() * 2;
        let mut old_slots = std::mem::replace(&mut self.slots, Vec::new());
        self.slots.resize_with(new_capacity, || None);

        for slot in old_slots.iter_mut() {
            if let Some(entry) = slot.take() {
                let mut offset = (self.ops.hash(&entry.key) as usize) & (new_capacity - 1);
                loop {
                    if self.slots[offset].is_none() {
                        self.slots[offset] = Some(entry);
                        break;
                    }
                    offset += 1;
                    if offset >= new_capacity {
                        offset = 0;
                    }
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry<K, V>> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }
}

/// Content hash and equality for text keys.
#[derive(Debug, Default)]
pub struct TextKeyOps;

impl KeyOps<TextRef> for TextKeyOps {
    fn hash(&self, key: &TextRef) -> u64 {
        djb2(5381, key.as_bytes())
    }

    fn eq(&self, a: &TextRef, b: &TextRef) -> bool {
        a == b
    }
}

/// String-keyed dictionary with upsert, the hash table's generic-dictionary
/// face. Values are anything cheap to move (retained strings, code hashes).
#[derive(Debug)]
pub struct StringDict<V> {
    tab: HashTab<TextRef, V, TextKeyOps>,
}

impl<V> StringDict<V> {
    pub fn new() -> Self {
        Self {
            tab: HashTab::with_ops(TextKeyOps),
        }
    }

    pub fn len(&self) -> usize {
        self.tab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tab.is_empty()
    }

    /// Inserts if absent; false and no change when the key exists.
    pub fn add(&mut self, key: TextRef, value: V) -> bool {
        self.tab.add(key, value)
    }

    pub fn find(&self, key: &TextRef) -> Option<&V> {
        self.tab.find(key).map(|e| &e.value)
    }

    /// Insert-or-replace; true when the key was newly added.
    pub fn upsert(&mut self, key: TextRef, value: V) -> bool {
        if let Some(entry) = self.tab.find_mut(&key) {
            entry.value = value;
            return false;
        }
        self.tab.add(key, value)
    }
}

impl<V> Default for StringDict<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    struct IntOps;

    impl KeyOps<u64> for IntOps {
        fn hash(&self, key: &u64) -> u64 {
            // identity hash keeps probe positions predictable
            *key
        }

        fn eq(&self, a: &u64, b: &u64) -> bool {
            a == b
        }
    }

    #[test]
    fn add_then_find_returns_the_value() {
        let mut tab = HashTab::with_ops(IntOps);
        assert!(tab.add(10, "ten"));
        assert_eq!(tab.find(&10).map(|e| e.value), Some("ten"));
        assert!(tab.find(&11).is_none());
    }

    #[test]
    fn duplicate_add_returns_false_and_keeps_existing() {
        let mut tab = HashTab::with_ops(IntOps);
        assert!(tab.add(5, "first"));
        assert!(!tab.add(5, "second"));
        assert_eq!(tab.len(), 1);
        assert_eq!(tab.find(&5).map(|e| e.value), Some("first"));
    }

    #[test]
    fn crossing_load_factor_doubles_capacity_exactly_once() {
        let mut tab = HashTab::with_ops(IntOps);
        assert_eq!(tab.capacity(), 4);
        // 3 entries fill to 75%; nothing grows yet
        for k in 0..3 {
            assert!(tab.add(k, k));
        }
        assert_eq!(tab.capacity(), 4);
        // one past the load factor triggers exactly one doubling
        assert!(tab.add(3, 3));
        assert_eq!(tab.capacity(), 8);
        for k in 0..4 {
            assert_eq!(tab.find(&k).map(|e| e.value), Some(k));
        }
    }

    #[test]
    fn colliding_keys_probe_linearly() {
        let mut tab = HashTab::with_ops(IntOps);
        // same slot modulo 4
        assert!(tab.add(1, "a"));
        assert!(tab.add(5, "b"));
        assert!(tab.add(9, "c"));
        assert_eq!(tab.find(&1).map(|e| e.value), Some("a"));
        assert_eq!(tab.find(&5).map(|e| e.value), Some("b"));
        assert_eq!(tab.find(&9).map(|e| e.value), Some("c"));
    }

    #[test]
    fn find_mut_permits_in_place_replacement() {
        let mut tab = HashTab::with_ops(IntOps);
        tab.add(1, 100);
        tab.find_mut(&1).unwrap().value = 200;
        assert_eq!(tab.find(&1).map(|e| e.value), Some(200));
    }

    #[test]
    fn growth_keeps_all_keys_findable() {
        let mut tab = HashTab::with_ops(IntOps);
        for k in 0..100 {
            assert!(tab.add(k, k * 2));
        }
        assert_eq!(tab.len(), 100);
        assert!(tab.capacity().is_power_of_two());
        for k in 0..100 {
            assert_eq!(tab.find(&k).map(|e| e.value), Some(k * 2));
        }
    }

    #[test]
    fn string_dict_add_and_find_by_content() {
        let mut dict = StringDict::new();
        assert!(dict.add(Rc::from("alpha"), 1i64));
        assert!(!dict.add(Rc::from("alpha"), 2));
        // lookup key is a distinct allocation with equal content
        assert_eq!(dict.find(&Rc::from("alpha")), Some(&1));
    }

    #[test]
    fn string_dict_upsert_replaces_in_place() {
        let mut dict = StringDict::new();
        assert!(dict.upsert(Rc::from("k"), 1i64));
        assert!(!dict.upsert(Rc::from("k"), 2));
        assert_eq!(dict.find(&Rc::from("k")), Some(&2));
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn dropping_the_table_releases_stored_keys() {
        let key: TextRef = Rc::from("held");
        let mut dict = StringDict::new();
        dict.add(key.clone(), ());
        assert_eq!(Rc::strong_count(&key), 2);
        drop(dict);
        assert_eq!(Rc::strong_count(&key), 1);
    }
}
