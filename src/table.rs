//! Dual-indexed record table
//!
//! Every live record is reachable through two orderings:
//! - by key: unique, sorted; the identity of a record
//! - by value: non-unique, sorted; value -> set of keys holding that value
//!
//! Values are shared between both indices through `Arc<str>`, so a 1 MiB
//! value is stored once. The table is not synchronized; the engine owns it
//! behind its lock.

use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A single key/value pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub value: String,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The set of live records, indexed by key and by value
#[derive(Debug, Default)]
pub struct RecordTable {
    by_key: BTreeMap<String, Arc<str>>,
    by_value: BTreeMap<Arc<str>, BTreeSet<String>>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact match on the key ordering
    pub fn find_by_key(&self, key: &str) -> Option<Record> {
        self.by_key.get_key_value(key).map(|(key, value)| Record {
            key: key.clone(),
            value: value.to_string(),
        })
    }

    /// Borrow the value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.by_key.get(key).map(|value| &**value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Insert a new record. Returns `false` and leaves the table untouched
    /// when the key is already present.
    pub fn insert(&mut self, record: Record) -> bool {
        match self.by_key.entry(record.key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let value: Arc<str> = Arc::from(record.value);
                self.by_value
                    .entry(Arc::clone(&value))
                    .or_default()
                    .insert(slot.key().clone());
                slot.insert(value);
                true
            }
        }
    }

    /// Replace the value of an existing record in place.
    ///
    /// The record keeps its position in the key ordering; only its entry in
    /// the value ordering moves. Returns `false` when the key is absent.
    pub fn modify_value(&mut self, key: &str, new_value: String) -> bool {
        let Some(slot) = self.by_key.get_mut(key) else {
            return false;
        };
        let new_value: Arc<str> = Arc::from(new_value);
        let old_value = std::mem::replace(slot, Arc::clone(&new_value));

        unlink(&mut self.by_value, &old_value, key);
        self.by_value
            .entry(new_value)
            .or_default()
            .insert(key.to_owned());
        true
    }

    /// Remove a record by key. Returns `false` when the key is absent.
    pub fn erase(&mut self, key: &str) -> bool {
        match self.by_key.remove_entry(key) {
            Some((key, value)) => {
                unlink(&mut self.by_value, &value, &key);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// All keys currently holding `value`, in key order
    pub fn keys_with_value<'a>(&'a self, value: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.by_value
            .get(value)
            .into_iter()
            .flat_map(|keys| keys.iter().map(String::as_str))
    }

    /// `(key, value)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.by_key
            .iter()
            .map(|(key, value)| (key.as_str(), &**value))
    }

    /// `(key, value)` pairs ordered by value, ties broken by key
    pub fn iter_by_value(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.by_value.iter().flat_map(|(value, keys)| {
            keys.iter().map(move |key| (key.as_str(), &**value))
        })
    }

    /// Owned copy of every record, in key order
    pub fn records(&self) -> Vec<Record> {
        self.iter().map(|(key, value)| Record::new(key, value)).collect()
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let indexed: usize = self.by_value.values().map(BTreeSet::len).sum();
        assert_eq!(indexed, self.by_key.len(), "value index out of sync");

        for (value, keys) in &self.by_value {
            assert!(!keys.is_empty(), "empty key set left for {:?}", value);
            for key in keys {
                let stored = self.by_key.get(key).expect("value index names a dead key");
                assert_eq!(stored, value);
            }
        }
    }
}

fn unlink(by_value: &mut BTreeMap<Arc<str>, BTreeSet<String>>, value: &str, key: &str) {
    if let Some(keys) = by_value.get_mut(value) {
        keys.remove(key);
        if keys.is_empty() {
            by_value.remove(value);
        }
    }
}
