//! Ordered, key-unique record collection.

use std::collections::HashSet;

use serde::Serialize;

use super::Record;

/// An ordered sequence of records with unique primary keys.
///
/// Only the reconciler and refetch replacement mutate a collection; views get
/// shared references or clones.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Collection<T> {
    records: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<T: Record> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a collection from a fetched result set.
    ///
    /// Duplicate keys keep the first position and the last value. Sequenced
    /// records are sorted ascending (stable).
    pub fn from_records(records: impl IntoIterator<Item = T>) -> Self {
        let mut collection = Self::new();
        for record in records {
            match collection.position(record.key()) {
                Some(idx) => collection.records[idx] = record,
                None => collection.records.push(record),
            }
        }
        if collection.records.iter().any(|r| r.sequence().is_some()) {
            collection
                .records
                .sort_by_key(|r| r.sequence().unwrap_or(i64::MAX));
        }
        collection
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.records
    }

    pub fn into_vec(self) -> Vec<T> {
        self.records
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.records.iter().find(|r| r.key() == key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.key())
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.records.iter().position(|r| r.key() == key)
    }

    /// Inserts or replaces `record`.
    ///
    /// Unsequenced records are replaced in place or appended. Sequenced
    /// records are (re)placed after every record with a lower or equal
    /// sequence.
    pub(crate) fn upsert(&mut self, record: T) {
        let Some(seq) = record.sequence() else {
            match self.position(record.key()) {
                Some(idx) => self.records[idx] = record,
                None => self.records.push(record),
            }
            return;
        };

        if let Some(idx) = self.position(record.key()) {
            if self.records[idx].sequence() == Some(seq) {
                self.records[idx] = record;
                return;
            }
            self.records.remove(idx);
        }

        let at = self
            .records
            .partition_point(|r| r.sequence().is_some_and(|s| s <= seq));
        self.records.insert(at, record);
    }

    /// Replaces the record with `record`'s key. Returns false when absent.
    pub(crate) fn replace(&mut self, record: T) -> bool {
        if !self.contains_key(record.key()) {
            return false;
        }
        self.upsert(record);
        true
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<T> {
        self.position(key).map(|idx| self.records.remove(idx))
    }

    /// True when keys are unique and sequenced records are non-decreasing.
    pub fn is_consistent(&self) -> bool {
        let mut seen = HashSet::new();
        if !self.records.iter().all(|r| seen.insert(r.key())) {
            return false;
        }
        let sequences: Vec<i64> = self.records.iter().filter_map(|r| r.sequence()).collect();
        sequences.windows(2).all(|w| w[0] <= w[1])
    }
}

impl<'a, T> IntoIterator for &'a Collection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
