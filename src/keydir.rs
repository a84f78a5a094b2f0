// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The in-memory index mapping every live key to the location of its most recent record.

use crate::id::SegmentId;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Points at a single record inside a segment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeydirEntry {
    /// Segment the record lives in.
    pub segment_id: SegmentId,

    /// Byte offset of the record's header within the segment.
    pub offset: u64,

    /// Total on-disk size of the record, header included.
    pub frame_length: u64,
}

/// Concurrent key -> [`KeydirEntry`] mapping.
///
/// Ordered iteration is deliberately not supported; a plain hash map is the right tool once
/// key order is off the table.
#[allow(clippy::module_name_repetitions)]
pub struct Keydir {
    inner: RwLock<HashMap<Box<[u8]>, KeydirEntry>>,
}

impl Keydir {
    /// Creates an empty keydir.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Looks up `key`, returning a copy of its entry if present.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<KeydirEntry> {
        self.inner
            .read()
            .expect("keydir lock poisoned")
            .get(key)
            .copied()
    }

    /// Inserts or replaces the entry for `key`.
    pub fn set(&self, key: &[u8], entry: KeydirEntry) {
        self.inner
            .write()
            .expect("keydir lock poisoned")
            .insert(key.into(), entry);
    }

    /// Removes the entry for `key`, if any. Returns whether a key was actually removed.
    pub fn remove(&self, key: &[u8]) -> bool {
        self.inner
            .write()
            .expect("keydir lock poisoned")
            .remove(key)
            .is_some()
    }

    /// A point-in-time snapshot of every segment id referenced by a live entry.
    #[must_use]
    pub fn snapshot_referenced_segments(&self) -> HashSet<SegmentId> {
        self.inner
            .read()
            .expect("keydir lock poisoned")
            .values()
            .map(|entry| entry.segment_id)
            .collect()
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("keydir lock poisoned").len()
    }

    /// `true` if no keys are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visits every live `(key, entry)` pair. Iteration order is unspecified.
    pub fn for_each(&self, mut f: impl FnMut(&[u8], KeydirEntry)) {
        for (key, entry) in self.inner.read().expect("keydir lock poisoned").iter() {
            f(key, *entry);
        }
    }
}

impl Default for Keydir {
    fn default() -> Self {
        Self::new()
    }
}
