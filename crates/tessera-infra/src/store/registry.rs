// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::{BTreeMap, BTreeSet};

/// Records plus the diff accumulated since the last `end_frame`.
#[derive(Debug)]
pub(super) struct Registry<K, T> {
    records: BTreeMap<K, T>,
    /// Keys that did not exist at the start of the frame.
    created: BTreeSet<K>,
    dirty: BTreeSet<K>,
    deleted: BTreeSet<K>,
}

impl<K, T> Default for Registry<K, T> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            created: BTreeSet::new(),
            dirty: BTreeSet::new(),
            deleted: BTreeSet::new(),
        }
    }
}

impl<K: Ord + Copy, T> Registry<K, T> {
    pub(super) fn insert(&mut self, key: K, record: T) -> bool {
        let is_new = self.records.insert(key, record).is_none();
        // A key deleted earlier this frame is still mapped downstream.
        if is_new && !self.deleted.remove(&key) {
            self.created.insert(key);
        }
        self.dirty.insert(key);
        is_new
    }

    pub(super) fn modify(&mut self, key: K, edit: impl FnOnce(&mut T)) -> bool {
        match self.records.get_mut(&key) {
            Some(record) => {
                edit(record);
                self.dirty.insert(key);
                true
            }
            None => false,
        }
    }

    pub(super) fn remove(&mut self, key: K) -> Option<T> {
        let record = self.records.remove(&key)?;
        self.dirty.remove(&key);
        if !self.created.remove(&key) {
            self.deleted.insert(key);
        }
        Some(record)
    }

    pub(super) fn contains(&self, key: K) -> bool {
        self.records.contains_key(&key)
    }

    pub(super) fn get(&self, key: K) -> Option<&T> {
        self.records.get(&key)
    }

    pub(super) fn len(&self) -> usize {
        self.records.len()
    }

    pub(super) fn has_changes(&self) -> bool {
        !self.dirty.is_empty() || !self.deleted.is_empty()
    }

    pub(super) fn dirty_keys(&self) -> Vec<K> {
        self.dirty.iter().copied().collect()
    }

    pub(super) fn deleted_keys(&self) -> Vec<K> {
        self.deleted.iter().copied().collect()
    }

    pub(super) fn for_each(&self, mut f: impl FnMut(K, &T)) {
        for (key, record) in &self.records {
            f(*key, record);
        }
    }

    pub(super) fn end_frame(&mut self) {
        self.created.clear();
        self.dirty.clear();
        self.deleted.clear();
    }
}
