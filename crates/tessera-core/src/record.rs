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

//! Record identifiers and the contract of the render-data source.
//!
//! The source is the authority on which records exist and which of them changed
//! since the previous frame. Allocators never validate the diff they are given;
//! an inconsistent diff is a bug in the source.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

/// Slot value returned for ids that have no slot in a buffer.
pub const INVALID_INDEX: u32 = u32::MAX;

/// A stable, externally assigned identifier of a general source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u32);

/// A stable identifier in the hierarchical transform namespace.
///
/// Records reach their transform through the source's indirection table
/// (see [`RecordSource::resolve`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransformId(pub u32);

/// The id namespace a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Ids of the generic object registry.
    General,
    /// Ids of the transform registry, reached from records through an indirection table.
    Transform,
}

/// A key type that indexed buffers can map to slots.
pub trait RecordKey: Copy + Eq + Hash + Ord + Debug + Send + Sync + 'static {
    /// The namespace this key type lives in.
    const NAMESPACE: Namespace;

    /// The raw integer value of the key.
    fn raw(self) -> u32;
}

impl RecordKey for RecordId {
    const NAMESPACE: Namespace = Namespace::General;

    fn raw(self) -> u32 {
        self.0
    }
}

impl RecordKey for TransformId {
    const NAMESPACE: Namespace = Namespace::Transform;

    fn raw(self) -> u32 {
        self.0
    }
}

/// The per-type view of the render-data source.
///
/// A source implements this once per record type it can provide. The diff
/// (`dirty_keys` / `deleted_keys`) describes the changes since the previous frame
/// and must not change while the allocators update.
pub trait RecordSource<T>: Send + Sync + 'static {
    /// The key type of this record type's registry.
    type Key: RecordKey;

    /// Total number of live records of this type.
    fn live_count(&self) -> usize;

    /// Returns `true` if any record was marked dirty or deleted since the previous frame.
    fn has_changes(&self) -> bool;

    /// Keys of records created or modified since the previous frame.
    fn dirty_keys(&self) -> Vec<Self::Key>;

    /// Keys of records removed since the previous frame.
    fn deleted_keys(&self) -> Vec<Self::Key>;

    /// Runs `f` on the record stored under `key`, if it is live.
    fn with_record<R>(&self, key: Self::Key, f: impl FnOnce(&T) -> R) -> Option<R>;

    /// Visits every live record in the registry's natural order.
    fn for_each_live(&self, f: impl FnMut(Self::Key, &T));

    /// Translates a general record id into this registry's key.
    ///
    /// For general records this is the identity; for transforms it goes through
    /// the indirection table and returns `None` for records without a transform.
    fn resolve(&self, id: RecordId) -> Option<Self::Key>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_report_their_namespace() {
        assert_eq!(RecordId::NAMESPACE, Namespace::General);
        assert_eq!(TransformId::NAMESPACE, Namespace::Transform);
        assert_eq!(RecordId(9).raw(), 9);
        assert_eq!(TransformId(4).raw(), 4);
    }

    #[test]
    fn record_ids_order_by_value() {
        let mut ids = vec![RecordId(3), RecordId(1), RecordId(2)];
        ids.sort();
        assert_eq!(ids, vec![RecordId(1), RecordId(2), RecordId(3)]);
    }
}
