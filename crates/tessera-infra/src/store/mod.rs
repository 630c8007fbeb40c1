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

//! In-memory record registries with per-frame change tracking.
//!
//! Each store implements `RecordSource` for its record type. A scene that
//! holds several stores exposes all of them through [`impl_record_source!`].

mod registry;

use parking_lot::RwLock;
use registry::Registry;
use tessera_core::{RecordId, RecordSource, TransformId};

use ahash::AHashMap;

/// Records keyed by [`RecordId`].
#[derive(Debug)]
pub struct ObjectStore<T> {
    registry: RwLock<Registry<RecordId, T>>,
}

impl<T> Default for ObjectStore<T> {
    fn default() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
        }
    }
}

impl<T> ObjectStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record and marks it dirty.
    ///
    /// ## Returns
    /// `true` if the record is new.
    pub fn insert(&self, id: RecordId, record: T) -> bool {
        self.registry.write().insert(id, record)
    }

    /// Edits a record in place and marks it dirty.
    ///
    /// ## Returns
    /// `false` if there is no such record.
    pub fn modify(&self, id: RecordId, edit: impl FnOnce(&mut T)) -> bool {
        self.registry.write().modify(id, edit)
    }

    /// Removes a record, reporting it as deleted unless it was created this frame.
    pub fn remove(&self, id: RecordId) -> Option<T> {
        self.registry.write().remove(id)
    }

    /// Returns `true` if the record is live.
    pub fn contains(&self, id: RecordId) -> bool {
        self.registry.read().contains(id)
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    /// Returns `true` if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets the current diff. Call once all consumers have updated.
    pub fn end_frame(&self) {
        self.registry.write().end_frame();
    }
}

impl<T: Send + Sync + 'static> RecordSource<T> for ObjectStore<T> {
    type Key = RecordId;

    fn live_count(&self) -> usize {
        self.len()
    }

    fn has_changes(&self) -> bool {
        self.registry.read().has_changes()
    }

    fn dirty_keys(&self) -> Vec<RecordId> {
        self.registry.read().dirty_keys()
    }

    fn deleted_keys(&self) -> Vec<RecordId> {
        self.registry.read().deleted_keys()
    }

    fn with_record<R>(&self, key: RecordId, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.registry.read().get(key).map(f)
    }

    fn for_each_live(&self, f: impl FnMut(RecordId, &T)) {
        self.registry.read().for_each(f);
    }

    fn resolve(&self, id: RecordId) -> Option<RecordId> {
        Some(id)
    }
}

/// Transform records keyed by [`TransformId`], plus the table linking general
/// records to their transform.
#[derive(Debug)]
pub struct TransformStore<T> {
    registry: RwLock<Registry<TransformId, T>>,
    links: RwLock<AHashMap<RecordId, TransformId>>,
}

impl<T> Default for TransformStore<T> {
    fn default() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            links: RwLock::new(AHashMap::new()),
        }
    }
}

impl<T> TransformStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a transform and marks it dirty.
    pub fn insert(&self, id: TransformId, transform: T) -> bool {
        self.registry.write().insert(id, transform)
    }

    /// Edits a transform in place and marks it dirty.
    pub fn modify(&self, id: TransformId, edit: impl FnOnce(&mut T)) -> bool {
        self.registry.write().modify(id, edit)
    }

    /// Removes a transform. Links pointing at it stay and resolve to no slot.
    pub fn remove(&self, id: TransformId) -> Option<T> {
        self.registry.write().remove(id)
    }

    /// Points `record` at `transform`, replacing any previous link.
    pub fn link(&self, record: RecordId, transform: TransformId) {
        self.links.write().insert(record, transform);
    }

    /// Removes the transform link of `record`.
    pub fn unlink(&self, record: RecordId) -> Option<TransformId> {
        self.links.write().remove(&record)
    }

    /// Number of live transforms.
    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    /// Returns `true` if the store holds no transforms.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets the current diff.
    pub fn end_frame(&self) {
        self.registry.write().end_frame();
    }
}

impl<T: Send + Sync + 'static> RecordSource<T> for TransformStore<T> {
    type Key = TransformId;

    fn live_count(&self) -> usize {
        self.len()
    }

    fn has_changes(&self) -> bool {
        self.registry.read().has_changes()
    }

    fn dirty_keys(&self) -> Vec<TransformId> {
        self.registry.read().dirty_keys()
    }

    fn deleted_keys(&self) -> Vec<TransformId> {
        self.registry.read().deleted_keys()
    }

    fn with_record<R>(&self, key: TransformId, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.registry.read().get(key).map(f)
    }

    fn for_each_live(&self, f: impl FnMut(TransformId, &T)) {
        self.registry.read().for_each(f);
    }

    fn resolve(&self, id: RecordId) -> Option<TransformId> {
        self.links.read().get(&id).copied()
    }
}

/// Implements `RecordSource` for a struct by delegating each record type to
/// one of its store fields.
///
/// ```
/// use tessera_infra::{impl_record_source, ObjectStore, TransformStore};
///
/// #[derive(Default)]
/// struct Scene {
///     meshes: ObjectStore<u32>,
///     transforms: TransformStore<[f32; 3]>,
/// }
///
/// impl_record_source!(Scene {
///     meshes: ObjectStore<u32>,
///     transforms: TransformStore<[f32; 3]>,
/// });
///
/// fn live<T, S: tessera_core::RecordSource<T>>(source: &S) -> usize {
///     source.live_count()
/// }
///
/// let scene = Scene::default();
/// scene.meshes.insert(tessera_core::RecordId(1), 5);
/// assert_eq!(live::<u32, _>(&scene), 1);
/// assert_eq!(live::<[f32; 3], _>(&scene), 0);
/// ```
#[macro_export]
macro_rules! impl_record_source {
    ($scene:ty { $($field:ident : $store:ident < $record:ty >),+ $(,)? }) => {
        $(
            impl $crate::__core::RecordSource<$record> for $scene {
                type Key = <$store<$record> as $crate::__core::RecordSource<$record>>::Key;

                fn live_count(&self) -> usize {
                    <$store<$record> as $crate::__core::RecordSource<$record>>::live_count(&self.$field)
                }

                fn has_changes(&self) -> bool {
                    <$store<$record> as $crate::__core::RecordSource<$record>>::has_changes(&self.$field)
                }

                fn dirty_keys(&self) -> ::std::vec::Vec<Self::Key> {
                    <$store<$record> as $crate::__core::RecordSource<$record>>::dirty_keys(&self.$field)
                }

                fn deleted_keys(&self) -> ::std::vec::Vec<Self::Key> {
                    <$store<$record> as $crate::__core::RecordSource<$record>>::deleted_keys(&self.$field)
                }

                fn with_record<R>(
                    &self,
                    key: Self::Key,
                    f: impl FnOnce(&$record) -> R,
                ) -> ::std::option::Option<R> {
                    <$store<$record> as $crate::__core::RecordSource<$record>>::with_record(&self.$field, key, f)
                }

                fn for_each_live(&self, f: impl FnMut(Self::Key, &$record)) {
                    <$store<$record> as $crate::__core::RecordSource<$record>>::for_each_live(&self.$field, f)
                }

                fn resolve(&self, id: $crate::__core::RecordId) -> ::std::option::Option<Self::Key> {
                    <$store<$record> as $crate::__core::RecordSource<$record>>::resolve(&self.$field, id)
                }
            }
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_store_reports_diff() {
        let store = ObjectStore::new();
        store.insert(RecordId(1), "a");
        store.insert(RecordId(2), "b");
        assert_eq!(store.dirty_keys(), vec![RecordId(1), RecordId(2)]);
        store.end_frame();
        assert!(!store.has_changes());

        store.modify(RecordId(2), |r| *r = "B");
        store.remove(RecordId(1));
        assert_eq!(store.dirty_keys(), vec![RecordId(2)]);
        assert_eq!(store.deleted_keys(), vec![RecordId(1)]);
        assert_eq!(store.with_record(RecordId(2), |r| *r), Some("B"));
    }

    #[test]
    fn record_created_and_removed_in_one_frame_leaves_no_trace() {
        let store = ObjectStore::new();
        store.insert(RecordId(4), 1u8);
        store.remove(RecordId(4));
        assert!(!store.has_changes());
        assert!(store.is_empty());
    }

    #[test]
    fn transform_store_resolves_through_links() {
        let store = TransformStore::new();
        store.insert(TransformId(10), [0.0f32; 3]);
        store.link(RecordId(1), TransformId(10));
        assert_eq!(store.resolve(RecordId(1)), Some(TransformId(10)));
        assert_eq!(store.resolve(RecordId(2)), None);
        store.unlink(RecordId(1));
        assert_eq!(store.resolve(RecordId(1)), None);
    }

    #[test]
    fn live_records_visit_in_key_order() {
        let store = ObjectStore::new();
        for id in [5, 1, 3] {
            store.insert(RecordId(id), id);
        }
        let mut seen = Vec::new();
        store.for_each_live(|id, _| seen.push(id.0));
        assert_eq!(seen, vec![1, 3, 5]);
    }
}
