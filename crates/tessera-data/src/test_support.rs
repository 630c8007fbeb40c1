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

//! In-memory doubles of the device and source contracts for unit tests.

use ahash::AHashMap;
use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use tessera_core::{
    ArrayBufferDescriptor, BufferId, DeviceBufferFactory, RecordId, RecordSource, ResourceError,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct Point {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Point {
    pub fn new(x: u32) -> Self {
        Self {
            x,
            y: x * 2,
            z: x * 3,
        }
    }
}

#[derive(Debug, Default)]
struct DeviceState {
    next_id: usize,
    buffers: AHashMap<BufferId, (Vec<u8>, u32)>,
    retired: Vec<BufferId>,
    commits: usize,
    fail_creates: bool,
    failing_commits: usize,
}

/// Keeps every buffer in host memory and never destroys retired ones.
#[derive(Debug, Default)]
pub(crate) struct MockDevice {
    state: Mutex<DeviceState>,
}

impl MockDevice {
    pub fn read<G: Pod>(&self, id: BufferId) -> Vec<G> {
        let state = self.state.lock();
        let (data, _) = &state.buffers[&id];
        bytemuck::pod_collect_to_vec(data)
    }

    pub fn is_retired(&self, id: BufferId) -> bool {
        self.state.lock().retired.contains(&id)
    }

    pub fn commit_count(&self) -> usize {
        self.state.lock().commits
    }

    pub fn created_count(&self) -> usize {
        self.state.lock().next_id
    }

    pub fn fail_creates(&self, fail: bool) {
        self.state.lock().fail_creates = fail;
    }

    /// Makes the next `count` commits fail without writing.
    pub fn fail_next_commits(&self, count: usize) {
        self.state.lock().failing_commits = count;
    }
}

impl DeviceBufferFactory for MockDevice {
    fn create_array(&self, descriptor: &ArrayBufferDescriptor<'_>) -> Result<BufferId, ResourceError> {
        let mut state = self.state.lock();
        if state.fail_creates {
            return Err(ResourceError::Backend("out of device memory".to_string()));
        }
        let id = BufferId(state.next_id);
        state.next_id += 1;
        state.buffers.insert(
            id,
            (
                vec![0xAB; descriptor.byte_size() as usize],
                descriptor.element_stride,
            ),
        );
        Ok(id)
    }

    fn commit(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        state.commits += 1;
        if state.failing_commits > 0 {
            state.failing_commits -= 1;
            return Err(ResourceError::Backend("device lost".to_string()));
        }
        let (bytes, _) = state.buffers.get_mut(&id).ok_or(ResourceError::NotFound(id))?;
        let end = offset as usize + data.len();
        if end > bytes.len() {
            return Err(ResourceError::OutOfBounds {
                buffer: id,
                offset,
                len: data.len() as u64,
                size: bytes.len() as u64,
            });
        }
        bytes[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn capacity(&self, id: BufferId) -> Result<u64, ResourceError> {
        let state = self.state.lock();
        let (bytes, stride) = state.buffers.get(&id).ok_or(ResourceError::NotFound(id))?;
        Ok(bytes.len() as u64 / u64::from(*stride))
    }

    fn retire(&self, id: BufferId) {
        self.state.lock().retired.push(id);
    }
}

#[derive(Debug)]
struct SourceState<T> {
    records: BTreeMap<RecordId, T>,
    created: BTreeSet<RecordId>,
    dirty: BTreeSet<RecordId>,
    deleted: BTreeSet<RecordId>,
}

/// A record registry with a per-frame diff.
#[derive(Debug)]
pub(crate) struct MockSource<T> {
    state: Mutex<SourceState<T>>,
}

impl<T> Default for MockSource<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SourceState {
                records: BTreeMap::new(),
                created: BTreeSet::new(),
                dirty: BTreeSet::new(),
                deleted: BTreeSet::new(),
            }),
        }
    }
}

impl<T> MockSource<T> {
    pub fn insert(&self, id: RecordId, record: T) {
        let mut state = self.state.lock();
        if state.records.insert(id, record).is_none() && !state.deleted.remove(&id) {
            state.created.insert(id);
        }
        state.dirty.insert(id);
    }

    pub fn remove(&self, id: RecordId) {
        let mut state = self.state.lock();
        if state.records.remove(&id).is_none() {
            return;
        }
        state.dirty.remove(&id);
        if !state.created.remove(&id) {
            state.deleted.insert(id);
        }
    }

    pub fn end_frame(&self) {
        let mut state = self.state.lock();
        state.created.clear();
        state.dirty.clear();
        state.deleted.clear();
    }
}

impl<T: Send + Sync + 'static> RecordSource<T> for MockSource<T> {
    type Key = RecordId;

    fn live_count(&self) -> usize {
        self.state.lock().records.len()
    }

    fn has_changes(&self) -> bool {
        let state = self.state.lock();
        !state.dirty.is_empty() || !state.deleted.is_empty()
    }

    fn dirty_keys(&self) -> Vec<RecordId> {
        self.state.lock().dirty.iter().copied().collect()
    }

    fn deleted_keys(&self) -> Vec<RecordId> {
        self.state.lock().deleted.iter().copied().collect()
    }

    fn with_record<R>(&self, key: RecordId, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.state.lock().records.get(&key).map(f)
    }

    fn for_each_live(&self, mut f: impl FnMut(RecordId, &T)) {
        for (id, record) in &self.state.lock().records {
            f(*id, record);
        }
    }

    fn resolve(&self, id: RecordId) -> Option<RecordId> {
        Some(id)
    }
}
