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

use super::{IndexedBufferStats, ManagedBuffer, RecordFilter, SlotAllocator, UpdateOutcome};
use crate::config::IndexedBufferConfig;
use ahash::{AHashMap, AHashSet};
use bytemuck::{Pod, Zeroable};
use std::marker::PhantomData;
use std::sync::Arc;
use tessera_core::utils::{align_up, ThreadOwnership};
use tessera_core::{
    contract, ArrayBufferDescriptor, BufferId, BufferInput, BufferUsage, DeviceBufferFactory,
    MemoryPool, Namespace, RecordId, RecordKey, RecordSource, ResourceError, INVALID_INDEX,
};

type MapRecord<T, G> = Box<dyn Fn(&T) -> G + Send + Sync + 'static>;

fn stride_of<G>() -> u32 {
    std::mem::size_of::<G>() as u32
}

/// A dense device array holding one mapped element per live record of type `T`.
///
/// `G` is the device-side element produced by the buffer's map function. The
/// buffer mirrors the records in `S` through a key-to-slot table: a record keeps
/// its slot until it is deleted, filtered out, or the array is rebuilt with a
/// new capacity.
///
/// The array is rebuilt from scratch when the live count outgrows the capacity
/// or drops below `capacity / shrink_factor`; otherwise only changed records are
/// committed. Until the first record arrives, [`buffer_input`](Self::buffer_input)
/// points at a one-element zeroed fallback array so consumers can always bind
/// something.
pub struct TypedIndexedBuffer<T, G, S>
where
    G: Pod,
    S: RecordSource<T>,
{
    ownership: ThreadOwnership,
    packing: Packing<T, G, S>,
}

struct Packing<T, G, S>
where
    G: Pod,
    S: RecordSource<T>,
{
    name: String,
    source: Arc<S>,
    device: Arc<dyn DeviceBufferFactory>,
    map_record: MapRecord<T, G>,
    filter: Option<RecordFilter<T>>,
    pool: MemoryPool,
    config: IndexedBufferConfig,
    slots: AHashMap<S::Key, u32>,
    free: SlotAllocator,
    buffer: Option<BufferId>,
    fallback: BufferId,
    /// Set when a device error left the array behind the source.
    stale: bool,
    stats: IndexedBufferStats,
    _record: PhantomData<fn(&T)>,
}

impl<T, G, S> TypedIndexedBuffer<T, G, S>
where
    G: Pod,
    S: RecordSource<T>,
{
    /// Creates an empty buffer together with its fallback array.
    ///
    /// ## Arguments
    /// * `name` - Unique name, also used as the device label.
    /// * `source` - The registry the buffer mirrors.
    /// * `device` - Where arrays are created.
    /// * `map_record` - Converts a record into its device element.
    /// * `pool` - Placement hint for every array this buffer creates.
    /// * `filter` - Records rejected by the filter get no slot.
    /// * `config` - Capacity policy.
    /// ## Returns
    /// The buffer, or the device error raised while creating the fallback array.
    pub fn new(
        name: impl Into<String>,
        source: Arc<S>,
        device: Arc<dyn DeviceBufferFactory>,
        map_record: impl Fn(&T) -> G + Send + Sync + 'static,
        pool: MemoryPool,
        filter: Option<RecordFilter<T>>,
        config: IndexedBufferConfig,
    ) -> Result<Self, ResourceError> {
        let name = name.into();
        let fallback = device.create_array(&ArrayBufferDescriptor {
            label: format!("{name} (fallback)").into(),
            element_stride: stride_of::<G>(),
            element_count: 1,
            pool,
            usage: BufferUsage::MANAGED_ARRAY,
        })?;
        if let Err(e) = device.commit(fallback, 0, bytemuck::bytes_of(&G::zeroed())) {
            device.retire(fallback);
            return Err(e);
        }

        Ok(Self {
            ownership: ThreadOwnership::new(),
            packing: Packing {
                name,
                source,
                device,
                map_record: Box::new(map_record),
                filter,
                pool,
                config,
                slots: AHashMap::new(),
                free: SlotAllocator::new(),
                buffer: None,
                fallback,
                stale: false,
                stats: IndexedBufferStats::default(),
                _record: PhantomData,
            },
        })
    }

    /// Applies the source's diff since the previous frame.
    ///
    /// After a device error the buffer no longer trusts the diff: the next
    /// update rebuilds the array from every live record.
    ///
    /// # Panics
    /// In debug builds, panics when the source's diff contradicts the slot table
    /// (see [`contract!`]), or when another thread is updating the same buffer.
    pub fn update(&mut self) -> Result<UpdateOutcome, ResourceError> {
        let _owner = self.ownership.claim(&self.packing.name);
        self.packing.update()
    }

    /// Slot of the record `id`, or [`INVALID_INDEX`] if it has none.
    pub fn index_of(&self, id: RecordId) -> u32 {
        self.packing
            .source
            .resolve(id)
            .map_or(INVALID_INDEX, |key| self.index_of_key(key))
    }

    /// Slot of a key of this buffer's own namespace, or [`INVALID_INDEX`].
    pub fn index_of_key(&self, key: S::Key) -> u32 {
        self.packing
            .slots
            .get(&key)
            .copied()
            .unwrap_or(INVALID_INDEX)
    }

    /// The current array, or the fallback when nothing is allocated.
    pub fn buffer(&self) -> BufferId {
        self.packing.buffer.unwrap_or(self.packing.fallback)
    }

    /// Bind descriptor of the whole array.
    pub fn buffer_input(&self) -> BufferInput {
        match self.packing.buffer {
            Some(buffer) => BufferInput {
                buffer,
                first_element: 0,
                element_count: u64::from(self.capacity()),
                element_stride: self.stride(),
            },
            None => BufferInput {
                buffer: self.packing.fallback,
                first_element: 0,
                element_count: 1,
                element_stride: self.stride(),
            },
        }
    }

    /// Bind descriptor of the single element holding `id`.
    pub fn element_input(&self, id: RecordId) -> Option<BufferInput> {
        let buffer = self.packing.buffer?;
        let slot = self.index_of(id);
        (slot != INVALID_INDEX).then(|| BufferInput {
            buffer,
            first_element: u64::from(slot),
            element_count: 1,
            element_stride: self.stride(),
        })
    }

    /// The buffer's name.
    pub fn name(&self) -> &str {
        &self.packing.name
    }

    /// Size of one element in bytes.
    pub fn stride(&self) -> u32 {
        stride_of::<G>()
    }

    /// Capacity of the current array in elements, zero when nothing is allocated.
    pub fn capacity(&self) -> u32 {
        self.packing.free.capacity()
    }

    /// Number of records that own a slot.
    pub fn live_len(&self) -> usize {
        self.packing.slots.len()
    }

    /// The placement hint used for this buffer's arrays.
    pub fn pool(&self) -> MemoryPool {
        self.packing.pool
    }

    /// Lifetime counters.
    pub fn stats(&self) -> IndexedBufferStats {
        self.packing.stats
    }

    /// Checks that every slot in `[0, capacity)` is either owned by exactly one
    /// key or free, never both.
    pub fn check_invariants(&self) -> bool {
        let packing = &self.packing;
        let capacity = packing.free.capacity() as usize;
        let distinct: AHashSet<u32> = packing.slots.values().copied().collect();

        let device_capacity = match packing.buffer {
            Some(buffer) => packing.device.capacity(buffer).ok(),
            None => Some(0),
        };

        device_capacity == Some(capacity as u64)
            && distinct.len() == packing.slots.len()
            && packing.slots.len() + packing.free.free_len() == capacity
            && packing.slots.len() == packing.free.occupied_len()
            && distinct.iter().all(|&slot| packing.free.is_occupied(slot))
    }
}

impl<T, G, S> Packing<T, G, S>
where
    G: Pod,
    S: RecordSource<T>,
{
    fn update(&mut self) -> Result<UpdateOutcome, ResourceError> {
        let result = self.refresh();
        if let Err(e) = &result {
            log::warn!("Indexed buffer '{}' failed to update, will rebuild: {}", self.name, e);
            self.stale = true;
        }
        result
    }

    fn refresh(&mut self) -> Result<UpdateOutcome, ResourceError> {
        if !self.stale && !self.source.has_changes() {
            return Ok(UpdateOutcome::Unchanged);
        }

        let live = self.source.live_count();
        if live == 0 {
            return Ok(self.release());
        }
        let live = u32::try_from(live).unwrap_or(INVALID_INDEX - 1);

        match self.buffer {
            Some(buffer) if !self.stale && !self.needs_rebuild(live) => self.apply_diff(buffer),
            _ => self.rebuild(live),
        }
    }

    fn needs_rebuild(&self, live: u32) -> bool {
        let capacity = self.free.capacity();
        if live > capacity {
            return true;
        }
        let oversized = u64::from(capacity) > u64::from(live) * u64::from(self.config.shrink_factor);
        oversized && align_up(live, self.config.alignment) < capacity
    }

    fn release(&mut self) -> UpdateOutcome {
        self.stale = false;
        self.slots.clear();
        self.free.clear();
        match self.buffer.take() {
            Some(old) => {
                self.device.retire(old);
                self.stats.releases += 1;
                log::debug!("Indexed buffer '{}' is empty, retired {:?}", self.name, old);
                UpdateOutcome::Released
            }
            None => UpdateOutcome::Unchanged,
        }
    }

    fn rebuild(&mut self, live: u32) -> Result<UpdateOutcome, ResourceError> {
        let capacity = align_up(live, self.config.alignment);
        let mut slots = AHashMap::with_capacity(live as usize);
        let mut free = SlotAllocator::new();
        free.reset(capacity);

        let mut staging = vec![G::zeroed(); capacity as usize];
        self.source.for_each_live(|key, record| {
            if self.filter.as_ref().is_some_and(|keep| !keep(record)) {
                return;
            }
            let Some(slot) = free.acquire() else {
                contract!(
                    false,
                    "{}: free-slot exhaustion while repacking {capacity} slots",
                    self.name
                );
                return;
            };
            slots.insert(key, slot);
            staging[slot as usize] = (self.map_record)(record);
        });

        let buffer = self.device.create_array(&ArrayBufferDescriptor {
            label: self.name.as_str().into(),
            element_stride: stride_of::<G>(),
            element_count: u64::from(capacity),
            pool: self.pool,
            usage: BufferUsage::MANAGED_ARRAY,
        })?;
        let bytes: &[u8] = bytemuck::cast_slice(&staging);
        let filled = self.device.capacity(buffer).and_then(|reported| {
            contract!(
                reported == u64::from(capacity),
                "{}: device array holds {reported} elements, expected {capacity}",
                self.name
            );
            self.device.commit(buffer, 0, bytes)
        });
        if let Err(e) = filled {
            self.device.retire(buffer);
            return Err(e);
        }

        if let Some(old) = self.buffer.replace(buffer) {
            self.device.retire(old);
        }
        self.slots = slots;
        self.free = free;
        self.stale = false;
        self.stats.full_rebuilds += 1;
        self.stats.bytes_committed += bytes.len() as u64;

        log::debug!(
            "Indexed buffer '{}' rebuilt: {} records in {} slots ({:?})",
            self.name,
            self.slots.len(),
            capacity,
            <S::Key as RecordKey>::NAMESPACE
        );
        Ok(UpdateOutcome::Rebuilt {
            capacity,
            live: self.slots.len() as u32,
        })
    }

    fn apply_diff(&mut self, buffer: BufferId) -> Result<UpdateOutcome, ResourceError> {
        for key in self.source.deleted_keys() {
            match self.slots.remove(&key) {
                Some(slot) => self.free.release(slot),
                None => {
                    // Filtered records never had a slot.
                    contract!(
                        self.filter.is_some(),
                        "{}: deleted key {key:?} was never mapped",
                        self.name
                    );
                }
            }
        }

        let stride = u64::from(stride_of::<G>());
        let mut writes = 0u32;
        for key in self.source.dirty_keys() {
            let mapped = self.source.with_record(key, |record| {
                let keep = self.filter.as_ref().map_or(true, |keep| keep(record));
                keep.then(|| (self.map_record)(record))
            });
            let Some(mapped) = mapped else {
                contract!(false, "{}: dirty key {key:?} has no live record", self.name);
                continue;
            };
            let Some(element) = mapped else {
                if let Some(slot) = self.slots.remove(&key) {
                    self.free.release(slot);
                }
                continue;
            };

            let slot = match self.slots.get(&key) {
                Some(&slot) => slot,
                None => {
                    let Some(slot) = self.free.acquire() else {
                        contract!(
                            false,
                            "{}: free-slot exhaustion with {} slots",
                            self.name,
                            self.free.capacity()
                        );
                        continue;
                    };
                    self.slots.insert(key, slot);
                    slot
                }
            };

            let bytes = bytemuck::bytes_of(&element);
            self.device.commit(buffer, u64::from(slot) * stride, bytes)?;
            writes += 1;
            self.stats.element_writes += 1;
            self.stats.bytes_committed += bytes.len() as u64;
        }

        self.stats.incremental_updates += 1;
        log::trace!("Indexed buffer '{}': {} element writes", self.name, writes);
        Ok(UpdateOutcome::Incremental { writes })
    }
}

impl<T, G, S> Drop for Packing<T, G, S>
where
    G: Pod,
    S: RecordSource<T>,
{
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.device.retire(buffer);
        }
        self.device.retire(self.fallback);
    }
}

impl<T, G, S> ManagedBuffer for TypedIndexedBuffer<T, G, S>
where
    T: 'static,
    G: Pod,
    S: RecordSource<T>,
{
    fn name(&self) -> &str {
        TypedIndexedBuffer::name(self)
    }

    fn namespace(&self) -> Namespace {
        <S::Key as RecordKey>::NAMESPACE
    }

    fn update(&mut self) -> Result<UpdateOutcome, ResourceError> {
        TypedIndexedBuffer::update(self)
    }

    fn index_of(&self, id: RecordId) -> u32 {
        TypedIndexedBuffer::index_of(self, id)
    }

    fn buffer_input(&self) -> BufferInput {
        TypedIndexedBuffer::buffer_input(self)
    }

    fn element_input(&self, id: RecordId) -> Option<BufferInput> {
        TypedIndexedBuffer::element_input(self, id)
    }

    fn capacity(&self) -> u32 {
        TypedIndexedBuffer::capacity(self)
    }

    fn live_len(&self) -> usize {
        TypedIndexedBuffer::live_len(self)
    }

    fn stats(&self) -> IndexedBufferStats {
        TypedIndexedBuffer::stats(self)
    }
}
