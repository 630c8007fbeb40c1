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

use super::arena::{LutArena, LutArenaStats};
use super::{LutKind, LutRecord, SlotResolver};
use crate::config::LutConfig;
use crate::indexed::IndexedBufferHandle;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tessera_core::{
    contract, BufferInput, DeviceBufferFactory, RecordId, ResourceError, INVALID_INDEX,
};

type ErasedWriter = Box<dyn Fn(u32, &mut [u8]) + Send + Sync + 'static>;

struct LutWriter {
    buffer: IndexedBufferHandle,
    write: ErasedWriter,
}

struct KindEntry {
    name: &'static str,
    stride: u32,
    writers: Vec<LutWriter>,
}

/// A snapshot of one lookup-table kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LutStats {
    /// The kind's name.
    pub name: &'static str,
    /// Number of registered writers.
    pub writers: usize,
    /// Counters of the kind's arena. Zeroed until the first table is uploaded.
    pub arena: LutArenaStats,
}

/// Builds lookup-table records and hands out per-frame views into their arenas.
///
/// Writers are registered up front through `&mut self`. Building and
/// uploading only need `&self` and may run from many threads at once: records
/// are composed without locks, and each kind's arena has its own lock held only
/// while a range is carved out and committed.
pub struct LutAllocator {
    config: LutConfig,
    device: Arc<dyn DeviceBufferFactory>,
    kinds: AHashMap<LutKind, KindEntry>,
    arenas: Mutex<AHashMap<LutKind, Arc<Mutex<LutArena>>>>,
    frame_index: u64,
}

impl LutAllocator {
    /// Creates an allocator with no registered kinds.
    pub fn new(device: Arc<dyn DeviceBufferFactory>, config: LutConfig) -> Self {
        Self {
            config,
            device,
            kinds: AHashMap::new(),
            arenas: Mutex::new(AHashMap::new()),
            frame_index: 0,
        }
    }

    /// Registers the writer that fills `L` records from the slots of `buffer`.
    ///
    /// Each `(buffer, kind)` pair may have one writer; writers run in
    /// registration order.
    pub fn register_writer<L: LutRecord>(
        &mut self,
        buffer: IndexedBufferHandle,
        write: impl Fn(u32, &mut L) + Send + Sync + 'static,
    ) {
        let stride = std::mem::size_of::<L>() as u32;
        let entry = self.kinds.entry(L::KIND).or_insert_with(|| KindEntry {
            name: L::NAME,
            stride,
            writers: Vec::new(),
        });
        if !contract!(
            entry.name == L::NAME && entry.stride == stride,
            "LUT kinds '{}' and '{}' share the tag {:?}",
            entry.name,
            L::NAME,
            L::KIND
        ) {
            return;
        }
        if !contract!(
            entry.writers.iter().all(|writer| writer.buffer != buffer),
            "buffer {buffer:?} already has a writer for LUT '{}'",
            L::NAME
        ) {
            return;
        }

        entry.writers.push(LutWriter {
            buffer,
            write: Box::new(move |slot: u32, bytes: &mut [u8]| {
                write(slot, bytemuck::from_bytes_mut(bytes))
            }),
        });
        log::debug!("Registered writer for LUT '{}' on {:?}", L::NAME, buffer);
    }

    /// Composes one `L` record per id.
    ///
    /// Records start from `initial` (or zeroed), then every writer fills in the
    /// fields it owns. Writers skip ids that have no slot in their buffer.
    pub fn build<L: LutRecord>(
        &self,
        ids: &[RecordId],
        initial: Option<&[L]>,
        resolver: &dyn SlotResolver,
    ) -> Vec<L> {
        let mut records = match initial {
            Some(initial) => {
                contract!(
                    initial.len() == ids.len(),
                    "LUT '{}': {} initial records for {} ids",
                    L::NAME,
                    initial.len(),
                    ids.len()
                );
                let mut records = initial.to_vec();
                records.resize(ids.len(), L::zeroed());
                records
            }
            None => vec![L::zeroed(); ids.len()],
        };

        let Some(entry) = self.kinds.get(&L::KIND) else {
            contract!(false, "LUT '{}' has no registered writers", L::NAME);
            return records;
        };
        for writer in &entry.writers {
            for (record, &id) in records.iter_mut().zip(ids) {
                let slot = resolver.slot_of(writer.buffer, id);
                if slot != INVALID_INDEX {
                    (writer.write)(slot, bytemuck::bytes_of_mut(record));
                }
            }
        }
        records
    }

    /// Copies `records` into this frame's arena for `L` and returns their view.
    ///
    /// The view stays valid until the next [`begin_frame`](Self::begin_frame).
    pub fn upload<L: LutRecord>(&self, records: &[L]) -> Result<BufferInput, ResourceError> {
        let arena = self.arena_for::<L>();
        let mut arena = arena.lock();
        let view = arena.allocate(&*self.device, &self.config, records.len() as u64)?;
        if !records.is_empty() {
            self.device
                .commit(view.buffer, view.byte_offset(), bytemuck::cast_slice(records))?;
        }
        Ok(view)
    }

    /// Rewinds every arena and updates its shrink bookkeeping.
    ///
    /// Invalidates all views handed out during the previous frame.
    pub fn begin_frame(&mut self) {
        for arena in self.arenas.get_mut().values() {
            arena.lock().begin_frame(&self.config);
        }
        self.frame_index += 1;
    }

    /// Number of frames begun since the allocator was created.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Per-kind snapshot, ordered by kind name.
    pub fn stats(&self) -> Vec<LutStats> {
        let arenas = self.arenas.lock();
        let mut stats: Vec<LutStats> = self
            .kinds
            .iter()
            .map(|(kind, entry)| LutStats {
                name: entry.name,
                writers: entry.writers.len(),
                arena: arenas
                    .get(kind)
                    .map(|arena| arena.lock().stats())
                    .unwrap_or_default(),
            })
            .collect();
        stats.sort_by_key(|s| s.name);
        stats
    }

    fn arena_for<L: LutRecord>(&self) -> Arc<Mutex<LutArena>> {
        let mut arenas = self.arenas.lock();
        let arena = arenas.entry(L::KIND).or_insert_with(|| {
            Arc::new(Mutex::new(LutArena::new(
                L::NAME,
                std::mem::size_of::<L>() as u32,
            )))
        });
        debug_assert_eq!(arena.lock().stride(), std::mem::size_of::<L>() as u32);
        Arc::clone(arena)
    }
}

impl Drop for LutAllocator {
    fn drop(&mut self) {
        for arena in self.arenas.get_mut().values() {
            arena.lock().retire(&*self.device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockDevice;
    use bytemuck::{Pod, Zeroable};

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
    struct DrawLut {
        transform: u32,
        material: u32,
    }

    impl LutRecord for DrawLut {
        const NAME: &'static str = "DrawLut";
    }

    const TRANSFORMS: IndexedBufferHandle = IndexedBufferHandle(0);
    const MATERIALS: IndexedBufferHandle = IndexedBufferHandle(1);

    /// Transforms know every id as `id + 100`; materials only know even ids.
    struct FixedSlots;

    impl SlotResolver for FixedSlots {
        fn slot_of(&self, buffer: IndexedBufferHandle, id: RecordId) -> u32 {
            match buffer {
                TRANSFORMS => id.0 + 100,
                MATERIALS if id.0 % 2 == 0 => id.0 / 2,
                _ => INVALID_INDEX,
            }
        }
    }

    fn allocator() -> (Arc<MockDevice>, LutAllocator) {
        let device = Arc::new(MockDevice::default());
        let mut luts = LutAllocator::new(device.clone(), LutConfig::default());
        luts.register_writer::<DrawLut>(TRANSFORMS, |slot, lut| lut.transform = slot);
        luts.register_writer::<DrawLut>(MATERIALS, |slot, lut| lut.material = slot);
        (device, luts)
    }

    fn ids(raw: &[u32]) -> Vec<RecordId> {
        raw.iter().copied().map(RecordId).collect()
    }

    #[test]
    fn every_writer_fills_its_field() {
        let (_device, luts) = allocator();
        let records = luts.build::<DrawLut>(&ids(&[2, 3]), None, &FixedSlots);
        assert_eq!(
            records,
            vec![
                DrawLut {
                    transform: 102,
                    material: 1
                },
                DrawLut {
                    transform: 103,
                    material: 0
                },
            ]
        );
    }

    #[test]
    fn untouched_fields_keep_initial_values() {
        let (_device, luts) = allocator();
        let initial = [DrawLut {
            transform: 0,
            material: 77,
        }];
        let records = luts.build(&ids(&[5]), Some(&initial[..]), &FixedSlots);
        assert_eq!(records[0].material, 77);
        assert_eq!(records[0].transform, 105);
    }

    #[test]
    fn uploads_in_one_frame_are_disjoint() {
        let (device, luts) = allocator();
        let first = luts.build::<DrawLut>(&ids(&[0, 2]), None, &FixedSlots);
        let second = luts.build::<DrawLut>(&ids(&[4]), None, &FixedSlots);
        let a = luts.upload(&first).unwrap();
        let b = luts.upload(&second).unwrap();
        assert_eq!(a.buffer, b.buffer);
        assert_eq!(b.first_element, 2);

        let data = device.read::<DrawLut>(a.buffer);
        assert_eq!(&data[0..2], &first[..]);
        assert_eq!(data[2], second[0]);
    }

    #[test]
    fn concurrent_uploads_get_disjoint_ranges() {
        let (_device, luts) = allocator();
        let mut views: Vec<BufferInput> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4u32)
                .map(|t| {
                    let luts = &luts;
                    scope.spawn(move || {
                        (0..8u32)
                            .map(|i| {
                                let records = luts.build::<DrawLut>(&ids(&[t * 8 + i]), None, &FixedSlots);
                                luts.upload(&records).unwrap()
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        views.sort_by_key(|v| (v.buffer, v.first_element));
        for pair in views.windows(2) {
            if pair[0].buffer == pair[1].buffer {
                assert!(pair[0].first_element + pair[0].element_count <= pair[1].first_element);
            }
        }
    }

    #[test]
    fn stats_report_registered_kinds() {
        let (_device, mut luts) = allocator();
        luts.upload(&[DrawLut::zeroed(); 3]).unwrap();
        luts.begin_frame();

        let stats = luts.stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].name, "DrawLut");
        assert_eq!(stats[0].writers, 2);
        assert_eq!(stats[0].arena.records, 3);
        assert_eq!(stats[0].arena.capacity, 64);
        assert_eq!(luts.frame_index(), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "already has a writer")]
    fn second_writer_for_same_buffer_is_rejected() {
        let (_device, mut luts) = allocator();
        luts.register_writer::<DrawLut>(TRANSFORMS, |_, _| {});
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "no registered writers")]
    fn building_unregistered_kind_is_rejected() {
        #[repr(C)]
        #[derive(Clone, Copy, Pod, Zeroable)]
        struct Orphan(u32);
        impl LutRecord for Orphan {
            const NAME: &'static str = "Orphan";
        }

        let (_device, luts) = allocator();
        luts.build::<Orphan>(&ids(&[1]), None, &FixedSlots);
    }
}
