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

//! The device arena behind one lookup-table kind.

use crate::config::LutConfig;
use tessera_core::utils::align_up_u64;
use tessera_core::{
    ArrayBufferDescriptor, BufferId, BufferInput, BufferUsage, DeviceBufferFactory, MemoryPool,
    ResourceError,
};

/// Lifetime counters of one arena.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LutArenaStats {
    /// Current capacity in records.
    pub capacity: u64,
    /// Number of tables carved out.
    pub allocations: u64,
    /// Number of records carved out.
    pub records: u64,
    /// Number of rebuilds caused by overflow.
    pub grows: u64,
    /// Number of rebuilds caused by sustained under-use.
    pub shrinks: u64,
}

/// A bump allocator over one device array, reset every frame.
///
/// Overflow rebuilds the array at a larger capacity, retiring the old one so
/// views handed out earlier in the frame stay valid. Shrinking is hysteretic:
/// the arena must be under-used for `shrink_after_frames` consecutive frames,
/// and then shrinks to fit the largest demand seen in that window.
#[derive(Debug)]
pub(crate) struct LutArena {
    label: &'static str,
    stride: u32,
    buffer: Option<BufferId>,
    capacity: u64,
    cursor: u64,
    frame_demand: u64,
    window_peak: u64,
    underused_frames: u32,
    must_shrink: bool,
    fresh_frame: bool,
    shrunk_this_frame: bool,
    /// A shrunk capacity that had to grow again in the same frame.
    regrown_size: Option<u64>,
    stats: LutArenaStats,
}

impl LutArena {
    pub(crate) fn new(label: &'static str, stride: u32) -> Self {
        Self {
            label,
            stride,
            buffer: None,
            capacity: 0,
            cursor: 0,
            frame_demand: 0,
            window_peak: 0,
            underused_frames: 0,
            must_shrink: false,
            fresh_frame: true,
            shrunk_this_frame: false,
            regrown_size: None,
            stats: LutArenaStats::default(),
        }
    }

    pub(crate) fn stride(&self) -> u32 {
        self.stride
    }

    pub(crate) fn stats(&self) -> LutArenaStats {
        LutArenaStats {
            capacity: self.capacity,
            ..self.stats
        }
    }

    /// Closes the previous frame's books and rewinds the cursor.
    pub(crate) fn begin_frame(&mut self, config: &LutConfig) {
        if self.buffer.is_some() {
            let underused =
                self.frame_demand.saturating_mul(u64::from(config.shrink_factor)) <= self.capacity;
            let above_floor = self.capacity > align_up_u64(config.min_capacity, config.alignment);
            if underused && above_floor {
                self.underused_frames += 1;
                self.window_peak = self.window_peak.max(self.frame_demand);
                if self.underused_frames >= config.shrink_after_frames {
                    self.must_shrink = true;
                }
            } else {
                self.underused_frames = 0;
                self.window_peak = 0;
                self.must_shrink = false;
            }
        }

        self.cursor = 0;
        self.frame_demand = 0;
        self.fresh_frame = true;
        self.shrunk_this_frame = false;
    }

    /// Reserves `count` consecutive records and returns their view.
    pub(crate) fn allocate(
        &mut self,
        device: &dyn DeviceBufferFactory,
        config: &LutConfig,
        count: u64,
    ) -> Result<BufferInput, ResourceError> {
        if std::mem::take(&mut self.fresh_frame) && self.must_shrink {
            self.shrink(device, config)?;
        }

        if self.buffer.is_none() || self.cursor + count > self.capacity {
            let grown = self.capacity.saturating_mul(u64::from(config.growth_factor));
            let target = align_up_u64(grown.max(count).max(config.min_capacity), config.alignment);
            if self.shrunk_this_frame {
                self.regrown_size = Some(self.capacity);
            }
            let previous = self.buffer.map(|_| self.capacity);
            self.rebuild(device, target)?;
            if let Some(previous) = previous {
                self.stats.grows += 1;
                log::info!(
                    "LUT arena '{}' grows from {} to {} records",
                    self.label,
                    previous,
                    target
                );
            }
        }

        let Some(buffer) = self.buffer else {
            unreachable!("arena was just rebuilt");
        };
        let first_element = self.cursor;
        self.cursor += count;
        self.frame_demand += count;
        self.stats.allocations += 1;
        self.stats.records += count;
        Ok(BufferInput {
            buffer,
            first_element,
            element_count: count,
            element_stride: self.stride,
        })
    }

    fn shrink(&mut self, device: &dyn DeviceBufferFactory, config: &LutConfig) -> Result<(), ResourceError> {
        let peak = self.window_peak.saturating_mul(u64::from(config.growth_factor));
        let mut target = align_up_u64(peak.max(config.min_capacity), config.alignment);
        if let Some(regrown) = self.regrown_size {
            if target <= regrown {
                target = align_up_u64(regrown.saturating_mul(u64::from(config.growth_factor)), config.alignment);
            }
        }

        self.must_shrink = false;
        self.underused_frames = 0;
        self.window_peak = 0;
        if target >= self.capacity {
            return Ok(());
        }

        log::info!(
            "LUT arena '{}' shrinks from {} to {} records",
            self.label,
            self.capacity,
            target
        );
        self.rebuild(device, target)?;
        self.stats.shrinks += 1;
        self.shrunk_this_frame = true;
        Ok(())
    }

    fn rebuild(&mut self, device: &dyn DeviceBufferFactory, capacity: u64) -> Result<(), ResourceError> {
        let buffer = device.create_array(&ArrayBufferDescriptor {
            label: self.label.into(),
            element_stride: self.stride,
            element_count: capacity,
            pool: MemoryPool::HostVisible,
            usage: BufferUsage::MANAGED_ARRAY,
        })?;
        if let Some(old) = self.buffer.replace(buffer) {
            device.retire(old);
        }
        self.capacity = capacity;
        self.cursor = 0;
        Ok(())
    }

    /// Hands the arena's array to deferred deletion.
    pub(crate) fn retire(&mut self, device: &dyn DeviceBufferFactory) {
        if let Some(buffer) = self.buffer.take() {
            device.retire(buffer);
        }
        self.capacity = 0;
        self.cursor = 0;
    }
}
