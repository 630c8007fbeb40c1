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

//! Managed arrays as `wgpu` storage buffers.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tessera_core::{
    ArrayBufferDescriptor, BufferId, BufferUsage, DeviceBufferFactory, ResourceError,
    MAX_FRAMES_IN_FLIGHT,
};

fn usages(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut usages = wgpu::BufferUsages::empty();
    if usage.contains(BufferUsage::COPY_SRC) {
        usages |= wgpu::BufferUsages::COPY_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        usages |= wgpu::BufferUsages::COPY_DST;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        usages |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsage::STORAGE) {
        usages |= wgpu::BufferUsages::STORAGE;
    }
    usages
}

#[derive(Debug)]
struct WgpuArrayEntry {
    buffer: Arc<wgpu::Buffer>,
    stride: u32,
}

/// A [`DeviceBufferFactory`] that creates `wgpu` buffers and fills them
/// through the queue.
///
/// Element strides must be a multiple of [`wgpu::COPY_BUFFER_ALIGNMENT`], so
/// that every element commit is a valid queue write.
#[derive(Debug)]
pub struct WgpuBufferDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    arrays: Mutex<AHashMap<BufferId, WgpuArrayEntry>>,
    retired: Mutex<VecDeque<(u64, BufferId)>>,
    frame: AtomicU64,
    next_buffer_id: AtomicUsize,
}

impl WgpuBufferDevice {
    /// Wraps a device and the queue used for commits.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            arrays: Mutex::new(AHashMap::new()),
            retired: Mutex::new(VecDeque::new()),
            frame: AtomicU64::new(0),
            next_buffer_id: AtomicUsize::new(0),
        }
    }

    /// The `wgpu` buffer behind an id, for building bind groups.
    pub fn buffer(&self, id: BufferId) -> Option<Arc<wgpu::Buffer>> {
        self.arrays
            .lock()
            .get(&id)
            .map(|entry| Arc::clone(&entry.buffer))
    }

    /// Ends the current frame and destroys buffers whose in-flight frames are over.
    pub fn advance_frame(&self) -> usize {
        let frame = self.frame.fetch_add(1, Ordering::AcqRel) + 1;
        let mut retired = self.retired.lock();
        let mut arrays = self.arrays.lock();
        let mut destroyed = 0;
        while let Some(&(retired_at, id)) = retired.front() {
            if retired_at + MAX_FRAMES_IN_FLIGHT as u64 > frame {
                break;
            }
            retired.pop_front();
            if let Some(entry) = arrays.remove(&id) {
                entry.buffer.destroy();
                log::debug!("WgpuBufferDevice: Destroyed buffer with ID: {id:?}");
                destroyed += 1;
            }
        }
        destroyed
    }
}

impl DeviceBufferFactory for WgpuBufferDevice {
    fn create_array(&self, descriptor: &ArrayBufferDescriptor<'_>) -> Result<BufferId, ResourceError> {
        if descriptor.element_stride == 0
            || u64::from(descriptor.element_stride) % wgpu::COPY_BUFFER_ALIGNMENT != 0
        {
            return Err(ResourceError::InvalidDescriptor {
                label: descriptor.label.to_string(),
                reason: format!(
                    "element stride {} is not a multiple of {}",
                    descriptor.element_stride,
                    wgpu::COPY_BUFFER_ALIGNMENT
                ),
            });
        }

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(descriptor.label.as_ref()),
            size: descriptor.byte_size(),
            usage: usages(descriptor.usage),
            mapped_at_creation: false,
        });
        let id = BufferId(self.next_buffer_id.fetch_add(1, Ordering::Relaxed));
        self.arrays.lock().insert(
            id,
            WgpuArrayEntry {
                buffer: Arc::new(buffer),
                stride: descriptor.element_stride,
            },
        );

        log::debug!(
            "WgpuBufferDevice: Created buffer '{}' with ID: {:?}, size: {} bytes",
            descriptor.label,
            id,
            descriptor.byte_size()
        );
        Ok(id)
    }

    fn commit(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let arrays = self.arrays.lock();
        let entry = arrays.get(&id).ok_or(ResourceError::NotFound(id))?;

        let size = entry.buffer.size();
        let end = offset + data.len() as u64;
        if end > size {
            return Err(ResourceError::OutOfBounds {
                buffer: id,
                offset,
                len: data.len() as u64,
                size,
            });
        }

        self.queue.write_buffer(&entry.buffer, offset, data);
        Ok(())
    }

    fn capacity(&self, id: BufferId) -> Result<u64, ResourceError> {
        let arrays = self.arrays.lock();
        let entry = arrays.get(&id).ok_or(ResourceError::NotFound(id))?;
        Ok(entry.buffer.size() / u64::from(entry.stride))
    }

    fn retire(&self, id: BufferId) {
        if !self.arrays.lock().contains_key(&id) {
            log::warn!("WgpuBufferDevice: Retiring unknown buffer {:?}", id);
            return;
        }
        let frame = self.frame.load(Ordering::Acquire);
        self.retired.lock().push_back((frame, id));
    }
}
