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

//! A device that keeps every array in host memory.

use ahash::AHashMap;
use bytemuck::Pod;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tessera_core::{
    ArrayBufferDescriptor, BufferId, DeviceBufferFactory, MemoryPool, ResourceError,
    MAX_FRAMES_IN_FLIGHT,
};

#[derive(Debug)]
struct HostArrayEntry {
    label: String,
    data: Vec<u8>,
    stride: u32,
    pool: MemoryPool,
    retired: bool,
}

/// Counters of a [`HostDevice`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HostDeviceStats {
    /// Arrays created so far.
    pub created: u64,
    /// Arrays destroyed after retirement.
    pub destroyed: u64,
    /// Calls to `commit`.
    pub commits: u64,
    /// Bytes written by `commit`.
    pub bytes_committed: u64,
    /// Bytes held by arrays that are not destroyed yet.
    pub allocated_bytes: u64,
    /// High-water mark of `allocated_bytes`.
    pub peak_bytes: u64,
}

/// A [`DeviceBufferFactory`] backed by plain byte vectors.
///
/// Retired arrays stay readable for [`MAX_FRAMES_IN_FLIGHT`] calls to
/// [`advance_frame`](Self::advance_frame) and are destroyed afterwards, which
/// mirrors how a GPU backend has to keep buffers alive for in-flight work.
#[derive(Debug, Default)]
pub struct HostDevice {
    arrays: Mutex<AHashMap<BufferId, HostArrayEntry>>,
    retired: Mutex<VecDeque<(u64, BufferId)>>,
    frame: AtomicU64,
    next_buffer_id: AtomicUsize,

    created: AtomicU64,
    destroyed: AtomicU64,
    commits: AtomicU64,
    bytes_committed: AtomicU64,
    allocated_bytes: AtomicU64,
    peak_bytes: AtomicU64,
}

impl HostDevice {
    /// Creates a device with no arrays.
    pub fn new() -> Self {
        Self::default()
    }

    fn generate_buffer_id(&self) -> BufferId {
        BufferId(self.next_buffer_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Ends the current frame and destroys arrays retired long enough ago.
    ///
    /// ## Returns
    /// The number of arrays destroyed.
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
                self.allocated_bytes
                    .fetch_sub(entry.data.len() as u64, Ordering::Relaxed);
                log::debug!("HostDevice: Destroyed array '{}' ({:?})", entry.label, id);
                destroyed += 1;
            }
        }
        self.destroyed.fetch_add(destroyed as u64, Ordering::Relaxed);
        destroyed
    }

    /// Copies the elements of an array out as `G` values.
    ///
    /// ## Errors
    /// * `ResourceError::NotFound` - If the array was never created or is already destroyed.
    pub fn read_elements<G: Pod>(&self, id: BufferId) -> Result<Vec<G>, ResourceError> {
        let arrays = self.arrays.lock();
        let entry = arrays.get(&id).ok_or(ResourceError::NotFound(id))?;
        Ok(bytemuck::pod_collect_to_vec(&entry.data))
    }

    /// Returns `true` if the array exists and has not been destroyed.
    pub fn is_alive(&self, id: BufferId) -> bool {
        self.arrays.lock().contains_key(&id)
    }

    /// Returns `true` if the array was retired but is still alive.
    pub fn is_retired(&self, id: BufferId) -> bool {
        self.arrays.lock().get(&id).is_some_and(|entry| entry.retired)
    }

    /// The label and placement hint an array was created with.
    pub fn describe(&self, id: BufferId) -> Option<(String, MemoryPool)> {
        self.arrays
            .lock()
            .get(&id)
            .map(|entry| (entry.label.clone(), entry.pool))
    }

    /// Number of arrays not yet destroyed, retired ones included.
    pub fn live_arrays(&self) -> usize {
        self.arrays.lock().len()
    }

    /// A snapshot of the device's counters.
    pub fn stats(&self) -> HostDeviceStats {
        HostDeviceStats {
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            bytes_committed: self.bytes_committed.load(Ordering::Relaxed),
            allocated_bytes: self.allocated_bytes.load(Ordering::Relaxed),
            peak_bytes: self.peak_bytes.load(Ordering::Relaxed),
        }
    }
}

impl DeviceBufferFactory for HostDevice {
    fn create_array(&self, descriptor: &ArrayBufferDescriptor<'_>) -> Result<BufferId, ResourceError> {
        if descriptor.element_stride == 0 {
            return Err(ResourceError::InvalidDescriptor {
                label: descriptor.label.to_string(),
                reason: "element stride is zero".to_string(),
            });
        }

        let size = descriptor.byte_size();
        let id = self.generate_buffer_id();
        self.arrays.lock().insert(
            id,
            HostArrayEntry {
                label: descriptor.label.to_string(),
                data: vec![0; size as usize],
                stride: descriptor.element_stride,
                pool: descriptor.pool,
                retired: false,
            },
        );

        self.created.fetch_add(1, Ordering::Relaxed);
        let allocated = self.allocated_bytes.fetch_add(size, Ordering::Relaxed) + size;
        self.peak_bytes.fetch_max(allocated, Ordering::Relaxed);

        log::debug!(
            "HostDevice: Created array '{}' with ID: {:?}, {} x {} bytes",
            descriptor.label,
            id,
            descriptor.element_count,
            descriptor.element_stride
        );
        Ok(id)
    }

    fn commit(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut arrays = self.arrays.lock();
        let entry = arrays.get_mut(&id).ok_or(ResourceError::NotFound(id))?;

        let size = entry.data.len() as u64;
        let end = offset + data.len() as u64;
        if end > size {
            return Err(ResourceError::OutOfBounds {
                buffer: id,
                offset,
                len: data.len() as u64,
                size,
            });
        }
        if entry.retired {
            log::warn!("HostDevice: Commit to retired array '{}' ({:?})", entry.label, id);
        }

        entry.data[offset as usize..end as usize].copy_from_slice(data);
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.bytes_committed
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn capacity(&self, id: BufferId) -> Result<u64, ResourceError> {
        let arrays = self.arrays.lock();
        let entry = arrays.get(&id).ok_or(ResourceError::NotFound(id))?;
        Ok(entry.data.len() as u64 / u64::from(entry.stride))
    }

    fn retire(&self, id: BufferId) {
        let frame = self.frame.load(Ordering::Acquire);
        match self.arrays.lock().get_mut(&id) {
            Some(entry) if !entry.retired => entry.retired = true,
            Some(entry) => {
                log::warn!("HostDevice: Array '{}' ({:?}) retired twice", entry.label, id);
                return;
            }
            None => {
                log::warn!("HostDevice: Retiring unknown array {:?}", id);
                return;
            }
        }
        self.retired.lock().push_back((frame, id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::BufferUsage;

    fn descriptor(count: u64) -> ArrayBufferDescriptor<'static> {
        ArrayBufferDescriptor {
            label: "Test".into(),
            element_stride: 4,
            element_count: count,
            pool: MemoryPool::DeviceLocal,
            usage: BufferUsage::MANAGED_ARRAY,
        }
    }

    #[test]
    fn new_array_is_zeroed_and_sized() {
        let device = HostDevice::new();
        let id = device.create_array(&descriptor(3)).unwrap();
        assert_eq!(device.capacity(id).unwrap(), 3);
        assert_eq!(device.read_elements::<u32>(id).unwrap(), vec![0, 0, 0]);
        assert_eq!(device.stats().allocated_bytes, 12);
    }

    #[test]
    fn commit_writes_sub_range() {
        let device = HostDevice::new();
        let id = device.create_array(&descriptor(3)).unwrap();
        device.commit(id, 4, bytemuck::bytes_of(&7u32)).unwrap();
        assert_eq!(device.read_elements::<u32>(id).unwrap(), vec![0, 7, 0]);
        assert_eq!(device.stats().commits, 1);
        assert_eq!(device.stats().bytes_committed, 4);
    }

    #[test]
    fn commit_past_end_is_rejected() {
        let device = HostDevice::new();
        let id = device.create_array(&descriptor(2)).unwrap();
        let err = device.commit(id, 4, &[0; 8]).unwrap_err();
        assert_eq!(
            err,
            ResourceError::OutOfBounds {
                buffer: id,
                offset: 4,
                len: 8,
                size: 8
            }
        );
    }

    #[test]
    fn zero_stride_is_rejected() {
        let device = HostDevice::new();
        let mut bad = descriptor(1);
        bad.element_stride = 0;
        assert!(matches!(
            device.create_array(&bad),
            Err(ResourceError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn retired_array_outlives_in_flight_frames() {
        let device = HostDevice::new();
        let id = device.create_array(&descriptor(1)).unwrap();
        device.retire(id);
        assert!(device.is_retired(id));

        for _ in 1..MAX_FRAMES_IN_FLIGHT {
            assert_eq!(device.advance_frame(), 0);
            assert!(device.is_alive(id));
        }
        assert_eq!(device.advance_frame(), 1);
        assert!(!device.is_alive(id));
        assert_eq!(device.stats().allocated_bytes, 0);
        assert_eq!(device.stats().peak_bytes, 4);
    }

    #[test]
    fn unknown_array_is_not_found() {
        let device = HostDevice::new();
        assert_eq!(
            device.commit(BufferId(42), 0, &[1]),
            Err(ResourceError::NotFound(BufferId(42)))
        );
        device.retire(BufferId(42));
        assert_eq!(device.advance_frame(), 0);
    }
}
