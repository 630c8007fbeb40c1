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

//! Defines data structures related to device array buffers and their bind descriptors.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

bitflags! {
    /// A set of flags describing the allowed usages of a [`BufferId`].
    ///
    /// The device layer uses them to pick a memory type and to validate that
    /// the buffer is bound correctly at runtime.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// The buffer can be used as the source of a copy operation.
        const COPY_SRC = 1 << 2;
        /// The buffer can be used as the destination of a copy operation.
        const COPY_DST = 1 << 3;
        /// The buffer can be bound as a uniform buffer.
        const UNIFORM = 1 << 6;
        /// The buffer can be bound as a read-only storage buffer.
        const STORAGE = 1 << 7;
    }
}

impl BufferUsage {
    /// The usage every managed array gets: read from shaders, written by commits.
    pub const MANAGED_ARRAY: Self = Self::STORAGE.union(Self::COPY_DST);
}

/// Where the device should place an array's backing memory.
///
/// This is a hint only; a backend is free to ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MemoryPool {
    /// Device-local memory, filled through staged commits. Best for data that
    /// changes rarely relative to how often it is read.
    #[default]
    DeviceLocal,
    /// Host-visible memory that the device reads directly. Best for data that is
    /// rewritten most frames, such as lookup tables.
    HostVisible,
}

/// A descriptor used to create a device array buffer.
#[derive(Debug, Clone)]
pub struct ArrayBufferDescriptor<'a> {
    /// A debug label for the buffer.
    pub label: Cow<'a, str>,
    /// The size in bytes of one element.
    pub element_stride: u32,
    /// The number of elements the array holds.
    pub element_count: u64,
    /// The memory placement hint.
    pub pool: MemoryPool,
    /// A bitmask of [`BufferUsage`] flags describing how the buffer will be used.
    pub usage: BufferUsage,
}

impl ArrayBufferDescriptor<'_> {
    /// The total size of the array in bytes.
    pub fn byte_size(&self) -> u64 {
        self.element_count * u64::from(self.element_stride)
    }
}

/// An opaque handle to a device buffer resource.
///
/// This ID is returned by [`DeviceBufferFactory::create_array`](crate::DeviceBufferFactory::create_array)
/// and is used to reference the buffer in all subsequent operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub usize);

/// A bind descriptor: a typed element range inside a device buffer.
///
/// Returned for whole managed arrays, single records, and lookup-table views.
/// Lookup-table views are only valid until the next frame begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferInput {
    /// The buffer the range lives in.
    pub buffer: BufferId,
    /// Index of the first element of the range.
    pub first_element: u64,
    /// Number of elements in the range.
    pub element_count: u64,
    /// Size in bytes of one element.
    pub element_stride: u32,
}

impl BufferInput {
    /// Byte offset of the first element.
    pub fn byte_offset(&self) -> u64 {
        self.first_element * u64::from(self.element_stride)
    }

    /// Byte length of the whole range.
    pub fn byte_len(&self) -> u64 {
        self.element_count * u64::from(self.element_stride)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn managed_array_usage_is_storage_and_copy_dst() {
        assert!(BufferUsage::MANAGED_ARRAY.contains(BufferUsage::STORAGE));
        assert!(BufferUsage::MANAGED_ARRAY.contains(BufferUsage::COPY_DST));
        assert!(!BufferUsage::MANAGED_ARRAY.contains(BufferUsage::UNIFORM));
    }

    #[test]
    fn buffer_input_byte_range() {
        let input = BufferInput {
            buffer: BufferId(3),
            first_element: 5,
            element_count: 4,
            element_stride: 16,
        };
        assert_eq!(input.byte_offset(), 80);
        assert_eq!(input.byte_len(), 64);
    }

    #[test]
    fn memory_pool_round_trips_through_json() {
        let json = serde_json::to_string(&MemoryPool::HostVisible).unwrap();
        assert_eq!(json, "\"HostVisible\"");
        let back: MemoryPool = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MemoryPool::HostVisible);
    }
}
