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

//! Typed indexed buffers: one dense device array per record type.
//!
//! Every live record that passes the buffer's filter owns exactly one slot.
//! Slots are stable while the buffer keeps its capacity, so lookup tables can
//! refer to records by slot index.

mod buffer;
mod slots;

pub use buffer::TypedIndexedBuffer;
pub use slots::SlotAllocator;

use tessera_core::{BufferInput, Namespace, RecordId, ResourceError};

/// A predicate selecting which records of a type get a slot.
pub type RecordFilter<T> = Box<dyn Fn(&T) -> bool + Send + Sync + 'static>;

/// Identifies an indexed buffer inside its manager.
///
/// Handles are dense and assigned in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexedBufferHandle(pub usize);

/// What one call to `update` did to a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The source reported no changes.
    Unchanged,
    /// The last record went away and the device array was retired.
    Released,
    /// Capacity changed (or the first array was created) and every live record
    /// was repacked into a new array.
    Rebuilt {
        /// The new capacity, in elements.
        capacity: u32,
        /// Number of records written.
        live: u32,
    },
    /// Capacity stayed and only changed records were written.
    Incremental {
        /// Number of elements written.
        writes: u32,
    },
}

impl UpdateOutcome {
    /// Returns `true` if the buffer handle a consumer holds is no longer current.
    pub fn reallocated(&self) -> bool {
        matches!(self, Self::Rebuilt { .. } | Self::Released)
    }
}

/// Lifetime counters of one indexed buffer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexedBufferStats {
    /// Number of full repacks into a new array.
    pub full_rebuilds: u64,
    /// Number of updates that only wrote changed records.
    pub incremental_updates: u64,
    /// Number of single-element commits.
    pub element_writes: u64,
    /// Number of times the array was retired because the source became empty.
    pub releases: u64,
    /// Total bytes handed to `commit`.
    pub bytes_committed: u64,
}

/// The type-erased face of a [`TypedIndexedBuffer`].
///
/// The manager stores buffers of different record types side by side and
/// moves them into worker jobs during the frame update.
pub trait ManagedBuffer: Send + Sync + 'static {
    /// The buffer's unique name.
    fn name(&self) -> &str;

    /// The namespace of the keys this buffer maps.
    fn namespace(&self) -> Namespace;

    /// Brings the device array in line with the source's diff.
    fn update(&mut self) -> Result<UpdateOutcome, ResourceError>;

    /// Slot of the record, or [`INVALID_INDEX`](tessera_core::INVALID_INDEX) if it has none.
    fn index_of(&self, id: RecordId) -> u32;

    /// Bind descriptor of the whole array.
    fn buffer_input(&self) -> BufferInput;

    /// Bind descriptor of the single element holding `id`.
    fn element_input(&self, id: RecordId) -> Option<BufferInput>;

    /// Capacity of the current array, in elements. Zero when nothing is allocated.
    fn capacity(&self) -> u32;

    /// Number of records that own a slot.
    fn live_len(&self) -> usize;

    /// Lifetime counters.
    fn stats(&self) -> IndexedBufferStats;
}
