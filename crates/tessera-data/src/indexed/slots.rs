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

//! Dense slot bookkeeping for an indexed buffer.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tessera_core::contract;

/// Hands out slot indices in `[0, capacity)`, always the lowest free one first.
///
/// Released slots go back to a min-heap, so a long-lived buffer keeps its
/// occupied slots packed toward the front. An occupancy bitset catches
/// double releases.
#[derive(Debug, Default, Clone)]
pub struct SlotAllocator {
    free: BinaryHeap<Reverse<u32>>,
    occupied: Vec<u64>,
    capacity: u32,
}

impl SlotAllocator {
    /// Creates an allocator with no slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards all state and makes every slot in `[0, capacity)` free.
    pub fn reset(&mut self, capacity: u32) {
        self.free = (0..capacity).map(Reverse).collect::<Vec<_>>().into();
        self.occupied.clear();
        self.occupied.resize(capacity.div_ceil(64) as usize, 0);
        self.capacity = capacity;
    }

    /// Drops every slot. Equivalent to `reset(0)`.
    pub fn clear(&mut self) {
        self.free.clear();
        self.occupied.clear();
        self.capacity = 0;
    }

    /// Takes the lowest free slot, or `None` when all slots are in use.
    pub fn acquire(&mut self) -> Option<u32> {
        let Reverse(slot) = self.free.pop()?;
        self.occupied[(slot / 64) as usize] |= 1 << (slot % 64);
        Some(slot)
    }

    /// Returns a slot to the free pool.
    ///
    /// Releasing a slot that is out of range or already free is a contract
    /// violation and leaves the allocator untouched.
    pub fn release(&mut self, slot: u32) {
        if !contract!(
            self.is_occupied(slot),
            "slot {slot} released twice or out of range (capacity {})",
            self.capacity
        ) {
            return;
        }
        self.occupied[(slot / 64) as usize] &= !(1 << (slot % 64));
        self.free.push(Reverse(slot));
    }

    /// Returns `true` if `slot` is currently handed out.
    pub fn is_occupied(&self, slot: u32) -> bool {
        slot < self.capacity && (self.occupied[(slot / 64) as usize] & (1 << (slot % 64))) != 0
    }

    /// Total number of slots.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of slots available for [`acquire`](Self::acquire).
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Number of slots currently handed out.
    pub fn occupied_len(&self) -> usize {
        self.occupied.iter().map(|word| word.count_ones() as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquires_lowest_slot_first() {
        let mut slots = SlotAllocator::new();
        slots.reset(4);
        assert_eq!(slots.acquire(), Some(0));
        assert_eq!(slots.acquire(), Some(1));
        assert_eq!(slots.acquire(), Some(2));

        slots.release(0);
        slots.release(2);
        assert_eq!(slots.acquire(), Some(0));
        assert_eq!(slots.acquire(), Some(2));
        assert_eq!(slots.acquire(), Some(3));
        assert_eq!(slots.acquire(), None);
    }

    #[test]
    fn occupied_and_free_partition_capacity() {
        let mut slots = SlotAllocator::new();
        slots.reset(130);
        for _ in 0..70 {
            slots.acquire();
        }
        slots.release(65);
        assert_eq!(slots.occupied_len(), 69);
        assert_eq!(slots.free_len(), 61);
        assert!(!slots.is_occupied(65));
        assert!(slots.is_occupied(66));
        assert!(!slots.is_occupied(500));
    }

    #[test]
    fn reset_frees_everything() {
        let mut slots = SlotAllocator::new();
        slots.reset(2);
        slots.acquire();
        slots.reset(8);
        assert_eq!(slots.free_len(), 8);
        assert_eq!(slots.occupied_len(), 0);
        slots.clear();
        assert_eq!(slots.acquire(), None);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "released twice")]
    fn double_release_is_a_contract_violation() {
        let mut slots = SlotAllocator::new();
        slots.reset(2);
        let slot = slots.acquire().unwrap();
        slots.release(slot);
        slots.release(slot);
    }
}
