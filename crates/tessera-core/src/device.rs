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

//! The opaque device buffer capability consumed by the allocators.

use crate::buffer::{ArrayBufferDescriptor, BufferId};
use crate::error::ResourceError;
use std::fmt::Debug;

/// The maximum number of frames that can be processed by the device at once.
///
/// A retired buffer must stay alive for at least this many frames, since render
/// work recorded against it may still be in flight.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Creates, fills, and retires device array buffers.
///
/// Buffers are never resized in place. When an allocator needs a different
/// capacity it creates a new array and hands the old one to [`retire`](Self::retire),
/// which defers the actual destruction until in-flight frames are done with it.
pub trait DeviceBufferFactory: Send + Sync + Debug + 'static {
    /// Creates a new array buffer.
    /// ## Arguments
    /// * `descriptor` - The label, element stride, element count, and placement hints.
    /// ## Returns
    /// A `Result` containing the ID of the created buffer or an error if the creation fails.
    fn create_array(&self, descriptor: &ArrayBufferDescriptor<'_>) -> Result<BufferId, ResourceError>;

    /// Writes bytes into a buffer.
    /// ## Arguments
    /// * `id` - The ID of the buffer to write to.
    /// * `offset` - The byte offset in the buffer where the data will be written.
    /// * `data` - The bytes to write.
    /// ## Errors
    /// * `ResourceError::NotFound` - If the buffer does not exist.
    /// * `ResourceError::OutOfBounds` - If the write would run past the end of the buffer.
    fn commit(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Returns the capacity of a buffer, in elements.
    fn capacity(&self, id: BufferId) -> Result<u64, ResourceError>;

    /// Hands a replaced buffer to deferred deletion.
    ///
    /// The buffer stays readable by in-flight work; callers must not commit to it again.
    fn retire(&self, id: BufferId);
}
