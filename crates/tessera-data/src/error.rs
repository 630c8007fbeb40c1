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

//! Errors surfaced by the indexed-buffer subsystem.
//!
//! Only failures of collaborators are errors. Broken invariants inside the
//! allocators are contract violations and go through `tessera_core::contract!`.

use crate::config::ConfigError;
use tessera_core::ResourceError;
use thiserror::Error;

/// An error returned by the manager or one of its buffers.
#[derive(Debug, Error)]
pub enum IndexedBufferError {
    /// The device layer failed to create or fill a buffer.
    #[error("Device buffer operation failed: {0}")]
    Resource(#[from] ResourceError),
    /// The manager was created with out-of-range tuning constants.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    /// A worker finished a buffer's update job without sending the buffer back.
    #[error("Worker for buffer '{buffer}' finished without returning it")]
    WorkerDisconnected {
        /// Name of the buffer whose job went missing.
        buffer: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use tessera_core::BufferId;

    #[test]
    fn resource_error_is_wrapped_with_source() {
        let err: IndexedBufferError = ResourceError::NotFound(BufferId(12)).into();
        assert_eq!(
            format!("{err}"),
            "Device buffer operation failed: Buffer not found: BufferId(12)"
        );
        assert!(err.source().is_some());
    }
}
