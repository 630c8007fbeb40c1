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

//! The per-frame driver of all indexed buffers and lookup tables.

use crate::config::ManagerConfig;
use crate::error::IndexedBufferError;
use crate::indexed::{
    IndexedBufferHandle, IndexedBufferStats, ManagedBuffer, RecordFilter, TypedIndexedBuffer,
    UpdateOutcome,
};
use crate::lut::{LutAllocator, LutRecord, LutStats, SlotResolver};
use ahash::AHashMap;
use bytemuck::Pod;
use crossbeam_channel::Sender;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tessera_core::{
    contract, BufferInput, DeviceBufferFactory, JobPanic, MemoryPool, Namespace, RecordId,
    RecordSource, ResourceError, WorkerPool, INVALID_INDEX,
};

/// The result of one buffer's update within a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferOutcome {
    /// The buffer that was updated.
    pub handle: IndexedBufferHandle,
    /// What the update did.
    pub outcome: UpdateOutcome,
}

/// Everything [`IndexedBufferManager::update`] did in one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Index of the frame that was closed.
    pub frame: u64,
    /// One entry per buffer, in registration order.
    pub outcomes: Vec<BufferOutcome>,
}

impl FrameReport {
    /// Returns `true` if any buffer now lives in a different device array.
    pub fn any_reallocated(&self) -> bool {
        self.outcomes.iter().any(|o| o.outcome.reallocated())
    }

    /// Total single-element writes across all incremental updates.
    pub fn element_writes(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o.outcome {
                UpdateOutcome::Incremental { writes } => u64::from(writes),
                _ => 0,
            })
            .sum()
    }
}

/// A debug snapshot of one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSummary {
    /// The buffer's name.
    pub name: String,
    /// The namespace of its keys.
    pub namespace: Namespace,
    /// Capacity in elements.
    pub capacity: u32,
    /// Records that own a slot.
    pub live: usize,
    /// Lifetime counters.
    pub stats: IndexedBufferStats,
}

/// A debug snapshot of the whole manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerStats {
    /// Frames completed so far.
    pub frame: u64,
    /// One entry per buffer, in registration order.
    pub buffers: Vec<BufferSummary>,
    /// One entry per lookup-table kind, ordered by name.
    pub luts: Vec<LutStats>,
}

type UpdateResult = Result<UpdateOutcome, ResourceError>;
type Returned = (Box<dyn ManagedBuffer>, Option<Result<UpdateResult, JobPanic>>);

/// Carries a buffer through one worker job.
///
/// Dropping the lease sends the buffer back, whether the job ran, panicked, or
/// was discarded by the pool without running.
struct BufferLease {
    buffer: Option<Box<dyn ManagedBuffer>>,
    result: Option<Result<UpdateResult, JobPanic>>,
    home: Sender<Returned>,
}

impl BufferLease {
    fn run(&mut self) {
        if let Some(buffer) = self.buffer.as_mut() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| buffer.update()))
                .map_err(JobPanic::from_payload);
            self.result = Some(result);
        }
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            // The manager holds the receiver until every buffer is back.
            let _ = self.home.send((buffer, self.result.take()));
        }
    }
}

struct BufferSet<'a>(&'a [Box<dyn ManagedBuffer>]);

impl SlotResolver for BufferSet<'_> {
    fn slot_of(&self, buffer: IndexedBufferHandle, id: RecordId) -> u32 {
        self.0
            .get(buffer.0)
            .map_or(INVALID_INDEX, |buffer| buffer.index_of(id))
    }
}

/// Owns every indexed buffer mirroring `S` and the lookup tables built from them.
///
/// The manager is handed its collaborators explicitly: the record source, the
/// device buffer factory, and the worker pool used to fan out buffer updates.
///
/// Call [`update`](Self::update) once per frame, after the source has
/// accumulated the frame's changes and before any lookup tables are requested.
/// Lookup-table requests only need `&self` and may be issued from many threads.
pub struct IndexedBufferManager<S> {
    source: Arc<S>,
    device: Arc<dyn DeviceBufferFactory>,
    workers: Arc<dyn WorkerPool>,
    config: ManagerConfig,
    buffers: Vec<Box<dyn ManagedBuffer>>,
    names: AHashMap<String, IndexedBufferHandle>,
    luts: LutAllocator,
}

impl<S: Send + Sync + 'static> IndexedBufferManager<S> {
    /// Creates a manager with no buffers.
    ///
    /// ## Errors
    /// * `IndexedBufferError::InvalidConfig` - If a tuning constant is out of range.
    pub fn new(
        source: Arc<S>,
        device: Arc<dyn DeviceBufferFactory>,
        workers: Arc<dyn WorkerPool>,
        config: ManagerConfig,
    ) -> Result<Self, IndexedBufferError> {
        config.validate()?;
        Ok(Self {
            source,
            luts: LutAllocator::new(Arc::clone(&device), config.lut),
            device,
            workers,
            config,
            buffers: Vec::new(),
            names: AHashMap::new(),
        })
    }

    /// Registers a buffer that mirrors the `T` records of the source.
    ///
    /// The key namespace follows the source's `RecordSource<T>` implementation,
    /// so transform buffers are registered the same way.
    ///
    /// ## Arguments
    /// * `name` - Unique buffer name.
    /// * `map_record` - Converts a record into its device element.
    /// * `pool` - Placement hint for the buffer's arrays.
    /// * `filter` - Only records accepted by the filter get a slot.
    /// ## Returns
    /// The handle of the new buffer. Registering a name twice is a contract
    /// violation; release builds return the existing handle.
    pub fn add_indexed_buffer<T, G>(
        &mut self,
        name: &str,
        map_record: impl Fn(&T) -> G + Send + Sync + 'static,
        pool: MemoryPool,
        filter: Option<RecordFilter<T>>,
    ) -> Result<IndexedBufferHandle, IndexedBufferError>
    where
        S: RecordSource<T>,
        T: 'static,
        G: Pod,
    {
        if let Some(&existing) = self.names.get(name) {
            contract!(false, "indexed buffer '{name}' is already registered");
            return Ok(existing);
        }

        let buffer = TypedIndexedBuffer::new(
            name,
            Arc::clone(&self.source),
            Arc::clone(&self.device),
            map_record,
            pool,
            filter,
            self.config.indexed,
        )?;
        let handle = IndexedBufferHandle(self.buffers.len());
        log::info!(
            "Registered indexed buffer '{}' ({:?}, {} bytes per element) as {:?}",
            name,
            buffer.namespace(),
            buffer.stride(),
            handle
        );
        self.buffers.push(Box::new(buffer));
        self.names.insert(name.to_owned(), handle);
        Ok(handle)
    }

    /// Attaches the writer that fills `L` records from the slots of `buffer`.
    pub fn register_lut_writer<L: LutRecord>(
        &mut self,
        buffer: IndexedBufferHandle,
        write: impl Fn(u32, &mut L) + Send + Sync + 'static,
    ) {
        if !contract!(
            buffer.0 < self.buffers.len(),
            "LUT '{}' writer registered on unknown {buffer:?}",
            L::NAME
        ) {
            return;
        }
        self.luts.register_writer::<L>(buffer, write);
    }

    /// Updates every buffer from the source's diff and starts a new LUT frame.
    ///
    /// Buffers are updated on the worker pool when `parallel_update` is set and
    /// the pool has more than one worker. All updates finish before this returns.
    ///
    /// ## Errors
    /// The first device error, in registration order, after every buffer ran.
    ///
    /// # Panics
    /// Resumes the first panic raised by a buffer update, once every buffer is
    /// back under its handle.
    pub fn update(&mut self) -> Result<FrameReport, IndexedBufferError> {
        let parallel = self.config.parallel_update
            && self.workers.parallelism() > 1
            && self.buffers.len() > 1;
        let results = if parallel {
            self.update_on_workers()?
        } else {
            self.buffers.iter_mut().map(|buffer| buffer.update()).collect()
        };

        let frame = self.luts.frame_index();
        self.luts.begin_frame();

        let mut outcomes = Vec::with_capacity(results.len());
        for (index, result) in results.into_iter().enumerate() {
            outcomes.push(BufferOutcome {
                handle: IndexedBufferHandle(index),
                outcome: result?,
            });
        }
        Ok(FrameReport { frame, outcomes })
    }

    fn update_on_workers(&mut self) -> Result<Vec<UpdateResult>, IndexedBufferError> {
        let pending: Vec<_> = std::mem::take(&mut self.buffers)
            .into_iter()
            .map(|buffer| {
                let name = buffer.name().to_owned();
                let (home, rx) = crossbeam_channel::bounded(1);
                let mut lease = BufferLease {
                    buffer: Some(buffer),
                    result: None,
                    home,
                };
                let job = self.workers.enqueue(Box::new(move || lease.run()));
                (name, rx, job)
            })
            .collect();

        let mut first_panic: Option<JobPanic> = None;
        let mut missing = None;
        let mut results = Vec::with_capacity(pending.len());
        for (name, rx, job) in pending {
            // Update panics are caught inside the lease; a failed join only
            // means the pool dropped the job.
            let _ = job.join();
            let Ok((buffer, result)) = rx.recv() else {
                unreachable!("lease of indexed buffer '{name}' ended without returning it");
            };
            self.buffers.push(buffer);
            match result {
                Some(Ok(result)) => results.push(result),
                Some(Err(panic)) => {
                    log::error!("Update of indexed buffer '{}' panicked: {}", name, panic.message());
                    first_panic.get_or_insert(panic);
                }
                None => {
                    log::error!("Worker pool dropped the update of indexed buffer '{}'", name);
                    missing.get_or_insert(name);
                }
            }
        }

        if let Some(panic) = first_panic {
            panic.resume();
        }
        match missing {
            Some(buffer) => Err(IndexedBufferError::WorkerDisconnected { buffer }),
            None => Ok(results),
        }
    }

    /// The handle registered under `name`.
    pub fn handle(&self, name: &str) -> Option<IndexedBufferHandle> {
        self.names.get(name).copied()
    }

    /// The buffer behind `handle`.
    pub fn buffer(&self, handle: IndexedBufferHandle) -> Option<&dyn ManagedBuffer> {
        self.buffers.get(handle.0).map(|buffer| buffer.as_ref())
    }

    fn named(&self, name: &str) -> Option<&dyn ManagedBuffer> {
        self.handle(name).and_then(|handle| self.buffer(handle))
    }

    /// Bind descriptor of the whole array of buffer `name`.
    ///
    /// Before the buffer's first record arrives this is its one-element fallback.
    pub fn indexed_buffer_input(&self, name: &str) -> Option<BufferInput> {
        self.named(name).map(|buffer| buffer.buffer_input())
    }

    /// Bind descriptor of the element holding `id` in buffer `name`.
    pub fn single_element_buffer_input(&self, id: RecordId, name: &str) -> Option<BufferInput> {
        self.named(name).and_then(|buffer| buffer.element_input(id))
    }

    /// Slot of `id` in buffer `name`, or [`INVALID_INDEX`].
    pub fn index_of(&self, name: &str, id: RecordId) -> u32 {
        match self.named(name) {
            Some(buffer) => buffer.index_of(id),
            None => {
                log::warn!("Index query on unknown indexed buffer '{}'", name);
                INVALID_INDEX
            }
        }
    }

    /// Builds one `L` record per id and uploads them into this frame's arena.
    ///
    /// The view is valid until the next [`update`](Self::update).
    pub fn lut_buffer_input<L: LutRecord>(
        &self,
        ids: &[RecordId],
    ) -> Result<BufferInput, IndexedBufferError> {
        let records = self.lut_buffer_data::<L>(ids);
        Ok(self.luts.upload(&records)?)
    }

    /// Like [`lut_buffer_input`](Self::lut_buffer_input), starting from
    /// caller-provided records instead of zeroed ones.
    pub fn lut_buffer_input_with<L: LutRecord>(
        &self,
        ids: &[RecordId],
        initial: &[L],
    ) -> Result<BufferInput, IndexedBufferError> {
        let records = self
            .luts
            .build(ids, Some(initial), &BufferSet(&self.buffers));
        Ok(self.luts.upload(&records)?)
    }

    /// Builds one `L` record per id without uploading them.
    pub fn lut_buffer_data<L: LutRecord>(&self, ids: &[RecordId]) -> Vec<L> {
        self.luts.build(ids, None, &BufferSet(&self.buffers))
    }

    /// Frames completed so far.
    pub fn frame_index(&self) -> u64 {
        self.luts.frame_index()
    }

    /// The manager's settings.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The source the buffers mirror.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// A snapshot for debug display.
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            frame: self.frame_index(),
            buffers: self
                .buffers
                .iter()
                .map(|buffer| BufferSummary {
                    name: buffer.name().to_owned(),
                    namespace: buffer.namespace(),
                    capacity: buffer.capacity(),
                    live: buffer.live_len(),
                    stats: buffer.stats(),
                })
                .collect(),
            luts: self.luts.stats(),
        }
    }
}
