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

//! The job-queue contract used for per-frame fan-out.
//!
//! Jobs are `'static` closures. A [`JobHandle`] is joined to wait for the job and
//! to learn whether it panicked; results travel through whatever channel the job
//! captured.

use crossbeam_channel::{Receiver, Sender};
use std::any::Any;
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use thiserror::Error;

/// A unit of work submitted to a [`WorkerPool`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A job panicked, or was dropped before it could run.
#[derive(Debug, Error)]
#[error("worker job failed: {message}")]
pub struct JobPanic {
    message: String,
    payload: Mutex<Box<dyn Any + Send + 'static>>,
}

impl JobPanic {
    /// Wraps a panic payload caught from a job.
    pub fn from_payload(payload: Box<dyn Any + Send + 'static>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            message,
            payload: Mutex::new(payload),
        }
    }

    /// The panic message, when the payload was a string.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Re-raises the original panic on the current thread.
    pub fn resume(self) -> ! {
        let payload = self
            .payload
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        panic::resume_unwind(payload)
    }
}

/// Runs a job, catching any panic it raises.
pub fn run_job(job: Job) -> Result<(), JobPanic> {
    panic::catch_unwind(AssertUnwindSafe(job)).map_err(JobPanic::from_payload)
}

/// A joinable handle to a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    done: Receiver<Result<(), JobPanic>>,
}

impl JobHandle {
    /// Creates a handle and the sender the executing worker reports completion on.
    pub fn channel() -> (Sender<Result<(), JobPanic>>, Self) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (tx, Self { done: rx })
    }

    /// Creates a handle for a job that already ran.
    pub fn completed(result: Result<(), JobPanic>) -> Self {
        let (tx, handle) = Self::channel();
        // The receiver is alive in `handle`, so the bounded slot is free.
        let _ = tx.send(result);
        handle
    }

    /// Blocks until the job has finished.
    ///
    /// ## Errors
    /// Returns the caught panic if the job panicked, or a synthetic failure if the
    /// pool dropped the job without running it.
    pub fn join(self) -> Result<(), JobPanic> {
        match self.done.recv() {
            Ok(result) => result,
            Err(_) => Err(JobPanic::from_payload(Box::new(
                "job was dropped before it completed",
            ))),
        }
    }
}

/// Executes jobs, possibly in parallel.
pub trait WorkerPool: Send + Sync + Debug + 'static {
    /// Queues a job for execution and returns a handle to join on.
    fn enqueue(&self, job: Job) -> JobHandle;

    /// The number of jobs the pool can run at the same time.
    fn parallelism(&self) -> usize;
}

/// A pool that runs every job immediately on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineWorkerPool;

impl WorkerPool for InlineWorkerPool {
    fn enqueue(&self, job: Job) -> JobHandle {
        JobHandle::completed(run_job(job))
    }

    fn parallelism(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn inline_pool_runs_job_before_returning() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let handle = InlineWorkerPool.enqueue(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(handle.join().is_ok());
    }

    #[test]
    fn panicking_job_is_reported_on_join() {
        let handle = InlineWorkerPool.enqueue(Box::new(|| panic!("slot double-free")));
        let err = handle.join().unwrap_err();
        assert_eq!(err.message(), "slot double-free");
    }

    #[test]
    fn dropped_job_reports_failure() {
        let (tx, handle) = JobHandle::channel();
        drop(tx);
        let err = handle.join().unwrap_err();
        assert!(err.message().contains("dropped"));
    }

    #[test]
    #[should_panic(expected = "free-slot exhaustion")]
    fn resume_reraises_original_panic() {
        let handle = InlineWorkerPool.enqueue(Box::new(|| panic!("free-slot exhaustion")));
        handle.join().unwrap_err().resume();
    }
}
