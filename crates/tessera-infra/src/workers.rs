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

//! A fixed-size pool of worker threads.

use crossbeam_channel::{Receiver, Sender};
use std::io;
use std::thread;
use tessera_core::{run_job, Job, JobHandle, JobPanic, WorkerPool};

type Envelope = (Job, Sender<Result<(), JobPanic>>);

/// A [`WorkerPool`] with persistent threads fed from one shared channel.
///
/// Panicking jobs are caught on the worker and reported through their
/// [`JobHandle`]; the worker keeps serving the queue. Dropping the pool closes
/// the queue and joins every thread once the remaining jobs are done.
#[derive(Debug)]
pub struct ThreadWorkerPool {
    queue: Option<Sender<Envelope>>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl ThreadWorkerPool {
    /// Spawns `threads` workers (at least one).
    ///
    /// ## Errors
    /// Returns the OS error if a thread could not be spawned.
    pub fn new(threads: usize) -> io::Result<Self> {
        let threads = threads.max(1);
        let (queue, jobs) = crossbeam_channel::unbounded::<Envelope>();
        let handles = (0..threads)
            .map(|index| {
                let jobs = jobs.clone();
                thread::Builder::new()
                    .name(format!("tessera-worker-{index}"))
                    .spawn(move || worker_loop(jobs))
            })
            .collect::<io::Result<Vec<_>>>()?;

        log::info!("ThreadWorkerPool: Started {} workers", threads);
        Ok(Self {
            queue: Some(queue),
            threads: handles,
        })
    }

    /// Spawns one worker per available CPU.
    pub fn with_available_parallelism() -> io::Result<Self> {
        Self::new(thread::available_parallelism().map_or(1, |n| n.get()))
    }
}

fn worker_loop(jobs: Receiver<Envelope>) {
    while let Ok((job, done)) = jobs.recv() {
        // The submitter may have dropped its handle.
        let _ = done.send(run_job(job));
    }
}

impl WorkerPool for ThreadWorkerPool {
    fn enqueue(&self, job: Job) -> JobHandle {
        let (done, handle) = JobHandle::channel();
        match &self.queue {
            Some(queue) => {
                if queue.send((job, done)).is_err() {
                    log::error!("ThreadWorkerPool: Queue closed, job dropped");
                }
            }
            None => log::error!("ThreadWorkerPool: Pool is shutting down, job dropped"),
        }
        handle
    }

    fn parallelism(&self) -> usize {
        self.threads.len()
    }
}

impl Drop for ThreadWorkerPool {
    fn drop(&mut self) {
        self.queue.take();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        log::info!("ThreadWorkerPool: Stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_every_job() {
        let pool = ThreadWorkerPool::new(3).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.enqueue(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 32);
        assert_eq!(pool.parallelism(), 3);
    }

    #[test]
    fn worker_survives_a_panicking_job() {
        let pool = ThreadWorkerPool::new(1).unwrap();
        let err = pool
            .enqueue(Box::new(|| panic!("bad slot")))
            .join()
            .unwrap_err();
        assert_eq!(err.message(), "bad slot");

        let (tx, rx) = crossbeam_channel::bounded(1);
        pool.enqueue(Box::new(move || tx.send(5).unwrap()))
            .join()
            .unwrap();
        assert_eq!(rx.recv().unwrap(), 5);
    }

    #[test]
    fn zero_threads_means_one() {
        let pool = ThreadWorkerPool::new(0).unwrap();
        assert_eq!(pool.parallelism(), 1);
    }
}
