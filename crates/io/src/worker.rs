// This file is part of keyvalued.

// keyvalued is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// keyvalued is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with keyvalued.  If not, see <http://www.gnu.org/licenses/>.

//! Fixed-size pool of job-processing threads: each spawned with
//! `thread::Builder`, woken by a condvar, joined on drop. Pulls work from
//! a shared `JobQueue` rather than a work-stealing deque — there is
//! exactly one producer role here (the dispatcher), so no stealer is
//! needed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use keyvalued_protocol::{ErrorCode, JobType};
use keyvalued_store::{Error as StoreError, KvEngine};

use crate::queue::JobQueue;

const STACK_SIZE: usize = 256 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct WorkerPool {
    threads: Vec<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    queue: Arc<JobQueue>,
}

impl WorkerPool {
    pub fn start(num_workers: u32, engine: Arc<KvEngine>, queue: Arc<JobQueue>) -> WorkerPool {
        let running = Arc::new(AtomicBool::new(true));
        let mut threads = Vec::with_capacity(num_workers as usize);
        for id in 0..num_workers {
            let engine = engine.clone();
            let queue = queue.clone();
            let running = running.clone();
            let handle = thread::Builder::new()
                .stack_size(STACK_SIZE)
                .name(format!("kv-worker-{id}"))
                .spawn(move || worker_loop(id, engine, queue, running))
                .expect("failed to spawn worker thread");
            threads.push(handle);
        }
        WorkerPool {
            threads,
            running,
            queue,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.queue.wake_all();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(id: u32, engine: Arc<KvEngine>, queue: Arc<JobQueue>, running: Arc<AtomicBool>) {
    log::debug!(target: "worker", "worker {id} starting");
    while running.load(Ordering::SeqCst) {
        let job = match queue.pop_timeout(POLL_INTERVAL) {
            Some(job) => job,
            None => continue,
        };
        let (error, data) = dispatch(&engine, &job.request);
        job.finish(error, data);
    }
    log::debug!(target: "worker", "worker {id} stopping");
}

/// Runs one request against the store and maps the outcome to a wire
/// error code and payload.
fn dispatch(engine: &KvEngine, request: &keyvalued_protocol::Request) -> (ErrorCode, Vec<u8>) {
    match request.job_type {
        JobType::Put => match engine.put(request.key(), request.value()) {
            Ok(()) => (ErrorCode::NoError, Vec::new()),
            Err(e) => (map_error(e), Vec::new()),
        },
        JobType::Get => match engine.get(request.key()) {
            Ok(Some(value)) => (ErrorCode::NoError, value),
            Ok(None) => (ErrorCode::KeyNotFound, Vec::new()),
            Err(e) => (map_error(e), Vec::new()),
        },
        JobType::Delete => match engine.delete(request.key()) {
            Ok(true) => (ErrorCode::NoError, Vec::new()),
            Ok(false) => (ErrorCode::KeyNotFound, Vec::new()),
            Err(e) => (map_error(e), Vec::new()),
        },
    }
}

fn map_error(error: StoreError) -> ErrorCode {
    match error {
        StoreError::InvalidArg | StoreError::InvalidImage => ErrorCode::InvalidKey,
        StoreError::StorageFull => ErrorCode::StorageFull,
        StoreError::Io(e) => {
            log::error!(target: "worker", "store I/O error: {e}");
            ErrorCode::StorageFull
        }
    }
}
