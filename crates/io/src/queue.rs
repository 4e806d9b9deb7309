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

//! The in-process job queue handed off between the connection dispatcher
//! and the worker pool: a mutex + condvar guarded FIFO, no spinning.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use keyvalued_protocol::{ErrorCode, JobStatus, JobType, Request, Response};

use crate::client_handle::ClientHandle;

/// One accepted request in flight, from submission to a terminal status.
pub struct Job {
    pub request: Request,
    client: ClientHandle,
    status: JobStatus,
}

impl Job {
    pub fn new(request: Request, client: ClientHandle) -> Job {
        Job {
            request,
            client,
            status: JobStatus::NotStarted,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Advance to a non-terminal status and ship the update. Write
    /// failures (the client has already hung up) are logged and otherwise
    /// ignored; the job keeps running so the store mutation it represents
    /// still completes.
    fn advance(&mut self, status: JobStatus) {
        self.status = status;
        let response = Response::new(self.request.job_type, status, ErrorCode::NoError, Vec::new());
        if let Err(e) = self.client.send(&response) {
            log::debug!(target: "queue", "status update dropped, client gone: {e}");
        }
    }

    /// Ship the terminal response and consume the job. A miss
    /// (`KeyNotFound` on a GET/DELETE) is not a failure: it completes with
    /// the error code set to distinguish it, same as a successful hit.
    pub fn finish(mut self, error: ErrorCode, data: Vec<u8>) {
        let status = match error {
            ErrorCode::NoError | ErrorCode::KeyNotFound => JobStatus::Completed,
            ErrorCode::InvalidKey | ErrorCode::StorageFull => JobStatus::Failed,
        };
        self.status = status;
        let response = Response::new(self.request.job_type, status, error, data);
        if let Err(e) = self.client.send(&response) {
            log::debug!(target: "queue", "terminal response dropped, client gone: {e}");
        }
    }
}

/// FIFO handoff between the dispatcher and the worker pool. `push` emits
/// the `SUBMITTED` status update; `pop` emits `PROCESSING` before handing
/// the job to its caller, matching the status sequence the client
/// observes on the wire.
pub struct JobQueue {
    inner: Mutex<VecDeque<Job>>,
    not_empty: Condvar,
}

impl JobQueue {
    pub fn new() -> JobQueue {
        JobQueue {
            inner: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
        }
    }

    pub fn push(&self, mut job: Job) {
        job.advance(JobStatus::Submitted);
        let mut queue = self.inner.lock();
        queue.push_back(job);
        self.not_empty.notify_one();
    }

    /// Blocks until a job is available, then marks it `PROCESSING`.
    pub fn pop(&self) -> Job {
        let mut queue = self.inner.lock();
        while queue.is_empty() {
            self.not_empty.wait(&mut queue);
        }
        let mut job = queue.pop_front().expect("queue checked non-empty");
        drop(queue);
        job.advance(JobStatus::Processing);
        job
    }

    /// Like `pop`, but gives up and returns `None` after `timeout` so a
    /// worker thread can periodically check its shutdown flag instead of
    /// blocking forever on an empty queue.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Job> {
        let mut queue = self.inner.lock();
        if queue.is_empty() {
            let result = self.not_empty.wait_for(&mut queue, timeout);
            if result.timed_out() && queue.is_empty() {
                return None;
            }
        }
        let mut job = queue.pop_front()?;
        drop(queue);
        job.advance(JobStatus::Processing);
        Some(job)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Wakes every thread blocked in `pop`/`pop_timeout`, used on shutdown
    /// so workers notice a cleared running flag without waiting out their
    /// timeout.
    pub fn wake_all(&self) {
        self.not_empty.notify_all();
    }
}

impl Default for JobQueue {
    fn default() -> JobQueue {
        JobQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    fn job_pair() -> (Job, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        let mio_stream = mio::net::TcpStream::from_std(server_side);
        let handle = ClientHandle::duplicate(&mio_stream).unwrap();
        let request = Request::new(JobType::Get, b"k", b"").unwrap();
        (Job::new(request, handle), client)
    }

    #[test]
    fn push_then_pop_preserves_fifo_order() {
        let queue = JobQueue::new();
        let (job_a, _a) = job_pair();
        let (job_b, _b) = job_pair();
        queue.push(job_a);
        queue.push(job_b);
        assert_eq!(queue.len(), 2);
        let first = queue.pop();
        assert_eq!(first.status(), JobStatus::Processing);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn push_emits_submitted_status_on_wire() {
        let (job, mut client) = job_pair();
        let queue = JobQueue::new();
        queue.push(job);
        let response = Response::read_from(&mut client).unwrap();
        assert_eq!(response.status, JobStatus::Submitted);
    }

    #[test]
    fn pop_emits_processing_status_on_wire() {
        let (job, mut client) = job_pair();
        let queue = JobQueue::new();
        queue.push(job);
        let _submitted = Response::read_from(&mut client).unwrap();
        let popped = queue.pop();
        let processing = Response::read_from(&mut client).unwrap();
        assert_eq!(processing.status, JobStatus::Processing);
        popped.finish(ErrorCode::NoError, b"v".to_vec());
        let completed = Response::read_from(&mut client).unwrap();
        assert_eq!(completed.status, JobStatus::Completed);
        assert_eq!(completed.data(), b"v");
    }

    #[test]
    fn finish_with_storage_full_reports_failed() {
        let (job, mut client) = job_pair();
        let queue = JobQueue::new();
        queue.push(job);
        let _ = Response::read_from(&mut client).unwrap();
        let popped = queue.pop();
        let _ = Response::read_from(&mut client).unwrap();
        popped.finish(ErrorCode::StorageFull, Vec::new());
        let failed = Response::read_from(&mut client).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error, ErrorCode::StorageFull);
    }

    #[test]
    fn finish_with_key_not_found_reports_completed() {
        let (job, mut client) = job_pair();
        let queue = JobQueue::new();
        queue.push(job);
        let _ = Response::read_from(&mut client).unwrap();
        let popped = queue.pop();
        let _ = Response::read_from(&mut client).unwrap();
        popped.finish(ErrorCode::KeyNotFound, Vec::new());
        let completed = Response::read_from(&mut client).unwrap();
        assert_eq!(completed.status, JobStatus::Completed);
        assert_eq!(completed.error, ErrorCode::KeyNotFound);
    }

    #[test]
    fn dropped_client_does_not_panic_on_write() {
        let (job, client) = job_pair();
        drop(client);
        let queue = JobQueue::new();
        queue.push(job);
        let popped = queue.pop();
        popped.finish(ErrorCode::NoError, Vec::new());
    }
}
