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

//! Wires the store, job queue, worker pool and dispatcher together into a
//! running daemon: open the store, start the worker pool, install a
//! shutdown signal handler, then run the dispatcher on the calling
//! thread until signalled.

pub mod config;
pub mod logger;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use config::Config;
use keyvalued_io::{run_dispatcher, JobQueue, WorkerPool};
use keyvalued_store::KvEngine;

/// Top-level failure starting or running the daemon.
#[derive(Debug)]
pub enum Error {
    Store(keyvalued_store::Error),
    Dispatcher(keyvalued_io::Error),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(e) => write!(f, "{e}"),
            Error::Dispatcher(e) => write!(f, "{e}"),
            Error::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<keyvalued_store::Error> for Error {
    fn from(e: keyvalued_store::Error) -> Error {
        Error::Store(e)
    }
}

impl From<keyvalued_io::Error> for Error {
    fn from(e: keyvalued_io::Error) -> Error {
        Error::Dispatcher(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

/// Opens the store, starts the worker pool, and runs the connection
/// dispatcher on the calling thread until a shutdown signal arrives.
///
/// This call blocks: there is one dedicated dispatcher thread, and the
/// caller (`main`) donates its own thread to that role rather than
/// spawning a separate one.
pub fn run(config: Config) -> Result<(), Error> {
    let _ = fdlimit::raise_fd_limit();

    log::debug!(
        target: "keyvalued",
        "num_workers={} (host cpus={})",
        config.num_workers,
        num_cpus::get()
    );

    let engine = Arc::new(KvEngine::open(
        &config.image_path,
        config.block_size,
        config.num_blocks,
        config.hash_bucket_count,
    )?);
    log::info!(
        target: "keyvalued",
        "opened store at {} ({} blocks x {} bytes)",
        config.image_path.display(),
        engine.num_blocks(),
        engine.block_size()
    );

    let queue = Arc::new(JobQueue::new());
    let running = Arc::new(AtomicBool::new(true));

    let _workers = WorkerPool::start(config.num_workers as u32, engine.clone(), queue.clone());

    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            log::info!(target: "keyvalued", "shutdown signal received");
            running.store(false, Ordering::SeqCst);
        })
        .map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::Other, format!("signal handler: {e}"))
        })?;
    }

    let addr = SocketAddr::new(config.bind_ip, config.port);
    run_dispatcher(addr, queue, running)?;

    // `_workers` drops here: its `Drop` clears the running flag the pool
    // watches and joins every worker thread before the process exits.
    Ok(())
}
