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

//! Job queue, worker pool and connection dispatcher: the networked half of
//! the key-value daemon sitting on top of `keyvalued-store`.

mod client_handle;
mod dispatcher;
mod error;
mod queue;
mod worker;

pub use client_handle::ClientHandle;
pub use dispatcher::run as run_dispatcher;
pub use error::Error;
pub use queue::{Job, JobQueue};
pub use worker::WorkerPool;
