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

//! The write-end a worker borrows to ship status updates back to a client.
//!
//! A job's client handle is an independently-owned duplicate of the
//! connection's file descriptor: the dispatcher keeps reading from its own
//! `mio::net::TcpStream`, while each in-flight job writes through its own
//! `dup`'d descriptor. The two descriptors refer to the same socket but are
//! closed independently, so a worker finishing (and dropping) a job never
//! races the dispatcher's own close of the connection.

use std::io;
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, FromRawFd};

use keyvalued_protocol::Response;

pub struct ClientHandle {
    stream: TcpStream,
}

impl ClientHandle {
    pub fn duplicate(source: &mio::net::TcpStream) -> io::Result<ClientHandle> {
        let fd = source.as_raw_fd();
        let dup_fd = unsafe { libc::dup(fd) };
        if dup_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ClientHandle {
            stream: unsafe { TcpStream::from_raw_fd(dup_fd) },
        })
    }

    /// Best-effort: the caller logs and moves on if this fails, per the
    /// spec's "write failure is logged... remaining updates still
    /// attempted, they simply fail silently" policy.
    pub fn send(&mut self, response: &Response) -> io::Result<()> {
        response.write_to(&mut self.stream)
    }
}
