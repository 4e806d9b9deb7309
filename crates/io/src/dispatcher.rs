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

//! The single-threaded readiness loop: accepts clients on a
//! level-triggered listen socket, reads fixed-size request frames off
//! edge-triggered client sockets, and hands each complete frame to the job
//! queue.

use std::io::{self, ErrorKind, Read};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use slab::Slab;

use keyvalued_protocol::{Request, REQUEST_WIRE_LEN};

use crate::client_handle::ClientHandle;
use crate::error::Error;
use crate::queue::{Job, JobQueue};

const LISTENER: Token = Token(0);
const POLL_TIMEOUT: Duration = Duration::from_millis(250);

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    buf: [u8; REQUEST_WIRE_LEN],
    filled: usize,
}

/// Runs the readiness loop until `running` is cleared: the loop exits on
/// its next poll timeout after the flag drops. Blocking call; meant to run
/// on its own dedicated thread.
pub fn run(
    listener_addr: SocketAddr,
    queue: Arc<JobQueue>,
    running: Arc<AtomicBool>,
) -> Result<(), Error> {
    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(1024);

    let mut listener = TcpListener::bind(listener_addr)?;
    poll.registry()
        .register(&mut listener, LISTENER, Interest::READABLE)?;

    let mut connections: Slab<Connection> = Slab::new();

    log::info!(target: "dispatcher", "listening on {listener_addr}");

    while running.load(Ordering::SeqCst) {
        match poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }

        for event in events.iter() {
            match event.token() {
                LISTENER => accept_all(&mut listener, &mut poll, &mut connections)?,
                Token(slot) => {
                    if event.is_readable() {
                        service_connection(slot, &mut poll, &mut connections, &queue);
                    }
                }
            }
        }
    }

    log::info!(target: "dispatcher", "shutting down readiness loop");
    Ok(())
}

/// Listen socket is level-triggered: drain every pending connection in one
/// pass, in a tight loop until `accept` returns `WouldBlock`.
fn accept_all(
    listener: &mut TcpListener,
    poll: &mut Poll,
    connections: &mut Slab<Connection>,
) -> io::Result<()> {
    loop {
        match listener.accept() {
            Ok((mut stream, peer)) => {
                let entry = connections.vacant_entry();
                let token = Token(entry.key());
                poll.registry()
                    .register(&mut stream, token, Interest::READABLE)?;
                entry.insert(Connection {
                    stream,
                    peer,
                    buf: [0u8; REQUEST_WIRE_LEN],
                    filled: 0,
                });
                log::debug!(target: "dispatcher", "accepted {peer}");
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!(target: "dispatcher", "accept failed: {e}");
                return Ok(());
            }
        }
    }
}

/// Client sockets are edge-triggered: a single readable event can mean
/// "more than one request's worth of bytes arrived," so this reads until
/// `WouldBlock`, constructing and enrolling one job per complete frame.
fn service_connection(
    slot: usize,
    poll: &mut Poll,
    connections: &mut Slab<Connection>,
    queue: &Arc<JobQueue>,
) {
    let mut close = false;
    {
        let conn = &mut connections[slot];
        loop {
            match conn.stream.read(&mut conn.buf[conn.filled..]) {
                Ok(0) => {
                    close = true;
                    break;
                }
                Ok(n) => {
                    conn.filled += n;
                    if conn.filled == REQUEST_WIRE_LEN {
                        if !enroll(conn, queue) {
                            close = true;
                            break;
                        }
                        conn.filled = 0;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!(target: "dispatcher", "read error from {}: {e}", conn.peer);
                    close = true;
                    break;
                }
            }
        }
    }
    if close {
        let mut conn = connections.remove(slot);
        let _ = poll.registry().deregister(&mut conn.stream);
        log::debug!(target: "dispatcher", "closed connection to {}", conn.peer);
    }
}

/// Decodes one full frame and pushes a job. Returns `false` on a protocol
/// error, meaning the connection should be dropped without a response.
fn enroll(conn: &mut Connection, queue: &Arc<JobQueue>) -> bool {
    let request = match Request::decode(&conn.buf) {
        Ok(request) => request,
        Err(e) => {
            log::warn!(target: "dispatcher", "protocol error from {}: {e}", conn.peer);
            return false;
        }
    };
    let handle = match ClientHandle::duplicate(&conn.stream) {
        Ok(handle) => handle,
        Err(e) => {
            log::warn!(target: "dispatcher", "failed to duplicate client fd for {}: {e}", conn.peer);
            return false;
        }
    };
    queue.push(Job::new(request, handle));
    true
}
