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

//! Thin CLI client for `keyvalued`: connect, send one request, print every
//! response record until a terminal status arrives.

use std::io;
use std::net::TcpStream;
use std::process;

use clap::{Parser, Subcommand};

use keyvalued_protocol::{ErrorCode, JobStatus, JobType, Request, Response};

#[derive(Parser, Debug)]
#[command(name = "keyvaluectl", about = "talk to a running keyvalued daemon")]
struct Cli {
    /// Server to connect to, `<ip>:<port>`.
    #[arg(short = 'c', long = "connect")]
    connect: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a value under a key.
    Put { key: String, value: String },
    /// Fetch the value stored under a key.
    Get { key: String },
    /// Remove a key.
    Delete { key: String },
}

fn main() {
    let cli = Cli::parse();

    let (job_type, key, value) = match cli.command {
        Command::Put { key, value } => (JobType::Put, key, value),
        Command::Get { key } => (JobType::Get, key, String::new()),
        Command::Delete { key } => (JobType::Delete, key, String::new()),
    };

    let request = match Request::new(job_type, key.as_bytes(), value.as_bytes()) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    match run(&cli.connect, &request) {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Sends `request` and prints every response record until a terminal
/// status. Returns the process exit code: 0 on `COMPLETED`, 1 on
/// `FAILED` or a connection error.
fn run(connect: &str, request: &Request) -> io::Result<i32> {
    let mut stream = TcpStream::connect(connect)?;
    request.write_to(&mut stream)?;

    println!("waiting for job responses...");
    let mut response_count = 0u32;
    loop {
        let response = match Response::read_from(&mut stream) {
            Ok(response) => response,
            Err(e) => {
                eprintln!("server closed connection: {e}");
                return Ok(1);
            }
        };
        response_count += 1;
        print_response(response_count, &response);

        match response.status {
            JobStatus::Completed => return Ok(0),
            JobStatus::Failed => return Ok(1),
            _ => {}
        }
    }
}

fn print_response(n: u32, response: &Response) {
    println!("response {n}:");
    println!("  status: {:?}", response.status);
    println!("  error:  {:?}", response.error);
    if response.error == ErrorCode::NoError && !response.data().is_empty() {
        println!("  data:   {}", String::from_utf8_lossy(response.data()));
    }
}
