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

//! Wire protocol between `keyvalued` clients and the daemon.
//!
//! Both request and response are fixed-size, length-delimited binary
//! records sent in host byte order (client and server are co-located).
//! See the request/response layout in the crate-level docs of `keyvalued`.

use std::fmt;
use std::io::{self, Read, Write};

/// Maximum key length, in bytes (spec: ≤ 128).
pub const MAX_KEY_LEN: usize = 128;
/// Maximum value length, in bytes (spec: ≤ 1024).
pub const MAX_VALUE_LEN: usize = 1024;

/// `4B type + 128B key + 1024B value`.
pub const REQUEST_WIRE_LEN: usize = 4 + MAX_KEY_LEN + MAX_VALUE_LEN;
/// `4B type + 4B status + 4B error + 4B data_len + 1024B data`.
pub const RESPONSE_WIRE_LEN: usize = 4 + 4 + 4 + 4 + MAX_VALUE_LEN;

/// Request operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    Put = 1,
    Get = 2,
    Delete = 3,
}

impl JobType {
    fn from_wire(v: i32) -> Option<JobType> {
        match v {
            1 => Some(JobType::Put),
            2 => Some(JobType::Get),
            3 => Some(JobType::Delete),
            _ => None,
        }
    }
}

/// Lifecycle status of a job, reported on the response channel.
///
/// Transitions are linear and terminal states are absorbing:
/// `NotStarted -> Submitted -> Processing -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    NotStarted = 0,
    Submitted = 1,
    Processing = 2,
    Completed = 3,
    Failed = 4,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn from_wire(v: i32) -> Option<JobStatus> {
        match v {
            0 => Some(JobStatus::NotStarted),
            1 => Some(JobStatus::Submitted),
            2 => Some(JobStatus::Processing),
            3 => Some(JobStatus::Completed),
            4 => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// Error code carried in a response. Distinct from the process-local
/// `keyvalued_store::Error` taxonomy — only the codes meaningful to a
/// client appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NoError = 0,
    InvalidKey = 1,
    StorageFull = 2,
    KeyNotFound = 3,
}

impl ErrorCode {
    fn from_wire(v: i32) -> Option<ErrorCode> {
        match v {
            0 => Some(ErrorCode::NoError),
            1 => Some(ErrorCode::InvalidKey),
            2 => Some(ErrorCode::StorageFull),
            3 => Some(ErrorCode::KeyNotFound),
            _ => None,
        }
    }
}

/// A malformed or short frame on the wire. The connection is dropped
/// without a response when this occurs on read.
#[derive(Debug)]
pub struct ProtocolError(pub String);

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "protocol error: {}", self.0)
    }
}

impl std::error::Error for ProtocolError {}

/// One client request: PUT(key, value), GET(key) or DELETE(key).
#[derive(Debug, Clone)]
pub struct Request {
    pub job_type: JobType,
    key: Vec<u8>,
    value: Vec<u8>,
}

impl Request {
    pub fn new(job_type: JobType, key: &[u8], value: &[u8]) -> Result<Request, ProtocolError> {
        if key.len() > MAX_KEY_LEN {
            return Err(ProtocolError(format!(
                "key length {} exceeds {}",
                key.len(),
                MAX_KEY_LEN
            )));
        }
        if value.len() > MAX_VALUE_LEN {
            return Err(ProtocolError(format!(
                "value length {} exceeds {}",
                value.len(),
                MAX_VALUE_LEN
            )));
        }
        Ok(Request {
            job_type,
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Encode into the fixed `REQUEST_WIRE_LEN`-byte frame.
    pub fn encode(&self) -> [u8; REQUEST_WIRE_LEN] {
        let mut buf = [0u8; REQUEST_WIRE_LEN];
        buf[0..4].copy_from_slice(&(self.job_type as i32).to_ne_bytes());
        buf[4..4 + self.key.len()].copy_from_slice(&self.key);
        let value_off = 4 + MAX_KEY_LEN;
        buf[value_off..value_off + self.value.len()].copy_from_slice(&self.value);
        buf
    }

    /// Decode a fixed `REQUEST_WIRE_LEN`-byte frame read off the wire.
    /// Key/value are NUL-terminated within their fixed-size fields; the
    /// logical length is the position of the first NUL byte (or the
    /// field's full capacity if none is present).
    pub fn decode(buf: &[u8; REQUEST_WIRE_LEN]) -> Result<Request, ProtocolError> {
        let mut type_bytes = [0u8; 4];
        type_bytes.copy_from_slice(&buf[0..4]);
        let job_type = JobType::from_wire(i32::from_ne_bytes(type_bytes)).ok_or_else(|| {
            log::debug!(target: "protocol", "unknown request type {}", i32::from_ne_bytes(type_bytes));
            ProtocolError("unknown request type".into())
        })?;

        let key_field = &buf[4..4 + MAX_KEY_LEN];
        let key_len = key_field.iter().position(|&b| b == 0).unwrap_or(MAX_KEY_LEN);
        let key = key_field[..key_len].to_vec();

        let value_off = 4 + MAX_KEY_LEN;
        let value_field = &buf[value_off..value_off + MAX_VALUE_LEN];
        let value_len = value_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_VALUE_LEN);
        let value = value_field[..value_len].to_vec();

        Ok(Request {
            job_type,
            key,
            value,
        })
    }

    /// Read and decode one fixed-size request frame from `r`. A short
    /// read (including a clean EOF with zero bytes) is a protocol error.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Request, ProtocolError> {
        let mut buf = [0u8; REQUEST_WIRE_LEN];
        r.read_exact(&mut buf)
            .map_err(|e| ProtocolError(format!("short request read: {e}")))?;
        Request::decode(&buf)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.encode())
    }
}

/// One status update (or terminal result) shipped back to the client.
#[derive(Debug, Clone)]
pub struct Response {
    pub job_type: JobType,
    pub status: JobStatus,
    pub error: ErrorCode,
    data: Vec<u8>,
}

impl Response {
    pub fn new(job_type: JobType, status: JobStatus, error: ErrorCode, data: Vec<u8>) -> Response {
        debug_assert!(data.len() <= MAX_VALUE_LEN);
        Response {
            job_type,
            status,
            error,
            data,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn encode(&self) -> [u8; RESPONSE_WIRE_LEN] {
        let mut buf = [0u8; RESPONSE_WIRE_LEN];
        buf[0..4].copy_from_slice(&(self.job_type as i32).to_ne_bytes());
        buf[4..8].copy_from_slice(&(self.status as i32).to_ne_bytes());
        buf[8..12].copy_from_slice(&(self.error as i32).to_ne_bytes());
        buf[12..16].copy_from_slice(&(self.data.len() as i32).to_ne_bytes());
        buf[16..16 + self.data.len()].copy_from_slice(&self.data);
        buf
    }

    pub fn decode(buf: &[u8; RESPONSE_WIRE_LEN]) -> Result<Response, ProtocolError> {
        let job_type = JobType::from_wire(i32::from_ne_bytes(buf[0..4].try_into().unwrap()))
            .ok_or_else(|| ProtocolError("unknown response type".into()))?;
        let status = JobStatus::from_wire(i32::from_ne_bytes(buf[4..8].try_into().unwrap()))
            .ok_or_else(|| ProtocolError("unknown response status".into()))?;
        let error = ErrorCode::from_wire(i32::from_ne_bytes(buf[8..12].try_into().unwrap()))
            .ok_or_else(|| ProtocolError("unknown response error code".into()))?;
        let data_len = i32::from_ne_bytes(buf[12..16].try_into().unwrap());
        if data_len < 0 || data_len as usize > MAX_VALUE_LEN {
            return Err(ProtocolError(format!("invalid data_len {data_len}")));
        }
        let data_len = data_len as usize;
        let data = buf[16..16 + data_len].to_vec();
        Ok(Response {
            job_type,
            status,
            error,
            data,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.encode())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Response, ProtocolError> {
        let mut buf = [0u8; RESPONSE_WIRE_LEN];
        r.read_exact(&mut buf)
            .map_err(|e| ProtocolError(format!("short response read: {e}")))?;
        Response::decode(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let req = Request::new(JobType::Put, b"hello", b"world").unwrap();
        let encoded = req.encode();
        let decoded = Request::decode(&encoded).unwrap();
        assert_eq!(decoded.job_type, JobType::Put);
        assert_eq!(decoded.key(), b"hello");
        assert_eq!(decoded.value(), b"world");
    }

    #[test]
    fn request_rejects_oversize_key() {
        let key = vec![b'k'; MAX_KEY_LEN + 1];
        assert!(Request::new(JobType::Get, &key, b"").is_err());
    }

    #[test]
    fn request_rejects_oversize_value() {
        let value = vec![b'v'; MAX_VALUE_LEN + 1];
        assert!(Request::new(JobType::Put, b"k", &value).is_err());
    }

    #[test]
    fn response_round_trips_with_payload() {
        let res = Response::new(
            JobType::Get,
            JobStatus::Completed,
            ErrorCode::NoError,
            b"world".to_vec(),
        );
        let encoded = res.encode();
        let decoded = Response::decode(&encoded).unwrap();
        assert_eq!(decoded.status, JobStatus::Completed);
        assert_eq!(decoded.error, ErrorCode::NoError);
        assert_eq!(decoded.data(), b"world");
    }

    #[test]
    fn response_rejects_bad_data_len() {
        let mut buf = [0u8; RESPONSE_WIRE_LEN];
        buf[12..16].copy_from_slice(&(-1i32).to_ne_bytes());
        assert!(Response::decode(&buf).is_err());
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let mut buf = [0u8; REQUEST_WIRE_LEN];
        buf[0..4].copy_from_slice(&99i32.to_ne_bytes());
        assert!(Request::decode(&buf).is_err());
    }

    #[test]
    fn job_status_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Submitted.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }
}
