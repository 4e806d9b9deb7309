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

use std::fmt;

/// Error taxonomy for the block store and directory. Excludes key-not-found,
/// which the directory/engine represent as `Ok(None)` / `Ok(false)` since a
/// miss is not a failure.
#[derive(Debug)]
pub enum Error {
    /// Request fields violate constraints (empty key, oversize key/value).
    InvalidArg,
    /// Superblock magic/version mismatch at open. Fatal to the process.
    InvalidImage,
    /// Block allocator exhausted.
    StorageFull,
    /// A syscall on the backing file failed. Fatal for the process: unlike
    /// socket I/O errors, storage I/O errors are not locally recoverable.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArg => write!(f, "invalid argument"),
            Error::InvalidImage => write!(f, "invalid or incompatible image file"),
            Error::StorageFull => write!(f, "block allocator exhausted"),
            Error::Io(e) => write!(f, "storage I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}
