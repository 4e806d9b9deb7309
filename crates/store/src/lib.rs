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

//! Persistent block store backing the key-value daemon: a single
//! memory-mapped image file holding a superblock, a block-addressed free
//! list, and a hash-bucket directory of record blocks.

mod block_store;
mod directory;
mod engine;
mod error;
mod superblock;

pub use block_store::BlockStore;
pub use directory::{Directory, Lookup};
pub use engine::KvEngine;
pub use error::Error;
pub use superblock::Superblock;
