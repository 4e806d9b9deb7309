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

//! Block 0 of the image: the self-describing header.

use crate::error::Error;

/// Byte length of the populated header; the remainder of block 0 is
/// reserved padding.
pub const HEADER_LEN: usize = 40;

const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 4;
const OFF_TOTAL_SIZE: usize = 8;
const OFF_BLOCK_SIZE: usize = 16;
const OFF_NUM_BLOCKS: usize = 20;
const OFF_FREE_LIST_HEAD: usize = 24;
const OFF_FREE_BLOCK_COUNT: usize = 28;
const OFF_HASH_BUCKET_COUNT: usize = 32;
const OFF_HASH_BUCKETS_BLOCK: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub magic: u32,
    pub version: u32,
    pub total_size: u64,
    pub block_size: u32,
    pub num_blocks: u32,
    pub free_list_head: u32,
    pub free_block_count: u32,
    pub hash_bucket_count: u32,
    pub hash_buckets_block: u32,
}

impl Superblock {
    pub const MAGIC: u32 = 0x4b56_5331; // "KVS1"
    pub const VERSION: u32 = 1;

    /// A fresh superblock for an image about to be formatted: free list
    /// covers every block from 1 to `num_blocks - 1`, bucket array not yet
    /// allocated.
    pub fn fresh(block_size: u32, num_blocks: u32, hash_bucket_count: u32) -> Superblock {
        let free_block_count = num_blocks.saturating_sub(1);
        Superblock {
            magic: Self::MAGIC,
            version: Self::VERSION,
            total_size: block_size as u64 * num_blocks as u64,
            block_size,
            num_blocks,
            free_list_head: if free_block_count == 0 { 0 } else { 1 },
            free_block_count,
            hash_bucket_count,
            hash_buckets_block: 0,
        }
    }

    pub fn read(block0: &[u8]) -> Superblock {
        let u32_at = |off: usize| u32::from_ne_bytes(block0[off..off + 4].try_into().unwrap());
        Superblock {
            magic: u32_at(OFF_MAGIC),
            version: u32_at(OFF_VERSION),
            total_size: u64::from_ne_bytes(block0[OFF_TOTAL_SIZE..OFF_TOTAL_SIZE + 8].try_into().unwrap()),
            block_size: u32_at(OFF_BLOCK_SIZE),
            num_blocks: u32_at(OFF_NUM_BLOCKS),
            free_list_head: u32_at(OFF_FREE_LIST_HEAD),
            free_block_count: u32_at(OFF_FREE_BLOCK_COUNT),
            hash_bucket_count: u32_at(OFF_HASH_BUCKET_COUNT),
            hash_buckets_block: u32_at(OFF_HASH_BUCKETS_BLOCK),
        }
    }

    pub fn write(&self, block0: &mut [u8]) {
        block0[OFF_MAGIC..OFF_MAGIC + 4].copy_from_slice(&self.magic.to_ne_bytes());
        block0[OFF_VERSION..OFF_VERSION + 4].copy_from_slice(&self.version.to_ne_bytes());
        block0[OFF_TOTAL_SIZE..OFF_TOTAL_SIZE + 8].copy_from_slice(&self.total_size.to_ne_bytes());
        block0[OFF_BLOCK_SIZE..OFF_BLOCK_SIZE + 4].copy_from_slice(&self.block_size.to_ne_bytes());
        block0[OFF_NUM_BLOCKS..OFF_NUM_BLOCKS + 4].copy_from_slice(&self.num_blocks.to_ne_bytes());
        block0[OFF_FREE_LIST_HEAD..OFF_FREE_LIST_HEAD + 4]
            .copy_from_slice(&self.free_list_head.to_ne_bytes());
        block0[OFF_FREE_BLOCK_COUNT..OFF_FREE_BLOCK_COUNT + 4]
            .copy_from_slice(&self.free_block_count.to_ne_bytes());
        block0[OFF_HASH_BUCKET_COUNT..OFF_HASH_BUCKET_COUNT + 4]
            .copy_from_slice(&self.hash_bucket_count.to_ne_bytes());
        block0[OFF_HASH_BUCKETS_BLOCK..OFF_HASH_BUCKETS_BLOCK + 4]
            .copy_from_slice(&self.hash_buckets_block.to_ne_bytes());
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.magic != Self::MAGIC || self.version != Self::VERSION {
            return Err(Error::InvalidImage);
        }
        if self.total_size != self.block_size as u64 * self.num_blocks as u64 {
            return Err(Error::InvalidImage);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_superblock_matches_scenario_s1() {
        // block_size=4096, num_blocks=16: free_block_count == 15, head == 1.
        let sb = Superblock::fresh(4096, 16, 8);
        assert_eq!(sb.free_block_count, 15);
        assert_eq!(sb.free_list_head, 1);
    }

    #[test]
    fn round_trips_through_bytes() {
        let sb = Superblock::fresh(4096, 16384, 512);
        let mut buf = vec![0u8; 4096];
        sb.write(&mut buf);
        let read_back = Superblock::read(&buf);
        assert_eq!(sb, read_back);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut sb = Superblock::fresh(4096, 16, 8);
        sb.magic = 0xdead_beef;
        assert!(sb.validate().is_err());
    }
}
