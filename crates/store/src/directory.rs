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

//! Hash-bucket directory mapping keys to chains of record blocks. One
//! mutex guards the bucket array and all record-block chain edits; it is
//! always acquired *after* any block-store lock needed in the same
//! critical section (in practice: the store's own `free_lock` is taken
//! and released internally by `alloc_block` / `free_block`, never held
//! across a directory edit).

use keyvalued_protocol::{MAX_KEY_LEN, MAX_VALUE_LEN};
use parking_lot::Mutex;

use crate::block_store::BlockStore;
use crate::error::Error;

const RECORD_HEADER_LEN: usize = 4 + 2 + 2; // next, key_len, value_len

fn fnv1a32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

fn parse_record(block: &[u8]) -> (u32, &[u8], &[u8]) {
    let next = u32::from_ne_bytes(block[0..4].try_into().unwrap());
    let key_len = u16::from_ne_bytes(block[4..6].try_into().unwrap()) as usize;
    let value_len = u16::from_ne_bytes(block[6..8].try_into().unwrap()) as usize;
    let key = &block[RECORD_HEADER_LEN..RECORD_HEADER_LEN + key_len];
    let value = &block[RECORD_HEADER_LEN + key_len..RECORD_HEADER_LEN + key_len + value_len];
    (next, key, value)
}

fn write_record(block: &mut [u8], next: u32, key: &[u8], value: &[u8]) {
    block[0..4].copy_from_slice(&next.to_ne_bytes());
    block[4..6].copy_from_slice(&(key.len() as u16).to_ne_bytes());
    block[6..8].copy_from_slice(&(value.len() as u16).to_ne_bytes());
    block[RECORD_HEADER_LEN..RECORD_HEADER_LEN + key.len()].copy_from_slice(key);
    block[RECORD_HEADER_LEN + key.len()..RECORD_HEADER_LEN + key.len() + value.len()]
        .copy_from_slice(value);
}

fn set_record_next(block: &mut [u8], next: u32) {
    block[0..4].copy_from_slice(&next.to_ne_bytes());
}

fn read_bucket_head(store: &BlockStore, bucket_block: u32, bucket_index: u32) -> Result<u32, Error> {
    let block = store.block(bucket_block)?;
    let off = bucket_index as usize * 4;
    Ok(u32::from_ne_bytes(block[off..off + 4].try_into().unwrap()))
}

fn write_bucket_head(
    store: &BlockStore,
    bucket_block: u32,
    bucket_index: u32,
    value: u32,
) -> Result<(), Error> {
    let block = store.block_mut(bucket_block)?;
    let off = bucket_index as usize * 4;
    block[off..off + 4].copy_from_slice(&value.to_ne_bytes());
    Ok(())
}

/// Result of walking a bucket chain for a key.
pub struct Lookup {
    pub bucket_index: u32,
    pub prev_block: u32,
    /// 0 if the key was not found.
    pub record_block: u32,
}

pub struct Directory {
    lock: Mutex<()>,
}

impl Directory {
    pub fn new() -> Directory {
        Directory { lock: Mutex::new(()) }
    }

    /// Allocates the bucket array block on first use. A no-op once
    /// `hash_buckets_block` is non-zero.
    pub fn ensure_bucket_block(&self, store: &BlockStore) -> Result<(), Error> {
        let _guard = self.lock.lock();
        self.ensure_bucket_block_locked(store)
    }

    fn ensure_bucket_block_locked(&self, store: &BlockStore) -> Result<(), Error> {
        let sb = store.superblock()?;
        if sb.hash_buckets_block != 0 {
            return Ok(());
        }
        let block_idx = store.alloc_block()?;
        {
            let block = store.block_mut(block_idx)?;
            let needed = sb.hash_bucket_count as usize * 4;
            block[..needed].fill(0);
        }
        store.flush_block(block_idx)?;
        store.set_hash_buckets_block(block_idx)?;
        log::debug!(target: "directory", "allocated bucket array in block {block_idx}");
        Ok(())
    }

    fn lookup_locked(&self, store: &BlockStore, key: &[u8]) -> Result<Lookup, Error> {
        let sb = store.superblock()?;
        let bucket_index = fnv1a32(key) % sb.hash_bucket_count;
        if sb.hash_buckets_block == 0 {
            return Ok(Lookup {
                bucket_index,
                prev_block: 0,
                record_block: 0,
            });
        }
        let mut prev = 0u32;
        let mut cur = read_bucket_head(store, sb.hash_buckets_block, bucket_index)?;
        while cur != 0 {
            let block = store.block(cur)?;
            let (next, rec_key, _) = parse_record(block);
            if rec_key == key {
                return Ok(Lookup {
                    bucket_index,
                    prev_block: prev,
                    record_block: cur,
                });
            }
            prev = cur;
            cur = next;
        }
        Ok(Lookup {
            bucket_index,
            prev_block: 0,
            record_block: 0,
        })
    }

    /// Walks the bucket chain for `key`. `record_block == 0` means absent.
    pub fn lookup(&self, store: &BlockStore, key: &[u8]) -> Result<Lookup, Error> {
        let _guard = self.lock.lock();
        self.lookup_locked(store, key)
    }

    /// Overwrites the value in place if `key` exists, otherwise allocates a
    /// new record block and prepends it to the bucket chain (LIFO).
    pub fn insert_or_replace(&self, store: &BlockStore, key: &[u8], value: &[u8]) -> Result<(), Error> {
        if key.is_empty() || key.len() > MAX_KEY_LEN || value.len() > MAX_VALUE_LEN {
            return Err(Error::InvalidArg);
        }
        let _guard = self.lock.lock();
        self.ensure_bucket_block_locked(store)?;
        let found = self.lookup_locked(store, key)?;

        if found.record_block != 0 {
            let next = {
                let (next, _, _) = parse_record(store.block(found.record_block)?);
                next
            };
            write_record(store.block_mut(found.record_block)?, next, key, value);
            store.flush_block(found.record_block)?;
            return Ok(());
        }

        let sb = store.superblock()?;
        let head = read_bucket_head(store, sb.hash_buckets_block, found.bucket_index)?;
        let new_block = store.alloc_block()?;
        write_record(store.block_mut(new_block)?, head, key, value);
        store.flush_block(new_block)?; // record-block-first
        write_bucket_head(store, sb.hash_buckets_block, found.bucket_index, new_block)?;
        store.flush_block(sb.hash_buckets_block)?; // bucket-head-second
        Ok(())
    }

    /// Unlinks and frees `key`'s record block. Returns `false` if the key
    /// was absent (idempotent, not an error).
    pub fn erase(&self, store: &BlockStore, key: &[u8]) -> Result<bool, Error> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(Error::InvalidArg);
        }
        let _guard = self.lock.lock();
        let found = self.lookup_locked(store, key)?;
        if found.record_block == 0 {
            return Ok(false);
        }
        let sb = store.superblock()?;
        let next = {
            let (next, _, _) = parse_record(store.block(found.record_block)?);
            next
        };
        if found.prev_block == 0 {
            write_bucket_head(store, sb.hash_buckets_block, found.bucket_index, next)?;
            store.flush_block(sb.hash_buckets_block)?;
        } else {
            set_record_next(store.block_mut(found.prev_block)?, next);
            store.flush_block(found.prev_block)?;
        }
        store.free_block(found.record_block)?;
        Ok(true)
    }
}

impl Default for Directory {
    fn default() -> Directory {
        Directory::new()
    }
}

/// Reads a record's value by block index, for the engine's GET path.
pub fn record_value(store: &BlockStore, record_block: u32) -> Result<Vec<u8>, Error> {
    let block = store.block(record_block)?;
    let (_, _, value) = parse_record(block);
    Ok(value.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_store::BlockStore;
    use tempfile::tempdir;

    fn open(block_size: u32, num_blocks: u32, buckets: u32) -> (BlockStore, Directory, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.img");
        let bs = BlockStore::open_or_create(&path, block_size, num_blocks, buckets).unwrap();
        (bs, Directory::new(), dir)
    }

    #[test]
    fn insert_then_lookup_hits() {
        let (bs, d, _dir) = open(4096, 16, 8);
        d.insert_or_replace(&bs, b"hello", b"world").unwrap();
        let found = d.lookup(&bs, b"hello").unwrap();
        assert_ne!(found.record_block, 0);
        assert_eq!(record_value(&bs, found.record_block).unwrap(), b"world");
    }

    #[test]
    fn replace_reuses_block_and_does_not_change_free_count() {
        let (bs, d, _dir) = open(4096, 16, 8);
        d.insert_or_replace(&bs, b"k", b"v1").unwrap();
        let before = bs.superblock().unwrap().free_block_count;
        d.insert_or_replace(&bs, b"k", b"v2").unwrap();
        let after = bs.superblock().unwrap().free_block_count;
        assert_eq!(before, after);
        let found = d.lookup(&bs, b"k").unwrap();
        assert_eq!(record_value(&bs, found.record_block).unwrap(), b"v2");
    }

    #[test]
    fn erase_missing_key_is_idempotent_miss() {
        let (bs, d, _dir) = open(4096, 16, 8);
        assert!(!d.erase(&bs, b"missing").unwrap());
    }

    #[test]
    fn erase_existing_key_frees_its_block() {
        let (bs, d, _dir) = open(4096, 16, 8);
        d.insert_or_replace(&bs, b"k", b"v").unwrap();
        let before = bs.superblock().unwrap().free_block_count;
        assert!(d.erase(&bs, b"k").unwrap());
        let after = bs.superblock().unwrap().free_block_count;
        assert_eq!(after, before + 1);
        assert_eq!(d.lookup(&bs, b"k").unwrap().record_block, 0);
    }

    #[test]
    fn collision_chain_preserves_both_keys() {
        // force a collision by using a single bucket.
        let (bs, d, _dir) = open(4096, 16, 1);
        d.insert_or_replace(&bs, b"a", b"1").unwrap();
        d.insert_or_replace(&bs, b"b", b"2").unwrap();
        let a = d.lookup(&bs, b"a").unwrap();
        let b = d.lookup(&bs, b"b").unwrap();
        assert_eq!(record_value(&bs, a.record_block).unwrap(), b"1");
        assert_eq!(record_value(&bs, b.record_block).unwrap(), b"2");
    }

    #[test]
    fn rejects_empty_and_oversize_keys() {
        let (bs, d, _dir) = open(4096, 16, 8);
        assert!(matches!(d.insert_or_replace(&bs, b"", b"v"), Err(Error::InvalidArg)));
        let big_key = vec![b'k'; MAX_KEY_LEN + 1];
        assert!(matches!(
            d.insert_or_replace(&bs, &big_key, b"v"),
            Err(Error::InvalidArg)
        ));
    }
}
