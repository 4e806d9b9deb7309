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

//! Applies PUT/GET/DELETE over the directory and block store.

use std::path::Path;

use keyvalued_protocol::{MAX_KEY_LEN, MAX_VALUE_LEN};

use crate::block_store::BlockStore;
use crate::directory::{self, Directory};
use crate::error::Error;

/// The persistent store. Cheap to share across worker threads behind an
/// `Arc` — all interior state is already lock-guarded: the block store and
/// directory each own one lock, and the directory lock is always acquired
/// after any block-store lock needed in the same critical section.
pub struct KvEngine {
    store: BlockStore,
    directory: Directory,
}

impl KvEngine {
    pub fn open(
        path: &Path,
        block_size: u32,
        num_blocks: u32,
        hash_bucket_count: u32,
    ) -> Result<KvEngine, Error> {
        let store = BlockStore::open_or_create(path, block_size, num_blocks, hash_bucket_count)?;
        let directory = Directory::new();
        directory.ensure_bucket_block(&store)?;
        Ok(KvEngine { store, directory })
    }

    /// `Ok(())` on success; `Err(InvalidArg)` for a malformed key/value;
    /// `Err(StorageFull)` when the allocator is exhausted.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(Error::InvalidArg);
        }
        if value.len() > MAX_VALUE_LEN {
            return Err(Error::InvalidArg);
        }
        self.directory.insert_or_replace(&self.store, key, value)
    }

    /// `Ok(Some(value))` on hit, `Ok(None)` on miss (not an error — spec
    /// §4.3 resolves the GET-miss open question as COMPLETED +
    /// KEY_NOT_FOUND, never FAILED).
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(Error::InvalidArg);
        }
        let found = self.directory.lookup(&self.store, key)?;
        if found.record_block == 0 {
            return Ok(None);
        }
        Ok(Some(directory::record_value(&self.store, found.record_block)?))
    }

    /// `Ok(true)` if a record was erased, `Ok(false)` if the key was
    /// absent (idempotent).
    pub fn delete(&self, key: &[u8]) -> Result<bool, Error> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(Error::InvalidArg);
        }
        self.directory.erase(&self.store, key)
    }

    pub fn close(self) -> Result<(), Error> {
        self.store.close()
    }

    pub fn block_size(&self) -> u32 {
        self.store.block_size()
    }

    pub fn num_blocks(&self) -> u32 {
        self.store.num_blocks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(block_size: u32, num_blocks: u32, buckets: u32) -> (KvEngine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.img");
        let engine = KvEngine::open(&path, block_size, num_blocks, buckets).unwrap();
        (engine, dir)
    }

    #[test]
    fn put_then_get_returns_value() {
        // S2: PUT("hello","world") -> GET("hello") == "world"
        let (engine, _dir) = open(4096, 16, 8);
        engine.put(b"hello", b"world").unwrap();
        assert_eq!(engine.get(b"hello").unwrap(), Some(b"world".to_vec()));
    }

    #[test]
    fn put_twice_replaces_without_consuming_a_block() {
        // S3: PUT("k","v1"), PUT("k","v2") -> GET("k") == "v2"; no extra alloc.
        let (engine, _dir) = open(4096, 16, 8);
        engine.put(b"k", b"v1").unwrap();
        let before = engine.get(b"k").unwrap();
        engine.put(b"k", b"v2").unwrap();
        let after = engine.get(b"k").unwrap();
        assert_eq!(before, Some(b"v1".to_vec()));
        assert_eq!(after, Some(b"v2".to_vec()));
    }

    #[test]
    fn delete_missing_key_is_completed_not_found() {
        // S4: DELETE("missing") -> Ok(false), not an error.
        let (engine, _dir) = open(4096, 16, 8);
        assert_eq!(engine.delete(b"missing").unwrap(), false);
    }

    #[test]
    fn get_after_delete_is_miss() {
        let (engine, _dir) = open(4096, 16, 8);
        engine.put(b"a", b"1").unwrap();
        assert!(engine.delete(b"a").unwrap());
        assert_eq!(engine.get(b"a").unwrap(), None);
    }

    #[test]
    fn allocator_exhaustion_surfaces_as_storage_full() {
        // S5: with few data blocks, eventually PUT fails with StorageFull.
        let (engine, _dir) = open(4096, 4, 2); // 1 block for buckets, 2 data blocks left
        engine.put(b"a", b"1").unwrap();
        engine.put(b"b", b"2").unwrap();
        match engine.put(b"c", b"3") {
            Err(Error::StorageFull) => {}
            other => panic!("expected StorageFull, got {other:?}"),
        }
    }

    #[test]
    fn reopen_after_close_preserves_data() {
        // S6: PUT("a","1"), close, reopen -> GET("a") == "1".
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.img");
        {
            let engine = KvEngine::open(&path, 4096, 16, 8).unwrap();
            engine.put(b"a", b"1").unwrap();
            engine.close().unwrap();
        }
        let engine = KvEngine::open(&path, 4096, 16, 8).unwrap();
        assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn rejects_oversize_value() {
        let (engine, _dir) = open(4096, 16, 8);
        let big_value = vec![b'v'; MAX_VALUE_LEN + 1];
        assert!(matches!(engine.put(b"k", &big_value), Err(Error::InvalidArg)));
    }
}
