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

//! The memory-mapped block image: superblock + free list + raw block
//! access.
//!
//! Every access to a block outside the superblock goes through
//! [`BlockStore::block`] / [`BlockStore::block_mut`], which validate the
//! index before handing out a slice into the mapping, rather than exposing
//! raw mmap pointers to callers.

use std::cell::UnsafeCell;
use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::MmapMut;
use parking_lot::Mutex;

use crate::error::Error;
use crate::superblock::Superblock;

/// Owns the mapped image file. Exactly one writer touches the free list
/// and superblock at a time via `free_lock`; bulk block bodies are not
/// covered by that lock — callers must hold exclusive ownership of a block
/// (by having allocated it, or by the directory's own lock) before writing
/// it.
pub struct BlockStore {
    file: File,
    mmap: UnsafeCell<MmapMut>,
    block_size: u32,
    num_blocks: u32,
    free_lock: Mutex<()>,
}

// SAFETY: all cross-block-index access is bounds-checked before any raw
// pointer is formed, and the free list / superblock fields are only ever
// mutated under `free_lock`. Concurrent access to *different* blocks is
// the documented contract of this type (see module docs).
unsafe impl Send for BlockStore {}
unsafe impl Sync for BlockStore {}

impl BlockStore {
    /// Opens `path`, creating and formatting it first if it does not
    /// already exist. `hash_bucket_count` is only used to populate a fresh
    /// superblock — for an existing image the on-disk value wins.
    pub fn open_or_create(
        path: &Path,
        block_size: u32,
        num_blocks: u32,
        hash_bucket_count: u32,
    ) -> Result<BlockStore, Error> {
        let creating = !path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let total_size = block_size as u64 * num_blocks as u64;
        if creating || file.metadata()?.len() == 0 {
            file.set_len(total_size)?;
            let mut mmap = unsafe { MmapMut::map_mut(&file)? };
            let sb = Superblock::fresh(block_size, num_blocks, hash_bucket_count);
            sb.write(&mut mmap[..block_size as usize]);
            mmap.flush_range(0, block_size as usize)?;
            log::info!(target: "blockstore", "formatted new image {} ({} blocks x {} bytes)", path.display(), num_blocks, block_size);
            return Ok(BlockStore {
                file,
                mmap: UnsafeCell::new(mmap),
                block_size,
                num_blocks,
                free_lock: Mutex::new(()),
            });
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let sb = Superblock::read(&mmap[..block_size as usize]);
        sb.validate()?;
        log::info!(target: "blockstore", "opened existing image {} ({} free of {})", path.display(), sb.free_block_count, sb.num_blocks);
        Ok(BlockStore {
            file,
            mmap: UnsafeCell::new(mmap),
            block_size: sb.block_size,
            num_blocks: sb.num_blocks,
            free_lock: Mutex::new(()),
        })
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    /// Read-only snapshot of the superblock. Taken under `free_lock` so it
    /// never observes a torn update.
    pub fn superblock(&self) -> Result<Superblock, Error> {
        let _guard = self.free_lock.lock();
        Ok(Superblock::read(self.block(0)?))
    }

    /// Flushes `hash_buckets_block` into the superblock. The only
    /// superblock field the directory is allowed to set directly; every
    /// other field is owned by the allocator.
    pub fn set_hash_buckets_block(&self, block_index: u32) -> Result<(), Error> {
        let _guard = self.free_lock.lock();
        let mut sb = Superblock::read(self.block(0)?);
        sb.hash_buckets_block = block_index;
        sb.write(self.block_mut(0)?);
        self.flush_block(0)
    }

    fn block_ptr(&self, index: u32) -> Result<*mut u8, Error> {
        if index >= self.num_blocks {
            return Err(Error::InvalidArg);
        }
        let mmap = unsafe { &mut *self.mmap.get() };
        let offset = index as usize * self.block_size as usize;
        Ok(unsafe { mmap.as_mut_ptr().add(offset) })
    }

    /// Bounds-checked, read-only view of one block.
    pub fn block(&self, index: u32) -> Result<&[u8], Error> {
        let ptr = self.block_ptr(index)?;
        Ok(unsafe { std::slice::from_raw_parts(ptr, self.block_size as usize) })
    }

    /// Bounds-checked, mutable view of one block. The caller must own the
    /// block (by allocation, or by holding the directory's lock for a
    /// record/bucket block it is known to have allocated).
    #[allow(clippy::mut_from_ref)]
    pub fn block_mut(&self, index: u32) -> Result<&mut [u8], Error> {
        let ptr = self.block_ptr(index)?;
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr, self.block_size as usize) })
    }

    /// Durable write-back of one block's byte range.
    pub fn flush_block(&self, index: u32) -> Result<(), Error> {
        if index >= self.num_blocks {
            return Err(Error::InvalidArg);
        }
        let mmap = unsafe { &*self.mmap.get() };
        let offset = index as usize * self.block_size as usize;
        mmap.flush_range(offset, self.block_size as usize)?;
        Ok(())
    }

    /// Pops the head of the free list. Fails with `StorageFull` when the
    /// list is empty.
    pub fn alloc_block(&self) -> Result<u32, Error> {
        let _guard = self.free_lock.lock();
        let mut sb = Superblock::read(self.block(0)?);
        if sb.free_list_head == 0 || sb.free_block_count == 0 {
            return Err(Error::StorageFull);
        }
        let head = sb.free_list_head;
        let next = {
            let head_block = self.block(head)?;
            u32::from_ne_bytes(head_block[0..4].try_into().unwrap())
        };
        sb.free_list_head = next;
        sb.free_block_count -= 1;
        sb.write(self.block_mut(0)?);
        self.flush_block(0)?;
        log::debug!(target: "blockstore", "alloc_block -> {head} ({} free remain)", sb.free_block_count);
        Ok(head)
    }

    /// Pushes `index` onto the head of the free list (LIFO). Rejects block
    /// 0 and out-of-range indices; does not detect double-free.
    pub fn free_block(&self, index: u32) -> Result<(), Error> {
        if index == 0 || index >= self.num_blocks {
            return Err(Error::InvalidArg);
        }
        let _guard = self.free_lock.lock();
        let mut sb = Superblock::read(self.block(0)?);
        let head = sb.free_list_head;
        {
            let block = self.block_mut(index)?;
            block[0..4].copy_from_slice(&head.to_ne_bytes());
        }
        self.flush_block(index)?;
        sb.free_list_head = index;
        sb.free_block_count += 1;
        sb.write(self.block_mut(0)?);
        self.flush_block(0)?;
        log::debug!(target: "blockstore", "free_block({index}) ({} free remain)", sb.free_block_count);
        Ok(())
    }

    /// Flushes the entire mapping and closes the backing file.
    pub fn close(self) -> Result<(), Error> {
        let mmap = unsafe { &*self.mmap.get() };
        mmap.flush()?;
        drop(self.file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(block_size: u32, num_blocks: u32) -> (BlockStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.img");
        let bs = BlockStore::open_or_create(&path, block_size, num_blocks, 8).unwrap();
        (bs, dir)
    }

    #[test]
    fn fresh_image_has_expected_free_list() {
        let (bs, _dir) = open(4096, 16);
        let sb = bs.superblock().unwrap();
        assert_eq!(sb.free_block_count, 15);
        assert_eq!(sb.free_list_head, 1);
    }

    #[test]
    fn alloc_then_free_restores_count() {
        let (bs, _dir) = open(4096, 16);
        let before = bs.superblock().unwrap().free_block_count;
        let idx = bs.alloc_block().unwrap();
        bs.free_block(idx).unwrap();
        let after = bs.superblock().unwrap().free_block_count;
        assert_eq!(before, after);
    }

    #[test]
    fn alloc_exhausts_and_reports_storage_full() {
        let (bs, _dir) = open(4096, 4); // 3 free blocks
        for _ in 0..3 {
            bs.alloc_block().unwrap();
        }
        match bs.alloc_block() {
            Err(Error::StorageFull) => {}
            other => panic!("expected StorageFull, got {other:?}"),
        }
    }

    #[test]
    fn free_rejects_block_zero_and_out_of_range() {
        let (bs, _dir) = open(4096, 16);
        assert!(matches!(bs.free_block(0), Err(Error::InvalidArg)));
        assert!(matches!(bs.free_block(100), Err(Error::InvalidArg)));
    }

    #[test]
    fn reopen_validates_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.img");
        {
            let bs = BlockStore::open_or_create(&path, 4096, 16, 8).unwrap();
            bs.close().unwrap();
        }
        let reopened = BlockStore::open_or_create(&path, 4096, 16, 8).unwrap();
        assert_eq!(reopened.superblock().unwrap().free_block_count, 15);
    }
}
