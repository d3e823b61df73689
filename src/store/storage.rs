//! Durable page storage.
//!
//! Storage is append-only: pages are written as length-prefixed frames and
//! never overwritten. The only mutable location is the beacon in the header,
//! which names the frame of the current UberPage.
//!
//! ## Layout
//!
//! ```text
//! [magic 8][beacon u64][beacon check u64][end u64] [len u32][page bytes] ...
//! ```
//!
//! `end` is persisted together with the beacon, so frames appended by a
//! commit that never wrote its beacon are reclaimed on reopen. A failed
//! commit reclaims them immediately through [`Storage::rollback`].

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::MmapMut;
use parking_lot::RwLock;
use tracing::debug;

use crate::data::DecodeError;

use super::{CommitOptions, DbError, Result, StorageKey};

/// Byte-addressable durable page store.
pub trait Storage: Send + Sync {
    /// Reads the page frame at `key`.
    fn read_page(&self, key: StorageKey) -> Result<Vec<u8>>;

    /// Appends a page frame and returns its address.
    fn write_page(&self, bytes: &[u8]) -> Result<StorageKey>;

    /// Address of the current UberPage, if the resource was ever committed.
    fn read_beacon(&self) -> Result<Option<StorageKey>>;

    /// Publishes `key` as the current UberPage.
    fn write_beacon(&self, key: StorageKey) -> Result<()>;

    /// Flushes written data according to `options`.
    fn sync(&self, options: CommitOptions) -> Result<()>;

    /// Abandons a failed commit.
    ///
    /// Drops every frame appended since `beacon` was published and, if a
    /// newer beacon was written in the meantime, publishes `beacon` again.
    fn rollback(&self, beacon: StorageKey) -> Result<()>;
}

const MAGIC: &[u8; 8] = b"STRATADB";

/// Size of the storage header.
pub const HEADER_SIZE: usize = 32;

const FRAME_PREFIX: usize = 4;

/// A beacon together with the frame end it was written with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Published {
    beacon: u64,
    end: u64,
}

impl Published {
    const EMPTY: Published = Published {
        beacon: 0,
        end: HEADER_SIZE as u64,
    };
}

struct Inner {
    mmap: MmapMut,
    file: Option<File>,
    end: u64,
    /// State stored in the header.
    published: Published,
    /// Header state before the last beacon write.
    previous: Published,
}

impl Inner {
    fn capacity(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn write_header(&mut self) {
        let Published { beacon, end } = self.published;
        self.mmap[0..8].copy_from_slice(MAGIC);
        self.mmap[8..16].copy_from_slice(&beacon.to_le_bytes());
        self.mmap[16..24].copy_from_slice(&(!beacon).to_le_bytes());
        self.mmap[24..32].copy_from_slice(&end.to_le_bytes());
    }

    fn read_u64(&self, offset: usize) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.mmap[offset..offset + 8]);
        u64::from_le_bytes(buf)
    }

    /// Grows the map until `required` bytes fit.
    fn ensure_capacity(&mut self, required: u64) -> Result<()> {
        if required <= self.capacity() {
            return Ok(());
        }
        let mut new_len = self.capacity().max(HEADER_SIZE as u64);
        while new_len < required {
            new_len = new_len.checked_mul(2).ok_or(DbError::Full)?;
        }
        let new_len = usize::try_from(new_len).map_err(|_| DbError::Full)?;

        match &self.file {
            Some(file) => {
                self.mmap.flush()?;
                file.set_len(new_len as u64)?;
                // Safety: the file is only mapped by this storage instance.
                self.mmap = unsafe { MmapMut::map_mut(file)? };
            }
            None => {
                let mut grown = MmapMut::map_anon(new_len)?;
                grown[..self.mmap.len()].copy_from_slice(&self.mmap[..]);
                self.mmap = grown;
            }
        }
        debug!(size = new_len, "storage grown");
        Ok(())
    }
}

/// Memory-mapped storage, file-backed or anonymous.
pub struct MmapStorage {
    inner: RwLock<Inner>,
}

impl MmapStorage {
    /// Opens or creates file-backed storage at `path`.
    pub fn open<P: AsRef<Path>>(path: P, initial_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;

        let file_size = file.metadata()?.len();
        let min_size = (initial_size.max(HEADER_SIZE)) as u64;
        if file_size < min_size {
            file.set_len(min_size)?;
        }

        // Safety: the file is only mapped by this storage instance.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let is_new = file_size == 0 || mmap[0..HEADER_SIZE].iter().all(|&b| b == 0);

        let mut inner = Inner {
            mmap,
            file: Some(file),
            end: HEADER_SIZE as u64,
            published: Published::EMPTY,
            previous: Published::EMPTY,
        };

        if is_new {
            inner.write_header();
            inner.mmap.flush()?;
        } else {
            if &inner.mmap[0..8] != MAGIC {
                return Err(DecodeError::Malformed("bad storage magic".into()).into());
            }
            let end = inner.read_u64(24);
            if end < HEADER_SIZE as u64 || end > inner.capacity() {
                return Err(DecodeError::Malformed(format!("storage end {end} out of bounds")).into());
            }
            inner.end = end;
            inner.published = Published {
                beacon: inner.read_u64(8),
                end,
            };
            inner.previous = inner.published;
        }

        debug!(path = %path.as_ref().display(), is_new, end = inner.end, "storage opened");
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Creates anonymous in-memory storage.
    pub fn anonymous(initial_size: usize) -> Result<Self> {
        let mmap = MmapMut::map_anon(initial_size.max(HEADER_SIZE))?;
        let mut inner = Inner {
            mmap,
            file: None,
            end: HEADER_SIZE as u64,
            published: Published::EMPTY,
            previous: Published::EMPTY,
        };
        inner.write_header();
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Bytes in use, header included.
    pub fn len(&self) -> u64 {
        self.inner.read().end
    }

    pub fn is_empty(&self) -> bool {
        self.len() == HEADER_SIZE as u64
    }

    /// Size of the current mapping.
    pub fn capacity(&self) -> u64 {
        self.inner.read().capacity()
    }
}

impl Storage for MmapStorage {
    fn read_page(&self, key: StorageKey) -> Result<Vec<u8>> {
        let inner = self.inner.read();
        let offset = key.raw();
        if offset < HEADER_SIZE as u64 || offset + FRAME_PREFIX as u64 > inner.end {
            return Err(DbError::PageNotFound(key));
        }
        let start = offset as usize;
        let mut len = [0u8; FRAME_PREFIX];
        len.copy_from_slice(&inner.mmap[start..start + FRAME_PREFIX]);
        let len = u32::from_le_bytes(len) as u64;

        let body = offset + FRAME_PREFIX as u64;
        if body + len > inner.end {
            return Err(DbError::PageNotFound(key));
        }
        Ok(inner.mmap[body as usize..(body + len) as usize].to_vec())
    }

    fn write_page(&self, bytes: &[u8]) -> Result<StorageKey> {
        let len = u32::try_from(bytes.len()).map_err(|_| DbError::Full)?;
        let mut inner = self.inner.write();
        let offset = inner.end;
        let end = offset
            .checked_add(FRAME_PREFIX as u64 + bytes.len() as u64)
            .ok_or(DbError::Full)?;
        inner.ensure_capacity(end)?;

        let start = offset as usize;
        inner.mmap[start..start + FRAME_PREFIX].copy_from_slice(&len.to_le_bytes());
        inner.mmap[start + FRAME_PREFIX..end as usize].copy_from_slice(bytes);
        inner.end = end;
        Ok(StorageKey::new(offset))
    }

    fn read_beacon(&self) -> Result<Option<StorageKey>> {
        let inner = self.inner.read();
        let beacon = inner.read_u64(8);
        if beacon == 0 {
            return Ok(None);
        }
        if inner.read_u64(16) != !beacon {
            return Err(DecodeError::Malformed("torn storage beacon".into()).into());
        }
        Ok(Some(StorageKey::new(beacon)))
    }

    fn write_beacon(&self, key: StorageKey) -> Result<()> {
        let mut inner = self.inner.write();
        if key.raw() < HEADER_SIZE as u64 || key.raw() >= inner.end {
            return Err(DbError::PageNotFound(key));
        }
        inner.previous = inner.published;
        inner.published = Published {
            beacon: key.raw(),
            end: inner.end,
        };
        inner.write_header();
        Ok(())
    }

    fn sync(&self, options: CommitOptions) -> Result<()> {
        let inner = self.inner.read();
        if inner.file.is_none() {
            return Ok(());
        }
        match options {
            CommitOptions::FlushDataAndRoot => inner.mmap.flush()?,
            CommitOptions::FlushDataOnly => inner.mmap.flush_async()?,
            CommitOptions::DangerNoFlush => {}
        }
        Ok(())
    }

    fn rollback(&self, beacon: StorageKey) -> Result<()> {
        let mut inner = self.inner.write();
        let restored = inner.published.beacon != beacon.raw();
        if restored {
            if inner.previous.beacon != beacon.raw() {
                return Err(DbError::PageNotFound(beacon));
            }
            inner.published = inner.previous;
            inner.write_header();
        }
        let discarded = inner.end - inner.published.end;
        inner.end = inner.published.end;
        debug!(%beacon, restored, discarded, "storage rolled back");

        if restored && inner.file.is_some() {
            inner.mmap.flush_range(0, HEADER_SIZE)?;
        }
        Ok(())
    }
}
