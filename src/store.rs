/// Backing stores addressed by byte offset
use crate::{prelude::*, sync::*};
use fs2::FileExt;
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

/// Addressed read/write of byte ranges, the only way the catalog touches its medium.
///
/// Writes are not transactional; a partial write is assumed never to happen.
pub trait BackingStore {
    fn write_at(&mut self, offset: u32, bytes: &[u8]) -> IResult<()>;

    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> IResult<()>;

    /// Addressable bytes
    fn capacity(&self) -> u32;

    fn check_bounds(&self, offset: u32, len: usize) -> IResult<()> {
        if offset as u64 + len as u64 > self.capacity() as u64 {
            return Err(Error::OutOfBounds { offset, len })
        }
        Ok(())
    }
}

/// A volatile in-memory store. Clones share the same bytes.
#[derive(Clone, Debug)]
pub struct MemStore {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemStore {
    pub fn new(capacity: u32) -> Self {
        Self { bytes: Arc::new(Mutex::new(vec![0; capacity as usize])) }
    }

    /// Copy of the raw medium
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }
}

impl BackingStore for MemStore {
    fn write_at(&mut self, offset: u32, bytes: &[u8]) -> IResult<()> {
        self.check_bounds(offset, bytes.len())?;
        let start = offset as usize;
        self.bytes.lock()[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> IResult<()> {
        self.check_bounds(offset, buf.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.bytes.lock()[start..start + buf.len()]);
        Ok(())
    }

    fn capacity(&self) -> u32 {
        self.bytes.lock().len() as u32
    }
}

/// A file standing in for the device's serial RAM.
///
/// The file is held under an exclusive lock for the lifetime of the store.
#[derive(Debug)]
pub struct FileStore {
    file: File,
    capacity: u32,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(path: P, capacity: u32) -> IResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())
            .map_err(|e| Error::unavailable(StoreKind::Backing, e))?;

        file.try_lock_exclusive()
            .map_err(|e| Error::unavailable(StoreKind::Backing, e))?;
        file.allocate(capacity as u64)
            .map_err(|e| Error::unavailable(StoreKind::Backing, e))?;

        log::debug!("backing store {:?} opened, {} bytes", path.as_ref(), capacity);
        Ok(Self { file, capacity })
    }
}

impl BackingStore for FileStore {
    fn write_at(&mut self, offset: u32, bytes: &[u8]) -> IResult<()> {
        self.check_bounds(offset, bytes.len())?;
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> IResult<()> {
        self.check_bounds(offset, buf.len())?;
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            log::warn!("failed to unlock backing store: {:?}", e);
        }
    }
}
