use std::{
    io,
    sync::{Arc, RwLock, RwLockWriteGuard},
};

use super::FileLike;

type SharedBytes = Arc<RwLock<Vec<u8>>>;

/// A store file backed by a `Vec<u8>`.
///
/// Clones share the same bytes, so a test can keep one handle around, run a
/// store to completion against another, and then reopen or inspect the raw
/// contents. Writes past the current end zero-fill the gap, as a sparse file
/// would.
#[derive(Clone, Debug, Default)]
pub struct Mem(SharedBytes);

impl Mem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutable access to the underlying bytes.
    ///
    /// This is intended for tests which deliberately corrupt the file.
    pub fn buf_mut(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.0.write().unwrap()
    }
}

impl FileLike for Mem {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let inner = self.0.read().unwrap();
        let offset = offset as usize;
        if offset >= inner.len() {
            return Ok(0);
        }
        let n = buf.len().min(inner.len() - offset);
        buf[..n].copy_from_slice(&inner[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        let mut inner = self.0.write().unwrap();
        let offset = offset as usize;
        let end = offset + buf.len();
        if end > inner.len() {
            inner.resize(end, 0);
        }
        inner[offset..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn end_pos(&mut self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }

    fn fsync(&mut self) -> io::Result<()> {
        Ok(())
    }
}
