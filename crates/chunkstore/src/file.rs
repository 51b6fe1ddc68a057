use std::{fs::File, io};

use crate::error::{Error, Result};

#[cfg(any(test, feature = "test"))]
pub mod mem;

/// Positional I/O over the single backing file.
///
/// The store never maintains a file cursor of its own: every read and write
/// names its offset, and appends are performed by asking for the current
/// end-of-file position and writing there. Obtaining the position and writing
/// at it are two separate acts; callers must serialize access to the file.
pub trait FileLike {
    /// Read up to `buf.len()` bytes at `offset`. Returns 0 at end-of-file.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Write up to `buf.len()` bytes at `offset`, extending the file if the
    /// range lies past its current end.
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// The current end-of-file position, i.e. where the next append lands.
    fn end_pos(&mut self) -> io::Result<u64>;

    fn fsync(&mut self) -> io::Result<()>;

    /// Read exactly `buf.len()` bytes at `offset`.
    fn read_exact_at(&mut self, mut buf: &mut [u8], mut offset: u64) -> Result<()> {
        let expected = buf.len();
        while !buf.is_empty() {
            match self.read_at(buf, offset) {
                Ok(0) => {
                    return Err(Error::ShortRead {
                        expected,
                        actual: expected - buf.len(),
                    })
                }
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Write all of `buf` at `offset`.
    fn write_all_at(&mut self, mut buf: &[u8], mut offset: u64) -> Result<()> {
        let expected = buf.len();
        while !buf.is_empty() {
            match self.write_at(buf, offset) {
                Ok(0) => {
                    return Err(Error::ShortWrite {
                        expected,
                        actual: expected - buf.len(),
                    })
                }
                Ok(n) => {
                    buf = &buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
impl FileLike for File {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::write_at(self, buf, offset)
    }

    fn end_pos(&mut self) -> io::Result<u64> {
        io::Seek::seek(self, io::SeekFrom::End(0))
    }

    fn fsync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

#[cfg(windows)]
impl FileLike for File {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_write(self, buf, offset)
    }

    fn end_pos(&mut self) -> io::Result<u64> {
        io::Seek::seek(self, io::SeekFrom::End(0))
    }

    fn fsync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Allocate a zeroed byte buffer, surfacing allocator failure.
///
/// Buffer sizes are frequently read from file contents, so allocation is
/// treated as fallible rather than abort-on-failure.
pub(crate) fn alloc_bytes(n: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(n)
        .map_err(|_| Error::OutOfMemory { bytes: n })?;
    buf.resize(n, 0);
    Ok(buf)
}
