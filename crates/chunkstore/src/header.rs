use log::trace;

use crate::{
    error::{Error, Result},
    file::FileLike,
};

/// Identifies a chunkstore file: the word "CHUNK" padded to eight bytes.
pub const MAGIC: [u8; 8] = *b"CHUNK   ";

/// Current format version.
pub const VERSION: u32 = 4;

/// Byte-order probe. The constant reads back as 0x0A00 when the file was
/// produced on (or for) the opposite byte order, in which case open fails.
pub const ENDIAN_CHECK: u16 = 0x000A;

/// The fixed-size record at offset 0 of a store file.
///
/// The identity fields (magic, version, endianness probe, `data_start`) are
/// fixed at creation; the remaining fields are updated in memory and
/// persisted by [`Header::commit`]. The header is the only part of the file
/// ever rewritten in place.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
    /// Number of chunk slots in the current snapshot.
    pub array_size: u64,
    /// Offset of the first byte after the header.
    pub data_start: u64,
    /// File offset of the earliest index snapshot ever committed; 0 if none.
    pub first_commit: u64,
    /// File offset of the most recent index snapshot; 0 if none.
    pub current_commit: u64,
    /// Auxiliary pointer reserved for embedders, carried across commits.
    pub aux_offset: u64,
    /// Auxiliary length reserved for embedders, carried across commits.
    pub aux_size: u64,
}

impl Header {
    pub const LEN: usize = 64;

    /// A fresh header for a store with `array_size` chunk slots.
    pub fn new(array_size: u64) -> Self {
        Self {
            array_size,
            data_start: Self::LEN as u64,
            first_commit: 0,
            current_commit: 0,
            aux_offset: 0,
            aux_size: 0,
        }
    }

    /// Read and validate the header at offset 0 of `file`.
    pub fn load<F: FileLike>(file: &mut F) -> Result<Self> {
        let mut buf = [0; Self::LEN];
        file.read_exact_at(&mut buf, 0)?;
        Self::decode(&buf)
    }

    /// Re-read `self` from the header bytes at offset 0.
    pub fn reload<F: FileLike>(&mut self, file: &mut F) -> Result<()> {
        *self = Self::load(file)?;
        Ok(())
    }

    /// Append a copy of the header at end-of-file, then rewrite the live
    /// header at offset 0.
    ///
    /// The copy goes first: if the process dies before the rewrite starts,
    /// the live header still references the previous snapshot and the copy is
    /// ignored trailing data. The rewrite itself is not torn-write safe; see
    /// the crate docs. With `sync`, the file is flushed after the append and
    /// again after the rewrite.
    pub fn commit<F: FileLike>(&self, file: &mut F, sync: bool) -> Result<()> {
        let buf = self.encode();
        let end = file.end_pos()?;
        file.write_all_at(&buf, end)?;
        if sync {
            file.fsync()?;
        }
        file.write_all_at(&buf, 0)?;
        if sync {
            file.fsync()?;
        }
        trace!(
            "header committed: copy at {end}, current_commit={}",
            self.current_commit
        );
        Ok(())
    }

    fn encode(&self) -> [u8; Self::LEN] {
        let mut buf = [0; Self::LEN];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..12].copy_from_slice(&VERSION.to_le_bytes());
        // buf[12..14] is reserved padding, left zero.
        buf[14..16].copy_from_slice(&ENDIAN_CHECK.to_le_bytes());
        buf[16..24].copy_from_slice(&self.array_size.to_le_bytes());
        buf[24..32].copy_from_slice(&self.data_start.to_le_bytes());
        buf[32..40].copy_from_slice(&self.first_commit.to_le_bytes());
        buf[40..48].copy_from_slice(&self.current_commit.to_le_bytes());
        buf[48..56].copy_from_slice(&self.aux_offset.to_le_bytes());
        buf[56..64].copy_from_slice(&self.aux_size.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8; Self::LEN]) -> Result<Self> {
        if buf[0..8] != MAGIC {
            return Err(Error::MalformedHeader("bad magic"));
        }
        if u16_at(buf, 14) != ENDIAN_CHECK {
            return Err(Error::MalformedHeader("byte order mismatch"));
        }
        if u32_at(buf, 8) != VERSION {
            return Err(Error::MalformedHeader("version mismatch"));
        }

        Ok(Self {
            array_size: u64_at(buf, 16),
            data_start: u64_at(buf, 24),
            first_commit: u64_at(buf, 32),
            current_commit: u64_at(buf, 40),
            aux_offset: u64_at(buf, 48),
            aux_size: u64_at(buf, 56),
        })
    }
}

fn u16_at(buf: &[u8], at: usize) -> u16 {
    let mut bytes = [0; 2];
    bytes.copy_from_slice(&buf[at..at + 2]);
    u16::from_le_bytes(bytes)
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

pub(crate) fn u64_at(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}
