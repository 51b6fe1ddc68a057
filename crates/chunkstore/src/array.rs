use log::debug;

use crate::{
    error::{Error, Result},
    file::{alloc_bytes, FileLike},
    header::{u64_at, Header},
};

/// Width in bytes of one serialized index entry.
pub const ENTRY_LEN: usize = 16;

/// One index entry: where some bytes live in the file.
///
/// For entries 1..=N of a snapshot this locates a slot's payload; `len == 0`
/// means the slot has never had a committed payload. Entry 0 is the
/// back-link to the previous snapshot.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Entry {
    pub offset: u64,
    pub len: u64,
}

/// The in-memory index array.
///
/// Holds `N + 1` entries, where `N` is the number of chunk slots: entry 0 is
/// reserved, entries `1..=N` belong to slots `0..N`. Committing appends a
/// full snapshot of the entries to the file.
#[derive(Debug)]
pub struct Array {
    entries: Vec<Entry>,
    /// Offset and byte length of the snapshot this array was last committed
    /// to (or loaded from); zero if it has never been on disk. The length is
    /// the width that snapshot had when written, which a later resize does
    /// not change.
    last: Entry,
}

impl Array {
    /// A zeroed array sized per `header.array_size`. No I/O.
    pub fn new(header: &Header) -> Result<Self> {
        let entries = alloc_entries(header.array_size as usize + 1)?;
        Ok(Self {
            entries,
            last: Entry::default(),
        })
    }

    /// Read the current snapshot from `header.current_commit`.
    pub fn load<F: FileLike>(header: &Header, file: &mut F) -> Result<Self> {
        let n = header.array_size as usize;
        let mut buf = alloc_bytes((n + 1) * ENTRY_LEN)?;
        file.read_exact_at(&mut buf, header.current_commit)?;

        let mut entries = alloc_entries(n + 1)?;
        for (entry, raw) in entries.iter_mut().zip(buf.chunks_exact(ENTRY_LEN)) {
            entry.offset = u64_at(raw, 0);
            entry.len = u64_at(raw, 8);
        }

        Ok(Self {
            entries,
            last: Entry {
                offset: header.current_commit,
                len: ((n + 1) * ENTRY_LEN) as u64,
            },
        })
    }

    /// Number of chunk slots.
    pub fn slots(&self) -> usize {
        self.entries.len() - 1
    }

    /// Byte length of one serialized snapshot of this array.
    pub fn byte_len(&self) -> u64 {
        (self.entries.len() * ENTRY_LEN) as u64
    }

    /// File offset of the last committed snapshot; 0 if never committed.
    pub fn pos(&self) -> u64 {
        self.last.offset
    }

    /// Grow the array to `new_slots` slots.
    ///
    /// Existing entries keep their values, the tail reads as zero, and
    /// `header.array_size` is updated so the next committed snapshot has the
    /// new width. Shrinking fails, growing to the current size is a no-op.
    pub fn resize(&mut self, header: &mut Header, new_slots: usize) -> Result<()> {
        let slots = self.slots();
        if new_slots < slots {
            return Err(Error::TooSmall {
                current: slots,
                requested: new_slots,
            });
        }
        if new_slots == slots {
            return Ok(());
        }

        let mut entries = alloc_entries(new_slots + 1)?;
        entries[..self.entries.len()].copy_from_slice(&self.entries);
        self.entries = entries;
        header.array_size = new_slots as u64;
        debug!("index array resized: {slots} -> {new_slots} slots");
        Ok(())
    }

    /// Append a snapshot of the array at end-of-file and point the header at
    /// it.
    ///
    /// Entry 0 of the appended snapshot holds the offset and byte length of
    /// the *previous* snapshot (both zero for the first commit), so the
    /// snapshots in a file form a chain from `header.current_commit` back to
    /// `header.first_commit`. The recorded length is the width the previous
    /// snapshot was written with, which may differ from the current width
    /// after a resize. In-memory state advances only after the append
    /// succeeded; a failed commit leaves array and header at their pre-commit
    /// values.
    pub fn commit<F: FileLike>(&mut self, header: &mut Header, file: &mut F) -> Result<()> {
        let end = file.end_pos()?;
        let backlink = self.last;

        let mut buf = alloc_bytes(self.entries.len() * ENTRY_LEN)?;
        let entries = std::iter::once(&backlink).chain(self.entries.iter().skip(1));
        for (raw, entry) in buf.chunks_exact_mut(ENTRY_LEN).zip(entries) {
            raw[..8].copy_from_slice(&entry.offset.to_le_bytes());
            raw[8..].copy_from_slice(&entry.len.to_le_bytes());
        }
        file.write_all_at(&buf, end)?;

        self.entries[0] = backlink;
        header.current_commit = end;
        if header.first_commit == 0 {
            header.first_commit = end;
        }
        self.last = Entry {
            offset: end,
            len: self.byte_len(),
        };
        debug!(
            "index snapshot committed at {end} ({} entries)",
            self.entries.len()
        );
        Ok(())
    }

    /// Mutable access to the entry for `slot`.
    pub fn elem(&mut self, slot: usize) -> Result<&mut Entry> {
        let slots = self.slots();
        if slot >= slots {
            return Err(Error::OutOfBounds { slot, slots });
        }
        Ok(&mut self.entries[slot + 1])
    }

    /// Copy of the entry for `slot`.
    pub fn get(&self, slot: usize) -> Result<Entry> {
        let slots = self.slots();
        if slot >= slots {
            return Err(Error::OutOfBounds { slot, slots });
        }
        Ok(self.entries[slot + 1])
    }
}

fn alloc_entries(n: usize) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    entries
        .try_reserve_exact(n)
        .map_err(|_| Error::OutOfMemory { bytes: n * ENTRY_LEN })?;
    entries.resize(n, Entry::default());
    Ok(entries)
}
