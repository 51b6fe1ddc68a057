//! An append-only, single-file object store with versioned commits.
//!
//! A store file is a fixed 64-byte [`Header`] followed by an append-only log
//! of records: chunk payloads, index snapshots, and header copies, in
//! whatever order they were committed. The header is the only region ever
//! rewritten in place; it points at the most recent index snapshot, and each
//! snapshot back-links to its predecessor, so the file keeps a linked history
//! of every commit.
//!
//! An index snapshot is `N + 1` entries of 16 bytes each, where `N` is the
//! number of chunk slots. Entry 0 is the back-link; entries `1..=N` hold the
//! `(offset, length)` of each slot's payload, with a zero length marking a
//! slot that has never been written.
//!
//! Mutations happen through [`Chunk`] handles obtained from a [`Store`]:
//! committing a chunk appends its payload and updates the in-memory index;
//! committing the store appends an index snapshot and rewrites the header to
//! reference it. Until the store commits, the on-disk index still describes
//! the previous state, and the appended payloads are unreachable trailing
//! bytes.
//!
//! The engine is single-threaded and synchronous: no internal locks, no
//! retries, and no cross-process coordination. Opening the same file through
//! more than one [`Store`] at a time is not supported, since each maintains
//! its own append position via end-of-file queries.
//!
//! Rewriting the header is not torn-write safe: a crash mid-rewrite can
//! leave the live header corrupt, recoverable only from one of the appended
//! header copies. The append-then-rewrite order guarantees the narrower
//! property that a crash *before* the rewrite leaves the previous commit
//! fully intact.

mod array;
mod chunk;
mod header;
mod store;

pub mod error;
pub mod file;

#[cfg(any(test, feature = "test"))]
pub mod tests;

pub use crate::{
    array::{Array, Entry, ENTRY_LEN},
    chunk::Chunk,
    error::{Error, Result},
    file::FileLike,
    header::{Header, ENDIAN_CHECK, MAGIC, VERSION},
    store::Store,
};

/// [`Store`] options.
#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    /// Flush the backing file at each commit-ordering barrier:
    /// payload-append, index-append, header-append, header-rewrite.
    ///
    /// Off by default, leaving durability to the operating system. Without
    /// it, the commit ordering still holds against process crashes, but not
    /// against power loss.
    pub fsync: bool,
}
