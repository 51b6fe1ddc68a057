use std::io;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error type of every fallible chunkstore operation.
///
/// Errors surface to the immediate caller; no operation retries internally.
/// A failed commit leaves the in-memory state at its pre-commit values, and
/// any bytes it may have appended to the file are ignored on the next open.
#[derive(Debug, Error)]
pub enum Error {
    #[error("short read: wanted {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("short write: wanted {expected} bytes, wrote {actual}")]
    ShortWrite { expected: usize, actual: usize },

    #[error("slot {slot} out of bounds for an array of {slots} slots")]
    OutOfBounds { slot: usize, slots: usize },

    #[error("buffer of {got} bytes cannot hold a {need}-byte payload")]
    BufferTooSmall { need: usize, got: usize },

    #[error("cannot shrink the index array from {current} to {requested} slots")]
    TooSmall { current: usize, requested: usize },

    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),

    #[error("{refs} chunk handle(s) still live")]
    OpenChunks { refs: usize },

    #[error("chunk is not bound to a store")]
    NoFile,

    #[error("slot {slot} is already held by a live chunk")]
    SlotOccupied { slot: usize },

    #[error("failed to allocate {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}
