use std::{cell::RefCell, rc::Rc};

use log::{debug, warn};

use crate::{
    array::{Array, Entry},
    chunk::{Chunk, SharedBuf},
    error::{Error, Result},
    file::{alloc_bytes, FileLike},
    header::Header,
    Options,
};

pub(crate) struct LiveChunk {
    pub(crate) buf: SharedBuf,
}

pub(crate) struct StoreInner<F: FileLike> {
    pub(crate) file: F,
    pub(crate) header: Header,
    pub(crate) array: Array,
    pub(crate) live: Vec<Option<LiveChunk>>,
    pub(crate) refs: usize,
    pub(crate) opts: Options,
}

/// The store orchestrator.
///
/// Owns the backing file, the header, the index array, and a table of the
/// currently live chunk handles. All chunks are produced here; each live
/// chunk occupies its slot until released, and [`Store::destroy`] refuses to
/// tear the store down while any handle is outstanding.
pub struct Store<F: FileLike> {
    inner: Rc<RefCell<StoreInner<F>>>,
}

impl<F: FileLike> Store<F> {
    /// Initialize a fresh store with `slots` chunk slots in `file`.
    ///
    /// Writes the header, the initial all-zero index snapshot, and the header
    /// again so the live header references the snapshot. `file` should be
    /// empty.
    pub fn create(mut file: F, slots: usize, opts: Options) -> Result<Self> {
        let mut header = Header::new(slots as u64);
        header.commit(&mut file, opts.fsync)?;
        let mut array = Array::new(&header)?;
        array.commit(&mut header, &mut file)?;
        if opts.fsync {
            file.fsync()?;
        }
        header.commit(&mut file, opts.fsync)?;
        debug!(
            "store created: {slots} slots, first snapshot at {}",
            header.first_commit
        );

        Ok(Self::from_parts(file, header, array, opts))
    }

    /// Open an existing store from `file`.
    ///
    /// Validates the header and loads the index snapshot it references.
    /// Payloads are read on demand by the chunk constructors.
    pub fn open(mut file: F, opts: Options) -> Result<Self> {
        let header = Header::load(&mut file)?;
        let array = Array::load(&header, &mut file)?;
        debug!(
            "store opened: {} slots, current snapshot at {}",
            array.slots(),
            header.current_commit
        );

        Ok(Self::from_parts(file, header, array, opts))
    }

    fn from_parts(file: F, header: Header, array: Array, opts: Options) -> Self {
        let live = std::iter::repeat_with(|| None).take(array.slots()).collect();
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                file,
                header,
                array,
                live,
                refs: 0,
                opts,
            })),
        }
    }

    /// Number of chunk slots.
    pub fn slots(&self) -> usize {
        self.inner.borrow().array.slots()
    }

    /// Number of live chunk handles.
    pub fn refs(&self) -> usize {
        self.inner.borrow().refs
    }

    /// Copy of the index entry for `slot`.
    pub fn entry(&self, slot: usize) -> Result<Entry> {
        self.inner.borrow().array.get(slot)
    }

    /// Committed payload length of `slot`.
    pub fn chunk_size(&self, slot: usize) -> Result<u64> {
        Ok(self.entry(slot)?.len)
    }

    /// A zeroed buffer sized to hold the payload of `slot`, for use with
    /// [`Store::open_chunk`].
    pub fn allocate_chunk_buffer(&self, slot: usize) -> Result<Vec<u8>> {
        alloc_bytes(self.entry(slot)?.len as usize)
    }

    /// The auxiliary header fields `(offset, size)`.
    pub fn aux(&self) -> (u64, u64) {
        let inner = self.inner.borrow();
        (inner.header.aux_offset, inner.header.aux_size)
    }

    /// Set the auxiliary header fields; persisted by the next commit and
    /// carried across all subsequent commits.
    pub fn set_aux(&self, offset: u64, size: u64) {
        let mut inner = self.inner.borrow_mut();
        inner.header.aux_offset = offset;
        inner.header.aux_size = size;
    }

    /// Grow the index array to `new_slots` slots.
    ///
    /// Existing slots keep their entries and live chunks; new slots read as
    /// empty. Shrinking fails with [`Error::TooSmall`], growing to the
    /// current size is a no-op.
    pub fn resize(&self, new_slots: usize) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let StoreInner { header, array, live, .. } = &mut *inner;
        array.resize(header, new_slots)?;
        if live.len() < new_slots {
            live.resize_with(new_slots, || None);
        }
        Ok(())
    }

    /// A new chunk for `slot` with a zeroed, store-allocated buffer of
    /// `size` bytes. The slot's entry length becomes `size`.
    pub fn new_chunk(&self, slot: usize, size: usize) -> Result<Chunk<F>> {
        let mut inner = self.inner.borrow_mut();
        inner.array.get(slot)?;
        ensure_free(&inner, slot)?;
        let buf = alloc_bytes(size)?;
        self.install(&mut inner, slot, buf, true)
    }

    /// A new chunk for `slot` wrapping the caller-supplied `buf`. The slot's
    /// entry length becomes `buf.len()`.
    pub fn chunkify(&self, slot: usize, buf: Vec<u8>) -> Result<Chunk<F>> {
        let mut inner = self.inner.borrow_mut();
        inner.array.get(slot)?;
        ensure_free(&inner, slot)?;
        self.install(&mut inner, slot, buf, true)
    }

    /// Load the committed payload of `slot` into a store-allocated buffer.
    pub fn load_chunk(&self, slot: usize) -> Result<Chunk<F>> {
        let mut inner = self.inner.borrow_mut();
        let entry = inner.array.get(slot)?;
        ensure_free(&inner, slot)?;
        let mut buf = alloc_bytes(entry.len as usize)?;
        if entry.len > 0 {
            inner.file.read_exact_at(&mut buf, entry.offset)?;
        }
        self.install(&mut inner, slot, buf, false)
    }

    /// Load the committed payload of `slot` into the caller-supplied `buf`.
    ///
    /// Fails with [`Error::BufferTooSmall`] if `buf` is shorter than the
    /// payload; a longer `buf` is truncated to the payload length.
    pub fn open_chunk(&self, slot: usize, mut buf: Vec<u8>) -> Result<Chunk<F>> {
        let mut inner = self.inner.borrow_mut();
        let entry = inner.array.get(slot)?;
        ensure_free(&inner, slot)?;
        let need = entry.len as usize;
        if buf.len() < need {
            return Err(Error::BufferTooSmall { need, got: buf.len() });
        }
        buf.truncate(need);
        if need > 0 {
            inner.file.read_exact_at(&mut buf, entry.offset)?;
        }
        self.install(&mut inner, slot, buf, false)
    }

    fn install(
        &self,
        inner: &mut StoreInner<F>,
        slot: usize,
        buf: Vec<u8>,
        bind_len: bool,
    ) -> Result<Chunk<F>> {
        if bind_len {
            inner.array.elem(slot)?.len = buf.len() as u64;
        }
        let buf = Rc::new(RefCell::new(buf));
        inner.live[slot] = Some(LiveChunk { buf: Rc::clone(&buf) });
        inner.refs += 1;
        Ok(Chunk {
            store: Rc::downgrade(&self.inner),
            slot,
            buf,
        })
    }

    /// Commit the index snapshot, then the header.
    pub fn commit(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let StoreInner { file, header, array, opts, .. } = &mut *inner;
        array.commit(header, file)?;
        if opts.fsync {
            file.fsync()?;
        }
        header.commit(file, opts.fsync)?;
        Ok(())
    }

    /// Append every live chunk's payload and update its index entry.
    ///
    /// The index itself reaches the file on the next [`Store::commit`].
    pub fn commit_chunks(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let StoreInner { file, array, live, opts, .. } = &mut *inner;
        for (slot, chunk) in live.iter().enumerate() {
            let Some(chunk) = chunk else { continue };
            let buf = chunk.buf.borrow();
            let end = file.end_pos()?;
            file.write_all_at(&buf, end)?;
            if opts.fsync {
                file.fsync()?;
            }
            let entry = array.elem(slot)?;
            entry.offset = end;
            entry.len = buf.len() as u64;
            debug!("chunk {slot} committed: {} bytes at {end}", buf.len());
        }
        Ok(())
    }

    /// Commit every live chunk, then the index and header.
    pub fn commit_all(&self) -> Result<()> {
        self.commit_chunks()?;
        self.commit()
    }

    /// Tear the store down.
    ///
    /// Refuses with [`Error::OpenChunks`] while chunk handles are
    /// outstanding, handing the store back so the caller can release them
    /// and retry.
    pub fn destroy(self) -> Result<(), (Self, Error)> {
        let refs = self.refs();
        if refs > 0 {
            return Err((self, Error::OpenChunks { refs }));
        }
        Ok(())
    }

    /// Tear the store down regardless of outstanding chunk handles.
    ///
    /// Outstanding handles are detached: their payloads stay readable, but
    /// committing through them fails with [`Error::NoFile`]. Meant for
    /// read-only sessions where chunks are released independently.
    pub fn destroy_unsafe(self) {
        let refs = self.refs();
        if refs > 0 {
            warn!("store destroyed with {refs} live chunk handle(s)");
        }
    }

    /// Commit the index and header, then tear the store down.
    pub fn close(self) -> Result<(), (Self, Error)> {
        if let Err(e) = self.commit() {
            return Err((self, e));
        }
        self.destroy()
    }
}

fn ensure_free<F: FileLike>(inner: &StoreInner<F>, slot: usize) -> Result<()> {
    if inner.live[slot].is_some() {
        return Err(Error::SlotOccupied { slot });
    }
    Ok(())
}
