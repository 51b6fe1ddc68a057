use std::{
    cell::{Ref, RefCell, RefMut},
    mem,
    rc::{Rc, Weak},
};

use log::debug;

use crate::{
    error::{Error, Result},
    file::FileLike,
    store::StoreInner,
};

pub(crate) type SharedBuf = Rc<RefCell<Vec<u8>>>;

/// A live handle to one slot's payload.
///
/// Handles are produced by the [`Store`](crate::Store) chunk constructors and
/// tracked in the store's live table until released. Dropping the handle
/// releases it; [`Chunk::into_buffer`] releases it and hands the payload
/// buffer back to the caller.
///
/// A handle holds a weak reference to its store. After
/// [`Store::destroy_unsafe`](crate::Store::destroy_unsafe) the handle is
/// detached: the payload stays readable, but [`Chunk::commit`] and
/// [`Chunk::replace`] fail with [`Error::NoFile`].
pub struct Chunk<F: FileLike> {
    pub(crate) store: Weak<RefCell<StoreInner<F>>>,
    pub(crate) slot: usize,
    pub(crate) buf: SharedBuf,
}

impl<F: FileLike> Chunk<F> {
    /// The slot this chunk is bound to.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.buf.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared view of the payload.
    pub fn bytes(&self) -> Ref<'_, [u8]> {
        Ref::map(self.buf.borrow(), |buf| buf.as_slice())
    }

    /// Exclusive view of the payload.
    ///
    /// The view is a fixed-length slice; [`Chunk::replace`] is the only way
    /// to change a chunk's size. Release the view before committing through
    /// the store, which needs to read the buffer.
    pub fn bytes_mut(&mut self) -> RefMut<'_, [u8]> {
        RefMut::map(self.buf.borrow_mut(), |buf| buf.as_mut_slice())
    }

    /// Swap the payload for `new_buf`, returning the old payload.
    ///
    /// The slot's index entry length becomes `new_buf.len()` immediately; the
    /// new bytes reach the file on the next [`Chunk::commit`]. The chunk
    /// owns `new_buf` from here on, however its previous buffer was obtained.
    pub fn replace(&mut self, new_buf: Vec<u8>) -> Result<Vec<u8>> {
        let inner = self.store.upgrade().ok_or(Error::NoFile)?;
        let mut inner = inner.borrow_mut();
        inner.array.elem(self.slot)?.len = new_buf.len() as u64;
        drop(inner);

        Ok(mem::replace(&mut *self.buf.borrow_mut(), new_buf))
    }

    /// Append the payload at end-of-file and record its new location in the
    /// slot's index entry.
    ///
    /// The entry is updated only after the whole buffer was written; the
    /// index itself reaches the file on the next store commit.
    pub fn commit(&mut self) -> Result<()> {
        let inner = self.store.upgrade().ok_or(Error::NoFile)?;
        let mut inner = inner.borrow_mut();
        let buf = self.buf.borrow();

        let end = inner.file.end_pos()?;
        inner.file.write_all_at(&buf, end)?;
        if inner.opts.fsync {
            inner.file.fsync()?;
        }

        let entry = inner.array.elem(self.slot)?;
        entry.offset = end;
        entry.len = buf.len() as u64;
        debug!("chunk {} committed: {} bytes at {end}", self.slot, buf.len());
        Ok(())
    }

    /// Release the handle and return the payload buffer.
    pub fn into_buffer(mut self) -> Vec<u8> {
        self.detach();
        mem::take(&mut *self.buf.borrow_mut())
    }

    fn detach(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            let mut inner = inner.borrow_mut();
            let held = inner
                .live
                .get(self.slot)
                .and_then(|live| live.as_ref())
                .is_some_and(|live| Rc::ptr_eq(&live.buf, &self.buf));
            if held {
                inner.live[self.slot] = None;
                inner.refs -= 1;
            }
        }
        self.store = Weak::new();
    }
}

impl<F: FileLike> Drop for Chunk<F> {
    fn drop(&mut self) {
        self.detach();
    }
}
