use crate::{file::mem::Mem, Options, Store};

/// A fresh store with `slots` slots backed by shared memory.
///
/// The returned [`Mem`] shares its bytes with the store, so the test can
/// reopen from it after the store is gone, or corrupt it in between.
pub fn mem_store(slots: usize) -> (Mem, Store<Mem>) {
    let file = Mem::new();
    let store = Store::create(file.clone(), slots, Options::default()).unwrap();
    (file, store)
}

pub fn enable_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .format_timestamp(None)
        .is_test(true)
        .try_init();
}
