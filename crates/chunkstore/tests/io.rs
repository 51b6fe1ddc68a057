//! End-to-end scenarios against real files.

use std::fs::{File, OpenOptions};
use std::path::Path;

use itertools::Itertools as _;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use chunkstore::{
    tests::helpers::enable_logging, Error, FileLike as _, Header, Options, Store,
};

fn open_file(path: &Path) -> File {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .unwrap()
}

fn close(store: Store<File>) {
    store.close().map_err(|(_, e)| e).unwrap();
}

/// Scenario-2 state: a 10-slot store with payloads in slots 1 and 5.
fn seed(path: &Path) {
    let store = Store::create(open_file(path), 10, Options::default()).unwrap();
    let c1 = store.chunkify(1, b"hello world".to_vec()).unwrap();
    let c5 = store.chunkify(5, b"this is a test".to_vec()).unwrap();
    store.commit_all().unwrap();
    drop((c1, c5));
    close(store);
}

#[test]
fn create_empty() {
    enable_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.chunk");

    let store = Store::create(open_file(&path), 10, Options::default()).unwrap();
    store.commit_all().unwrap();
    close(store);

    let store = Store::open(open_file(&path), Options::default()).unwrap();
    assert_eq!(store.slots(), 10);
    for slot in 0..10 {
        assert_eq!(store.chunk_size(slot).unwrap(), 0);
    }
}

#[test]
fn write_read() {
    enable_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.chunk");
    seed(&path);

    let store = Store::open(open_file(&path), Options::default()).unwrap();

    let buf = store.allocate_chunk_buffer(1).unwrap();
    let c1 = store.open_chunk(1, buf).unwrap();
    assert_eq!(&*c1.bytes(), b"hello world");
    drop(c1);

    let buf = store.allocate_chunk_buffer(5).unwrap();
    let c5 = store.open_chunk(5, buf).unwrap();
    assert_eq!(&*c5.bytes(), b"this is a test");
}

#[test]
fn replace_grow() {
    enable_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.chunk");
    seed(&path);

    let store = Store::open(open_file(&path), Options::default()).unwrap();
    let c1 = store.chunkify(1, b"a change".to_vec()).unwrap();
    let c4 = store
        .chunkify(4, b"a really really really big change!".to_vec())
        .unwrap();
    store.commit_all().unwrap();
    drop((c1, c4));
    close(store);

    let store = Store::open(open_file(&path), Options::default()).unwrap();
    assert_eq!(&*store.load_chunk(1).unwrap().bytes(), b"a change");
    assert_eq!(
        &*store.load_chunk(4).unwrap().bytes(),
        b"a really really really big change!"
    );
    // Slot 5 is untouched by the second session.
    assert_eq!(&*store.load_chunk(5).unwrap().bytes(), b"this is a test");
}

#[test]
fn resize_and_fill() {
    enable_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.chunk");
    seed(&path);

    let store = Store::open(open_file(&path), Options::default()).unwrap();
    store.resize(20).unwrap();
    for i in 0..20u64 {
        let mut chunk = store
            .chunkify(i as usize, (0xaddeffffffff0000 + i).to_le_bytes().to_vec())
            .unwrap();
        chunk.commit().unwrap();
        drop(chunk);
        if (i + 1) % 5 == 0 {
            store.commit().unwrap();
        }
    }
    close(store);

    let store = Store::open(open_file(&path), Options::default()).unwrap();
    assert_eq!(store.slots(), 20);
    let want = (0..20).map(|i| 0xaddeffffffff0000u64 + i).collect_vec();
    for (slot, want) in want.iter().enumerate() {
        let chunk = store.load_chunk(slot).unwrap();
        assert_eq!(&*chunk.bytes(), &want.to_le_bytes());
    }
}

#[test]
fn open_chunks_guard() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("guard.chunk");

    let store = Store::create(open_file(&path), 4, Options::default()).unwrap();
    let chunk = store.chunkify(0, b"x".to_vec()).unwrap();

    let store = match store.destroy() {
        Err((store, Error::OpenChunks { refs: 1 })) => store,
        Ok(()) => panic!("destroy succeeded with a live chunk"),
        Err((_, other)) => panic!("expected open chunks, got {other:?}"),
    };

    drop(chunk);
    store.destroy().map_err(|(_, e)| e).unwrap();
}

#[test]
fn corruption_detect() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("junk.chunk");
    std::fs::write(&path, [0x4a; 64]).unwrap();

    match Store::open(open_file(&path), Options::default()) {
        Err(Error::MalformedHeader(_)) => {}
        other => panic!("expected malformed header, got {:?}", other.err()),
    }
}

/// Walking the entry-0 back-links from the current snapshot visits every
/// snapshot ever committed, ending at `first_commit`. Each back-link records
/// the offset and width of its predecessor, so the walk stays intact across
/// a resize that changes the snapshot width.
#[test]
fn snapshots_chain_to_the_first_commit() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chain.chunk");

    let store = Store::create(open_file(&path), 4, Options::default()).unwrap();
    for i in 0..3 {
        let mut chunk = store.chunkify(i, vec![i as u8; 9]).unwrap();
        chunk.commit().unwrap();
        drop(chunk);
        store.commit().unwrap();
    }
    store.resize(6).unwrap();
    store.commit().unwrap();
    store.destroy().map_err(|(_, e)| e).unwrap();

    let mut file = open_file(&path);
    let header = Header::load(&mut file).unwrap();

    // Creation commits the initial snapshot, the loop adds three more at the
    // 4-slot width, and the resize adds a final 6-slot one.
    let mut visited = vec![header.current_commit];
    loop {
        let mut entry = [0; 16];
        file.read_exact_at(&mut entry, *visited.last().unwrap()).unwrap();
        let prev = u64::from_le_bytes(entry[..8].try_into().unwrap());
        let len = u64::from_le_bytes(entry[8..].try_into().unwrap());
        if prev == 0 {
            assert_eq!(len, 0, "the first snapshot has no predecessor");
            break;
        }
        assert_eq!(len, 5 * 16, "back-links record the predecessor's width");
        visited.push(prev);
    }

    assert_eq!(visited.len(), 5);
    assert_eq!(*visited.last().unwrap(), header.first_commit);
    assert!(
        visited.windows(2).all(|w| w[0] > w[1]),
        "snapshots chain strictly backwards: {visited:?}"
    );
}
