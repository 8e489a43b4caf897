//! End-to-end coverage of the composite-path facade: round trips through
//! real files in a scratch directory, session batching, transactions, and
//! failure atomicity.

use std::fs;
use std::io::{Read, SeekFrom, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arcfs::handler::zip::ZipHandler;
use arcfs::handler::{ArchiveHandler, Capabilities, EntryReader, ReadSeek, ReopenFn, WriteSeek};
use arcfs::{ArchiveFs, Config, Entry, EntryKind, EntryStore, Error, HandlerFactory, Result};

fn scratch() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}

fn p(dir: &tempfile::TempDir, rest: &str) -> String {
    format!("{}/{}", dir.path().display(), rest)
}

// ── Concrete scenarios ────────────────────────────────────────────────────────

#[test]
fn zip_write_then_list_and_read() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let zip = p(&dir, "x.zip");

    fs.write(&format!("{zip}/a/b.txt"), b"hi").unwrap();
    assert!(fs::metadata(dir.path().join("x.zip")).unwrap().len() > 0);

    // A fresh instance proves the bytes landed on disk.
    let fresh = ArchiveFs::new();
    assert_eq!(fresh.list_dir(&zip).unwrap(), vec!["a"]);
    assert_eq!(fresh.read_to_string(&format!("{zip}/a/b.txt")).unwrap(), "hi");
}

#[test]
fn tar_gz_three_entries_walk() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let tgz = p(&dir, "x.tar.gz");

    let mut s = fs.batch_session();
    for name in ["f0", "f1", "f2"] {
        s.write(&format!("{tgz}/{name}"), b"0123456789").unwrap();
    }
    s.commit().unwrap();

    assert!(fs::metadata(dir.path().join("x.tar.gz")).unwrap().len() > 0);
    let frames = fs.walk(&tgz).unwrap();
    assert_eq!(
        frames,
        vec![(tgz.clone(), vec![], vec!["f0".into(), "f1".into(), "f2".into()])]
    );
}

#[test]
fn nested_zip_tar_gz_round_trip() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let deep = p(&dir, "outer.zip/inner.tar.gz/deep.txt");

    fs.write(&deep, b"D").unwrap();

    let fresh = ArchiveFs::new();
    assert_eq!(fresh.read(&deep).unwrap(), b"D");
    assert_eq!(
        fresh.list_dir(&p(&dir, "outer.zip")).unwrap(),
        vec!["inner.tar.gz"]
    );
}

#[test]
fn batch_session_rebuilds_once() {
    let dir = scratch();
    let zip = p(&dir, "b.zip");
    ArchiveFs::new().create_archive(&zip, None).unwrap();

    let serializes = Arc::new(AtomicUsize::new(0));
    let mut fs = ArchiveFs::new();
    fs.set_archive_handler("zip", counting_zip_factory(serializes.clone()));

    let mut s = fs.batch_session();
    for i in 0..5 {
        s.write(&format!("{zip}/file{i}.txt"), b"payload").unwrap();
    }
    s.commit().unwrap();

    assert_eq!(serializes.load(Ordering::SeqCst), 1);
    assert_eq!(ArchiveFs::new().list_dir(&zip).unwrap().len(), 5);
}

#[test]
fn transaction_failure_leaves_targets_untouched() {
    let dir = scratch();
    let plain = ArchiveFs::new();
    let a = p(&dir, "a.zip");
    let b = p(&dir, "b.zip");
    plain.write(&format!("{a}/keep.txt"), b"A").unwrap();
    plain.write(&format!("{b}/keep.txt"), b"B").unwrap();
    let a_before = fs::read(dir.path().join("a.zip")).unwrap();
    let b_before = fs::read(dir.path().join("b.zip")).unwrap();

    let mut fs = ArchiveFs::new();
    fs.set_archive_handler("zip", failing_zip_factory());
    let mut txn = fs.transaction(&[a.as_str(), b.as_str()]).unwrap();
    txn.write(&format!("{a}/ok.txt"), b"fine").unwrap();
    txn.write(&format!("{b}/boom.txt"), b"bad").unwrap();
    assert!(txn.commit().is_err());

    assert_eq!(fs::read(dir.path().join("a.zip")).unwrap(), a_before);
    assert_eq!(fs::read(dir.path().join("b.zip")).unwrap(), b_before);
}

#[test]
fn transaction_commits_all_targets() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let a = p(&dir, "a.zip");
    let b = p(&dir, "b.tar");

    let mut txn = fs.transaction(&[a.as_str(), b.as_str()]).unwrap();
    txn.write(&format!("{a}/one.txt"), b"1").unwrap();
    txn.write(&format!("{b}/two.txt"), b"2").unwrap();
    txn.commit().unwrap();

    assert_eq!(fs.read(&format!("{a}/one.txt")).unwrap(), b"1");
    assert_eq!(fs.read(&format!("{b}/two.txt")).unwrap(), b"2");
}

#[test]
fn codec_single_gzip() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let gz = p(&dir, "note.txt.gz");
    let content = "Z".repeat(1000);

    fs.write_str(&format!("{gz}/note.txt"), &content).unwrap();
    assert_eq!(fs.list_dir(&gz).unwrap(), vec!["note.txt"]);
    assert_eq!(
        fs.read_to_string(&format!("{gz}/note.txt")).unwrap(),
        content
    );
}

// ── Invariants ────────────────────────────────────────────────────────────────

#[test]
fn read_your_writes_before_commit() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let zip = p(&dir, "x.zip");

    let mut s = fs.batch_session();
    s.write(&format!("{zip}/f.txt"), b"staged").unwrap();
    assert_eq!(s.read(&format!("{zip}/f.txt")).unwrap(), b"staged");
    assert!(s.exists(&format!("{zip}/f.txt")));
    // Nothing on disk until commit.
    assert!(!dir.path().join("x.zip").exists());
    s.commit().unwrap();
    assert!(dir.path().join("x.zip").exists());
}

#[test]
fn insertion_order_preserved_across_reopen() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let tar = p(&dir, "ordered.tar");

    let mut s = fs.batch_session();
    for name in ["zeta", "alpha", "mid"] {
        s.write(&format!("{tar}/{name}"), name.as_bytes()).unwrap();
    }
    s.commit().unwrap();

    assert_eq!(
        ArchiveFs::new().list_dir(&tar).unwrap(),
        vec!["zeta", "alpha", "mid"]
    );
}

#[test]
fn mkdir_idempotent_with_parents() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let d = p(&dir, "x.zip/a/b");

    fs.mkdir(&d, true).unwrap();
    fs.mkdir(&d, true).unwrap();
    assert_eq!(fs.list_dir(&p(&dir, "x.zip/a")).unwrap(), vec!["b"]);

    // Without the flag the second call reports the collision.
    assert!(matches!(fs.mkdir(&d, false), Err(Error::AlreadyExists(_))));
}

#[test]
fn normalization_resolves_same_entry() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let zip = p(&dir, "x.zip");

    fs.write(&format!("{zip}/a/b/c"), b"norm").unwrap();
    assert_eq!(fs.read(&format!("{zip}//a/./b//c")).unwrap(), b"norm");
    assert!(matches!(
        fs.read(&format!("{zip}/a/../b")),
        Err(Error::InvalidPath { .. })
    ));
}

#[test]
fn failed_rebuild_preserves_original() {
    let dir = scratch();
    let zip = p(&dir, "b.zip");
    ArchiveFs::new()
        .write(&format!("{zip}/keep.txt"), b"precious")
        .unwrap();
    let before = fs::read(dir.path().join("b.zip")).unwrap();

    let mut fs = ArchiveFs::new();
    fs.set_archive_handler("zip", failing_zip_factory());
    assert!(fs.write(&format!("{zip}/boom.txt"), b"x").is_err());

    assert_eq!(fs::read(dir.path().join("b.zip")).unwrap(), before);
}

#[test]
fn tombstone_invisible_before_commit() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let zip = p(&dir, "x.zip");
    fs.write(&format!("{zip}/a.txt"), b"1").unwrap();
    fs.write(&format!("{zip}/b.txt"), b"2").unwrap();

    let mut s = fs.batch_session();
    s.remove(&format!("{zip}/a.txt")).unwrap();
    assert!(!s.exists(&format!("{zip}/a.txt")));
    assert_eq!(s.list_dir(&zip).unwrap(), vec!["b.txt"]);
    s.commit().unwrap();

    assert!(!fs.exists(&format!("{zip}/a.txt")));
    assert_eq!(ArchiveFs::new().list_dir(&zip).unwrap(), vec!["b.txt"]);
}

#[test]
fn nesting_depth_eight() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let mut path = dir.path().display().to_string();
    for i in 1..=8 {
        path.push_str(&format!("/n{i}.zip"));
    }
    path.push_str("/leaf.txt");

    fs.write(&path, b"deep payload").unwrap();
    assert_eq!(ArchiveFs::new().read(&path).unwrap(), b"deep payload");
}

// ── Operations across boundaries ──────────────────────────────────────────────

#[test]
fn append_goes_through_the_overlay() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let f = p(&dir, "log.tar.gz/app.log");

    fs.write(&f, b"one\n").unwrap();
    fs.append(&f, b"two\n").unwrap();
    assert_eq!(fs.read(&f).unwrap(), b"one\ntwo\n");

    // Appending to a missing entry behaves like a plain write.
    let g = p(&dir, "log.tar.gz/new.log");
    fs.append(&g, b"first\n").unwrap();
    assert_eq!(fs.read(&g).unwrap(), b"first\n");
}

#[test]
fn copy_and_rename_across_formats() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let src = p(&dir, "a.zip/data.txt");
    let dst = p(&dir, "b.tar.gz/moved/data.txt");

    fs.write(&src, b"cargo").unwrap();
    fs.copy(&src, &dst).unwrap();
    assert_eq!(fs.read(&dst).unwrap(), b"cargo");
    assert_eq!(fs.read(&src).unwrap(), b"cargo");

    let dst2 = p(&dir, "c.tar/final.txt");
    fs.rename(&dst, &dst2).unwrap();
    assert_eq!(fs.read(&dst2).unwrap(), b"cargo");
    assert!(!fs.exists(&dst));
}

#[test]
fn kind_mismatches_and_missing_paths() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let zip = p(&dir, "x.zip");
    fs.write(&format!("{zip}/d/f.txt"), b"x").unwrap();

    assert!(matches!(
        fs.remove(&format!("{zip}/d")),
        Err(Error::IsADirectory(_))
    ));
    assert!(matches!(
        fs.read(&format!("{zip}/d")),
        Err(Error::IsADirectory(_))
    ));
    assert!(matches!(
        fs.list_dir(&format!("{zip}/d/f.txt")),
        Err(Error::NotADirectory(_))
    ));
    assert!(matches!(
        fs.read(&format!("{zip}/missing.txt")),
        Err(Error::NotFound(_))
    ));

    // exists never errors, even on malformed or absent paths.
    assert!(!fs.exists(&p(&dir, "no/such/archive.zip/x")));
    assert!(!fs.exists("bad/../path"));
}

#[test]
fn rmdir_refuses_non_empty_unless_recursive() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let zip = p(&dir, "x.zip");
    fs.write(&format!("{zip}/d/one.txt"), b"1").unwrap();
    fs.write(&format!("{zip}/d/sub/two.txt"), b"2").unwrap();
    fs.write(&format!("{zip}/keep.txt"), b"k").unwrap();

    assert!(fs.rmdir(&format!("{zip}/d"), false).is_err());
    fs.rmdir(&format!("{zip}/d"), true).unwrap();
    assert_eq!(fs.list_dir(&zip).unwrap(), vec!["keep.txt"]);
}

#[test]
fn transaction_scope_is_enforced() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let a = p(&dir, "a.zip");
    let b = p(&dir, "b.zip");

    let mut txn = fs.transaction(&[a.as_str()]).unwrap();
    txn.write(&format!("{a}/in.txt"), b"ok").unwrap();
    assert!(matches!(
        txn.write(&format!("{b}/out.txt"), b"no"),
        Err(Error::State(_))
    ));
    txn.commit().unwrap();

    assert!(fs.exists(&format!("{a}/in.txt")));
    assert!(!dir.path().join("b.zip").exists());
}

#[test]
fn large_writes_spill_to_temp() {
    let dir = scratch();
    let mut config = Config::default();
    config.global_buffer_size = 256;
    config.temp_dir = Some(dir.path().to_path_buf());
    let fs = ArchiveFs::with_config(config);

    let zip = p(&dir, "big.zip");
    let payload = vec![42u8; 16 * 1024];
    fs.write(&format!("{zip}/blob.bin"), &payload).unwrap();
    assert_eq!(fs.read(&format!("{zip}/blob.bin")).unwrap(), payload);
}

#[test]
fn create_archive_with_explicit_format() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let weird = p(&dir, "weird.bin");

    let mut s = fs.batch_session();
    s.create_archive(&weird, Some("zip")).unwrap();
    s.write(&format!("{weird}/f.txt"), b"inside").unwrap();
    s.commit().unwrap();

    // The file name gives no hint; the bytes are a zip container.
    let handler = ZipHandler::new(64 * 1024 * 1024, std::env::temp_dir());
    let f = fs::File::open(dir.path().join("weird.bin")).unwrap();
    let store = handler.load(Box::new(f), "weird.bin").unwrap();
    assert!(store.get("f.txt").is_some());

    // And creating it again is a collision.
    assert!(matches!(
        fs.create_archive(&weird, Some("zip")),
        Err(Error::AlreadyExists(_))
    ));
}

#[test]
fn create_archive_infers_format_from_extension() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let tgz = p(&dir, "empty.tar.gz");

    fs.create_archive(&tgz, None).unwrap();
    assert!(dir.path().join("empty.tar.gz").exists());
    assert_eq!(fs.list_dir(&tgz).unwrap(), Vec::<String>::new());

    assert!(matches!(
        fs.create_archive(&p(&dir, "plain.txt"), None),
        Err(Error::UnsupportedFormat(_))
    ));
}

#[test]
fn write_streams_commit_on_close() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let f = p(&dir, "s.zip/streamed.txt");

    let mut ws = fs.open_write(&f, false).unwrap();
    ws.write_all(b"hello ").unwrap();
    ws.write_all(b"streams").unwrap();
    ws.close().unwrap();

    let mut rs = fs.open_read(&f).unwrap();
    assert!(rs.is_seekable());
    assert_eq!(rs.read_all().unwrap(), b"hello streams");

    let mut rs = fs.open_read(&f).unwrap();
    rs.seek(SeekFrom::Start(6)).unwrap();
    let mut rest = Vec::new();
    rs.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, b"streams");
}

#[test]
fn session_streams_defer_to_session_commit() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let f = p(&dir, "s.zip/deferred.txt");

    let mut s = fs.batch_session();
    let mut ws = s.open_write(&f, false).unwrap();
    ws.write_all(b"later").unwrap();
    ws.close().unwrap();
    assert_eq!(s.read(&f).unwrap(), b"later");
    assert!(!dir.path().join("s.zip").exists());
    s.commit().unwrap();
    assert_eq!(fs.read(&f).unwrap(), b"later");
}

#[test]
fn get_info_reports_entry_metadata() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let zip = p(&dir, "x.zip");
    fs.write(&format!("{zip}/d/f.txt"), b"12345").unwrap();

    let info = fs.get_info(&format!("{zip}/d/f.txt")).unwrap();
    assert_eq!(info.kind, EntryKind::File);
    assert_eq!(info.size, 5);
    assert!(info.modified.is_some());

    let info = fs.get_info(&format!("{zip}/d")).unwrap();
    assert_eq!(info.kind, EntryKind::Dir);

    // The container itself is physically a file.
    let info = fs.get_info(&zip).unwrap();
    assert_eq!(info.kind, EntryKind::File);
    assert!(info.size > 0);
}

#[test]
fn abandoned_session_discards_overlays() {
    let dir = scratch();
    let fs = ArchiveFs::new();
    let zip = p(&dir, "x.zip");
    fs.write(&format!("{zip}/keep.txt"), b"original").unwrap();
    let before = fs::read(dir.path().join("x.zip")).unwrap();

    {
        let mut s = fs.batch_session();
        s.write(&format!("{zip}/extra.txt"), b"staged").unwrap();
        s.remove(&format!("{zip}/keep.txt")).unwrap();
        // Dropped without commit.
    }

    assert_eq!(fs::read(dir.path().join("x.zip")).unwrap(), before);
    assert_eq!(fs.read(&format!("{zip}/keep.txt")).unwrap(), b"original");
}

// ── Injected handlers ─────────────────────────────────────────────────────────

struct CountingHandler {
    inner: Box<dyn ArchiveHandler>,
    serializes: Arc<AtomicUsize>,
}

impl ArchiveHandler for CountingHandler {
    fn format_name(&self) -> &'static str {
        self.inner.format_name()
    }

    fn load(&self, src: Box<dyn ReadSeek>, container_name: &str) -> Result<EntryStore> {
        self.inner.load(src, container_name)
    }

    fn open_entry(&self, src: Box<dyn ReadSeek>, entry: &Entry) -> Result<EntryReader> {
        self.inner.open_entry(src, entry)
    }

    fn serialize(
        &self,
        store: &EntryStore,
        reopen: &mut ReopenFn<'_>,
        sink: &mut dyn WriteSeek,
    ) -> Result<()> {
        self.serializes.fetch_add(1, Ordering::SeqCst);
        self.inner.serialize(store, reopen, sink)
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }
}

fn counting_zip_factory(serializes: Arc<AtomicUsize>) -> HandlerFactory {
    Arc::new(move |config: &Config| {
        Box::new(CountingHandler {
            inner: Box::new(ZipHandler::new(config.global_buffer_size, config.temp_dir())),
            serializes: serializes.clone(),
        }) as Box<dyn ArchiveHandler>
    })
}

/// Delegates to the real zip handler but refuses to serialize any store
/// holding an entry whose name contains "boom".
struct FailingHandler {
    inner: Box<dyn ArchiveHandler>,
}

impl ArchiveHandler for FailingHandler {
    fn format_name(&self) -> &'static str {
        self.inner.format_name()
    }

    fn load(&self, src: Box<dyn ReadSeek>, container_name: &str) -> Result<EntryStore> {
        self.inner.load(src, container_name)
    }

    fn open_entry(&self, src: Box<dyn ReadSeek>, entry: &Entry) -> Result<EntryReader> {
        self.inner.open_entry(src, entry)
    }

    fn serialize(
        &self,
        store: &EntryStore,
        reopen: &mut ReopenFn<'_>,
        sink: &mut dyn WriteSeek,
    ) -> Result<()> {
        if store.iter_live().any(|e| e.name.contains("boom")) {
            return Err(Error::Format {
                container: "injected".into(),
                message: "serialize failure requested".into(),
            });
        }
        self.inner.serialize(store, reopen, sink)
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }
}

fn failing_zip_factory() -> HandlerFactory {
    Arc::new(|config: &Config| {
        Box::new(FailingHandler {
            inner: Box::new(ZipHandler::new(config.global_buffer_size, config.temp_dir())),
        }) as Box<dyn ArchiveHandler>
    })
}
