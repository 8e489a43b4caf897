//! The public facade: one-shot namespace operations over composite paths.
//!
//! Each call opens an ephemeral [`Session`], performs the operation, and
//! commits before returning, so a successful mutation is on disk when the
//! call ends. Use [`ArchiveFs::batch_session`] to amortize archive loads and
//! rebuilds across many operations, and [`ArchiveFs::transaction`] for
//! all-or-nothing replacement of several outer files.

use crate::config::Config;
use crate::entry::EntryInfo;
use crate::error::Result;
use crate::registry::{HandlerFactory, Registry};
use crate::session::{Session, Transaction, WalkEntry};
use crate::stream::{ReadStream, SessionRef, WriteStream};

pub struct ArchiveFs {
    pub(crate) config: Config,
    pub(crate) registry: Registry,
}

impl Default for ArchiveFs {
    fn default() -> Self {
        ArchiveFs::new()
    }
}

impl ArchiveFs {
    pub fn new() -> Self {
        ArchiveFs::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        ArchiveFs {
            config,
            registry: Registry::with_defaults(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register or shadow the handler for an extension on this instance.
    pub fn set_archive_handler(&mut self, extension: &str, factory: HandlerFactory) {
        self.registry.register(extension, factory);
    }

    // ── Scoped operation groups ───────────────────────────────────────────────

    /// A session whose staged changes commit once, on `commit()`; dropping
    /// the session discards them.
    pub fn batch_session(&self) -> Session<'_> {
        Session::new(self)
    }

    /// A session confined to the given outer files, committed as one
    /// two-phase rename batch.
    pub fn transaction(&self, paths: &[&str]) -> Result<Transaction<'_>> {
        Transaction::new(self, paths)
    }

    fn with_session<T>(&self, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        let mut s = Session::new(self);
        let out = f(&mut s)?;
        s.commit()?;
        Ok(out)
    }

    // ── One-shot operations ───────────────────────────────────────────────────

    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.with_session(|s| s.read(path))
    }

    pub fn read_to_string(&self, path: &str) -> Result<String> {
        self.with_session(|s| s.read_to_string(path))
    }

    /// Overwrite `path` with `data`, creating intermediate archives and
    /// directories as needed.
    pub fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.with_session(|s| s.write(path, data))
    }

    pub fn write_str(&self, path: &str, text: &str) -> Result<()> {
        self.with_session(|s| s.write_str(path, text))
    }

    pub fn append(&self, path: &str, data: &[u8]) -> Result<()> {
        self.with_session(|s| s.append(path, data))
    }

    /// Never errors: any failure to resolve reads as "absent".
    pub fn exists(&self, path: &str) -> bool {
        let mut s = Session::new(self);
        s.exists(path)
    }

    pub fn remove(&self, path: &str) -> Result<()> {
        self.with_session(|s| s.remove(path))
    }

    pub fn copy(&self, src: &str, dst: &str) -> Result<()> {
        self.with_session(|s| s.copy(src, dst))
    }

    /// Copy then remove; both sides commit.
    pub fn rename(&self, src: &str, dst: &str) -> Result<()> {
        self.with_session(|s| s.rename(src, dst))
    }

    pub fn mkdir(&self, path: &str, create_parents: bool) -> Result<()> {
        self.with_session(|s| s.mkdir(path, create_parents))
    }

    pub fn rmdir(&self, path: &str, recursive: bool) -> Result<()> {
        self.with_session(|s| s.rmdir(path, recursive))
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        self.with_session(|s| s.list_dir(path))
    }

    pub fn walk(&self, path: &str) -> Result<Vec<WalkEntry>> {
        self.with_session(|s| s.walk(path))
    }

    pub fn get_info(&self, path: &str) -> Result<EntryInfo> {
        self.with_session(|s| s.get_info(path))
    }

    /// Stage an empty archive at `path`; the format comes from the extension
    /// unless given explicitly.
    pub fn create_archive(&self, path: &str, format: Option<&str>) -> Result<()> {
        self.with_session(|s| s.create_archive(path, format))
    }

    // ── Streams ───────────────────────────────────────────────────────────────

    pub fn open_read(&self, path: &str) -> Result<ReadStream> {
        let mut s = Session::new(self);
        s.open_read(path)
    }

    /// A write stream that commits its target on `close()`.
    pub fn open_write<'a>(&'a self, path: &str, append: bool) -> Result<WriteStream<'a, 'a>> {
        WriteStream::create(SessionRef::Owned(Session::new(self)), path, append)
    }
}
