//! Sessions and transactions: scoped deferral of commit.
//!
//! Every operation runs inside a session. One-shot facade calls open an
//! ephemeral session and commit before returning; `batch_session` hands the
//! caller a session whose staged overlays commit once, on the explicit
//! `commit()`. Dropping an uncommitted session discards all overlays; spill
//! temp files vanish with their blobs.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use crate::entry::{ContentSource, Entry, EntryInfo, EntryKind, EntryStore};
use crate::error::{Error, Result};
use crate::fs::ArchiveFs;
use crate::handler::EntryReader;
use crate::path::{base_name, join_entry, CompositePath};
use crate::rebuild;
use crate::resolve::{entry_reader, serialize_empty, ArchiveHandle, Backing, HandleCache, Intent, Location, Resolver};
use crate::spill::{Blob, SpillBuf};

/// A walk frame: directory path, immediate subdirectory names, file names.
pub type WalkEntry = (String, Vec<String>, Vec<String>);

pub struct Session<'fs> {
    fs: &'fs ArchiveFs,
    cache: HandleCache,
    committed: bool,
    /// When set, mutations are confined to these outer targets.
    allowed_targets: Option<Vec<PathBuf>>,
}

impl<'fs> Session<'fs> {
    pub(crate) fn new(fs: &'fs ArchiveFs) -> Self {
        Session {
            fs,
            cache: HandleCache::default(),
            committed: false,
            allowed_targets: None,
        }
    }

    pub(crate) fn with_targets(fs: &'fs ArchiveFs, targets: Vec<PathBuf>) -> Self {
        Session {
            fs,
            cache: HandleCache::default(),
            committed: false,
            allowed_targets: Some(targets),
        }
    }

    pub(crate) fn config(&self) -> &crate::config::Config {
        &self.fs.config
    }

    /// Validate a path as a write target without staging anything.
    pub(crate) fn check_write_target(&mut self, path: &str) -> Result<()> {
        let loc = self.resolve(path, Intent::Create, false)?;
        self.ensure_allowed(&loc)?;
        match &loc {
            Location::Fs(_) => Ok(()),
            Location::Entry { key, inner } => {
                if inner.is_empty() {
                    return Err(Error::IsADirectory(path.to_string()));
                }
                let h = self
                    .cache
                    .get(key)
                    .ok_or(Error::State("archive handle vanished from cache"))?;
                if h.store.is_dir(inner) {
                    return Err(Error::IsADirectory(path.to_string()));
                }
                Ok(())
            }
        }
    }

    /// Open a write stream that stages into this session on close.
    pub fn open_write<'s>(
        &'s mut self,
        path: &str,
        append: bool,
    ) -> Result<crate::stream::WriteStream<'s, 'fs>> {
        crate::stream::WriteStream::create(crate::stream::SessionRef::Borrowed(self), path, append)
    }

    /// Open a read stream; the stream stays valid after the session ends.
    pub fn open_read(&mut self, path: &str) -> Result<crate::stream::ReadStream> {
        let (reader, len) = self.open_entry_stream(path)?;
        Ok(crate::stream::ReadStream::new(reader, len))
    }

    fn resolver(&mut self) -> Resolver<'_> {
        Resolver {
            config: &self.fs.config,
            registry: &self.fs.registry,
            cache: &mut self.cache,
        }
    }

    fn resolve(&mut self, path: &str, intent: Intent, as_dir: bool) -> Result<Location> {
        self.resolver().resolve(path, intent, as_dir)
    }

    // ── Commit lifecycle ──────────────────────────────────────────────────────

    /// Rebuild every dirty archive and atomically replace the outer files.
    pub fn commit(mut self) -> Result<()> {
        self.committed = true;
        // Handles synthesized by an operation that was then rejected for
        // being outside the transaction's targets must not commit.
        if let Some(allowed) = &self.allowed_targets {
            let allowed: Vec<PathBuf> = allowed.iter().map(|p| normalize_fs_path(p)).collect();
            for (key, target) in self.cache.dirty_root_targets() {
                if !allowed.contains(&normalize_fs_path(&target)) {
                    tracing::debug!(key = %key, "discarding staged changes outside transaction targets");
                    self.cache.clean_subtree(&key);
                }
            }
        }
        rebuild::commit(&mut self.cache, &self.fs.config)
    }

    /// Discard all staged changes.
    pub fn abort(mut self) {
        self.committed = true;
        tracing::debug!("session aborted; staged changes discarded");
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    pub fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        let (mut reader, _) = self.open_entry_stream(path)?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        Ok(out)
    }

    pub fn read_to_string(&mut self, path: &str) -> Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|_| Error::format(path, "invalid UTF-8"))
    }

    /// Open a composite path for reading: the decoded stream and its length
    /// when known.
    pub(crate) fn open_entry_stream(&mut self, path: &str) -> Result<(EntryReader, Option<u64>)> {
        match self.resolve(path, Intent::Read, false)? {
            Location::Fs(p) => {
                let meta = std::fs::metadata(&p).map_err(|e| Error::path_io(p.clone(), e))?;
                if meta.is_dir() {
                    return Err(Error::IsADirectory(path.to_string()));
                }
                let f = std::fs::File::open(&p).map_err(|e| Error::path_io(p, e))?;
                Ok((EntryReader::Seekable(Box::new(f)), Some(meta.len())))
            }
            Location::Entry { key, inner } => {
                if inner.is_empty() {
                    return Err(Error::IsADirectory(path.to_string()));
                }
                let h = self
                    .cache
                    .get(&key)
                    .ok_or(Error::State("archive handle vanished from cache"))?;
                let entry = match h.store.get(&inner) {
                    Some(e) => e,
                    None if h.store.is_dir(&inner) => {
                        return Err(Error::IsADirectory(path.to_string()))
                    }
                    None => return Err(Error::NotFound(path.to_string())),
                };
                match entry.kind {
                    EntryKind::Dir => Err(Error::IsADirectory(path.to_string())),
                    EntryKind::Symlink => {
                        // Opaque: reading a symlink yields its target text.
                        let target = entry.link_target.clone().unwrap_or_default();
                        let len = target.len() as u64;
                        Ok((
                            EntryReader::Seekable(Box::new(io::Cursor::new(target.into_bytes()))),
                            Some(len),
                        ))
                    }
                    EntryKind::File => {
                        let size = entry.size;
                        Ok((entry_reader(h, entry)?, Some(size)))
                    }
                }
            }
        }
    }

    pub fn exists(&mut self, path: &str) -> bool {
        self.resolve(path, Intent::Read, false).is_ok()
    }

    pub fn get_info(&mut self, path: &str) -> Result<EntryInfo> {
        let display = CompositePath::parse(path)?.display();
        match self.resolve(path, Intent::Read, false)? {
            Location::Fs(p) => {
                let meta = std::fs::metadata(&p).map_err(|e| Error::path_io(p, e))?;
                let modified = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs());
                Ok(EntryInfo {
                    path: display,
                    kind: if meta.is_dir() {
                        EntryKind::Dir
                    } else {
                        EntryKind::File
                    },
                    size: meta.len(),
                    modified,
                    permissions: fs_mode(&meta),
                })
            }
            Location::Entry { key, inner } => {
                let h = self
                    .cache
                    .get(&key)
                    .ok_or(Error::State("archive handle vanished from cache"))?;
                if inner.is_empty() {
                    // An uncommitted archive container: physically a file.
                    let size = match &h.backing {
                        Backing::Blob(b) => b.len(),
                        Backing::Path(p) => std::fs::metadata(p).map(|m| m.len()).unwrap_or(0),
                    };
                    return Ok(EntryInfo {
                        path: display,
                        kind: EntryKind::File,
                        size,
                        modified: None,
                        permissions: None,
                    });
                }
                match h.store.get(&inner) {
                    Some(e) => Ok(EntryInfo {
                        path: display,
                        kind: e.kind,
                        size: e.size,
                        modified: e.mtime,
                        permissions: e.mode,
                    }),
                    None if h.store.is_dir(&inner) => Ok(EntryInfo {
                        path: display,
                        kind: EntryKind::Dir,
                        size: 0,
                        modified: None,
                        permissions: None,
                    }),
                    None => Err(Error::NotFound(path.to_string())),
                }
            }
        }
    }

    pub fn list_dir(&mut self, path: &str) -> Result<Vec<String>> {
        match self.resolve(path, Intent::Read, true)? {
            Location::Fs(p) => {
                let meta = std::fs::metadata(&p).map_err(|e| Error::path_io(p.clone(), e))?;
                if !meta.is_dir() {
                    return Err(Error::NotADirectory(path.to_string()));
                }
                let mut names: Vec<String> = std::fs::read_dir(&p)
                    .map_err(|e| Error::path_io(p, e))?
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                Ok(names)
            }
            Location::Entry { key, inner } => {
                let h = self
                    .cache
                    .get(&key)
                    .ok_or(Error::State("archive handle vanished from cache"))?;
                if !inner.is_empty() && !h.store.is_dir(&inner) {
                    return if h.store.get(&inner).is_some() {
                        Err(Error::NotADirectory(path.to_string()))
                    } else {
                        Err(Error::NotFound(path.to_string()))
                    };
                }
                Ok(h.store.children(&inner))
            }
        }
    }

    /// Depth-first traversal in entry insertion order. Nested archives are
    /// reported as files; they are not descended into implicitly.
    pub fn walk(&mut self, path: &str) -> Result<Vec<WalkEntry>> {
        let display = CompositePath::parse(path)?.display();
        match self.resolve(path, Intent::Read, true)? {
            Location::Fs(p) => {
                let meta = std::fs::metadata(&p).map_err(|e| Error::path_io(p.clone(), e))?;
                if !meta.is_dir() {
                    return Err(Error::NotADirectory(path.to_string()));
                }
                let mut out = Vec::new();
                walk_fs(&p, &display, &mut out)?;
                Ok(out)
            }
            Location::Entry { key, inner } => {
                let h = self
                    .cache
                    .get(&key)
                    .ok_or(Error::State("archive handle vanished from cache"))?;
                if !inner.is_empty() && !h.store.is_dir(&inner) {
                    return Err(Error::NotADirectory(path.to_string()));
                }
                Ok(walk_store(&h.store, &display, &inner))
            }
        }
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    pub fn write(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.write_blob(path, Blob::from_vec(data.to_vec()), Some(crate::now_unix_ts()))
    }

    pub fn write_str(&mut self, path: &str, text: &str) -> Result<()> {
        self.write(path, text.as_bytes())
    }

    /// Stage a blob at a composite path, creating interior archives and
    /// directories as needed.
    pub(crate) fn write_blob(&mut self, path: &str, blob: Blob, mtime: Option<u64>) -> Result<()> {
        let loc = self.resolve(path, Intent::Create, false)?;
        self.ensure_allowed(&loc)?;
        match loc {
            Location::Fs(p) => {
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)
                            .map_err(|e| Error::path_io(parent.to_path_buf(), e))?;
                    }
                }
                let mut f =
                    std::fs::File::create(&p).map_err(|e| Error::path_io(p.clone(), e))?;
                io::copy(&mut blob.reader()?, &mut f).map_err(|e| Error::path_io(p, e))?;
                Ok(())
            }
            Location::Entry { key, inner } => {
                if inner.is_empty() {
                    return Err(Error::IsADirectory(path.to_string()));
                }
                let h = self
                    .cache
                    .get_mut(&key)
                    .ok_or(Error::State("archive handle vanished from cache"))?;
                if h.store.is_dir(&inner) {
                    return Err(Error::IsADirectory(path.to_string()));
                }
                let size = blob.len();
                h.store.put(Entry::file(
                    inner,
                    size,
                    mtime,
                    ContentSource::Overlay(blob),
                ));
                self.cache.mark_dirty(&key);
                tracing::trace!(path = %path, bytes = size, "staged overlay write");
                Ok(())
            }
        }
    }

    pub fn append(&mut self, path: &str, data: &[u8]) -> Result<()> {
        // Read-modify-write through the staged overlay.
        let existing = match self.open_entry_stream(path) {
            Ok((mut r, _)) => {
                let mut buf = Vec::new();
                r.read_to_end(&mut buf)?;
                buf
            }
            Err(Error::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        let mut combined = existing;
        combined.extend_from_slice(data);
        self.write(path, &combined)
    }

    pub fn remove(&mut self, path: &str) -> Result<()> {
        let loc = self.resolve(path, Intent::Write, false)?;
        self.ensure_allowed(&loc)?;
        match loc {
            Location::Fs(p) => {
                let meta = std::fs::metadata(&p).map_err(|e| Error::path_io(p.clone(), e))?;
                if meta.is_dir() {
                    return Err(Error::IsADirectory(path.to_string()));
                }
                std::fs::remove_file(&p).map_err(|e| Error::path_io(p, e))
            }
            Location::Entry { key, inner } => {
                if inner.is_empty() {
                    return Err(Error::IsADirectory(path.to_string()));
                }
                let h = self
                    .cache
                    .get_mut(&key)
                    .ok_or(Error::State("archive handle vanished from cache"))?;
                match h.store.get(&inner) {
                    Some(e) if e.kind == EntryKind::Dir => {
                        return Err(Error::IsADirectory(path.to_string()))
                    }
                    Some(_) => {}
                    None if h.store.is_dir(&inner) => {
                        return Err(Error::IsADirectory(path.to_string()))
                    }
                    None => return Err(Error::NotFound(path.to_string())),
                }
                h.store.delete(&inner)?;
                self.cache.mark_dirty(&key);
                tracing::trace!(path = %path, "staged tombstone");
                Ok(())
            }
        }
    }

    pub fn mkdir(&mut self, path: &str, create_parents: bool) -> Result<()> {
        let loc = self.resolve(path, Intent::Create, true)?;
        self.ensure_allowed(&loc)?;
        match loc {
            Location::Fs(p) => {
                if p.exists() {
                    if p.is_dir() && create_parents {
                        return Ok(());
                    }
                    return Err(Error::AlreadyExists(path.to_string()));
                }
                if create_parents {
                    std::fs::create_dir_all(&p).map_err(|e| Error::path_io(p, e))
                } else {
                    std::fs::create_dir(&p).map_err(|e| Error::path_io(p, e))
                }
            }
            Location::Entry { key, inner } => {
                if inner.is_empty() {
                    // The archive root itself; creating it again is only an
                    // error without the idempotent flag.
                    if create_parents {
                        return Ok(());
                    }
                    return Err(Error::AlreadyExists(path.to_string()));
                }
                let h = self
                    .cache
                    .get_mut(&key)
                    .ok_or(Error::State("archive handle vanished from cache"))?;
                if h.store.is_dir(&inner) {
                    if create_parents {
                        return Ok(());
                    }
                    return Err(Error::AlreadyExists(path.to_string()));
                }
                if h.store.get(&inner).is_some() {
                    return Err(Error::AlreadyExists(path.to_string()));
                }
                if !create_parents {
                    if let Some((parent, _)) = inner.rsplit_once('/') {
                        if !h.store.is_dir(parent) {
                            return Err(Error::NotFound(parent.to_string()));
                        }
                    }
                }
                h.store.put(Entry::dir(inner, Some(crate::now_unix_ts())));
                self.cache.mark_dirty(&key);
                Ok(())
            }
        }
    }

    pub fn rmdir(&mut self, path: &str, recursive: bool) -> Result<()> {
        let loc = self.resolve(path, Intent::Write, true)?;
        self.ensure_allowed(&loc)?;
        match loc {
            Location::Fs(p) => {
                if !p.is_dir() {
                    return Err(Error::NotADirectory(path.to_string()));
                }
                if recursive {
                    std::fs::remove_dir_all(&p).map_err(|e| Error::path_io(p, e))
                } else {
                    std::fs::remove_dir(&p).map_err(|e| Error::path_io(p, e))
                }
            }
            Location::Entry { key, inner } => {
                let h = self
                    .cache
                    .get_mut(&key)
                    .ok_or(Error::State("archive handle vanished from cache"))?;
                if !inner.is_empty() && !h.store.is_dir(&inner) {
                    return Err(Error::NotADirectory(path.to_string()));
                }
                if h.store.has_children(&inner) && !recursive {
                    return Err(Error::Io(io::Error::other("directory not empty")));
                }
                if inner.is_empty() {
                    // Clearing an archive root empties it; the container
                    // itself is removed via `remove` on its parent.
                    let names: Vec<String> = h.store.children("");
                    for name in names {
                        h.store.delete_tree(&name);
                    }
                } else {
                    h.store.delete_tree(&inner);
                }
                self.cache.mark_dirty(&key);
                Ok(())
            }
        }
    }

    pub fn copy(&mut self, src: &str, dst: &str) -> Result<()> {
        let info = self.get_info(src)?;
        if info.kind == EntryKind::Dir {
            return Err(Error::IsADirectory(src.to_string()));
        }
        let (mut reader, _) = self.open_entry_stream(src)?;
        let mut spill = SpillBuf::new(
            self.fs.config.global_buffer_size,
            self.fs.config.temp_dir(),
            base_name(dst),
        );
        io::copy(&mut reader, &mut spill)?;
        let blob = spill.freeze()?;
        // Source mtime rides along on a best-effort basis.
        self.write_blob(dst, blob, info.modified.or(Some(crate::now_unix_ts())))
    }

    pub fn rename(&mut self, src: &str, dst: &str) -> Result<()> {
        self.copy(src, dst)?;
        self.remove(src)
    }

    pub fn create_archive(&mut self, path: &str, format: Option<&str>) -> Result<()> {
        if self.exists(path) {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        match format {
            None => {
                let loc = self.resolve(path, Intent::Create, true)?;
                self.ensure_allowed(&loc)?;
                match loc {
                    Location::Entry { ref inner, .. } if inner.is_empty() => Ok(()),
                    _ => Err(Error::UnsupportedFormat(path.to_string())),
                }
            }
            Some(ext) => self.create_archive_as(path, ext),
        }
    }

    /// Stage an empty archive of an explicit format, regardless of how the
    /// file name would resolve.
    fn create_archive_as(&mut self, path: &str, ext: &str) -> Result<()> {
        let factory = self
            .fs
            .registry
            .lookup_extension(ext)
            .ok_or_else(|| Error::UnsupportedFormat(ext.to_string()))?
            .clone();
        let handler = factory(&self.fs.config);
        let cp = CompositePath::parse(path)?;
        let Some((name, parent_segs)) = cp.segments.split_last() else {
            return Err(Error::InvalidPath {
                path: path.to_string(),
                reason: "no file name",
            });
        };
        let name = name.clone();
        let parent_path = CompositePath {
            absolute: cp.absolute,
            segments: parent_segs.to_vec(),
        };
        let parent_display = if parent_path.segments.is_empty() && !parent_path.absolute {
            ".".to_string()
        } else {
            parent_path.display()
        };
        let blob = serialize_empty(&*handler, &self.fs.config, &name)?;
        let loc = self.resolve(&parent_display, Intent::Create, true)?;
        self.ensure_allowed(&loc)?;
        match loc {
            Location::Fs(dir) => {
                let target = dir.join(&name);
                let key = cp.display();
                self.cache.insert(ArchiveHandle {
                    key: key.clone(),
                    parent_key: None,
                    name,
                    target: Some(target),
                    depth: 0,
                    handler,
                    backing: Backing::Blob(blob),
                    store: EntryStore::new(),
                    dirty: true,
                });
                self.cache.mark_dirty(&key);
                Ok(())
            }
            Location::Entry { key, inner } => {
                let entry_name = join_entry(&inner, &name);
                let child_key = format!("{key}/{entry_name}");
                let parent = self
                    .cache
                    .get_mut(&key)
                    .ok_or(Error::State("archive handle vanished from cache"))?;
                let depth = parent.depth + 1;
                parent.store.put(Entry::file(
                    entry_name.clone(),
                    blob.len(),
                    Some(crate::now_unix_ts()),
                    ContentSource::Overlay(blob.clone()),
                ));
                self.cache.insert(ArchiveHandle {
                    key: child_key.clone(),
                    parent_key: Some(key),
                    name: entry_name,
                    target: None,
                    depth,
                    handler,
                    backing: Backing::Blob(blob),
                    store: EntryStore::new(),
                    dirty: true,
                });
                self.cache.mark_dirty(&child_key);
                Ok(())
            }
        }
    }

    // ── Transaction confinement ───────────────────────────────────────────────

    fn ensure_allowed(&self, loc: &Location) -> Result<()> {
        let Some(allowed) = &self.allowed_targets else {
            return Ok(());
        };
        let target: PathBuf = match loc {
            Location::Fs(p) => p.clone(),
            Location::Entry { key, .. } => {
                let mut k = key.clone();
                loop {
                    let h = self
                        .cache
                        .get(&k)
                        .ok_or(Error::State("archive handle vanished from cache"))?;
                    match &h.parent_key {
                        Some(p) => k = p.clone(),
                        None => {
                            break h
                                .target
                                .clone()
                                .ok_or(Error::State("outermost handle has no target path"))?
                        }
                    }
                }
            }
        };
        if allowed.iter().any(|a| normalize_fs_path(a) == normalize_fs_path(&target)) {
            Ok(())
        } else {
            Err(Error::State("path is outside the transaction's targets"))
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if !self.committed && self.cache.any_dirty() {
            tracing::debug!("session dropped without commit; staged changes discarded");
        }
    }
}

// ── Transaction ───────────────────────────────────────────────────────────────

/// A session confined to an enumerated set of outer files, committed as a
/// single two-phase rename batch: after a failure anywhere, no target has
/// been replaced.
pub struct Transaction<'fs> {
    session: Session<'fs>,
}

impl<'fs> Transaction<'fs> {
    pub(crate) fn new(fs: &'fs ArchiveFs, paths: &[&str]) -> Result<Self> {
        let mut targets = Vec::with_capacity(paths.len());
        for p in paths {
            let cp = CompositePath::parse(p)?;
            targets.push(PathBuf::from(cp.display()));
        }
        Ok(Transaction {
            session: Session::with_targets(fs, targets),
        })
    }

    pub fn commit(self) -> Result<()> {
        self.session.commit()
    }

    pub fn abort(self) {
        self.session.abort()
    }
}

impl<'fs> std::ops::Deref for Transaction<'fs> {
    type Target = Session<'fs>;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl std::ops::DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}

// ── Walk helpers ──────────────────────────────────────────────────────────────

fn walk_store(store: &EntryStore, root_display: &str, start: &str) -> Vec<WalkEntry> {
    let mut out = Vec::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(start.to_string());
    while let Some(dir) = queue.pop_front() {
        let display = if dir.is_empty() {
            root_display.to_string()
        } else {
            format!("{root_display}/{dir}")
        };
        let mut subdirs = Vec::new();
        let mut files = Vec::new();
        for child in store.children(&dir) {
            let full = join_entry(&dir, &child);
            if store.is_dir(&full) {
                subdirs.push(child);
                queue.push_back(full);
            } else {
                files.push(child);
            }
        }
        out.push((display, subdirs, files));
    }
    out
}

fn walk_fs(dir: &Path, display: &str, out: &mut Vec<WalkEntry>) -> Result<()> {
    let mut subdirs = Vec::new();
    let mut files = Vec::new();
    let mut names: Vec<(String, bool)> = std::fs::read_dir(dir)
        .map_err(|e| Error::path_io(dir.to_path_buf(), e))?
        .filter_map(|e| e.ok())
        .map(|e| {
            let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
            (e.file_name().to_string_lossy().into_owned(), is_dir)
        })
        .collect();
    names.sort();
    for (name, is_dir) in &names {
        if *is_dir {
            subdirs.push(name.clone());
        } else {
            files.push(name.clone());
        }
    }
    out.push((display.to_string(), subdirs.clone(), files));
    for name in subdirs {
        let child_display = format!("{display}/{name}");
        walk_fs(&dir.join(&name), &child_display, out)?;
    }
    Ok(())
}

fn normalize_fs_path(p: &Path) -> PathBuf {
    p.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn fs_mode(meta: &std::fs::Metadata) -> Option<u32> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Some(meta.permissions().mode() & 0o7777)
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        None
    }
}
