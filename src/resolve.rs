//! Composite-path resolution.
//!
//! Resolution walks a composite path in two phases: first along the real
//! filesystem until a segment names a recognized archive file, then through
//! entry stores, descending into nested archives on demand. Opened archives
//! are cached per session in a [`HandleCache`] keyed by the composite prefix
//! that reaches them; dirtiness propagates from a mutated handle up through
//! its ancestors.

use std::fs::File;
use std::io;
use std::path::PathBuf;

use indexmap::IndexMap;

use crate::config::Config;
use crate::entry::{ContentSource, Entry, EntryKind, EntryStore};
use crate::error::{Error, Result};
use crate::handler::{ArchiveHandler, EntryReader, ReadSeek};
use crate::path::{base_name, join_entry, CompositePath};
use crate::registry::Registry;
use crate::spill::{Blob, SpillBuf};

// ── Backing streams ───────────────────────────────────────────────────────────

/// Supplier of fresh readable streams over an archive's current bytes.
/// Outermost archives re-open their file per use (no held OS handle);
/// nested archives read from a materialized blob.
#[derive(Debug)]
pub enum Backing {
    Path(PathBuf),
    Blob(Blob),
}

impl Backing {
    pub fn reader(&self) -> Result<Box<dyn ReadSeek>> {
        match self {
            Backing::Path(p) => {
                let f = File::open(p).map_err(|e| Error::path_io(p.clone(), e))?;
                Ok(Box::new(f))
            }
            Backing::Blob(b) => Ok(Box::new(b.reader()?)),
        }
    }
}

// ── Handles ───────────────────────────────────────────────────────────────────

/// One open archive in a resolution stack.
pub struct ArchiveHandle {
    pub key: String,
    /// Cache key of the enclosing archive; `None` at depth 0.
    pub parent_key: Option<String>,
    /// Entry name within the parent store (nested handles only).
    pub name: String,
    /// On-disk path replaced at commit (depth-0 handles only).
    pub target: Option<PathBuf>,
    pub depth: usize,
    pub handler: Box<dyn ArchiveHandler>,
    pub backing: Backing,
    pub store: EntryStore,
    pub dirty: bool,
}

/// Open one of a handle's entries for reading, wherever its bytes live.
pub fn entry_reader(handle: &ArchiveHandle, entry: &Entry) -> Result<EntryReader> {
    match &entry.source {
        ContentSource::Overlay(blob) => Ok(EntryReader::Seekable(Box::new(blob.reader()?))),
        ContentSource::Original(_) => handle.handler.open_entry(handle.backing.reader()?, entry),
        ContentSource::Deleted => Err(Error::NotFound(entry.name.clone())),
    }
}

/// Per-session cache of open handles, keyed by composite prefix.
#[derive(Default)]
pub struct HandleCache {
    handles: IndexMap<String, ArchiveHandle>,
}

impl HandleCache {
    pub fn get(&self, key: &str) -> Option<&ArchiveHandle> {
        self.handles.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ArchiveHandle> {
        self.handles.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handles.contains_key(key)
    }

    pub fn insert(&mut self, handle: ArchiveHandle) {
        self.handles.insert(handle.key.clone(), handle);
    }

    /// Mark a handle and every ancestor dirty.
    pub fn mark_dirty(&mut self, key: &str) {
        let mut cur = Some(key.to_string());
        while let Some(k) = cur {
            match self.handles.get_mut(&k) {
                Some(h) => {
                    h.dirty = true;
                    cur = h.parent_key.clone();
                }
                None => break,
            }
        }
    }

    /// Dirty handle keys, innermost first, so each rebuild sees the fresh
    /// bytes of its children.
    pub fn dirty_keys_innermost_first(&self) -> Vec<String> {
        let mut keys: Vec<&ArchiveHandle> = self.handles.values().filter(|h| h.dirty).collect();
        keys.sort_by(|a, b| b.depth.cmp(&a.depth));
        keys.into_iter().map(|h| h.key.clone()).collect()
    }

    pub fn any_dirty(&self) -> bool {
        self.handles.values().any(|h| h.dirty)
    }

    /// Dirty depth-0 handles and their commit targets.
    pub fn dirty_root_targets(&self) -> Vec<(String, PathBuf)> {
        self.handles
            .values()
            .filter(|h| h.dirty && h.parent_key.is_none())
            .filter_map(|h| h.target.clone().map(|t| (h.key.clone(), t)))
            .collect()
    }

    /// Drop the dirty flag on a root handle and everything beneath it.
    pub fn clean_subtree(&mut self, root_key: &str) {
        let prefix = format!("{root_key}/");
        for (k, h) in self.handles.iter_mut() {
            if k == root_key || k.starts_with(&prefix) {
                h.dirty = false;
            }
        }
    }
}

// ── Resolution ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Read,
    Write,
    Create,
}

enum Found {
    Dir,
    ImplicitDir,
    File,
    Symlink,
    Absent,
}

/// Where a composite path landed.
#[derive(Debug, Clone)]
pub enum Location {
    /// Entirely on the real filesystem; no archive boundary was crossed.
    Fs(PathBuf),
    /// Inside the archive open under `key`. `inner` is the entry name,
    /// `""` for the archive root.
    Entry { key: String, inner: String },
}

pub struct Resolver<'a> {
    pub config: &'a Config,
    pub registry: &'a Registry,
    pub cache: &'a mut HandleCache,
}

impl Resolver<'_> {
    /// Resolve a composite path. `as_dir` requests directory semantics for
    /// the final segment: a trailing archive name is descended into rather
    /// than treated as a file.
    pub fn resolve(&mut self, raw: &str, intent: Intent, as_dir: bool) -> Result<Location> {
        let cp = CompositePath::parse(raw)?;
        let segs = &cp.segments;
        let mut disk = PathBuf::from(if cp.absolute { "/" } else { "." });
        let mut display = String::new();
        let n = segs.len();

        // Phase 1: the on-disk prefix.
        for i in 0..n {
            let seg = &segs[i];
            let candidate = disk.join(seg);
            let cand_display = prefix_join(&cp, &display, seg);
            let is_final = i == n - 1;

            if self.cache.contains(&cand_display) {
                return self.resolve_inner(cand_display, segs, i + 1, intent, as_dir, raw);
            }

            match std::fs::metadata(&candidate) {
                Ok(m) if m.is_dir() => {
                    disk = candidate;
                    display = cand_display;
                }
                Ok(_) => {
                    // A file. Archive names become boundaries when the path
                    // continues past them or directory semantics were asked.
                    if self.registry.recognizes(seg) && (!is_final || as_dir) {
                        self.open_outer(&cand_display, candidate, false)?;
                        return self.resolve_inner(cand_display, segs, i + 1, intent, as_dir, raw);
                    }
                    if is_final {
                        return Ok(Location::Fs(candidate));
                    }
                    return Err(Error::NotADirectory(cand_display));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => match intent {
                    Intent::Create => {
                        if self.registry.recognizes(seg) && (!is_final || as_dir) {
                            self.open_outer(&cand_display, candidate, true)?;
                            return self.resolve_inner(cand_display, segs, i + 1, intent, as_dir, raw);
                        }
                        // A plain path yet to be created.
                        disk = candidate;
                        display = cand_display;
                        if is_final {
                            return Ok(Location::Fs(disk));
                        }
                    }
                    _ => return Err(Error::NotFound(cand_display)),
                },
                Err(e) => return Err(Error::path_io(candidate, e)),
            }
        }
        Ok(Location::Fs(disk))
    }

    /// Phase 2: walk the remaining segments through entry stores.
    fn resolve_inner(
        &mut self,
        mut key: String,
        segs: &[String],
        start: usize,
        intent: Intent,
        as_dir: bool,
        raw: &str,
    ) -> Result<Location> {
        let mut inner = String::new();
        let mut i = start;
        while i < segs.len() {
            let seg = &segs[i];
            let cand_inner = join_entry(&inner, seg);
            let child_key = format!("{key}/{cand_inner}");
            let is_final = i == segs.len() - 1;
            let descend_wanted = !is_final || as_dir;

            if descend_wanted && self.cache.contains(&child_key) {
                key = child_key;
                inner.clear();
                i += 1;
                continue;
            }

            let is_archive_name = self.registry.recognizes(seg);
            let found = {
                let store = &self
                    .cache
                    .get(&key)
                    .ok_or(Error::State("archive handle vanished from cache"))?
                    .store;
                match store.get(&cand_inner) {
                    Some(e) => match e.kind {
                        EntryKind::Dir => Found::Dir,
                        EntryKind::File => Found::File,
                        EntryKind::Symlink => Found::Symlink,
                    },
                    None if store.is_dir(&cand_inner) => Found::ImplicitDir,
                    None => Found::Absent,
                }
            };

            match found {
                Found::Dir | Found::ImplicitDir => {
                    inner = cand_inner;
                }
                Found::File => {
                    if descend_wanted && is_archive_name {
                        self.descend(&key, &cand_inner, &child_key, false)?;
                        key = child_key;
                        inner.clear();
                    } else if is_final {
                        return Ok(Location::Entry {
                            key,
                            inner: cand_inner,
                        });
                    } else {
                        return Err(Error::NotADirectory(child_key));
                    }
                }
                Found::Symlink => {
                    // Symlinks are opaque: usable as a leaf, never traversed.
                    if is_final && !as_dir {
                        return Ok(Location::Entry {
                            key,
                            inner: cand_inner,
                        });
                    }
                    return Err(Error::NotADirectory(child_key));
                }
                Found::Absent => match intent {
                    Intent::Create => {
                        if descend_wanted && is_archive_name {
                            self.descend(&key, &cand_inner, &child_key, true)?;
                            key = child_key;
                            inner.clear();
                        } else {
                            // Missing interior directories are implicit;
                            // keep accumulating the name.
                            inner = cand_inner;
                        }
                    }
                    _ => return Err(Error::NotFound(raw.to_string())),
                },
            }
            i += 1;
        }
        Ok(Location::Entry { key, inner })
    }

    fn open_outer(&mut self, key: &str, path: PathBuf, synthesize: bool) -> Result<()> {
        let fname = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPath {
                path: key.to_string(),
                reason: "no file name",
            })?;
        let (ext, factory) = self
            .registry
            .lookup(&fname)
            .ok_or_else(|| Error::UnsupportedFormat(fname.clone()))?;
        let ext = ext.to_string();
        let handler = factory(self.config);
        let handle = if synthesize {
            tracing::debug!(key = %key, format = %ext, "synthesizing new outer archive");
            let blob = serialize_empty(&*handler, self.config, &fname)?;
            ArchiveHandle {
                key: key.to_string(),
                parent_key: None,
                name: fname,
                target: Some(path),
                depth: 0,
                handler,
                backing: Backing::Blob(blob),
                store: EntryStore::new(),
                dirty: true,
            }
        } else {
            let backing = Backing::Path(path.clone());
            let store = handler.load(backing.reader()?, &fname)?;
            tracing::debug!(key = %key, format = %ext, "opened outer archive");
            ArchiveHandle {
                key: key.to_string(),
                parent_key: None,
                name: fname,
                target: Some(path),
                depth: 0,
                handler,
                backing,
                store,
                dirty: false,
            }
        };
        self.cache.insert(handle);
        Ok(())
    }

    fn descend(
        &mut self,
        parent_key: &str,
        entry_name: &str,
        child_key: &str,
        synthesize: bool,
    ) -> Result<()> {
        let container = base_name(entry_name).to_string();
        let (_, factory) = self
            .registry
            .lookup(&container)
            .ok_or_else(|| Error::UnsupportedFormat(container.clone()))?;
        let handler = factory(self.config);
        let parent = self
            .cache
            .get(parent_key)
            .ok_or(Error::State("archive handle vanished from cache"))?;
        let depth = parent.depth + 1;

        let (backing, store, dirty) = if synthesize {
            tracing::debug!(key = %child_key, "synthesizing nested archive");
            let blob = serialize_empty(&*handler, self.config, &container)?;
            // Stage a placeholder so the parent lists the new archive before
            // commit overwrites it with the serialized child.
            let placeholder = Entry::file(
                entry_name,
                blob.len(),
                Some(crate::now_unix_ts()),
                ContentSource::Overlay(blob.clone()),
            );
            self.cache
                .get_mut(parent_key)
                .expect("parent handle present")
                .store
                .put(placeholder);
            self.cache.mark_dirty(parent_key);
            (Backing::Blob(blob), EntryStore::new(), true)
        } else {
            let entry = parent
                .store
                .get(entry_name)
                .ok_or_else(|| Error::NotFound(child_key.to_string()))?;
            let blob = match &entry.source {
                ContentSource::Overlay(b) => b.clone(),
                _ => {
                    // Copy the nested container out of its parent so the
                    // child can seek independently of the parent stream.
                    let mut r = entry_reader(parent, entry)?;
                    let mut spill = SpillBuf::new(
                        self.config.global_buffer_size,
                        self.config.temp_dir(),
                        &container,
                    );
                    io::copy(&mut r, &mut spill)?;
                    spill.freeze()?
                }
            };
            let store = handler.load(Box::new(blob.reader()?), &container)?;
            tracing::debug!(key = %child_key, depth, "opened nested archive");
            (Backing::Blob(blob), store, false)
        };

        self.cache.insert(ArchiveHandle {
            key: child_key.to_string(),
            parent_key: Some(parent_key.to_string()),
            name: entry_name.to_string(),
            target: None,
            depth,
            handler,
            backing,
            store,
            dirty,
        });
        if dirty {
            self.cache.mark_dirty(child_key);
        }
        Ok(())
    }
}

fn prefix_join(cp: &CompositePath, prefix: &str, seg: &str) -> String {
    if prefix.is_empty() {
        if cp.absolute {
            format!("/{seg}")
        } else {
            seg.to_string()
        }
    } else {
        format!("{prefix}/{seg}")
    }
}

/// Serialize an empty store into fresh container bytes.
pub(crate) fn serialize_empty(
    handler: &dyn ArchiveHandler,
    config: &Config,
    tag: &str,
) -> Result<Blob> {
    let store = EntryStore::new();
    let mut sink = SpillBuf::new(config.global_buffer_size, config.temp_dir(), tag);
    let mut reopen = || -> Result<Box<dyn ReadSeek>> {
        Err(Error::State("new archive has no backing stream"))
    };
    handler.serialize(&store, &mut reopen, &mut sink)?;
    Ok(sink.freeze()?)
}
