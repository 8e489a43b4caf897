//! Archive entries and the per-archive entry store.
//!
//! The store is an insertion-ordered index of normalized entry names. Staged
//! mutations live beside loaded metadata as overlay content sources;
//! deletions of names present in the backing container become tombstones
//! that rebuild reconciles away.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::spill::Blob;

// ── Entry ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

/// Where an entry's original bytes live inside the backing container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginalRef {
    /// Central-directory index of a ZIP member.
    ZipIndex(usize),
    /// Byte slice of the (decoded) TAR stream.
    TarSlice { offset: u64, size: u64 },
    /// The entire decoded stream of a single-entry codec container.
    Whole,
}

#[derive(Debug, Clone)]
pub enum ContentSource {
    Original(OriginalRef),
    Overlay(Blob),
    Deleted,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
    /// Logical (decoded) size in bytes.
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: Option<u64>,
    /// Unix permission bits, when the format records them.
    pub mode: Option<u32>,
    /// Symlink target; never followed.
    pub link_target: Option<String>,
    pub source: ContentSource,
}

impl Entry {
    pub fn file(name: impl Into<String>, size: u64, mtime: Option<u64>, source: ContentSource) -> Self {
        Entry {
            name: name.into(),
            kind: EntryKind::File,
            size,
            mtime,
            mode: None,
            link_target: None,
            source,
        }
    }

    pub fn dir(name: impl Into<String>, mtime: Option<u64>) -> Self {
        Entry {
            name: name.into(),
            kind: EntryKind::Dir,
            size: 0,
            mtime,
            mode: None,
            link_target: None,
            source: ContentSource::Overlay(Blob::empty()),
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self.source, ContentSource::Deleted)
    }
}

/// Metadata record returned by `get_info`.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<u64>,
    pub permissions: Option<u32>,
}

// ── EntryStore ────────────────────────────────────────────────────────────────

/// Insertion-ordered index of one archive's entries with staged overlays.
#[derive(Debug, Default)]
pub struct EntryStore {
    entries: IndexMap<String, Entry>,
    /// Names present in the backing container; deleting one leaves a tombstone.
    original_names: HashSet<String>,
}

impl EntryStore {
    pub fn new() -> Self {
        EntryStore::default()
    }

    /// Record an entry scanned from the backing container.
    pub fn insert_original(&mut self, entry: Entry) {
        self.original_names.insert(entry.name.clone());
        self.entries.insert(entry.name.clone(), entry);
    }

    /// Look up a live entry; tombstoned names read as absent.
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name).filter(|e| !e.is_deleted())
    }

    /// Insert or replace an entry, clearing any tombstone. Replacement keeps
    /// the name's original position; new names append.
    pub fn put(&mut self, entry: Entry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    /// Remove a live entry. Names present in the original container get a
    /// tombstone; overlay-only names vanish outright.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        match self.entries.get_mut(name) {
            Some(e) if !e.is_deleted() => {
                if self.original_names.contains(name) {
                    e.source = ContentSource::Deleted;
                } else {
                    self.entries.shift_remove(name);
                }
                Ok(())
            }
            _ => Err(Error::NotFound(name.to_string())),
        }
    }

    /// Remove a directory name and everything beneath it.
    pub fn delete_tree(&mut self, dir: &str) {
        let prefix = format!("{dir}/");
        let doomed: Vec<String> = self
            .entries
            .values()
            .filter(|e| !e.is_deleted())
            .filter(|e| e.name == dir || e.name.starts_with(&prefix))
            .map(|e| e.name.clone())
            .collect();
        for name in doomed {
            let _ = self.delete(&name);
        }
    }

    /// Live entries in insertion order.
    pub fn iter_live(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values().filter(|e| !e.is_deleted())
    }

    pub fn len_live(&self) -> usize {
        self.iter_live().count()
    }

    pub fn is_empty_live(&self) -> bool {
        self.iter_live().next().is_none()
    }

    /// Immediate child base-names of a directory (`""` = store root), in
    /// first-seen order, including directories implied by deeper entries.
    pub fn children(&self, dir: &str) -> Vec<String> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };
        let mut out: IndexSet<String> = IndexSet::new();
        for e in self.iter_live() {
            let rest = match e.name.strip_prefix(&prefix) {
                Some(r) if !r.is_empty() => r,
                _ => continue,
            };
            if let Some(first) = rest.split('/').next() {
                out.insert(first.to_string());
            }
        }
        out.into_iter().collect()
    }

    /// True when `name` is an explicit live directory entry or implied by a
    /// live entry beneath it. The store root is always a directory.
    pub fn is_dir(&self, name: &str) -> bool {
        if name.is_empty() {
            return true;
        }
        if matches!(self.get(name), Some(e) if e.kind == EntryKind::Dir) {
            return true;
        }
        let prefix = format!("{name}/");
        self.iter_live().any(|e| e.name.starts_with(&prefix))
    }

    /// Whether any live name sits beneath `dir`.
    pub fn has_children(&self, dir: &str) -> bool {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };
        self.iter_live()
            .any(|e| e.name.len() > prefix.len() && e.name.starts_with(&prefix))
    }

    /// Live (name, kind) pairs in insertion order; walk iterates a snapshot.
    pub fn snapshot(&self) -> Vec<(String, EntryKind)> {
        self.iter_live().map(|e| (e.name.clone(), e.kind)).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
