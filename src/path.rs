//! Composite-path parsing and entry-name normalization.
//!
//! A composite path is an ordinary `/`-separated path whose segments may
//! cross archive boundaries (`out/x.zip/inner.tar.gz/deep.txt`). Entry
//! names inside a store are always POSIX-form relative paths: forward
//! slashes, no leading slash, no `.`/`..` segments.

use crate::error::{Error, Result};

// ── Composite paths ───────────────────────────────────────────────────────────

/// A parsed composite path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositePath {
    /// Leading `/`: anchored at the filesystem root rather than the CWD.
    pub absolute: bool,
    pub segments: Vec<String>,
}

impl CompositePath {
    /// Parse and normalize a raw composite path.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::InvalidPath {
                path: raw.into(),
                reason: "empty path",
            });
        }
        if raw.contains('\0') {
            return Err(Error::InvalidPath {
                path: raw.into(),
                reason: "null byte",
            });
        }
        let cleaned = to_slashes(raw);
        let absolute = cleaned.starts_with('/');
        let mut segments = Vec::new();
        for seg in cleaned.split('/') {
            match seg {
                "" | "." => continue,
                ".." => {
                    return Err(Error::InvalidPath {
                        path: raw.into(),
                        reason: "`..` segment",
                    })
                }
                s => segments.push(s.to_string()),
            }
        }
        Ok(CompositePath { absolute, segments })
    }

    /// Render back to a normalized string form.
    pub fn display(&self) -> String {
        let joined = self.segments.join("/");
        if self.absolute {
            format!("/{joined}")
        } else {
            joined
        }
    }
}

// ── Entry names ───────────────────────────────────────────────────────────────

/// Normalize a name for use inside an entry store.
///
/// Strips any leading `/` or `./`, collapses `//`, rejects `..`, and trims a
/// trailing `/` (directory entries are stored without it).
pub fn normalize_entry_name(raw: &str) -> Result<String> {
    if raw.contains('\0') {
        return Err(Error::InvalidPath {
            path: raw.into(),
            reason: "null byte",
        });
    }
    let cleaned = to_slashes(raw);
    let mut parts = Vec::new();
    for seg in cleaned.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                return Err(Error::InvalidPath {
                    path: raw.into(),
                    reason: "`..` segment",
                })
            }
            s => parts.push(s),
        }
    }
    Ok(parts.join("/"))
}

/// Join a store prefix and a child name (`""` prefix means the store root).
pub fn join_entry(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// The final component of an entry name or composite segment.
pub fn base_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn to_slashes(raw: &str) -> String {
    if std::path::MAIN_SEPARATOR != '/' {
        raw.replace(std::path::MAIN_SEPARATOR, "/")
    } else {
        raw.to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
