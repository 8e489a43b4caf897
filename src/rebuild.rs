//! The rebuild/commit engine.
//!
//! Mutation never edits a container in place. Commit walks the dirty
//! handles innermost-first: each nested archive serializes into a staging
//! blob that replaces its entry in the parent store, and each outermost
//! archive serializes into a temp file beside its target. Only after every
//! serialize has succeeded are the temp files renamed over their targets,
//! so a failure anywhere leaves every original byte-identical.

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::config::Config;
use crate::entry::{ContentSource, Entry};
use crate::error::{Error, Result};
use crate::path::base_name;
use crate::resolve::HandleCache;
use crate::spill::SpillBuf;

pub fn commit(cache: &mut HandleCache, config: &Config) -> Result<()> {
    let keys = cache.dirty_keys_innermost_first();
    if keys.is_empty() {
        return Ok(());
    }
    let mut pending: Vec<(NamedTempFile, PathBuf)> = Vec::new();

    for key in keys {
        let handle = cache
            .get(&key)
            .ok_or(Error::State("dirty handle vanished from cache"))?;
        match handle.parent_key.clone() {
            None => {
                let target = handle
                    .target
                    .clone()
                    .ok_or(Error::State("outermost handle has no target path"))?;
                let temp = serialize_to_temp(cache, &key, &target)?;
                pending.push((temp, target));
            }
            Some(parent_key) => {
                let (blob, name) = {
                    let h = cache.get(&key).expect("handle present");
                    let mut sink = SpillBuf::new(
                        config.global_buffer_size,
                        config.temp_dir(),
                        base_name(&h.name),
                    );
                    let mut reopen = || h.backing.reader();
                    h.handler.serialize(&h.store, &mut reopen, &mut sink)?;
                    (sink.freeze()?, h.name.clone())
                };
                tracing::debug!(key = %key, bytes = blob.len(), "rebuilt nested archive");
                let parent = cache
                    .get_mut(&parent_key)
                    .ok_or(Error::State("parent handle vanished from cache"))?;
                parent.store.put(Entry::file(
                    name,
                    blob.len(),
                    Some(crate::now_unix_ts()),
                    ContentSource::Overlay(blob),
                ));
            }
        }
        if let Some(h) = cache.get_mut(&key) {
            h.dirty = false;
        }
    }

    // Every rebuild succeeded; flip the targets over.
    for (temp, target) in pending {
        temp.persist(&target)
            .map_err(|e| Error::path_io(target.clone(), e.error))?;
        tracing::debug!(path = %target.display(), "replaced archive atomically");
    }
    Ok(())
}

fn serialize_to_temp(cache: &HandleCache, key: &str, target: &Path) -> Result<NamedTempFile> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| Error::path_io(dir.clone(), e))?;
    let fname = target
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".into());
    let mut temp = tempfile::Builder::new()
        .prefix("arcfs-")
        .suffix(&format!("-{fname}"))
        .tempfile_in(&dir)
        .map_err(|e| Error::path_io(dir, e))?;

    let h = cache.get(key).expect("handle present");
    let mut reopen = || h.backing.reader();
    h.handler.serialize(&h.store, &mut reopen, temp.as_file_mut())?;
    tracing::debug!(key = %key, temp = %temp.path().display(), "rebuilt outer archive");
    Ok(temp)
}
