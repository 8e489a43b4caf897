//! ZIP containers: central-directory load, per-member deflate, DOS mtimes.

use std::io::{self, Read};
use std::path::PathBuf;

use chrono::{Datelike, Timelike};
use zip::read::ZipArchive;
use zip::result::ZipError;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::entry::{ContentSource, Entry, EntryKind, EntryStore, OriginalRef};
use crate::error::{Error, Result};
use crate::handler::{ArchiveHandler, Capabilities, EntryReader, ReadSeek, ReopenFn, WriteSeek};
use crate::path::{base_name, normalize_entry_name};
use crate::spill::SpillBuf;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

pub struct ZipHandler {
    spill_threshold: usize,
    temp_dir: PathBuf,
}

impl ZipHandler {
    pub fn new(spill_threshold: usize, temp_dir: PathBuf) -> Self {
        ZipHandler {
            spill_threshold,
            temp_dir,
        }
    }
}

impl ArchiveHandler for ZipHandler {
    fn format_name(&self) -> &'static str {
        "zip"
    }

    fn load(&self, src: Box<dyn ReadSeek>, container_name: &str) -> Result<EntryStore> {
        let mut za = ZipArchive::new(src).map_err(|e| zip_err(container_name, e))?;
        let mut store = EntryStore::new();
        for i in 0..za.len() {
            let mut f = za.by_index(i).map_err(|e| zip_err(container_name, e))?;
            let raw_name = f.name().to_string();
            let name = normalize_entry_name(&raw_name).map_err(|_| {
                Error::format(container_name, format!("unsafe member name {raw_name:?}"))
            })?;
            if name.is_empty() {
                continue;
            }
            let mtime = f.last_modified().and_then(dos_to_unix);
            let mode = f.unix_mode();
            // Permission bits only; the type bits already drove the kind.
            let perm = mode.map(|m| m & 0o7777);
            let entry = if f.is_dir() {
                Entry {
                    name,
                    kind: EntryKind::Dir,
                    size: 0,
                    mtime,
                    mode: perm,
                    link_target: None,
                    source: ContentSource::Original(OriginalRef::ZipIndex(i)),
                }
            } else if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
                let mut target = String::new();
                f.read_to_string(&mut target)
                    .map_err(|e| Error::format(container_name, e.to_string()))?;
                Entry {
                    name,
                    kind: EntryKind::Symlink,
                    size: target.len() as u64,
                    mtime,
                    mode: perm,
                    link_target: Some(target),
                    source: ContentSource::Original(OriginalRef::ZipIndex(i)),
                }
            } else {
                Entry {
                    name,
                    kind: EntryKind::File,
                    size: f.size(),
                    mtime,
                    mode: perm,
                    link_target: None,
                    source: ContentSource::Original(OriginalRef::ZipIndex(i)),
                }
            };
            store.insert_original(entry);
        }
        tracing::debug!(container = %container_name, members = store.len_live(), "loaded zip central directory");
        Ok(store)
    }

    fn open_entry(&self, src: Box<dyn ReadSeek>, entry: &Entry) -> Result<EntryReader> {
        let ContentSource::Original(OriginalRef::ZipIndex(index)) = entry.source else {
            return Err(Error::State("entry content is not in the backing zip"));
        };
        let mut za = ZipArchive::new(src).map_err(|e| zip_err(&entry.name, e))?;
        let mut f = za.by_index(index).map_err(|e| zip_err(&entry.name, e))?;
        // The zip reader borrows the archive, so the decoded member is
        // staged out before handing back an independent seekable stream.
        let mut spill = SpillBuf::new(self.spill_threshold, &self.temp_dir, base_name(&entry.name));
        io::copy(&mut f, &mut spill).map_err(|e| Error::format(&entry.name, e.to_string()))?;
        let blob = spill.freeze()?;
        Ok(EntryReader::Seekable(Box::new(blob.reader()?)))
    }

    fn serialize(
        &self,
        store: &EntryStore,
        reopen: &mut ReopenFn<'_>,
        sink: &mut dyn WriteSeek,
    ) -> Result<()> {
        let mut original: Option<ZipArchive<Box<dyn ReadSeek>>> = None;
        let mut zw = ZipWriter::new(sink);
        for e in store.iter_live() {
            let mut opts = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .last_modified_time(unix_to_dos(e.mtime));
            if let Some(mode) = e.mode {
                opts = opts.unix_permissions(mode);
            }
            match e.kind {
                EntryKind::Dir => {
                    zw.add_directory(e.name.as_str(), opts)
                        .map_err(|err| zip_err(&e.name, err))?;
                }
                EntryKind::Symlink => {
                    let Some(target) = e.link_target.as_deref() else {
                        tracing::debug!(name = %e.name, "symlink entry without target skipped");
                        continue;
                    };
                    zw.add_symlink(e.name.as_str(), target, opts)
                        .map_err(|err| zip_err(&e.name, err))?;
                }
                EntryKind::File => {
                    zw.start_file(e.name.as_str(), opts)
                        .map_err(|err| zip_err(&e.name, err))?;
                    match &e.source {
                        ContentSource::Overlay(blob) => {
                            io::copy(&mut blob.reader()?, &mut zw)?;
                        }
                        ContentSource::Original(OriginalRef::ZipIndex(i)) => {
                            if original.is_none() {
                                original = Some(
                                    ZipArchive::new(reopen()?)
                                        .map_err(|err| zip_err(&e.name, err))?,
                                );
                            }
                            let za = original.as_mut().expect("archive just opened");
                            let mut f = za.by_index(*i).map_err(|err| zip_err(&e.name, err))?;
                            io::copy(&mut f, &mut zw)
                                .map_err(|err| Error::format(&e.name, err.to_string()))?;
                        }
                        ContentSource::Original(_) => {
                            return Err(Error::State("zip entry with foreign content source"));
                        }
                        ContentSource::Deleted => unreachable!("iter_live filters tombstones"),
                    }
                }
            }
        }
        zw.finish().map_err(|e| zip_err("zip", e))?;
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            random_read: true,
            append_in_place: false,
        }
    }
}

// ── Time and error conversion ─────────────────────────────────────────────────

fn zip_err(container: &str, e: ZipError) -> Error {
    match e {
        ZipError::Io(io) => Error::Io(io),
        ZipError::FileNotFound => Error::NotFound(container.to_string()),
        other => Error::format(container, other.to_string()),
    }
}

/// DOS timestamps have 2-second resolution and start at 1980; out-of-range
/// times clamp to the DOS epoch.
fn unix_to_dos(ts: Option<u64>) -> zip::DateTime {
    let Some(ts) = ts else {
        return zip::DateTime::default();
    };
    let Some(dt) = chrono::DateTime::from_timestamp(ts as i64, 0) else {
        return zip::DateTime::default();
    };
    let d = dt.naive_utc();
    zip::DateTime::from_date_and_time(
        d.year().clamp(0, u16::MAX as i32) as u16,
        d.month() as u8,
        d.day() as u8,
        d.hour() as u8,
        d.minute() as u8,
        d.second() as u8,
    )
    .unwrap_or_default()
}

fn dos_to_unix(dt: zip::DateTime) -> Option<u64> {
    let date = chrono::NaiveDate::from_ymd_opt(dt.year() as i32, dt.month() as u32, dt.day() as u32)?;
    let time = date.and_hms_opt(dt.hour() as u32, dt.minute() as u32, dt.second() as u32)?;
    let ts = time.and_utc().timestamp();
    (ts >= 0).then_some(ts as u64)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
