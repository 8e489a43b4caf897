//! Bare compression streams (`.gz`, `.bz2`, `.xz`) presented as archives
//! containing exactly one entry: the container name minus the codec
//! extension. Writing the container rewrites that sole entry.

use std::io::{self, Read};

use crate::codec::{Codec, FinishWrite};
use crate::entry::{ContentSource, Entry, EntryKind, EntryStore, OriginalRef};
use crate::error::{Error, Result};
use crate::handler::{
    stream_error, ArchiveHandler, Capabilities, EntryReader, ReadSeek, ReopenFn, WriteSeek,
};
use crate::path::base_name;

pub struct SingleHandler {
    codec: Codec,
    chunk: usize,
}

impl SingleHandler {
    pub fn new(codec: Codec, chunk: usize) -> Self {
        SingleHandler { codec, chunk }
    }

    /// `note.txt.gz` → `note.txt`; a bare `.gz` falls back to `data`.
    fn inner_name(&self, container_name: &str) -> String {
        let base = base_name(container_name);
        let suffix = format!(".{}", self.codec.extension());
        let stripped = if base.to_ascii_lowercase().ends_with(&suffix) {
            &base[..base.len() - suffix.len()]
        } else {
            base
        };
        if stripped.is_empty() {
            "data".to_string()
        } else {
            stripped.to_string()
        }
    }

    fn count_decoded(&self, r: &mut dyn Read, container_name: &str) -> Result<u64> {
        let mut buf = vec![0u8; self.chunk.max(1)];
        let mut total = 0u64;
        loop {
            let n = r.read(&mut buf).map_err(|e| stream_error(container_name, e))?;
            if n == 0 {
                return Ok(total);
            }
            total += n as u64;
        }
    }
}

impl ArchiveHandler for SingleHandler {
    fn format_name(&self) -> &'static str {
        self.codec.name()
    }

    fn load(&self, src: Box<dyn ReadSeek>, container_name: &str) -> Result<EntryStore> {
        // No index to read: a full decode pass establishes the logical size.
        let (size, mtime) = match self.codec {
            Codec::Gzip => {
                let mut dec = flate2::read::GzDecoder::new(src);
                let size = self.count_decoded(&mut dec, container_name)?;
                let mtime = dec
                    .header()
                    .map(|h| h.mtime() as u64)
                    .filter(|m| *m != 0);
                (size, mtime)
            }
            _ => {
                let mut dec = self.codec.decode(Box::new(src));
                (self.count_decoded(&mut dec, container_name)?, None)
            }
        };
        let mut store = EntryStore::new();
        store.insert_original(Entry {
            name: self.inner_name(container_name),
            kind: EntryKind::File,
            size,
            mtime,
            mode: None,
            link_target: None,
            source: ContentSource::Original(OriginalRef::Whole),
        });
        Ok(store)
    }

    fn open_entry(&self, src: Box<dyn ReadSeek>, entry: &Entry) -> Result<EntryReader> {
        let ContentSource::Original(OriginalRef::Whole) = entry.source else {
            return Err(Error::State("entry content is not in the backing stream"));
        };
        Ok(EntryReader::Sequential(self.codec.decode(Box::new(src))))
    }

    fn serialize(
        &self,
        store: &EntryStore,
        reopen: &mut ReopenFn<'_>,
        sink: &mut dyn WriteSeek,
    ) -> Result<()> {
        let mut files = store.iter_live().filter(|e| e.kind == EntryKind::File);
        let entry = files.next();
        if files.next().is_some() {
            return Err(Error::State(
                "a compressed stream holds exactly one entry",
            ));
        }
        let mut enc = self.codec.encode(Box::new(sink));
        if let Some(e) = entry {
            match &e.source {
                ContentSource::Overlay(blob) => {
                    io::copy(&mut blob.reader()?, &mut enc)?;
                }
                ContentSource::Original(OriginalRef::Whole) => {
                    let mut r = self.open_entry(reopen()?, e)?;
                    io::copy(&mut r, &mut enc).map_err(|err| stream_error(&e.name, err))?;
                }
                ContentSource::Original(_) => {
                    return Err(Error::State("codec entry with foreign content source"));
                }
                ContentSource::Deleted => unreachable!("iter_live filters tombstones"),
            }
        }
        enc.finish_stream()?;
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            random_read: false,
            append_in_place: false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spill::Blob;
    use std::io::{Cursor, Write};

    fn no_backing() -> impl FnMut() -> Result<Box<dyn ReadSeek>> {
        || Err(Error::State("no backing"))
    }

    #[test]
    fn gzip_container_presents_one_entry() {
        let mut raw = Vec::new();
        {
            let mut enc = flate2::GzBuilder::new()
                .mtime(1_600_000_000)
                .write(&mut raw, flate2::Compression::default());
            enc.write_all(b"hello stream").unwrap();
            enc.finish().unwrap();
        }
        let h = SingleHandler::new(Codec::Gzip, 8 * 1024);
        let store = h.load(Box::new(Cursor::new(raw.clone())), "note.txt.gz").unwrap();
        let names: Vec<&str> = store.iter_live().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["note.txt"]);
        let e = store.get("note.txt").unwrap();
        assert_eq!(e.size, 12);
        // The gzip header carries the stream's mtime.
        assert_eq!(e.mtime, Some(1_600_000_000));
        let mut r = h.open_entry(Box::new(Cursor::new(raw)), e).unwrap();
        assert_eq!(r.read_to_vec().unwrap(), b"hello stream");
    }

    #[test]
    fn gzip_without_header_mtime_reports_none() {
        let mut raw = Vec::new();
        {
            let mut enc = flate2::write::GzEncoder::new(&mut raw, flate2::Compression::default());
            enc.write_all(b"x").unwrap();
            enc.finish().unwrap();
        }
        let h = SingleHandler::new(Codec::Gzip, 8 * 1024);
        let store = h.load(Box::new(Cursor::new(raw)), "x.gz").unwrap();
        assert_eq!(store.get("x").unwrap().mtime, None);
    }

    #[test]
    fn rewrite_round_trips() {
        let h = SingleHandler::new(Codec::Xz, 8 * 1024);
        let mut store = EntryStore::new();
        store.put(Entry::file(
            "note.txt",
            4,
            Some(1_600_000_000),
            ContentSource::Overlay(Blob::from_vec(b"data".to_vec())),
        ));
        let mut sink = Cursor::new(Vec::new());
        h.serialize(&store, &mut no_backing(), &mut sink).unwrap();

        let bytes = sink.into_inner();
        let loaded = h.load(Box::new(Cursor::new(bytes.clone())), "note.txt.xz").unwrap();
        let e = loaded.get("note.txt").unwrap();
        let mut r = h.open_entry(Box::new(Cursor::new(bytes)), e).unwrap();
        assert_eq!(r.read_to_vec().unwrap(), b"data");
    }

    #[test]
    fn two_entries_refuse_to_serialize() {
        let h = SingleHandler::new(Codec::Gzip, 8 * 1024);
        let mut store = EntryStore::new();
        store.put(Entry::file("a", 0, None, ContentSource::Overlay(Blob::empty())));
        store.put(Entry::file("b", 0, None, ContentSource::Overlay(Blob::empty())));
        let mut sink = Cursor::new(Vec::new());
        assert!(matches!(
            h.serialize(&store, &mut no_backing(), &mut sink),
            Err(Error::State(_))
        ));
    }

    #[test]
    fn name_stripping() {
        let h = SingleHandler::new(Codec::Bzip2, 8 * 1024);
        assert_eq!(h.inner_name("logs/archive.tar.bz2"), "archive.tar");
        assert_eq!(h.inner_name("plain.bz2"), "plain");
        assert_eq!(h.inner_name("noext"), "noext");
    }
}
