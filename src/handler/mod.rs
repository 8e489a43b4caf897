//! The uniform contract over heterogeneous container formats.
//!
//! Each format implements [`ArchiveHandler`]: scan a backing stream into an
//! entry store, open one entry's decoded content, and serialize a store's
//! live entries into a fresh container. Handlers are stateless; per-call
//! streams come from the owning archive handle's backing supplier.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::entry::{Entry, EntryStore};
use crate::error::{Error, Result};

pub mod single;
pub mod tar;
pub mod zip;

// ── Stream traits ─────────────────────────────────────────────────────────────

pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

pub trait WriteSeek: Write + Seek {}
impl<T: Write + Seek> WriteSeek for T {}

/// Supplier of fresh readers over an archive's current backing bytes.
pub type ReopenFn<'a> = dyn FnMut() -> Result<Box<dyn ReadSeek>> + 'a;

// ── Entry readers ─────────────────────────────────────────────────────────────

/// Decoded content of one entry. Random-read formats yield a seekable
/// reader; codec-backed content is sequential.
pub enum EntryReader {
    Seekable(Box<dyn ReadSeek>),
    Sequential(Box<dyn Read>),
}

impl EntryReader {
    pub fn is_seekable(&self) -> bool {
        matches!(self, EntryReader::Seekable(_))
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        match self {
            EntryReader::Seekable(r) => Ok(r.seek(pos)?),
            EntryReader::Sequential(_) => Err(Error::State("stream does not support seeking")),
        }
    }

    pub fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            EntryReader::Seekable(r) => r.read(buf),
            EntryReader::Sequential(r) => r.read(buf),
        }
    }
}

// ── Capabilities ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Entries can be opened at arbitrary positions without a full rescan.
    pub random_read: bool,
    /// In-place append is never offered; mutation is always a rebuild.
    pub append_in_place: bool,
}

// ── Handler contract ──────────────────────────────────────────────────────────

pub trait ArchiveHandler {
    fn format_name(&self) -> &'static str;

    /// Scan the container and build its entry index. Content sources
    /// reference positions in the backing stream, not loaded bytes.
    fn load(&self, src: Box<dyn ReadSeek>, container_name: &str) -> Result<EntryStore>;

    /// Yield the decoded content of an entry whose source is `Original`.
    fn open_entry(&self, src: Box<dyn ReadSeek>, entry: &Entry) -> Result<EntryReader>;

    /// Write a fresh container holding the store's live entries in order.
    /// Original content is pulled through `reopen` (the *current* backing
    /// bytes); overlay content comes from the entries themselves.
    fn serialize(
        &self,
        store: &EntryStore,
        reopen: &mut ReopenFn<'_>,
        sink: &mut dyn WriteSeek,
    ) -> Result<()>;

    fn capabilities(&self) -> Capabilities;
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Discard `n` bytes from a sequential reader.
pub(crate) fn skip_bytes(r: &mut dyn Read, mut n: u64, chunk: usize) -> io::Result<()> {
    let mut buf = vec![0u8; chunk.max(1)];
    while n > 0 {
        let want = buf.len().min(n as usize);
        let got = r.read(&mut buf[..want])?;
        if got == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended while skipping",
            ));
        }
        n -= got as u64;
    }
    Ok(())
}

/// Classify a stream error: decoder-reported corruption becomes a format
/// error attributed to the container, anything else stays I/O.
pub(crate) fn stream_error(container: &str, e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            Error::format(container, e.to_string())
        }
        _ => Error::Io(e),
    }
}
