//! Spill-to-temp staging buffers.
//!
//! A [`SpillBuf`] accumulates bytes in memory until the configured threshold,
//! then transparently migrates to a uniquely named temp file
//! (`arcfs-<random>-<tag>`). Freezing yields a [`Blob`]: a cheap-to-clone,
//! read-only handle used for overlays, materialized nested containers, and
//! rebuild sinks. Temp files are removed when the last Blob clone drops.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;

// ── SpillBuf ──────────────────────────────────────────────────────────────────

pub struct SpillBuf {
    state: State,
    threshold: usize,
    temp_dir: PathBuf,
    tag: String,
}

enum State {
    Mem(Cursor<Vec<u8>>),
    Temp(NamedTempFile),
}

impl SpillBuf {
    pub fn new(threshold: usize, temp_dir: impl AsRef<Path>, tag: &str) -> Self {
        SpillBuf {
            state: State::Mem(Cursor::new(Vec::new())),
            threshold,
            temp_dir: temp_dir.as_ref().to_path_buf(),
            tag: tag.to_string(),
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> u64 {
        match &self.state {
            State::Mem(c) => c.get_ref().len() as u64,
            State::Temp(f) => f.as_file().metadata().map(|m| m.len()).unwrap_or(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once the buffer has migrated to a temp file.
    pub fn spilled(&self) -> bool {
        matches!(self.state, State::Temp(_))
    }

    fn migrate(&mut self) -> io::Result<()> {
        let State::Mem(cursor) = &mut self.state else {
            return Ok(());
        };
        let pos = cursor.position();
        let mut file = tempfile::Builder::new()
            .prefix("arcfs-")
            .suffix(&format!("-{}", self.tag))
            .tempfile_in(&self.temp_dir)?;
        file.write_all(cursor.get_ref())?;
        file.seek(SeekFrom::Start(pos))?;
        tracing::debug!(tag = %self.tag, bytes = cursor.get_ref().len(), "staging buffer spilled to temp file");
        self.state = State::Temp(file);
        Ok(())
    }

    /// Finish writing and turn the buffer into a shareable read-only blob.
    pub fn freeze(self) -> io::Result<Blob> {
        match self.state {
            State::Mem(cursor) => Ok(Blob::from_vec(cursor.into_inner())),
            State::Temp(mut file) => {
                file.flush()?;
                Ok(Blob {
                    inner: BlobInner::Temp(Arc::new(file)),
                })
            }
        }
    }
}

impl Write for SpillBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let State::Mem(cursor) = &self.state {
            let projected = cursor.get_ref().len() + buf.len();
            if projected > self.threshold {
                self.migrate()?;
            }
        }
        match &mut self.state {
            State::Mem(cursor) => cursor.write(buf),
            State::Temp(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.state {
            State::Mem(cursor) => cursor.flush(),
            State::Temp(file) => file.flush(),
        }
    }
}

impl Seek for SpillBuf {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.state {
            State::Mem(cursor) => cursor.seek(pos),
            State::Temp(file) => file.seek(pos),
        }
    }
}

// ── Blob ──────────────────────────────────────────────────────────────────────

/// Read-only frozen contents of a [`SpillBuf`]. Clones share storage.
#[derive(Clone)]
pub struct Blob {
    inner: BlobInner,
}

#[derive(Clone)]
enum BlobInner {
    Mem(Arc<[u8]>),
    Temp(Arc<NamedTempFile>),
}

impl Blob {
    pub fn empty() -> Self {
        Blob::from_vec(Vec::new())
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Blob {
            inner: BlobInner::Mem(bytes.into()),
        }
    }

    pub fn len(&self) -> u64 {
        match &self.inner {
            BlobInner::Mem(b) => b.len() as u64,
            BlobInner::Temp(f) => f.as_file().metadata().map(|m| m.len()).unwrap_or(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open an independent positioned reader over the blob.
    pub fn reader(&self) -> io::Result<BlobReader> {
        match &self.inner {
            BlobInner::Mem(b) => Ok(BlobReader::Mem(Cursor::new(b.clone()))),
            BlobInner::Temp(f) => Ok(BlobReader::File(f.reopen()?)),
        }
    }

    pub fn read_to_vec(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.len() as usize);
        self.reader()?.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            BlobInner::Mem(b) => write!(f, "Blob::Mem({} bytes)", b.len()),
            BlobInner::Temp(_) => write!(f, "Blob::Temp({} bytes)", self.len()),
        }
    }
}

pub enum BlobReader {
    Mem(Cursor<Arc<[u8]>>),
    File(File),
}

impl Read for BlobReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            BlobReader::Mem(c) => c.read(buf),
            BlobReader::File(f) => f.read(buf),
        }
    }
}

impl Seek for BlobReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            BlobReader::Mem(c) => c.seek(pos),
            BlobReader::File(f) => f.seek(pos),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_write_stays_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = SpillBuf::new(1024, dir.path(), "t");
        buf.write_all(b"hello").unwrap();
        assert!(!buf.spilled());
        let blob = buf.freeze().unwrap();
        assert_eq!(blob.read_to_vec().unwrap(), b"hello");
    }

    #[test]
    fn large_write_spills_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = SpillBuf::new(16, dir.path(), "t");
        let data = vec![7u8; 100];
        buf.write_all(&data).unwrap();
        assert!(buf.spilled());
        let blob = buf.freeze().unwrap();
        assert_eq!(blob.len(), 100);
        assert_eq!(blob.read_to_vec().unwrap(), data);
    }

    #[test]
    fn blob_readers_are_independent() {
        let blob = Blob::from_vec(b"abcdef".to_vec());
        let mut r1 = blob.reader().unwrap();
        let mut r2 = blob.reader().unwrap();
        let mut a = [0u8; 3];
        r1.read_exact(&mut a).unwrap();
        let mut b = [0u8; 6];
        r2.read_exact(&mut b).unwrap();
        assert_eq!(&a, b"abc");
        assert_eq!(&b, b"abcdef");
    }

    #[test]
    fn seek_rewrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = SpillBuf::new(1024, dir.path(), "t");
        buf.write_all(b"xxxxxx").unwrap();
        buf.seek(SeekFrom::Start(2)).unwrap();
        buf.write_all(b"yy").unwrap();
        let blob = buf.freeze().unwrap();
        assert_eq!(blob.read_to_vec().unwrap(), b"xxyyxx");
    }
}
