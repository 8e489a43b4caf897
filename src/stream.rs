//! File-like streams over composite paths.
//!
//! Read streams are independent of the session that resolved them: the
//! bytes come from the real filesystem, an overlay blob, or a materialized
//! member. Write streams accumulate through a spill buffer and stage their
//! bytes on `close()`; an ephemeral stream also commits, a session-scoped
//! stream defers to the session's commit.

use std::io::{self, Read, SeekFrom, Write};

use crate::error::{Error, Result};
use crate::handler::EntryReader;
use crate::session::Session;
use crate::spill::SpillBuf;

// ── ReadStream ────────────────────────────────────────────────────────────────

pub struct ReadStream {
    inner: EntryReader,
    len: Option<u64>,
}

impl ReadStream {
    pub(crate) fn new(inner: EntryReader, len: Option<u64>) -> Self {
        ReadStream { inner, len }
    }

    /// Decoded length, when the source knows it up front.
    pub fn len(&self) -> Option<u64> {
        self.len
    }

    pub fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }

    /// Random access where the underlying handler supports it; a codec-backed
    /// sequential stream reports a state error instead.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.inner.seek(pos)
    }

    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut out = match self.len {
            Some(n) => Vec::with_capacity(n as usize),
            None => Vec::new(),
        };
        self.inner.read_to_end(&mut out)?;
        Ok(out)
    }

    pub fn read_all_string(&mut self) -> Result<String> {
        let bytes = self.read_all()?;
        String::from_utf8(bytes).map_err(|_| Error::format("stream", "invalid UTF-8"))
    }
}

impl Read for ReadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

// ── WriteStream ───────────────────────────────────────────────────────────────

pub(crate) enum SessionRef<'s, 'fs> {
    /// The stream owns its session and commits on close.
    Owned(Session<'fs>),
    /// The stream stages into a caller-held session; commit is deferred.
    Borrowed(&'s mut Session<'fs>),
}

pub struct WriteStream<'s, 'fs> {
    sess: Option<SessionRef<'s, 'fs>>,
    path: String,
    buf: Option<SpillBuf>,
    append: bool,
    closed: bool,
}

impl<'s, 'fs> WriteStream<'s, 'fs> {
    pub(crate) fn create(
        mut sess: SessionRef<'s, 'fs>,
        path: &str,
        append: bool,
    ) -> Result<Self> {
        let session: &mut Session<'fs> = match &mut sess {
            SessionRef::Owned(s) => s,
            SessionRef::Borrowed(s) => s,
        };
        // Surface IsADirectory/InvalidPath at open time, not at close.
        session.check_write_target(path)?;
        let cfg = session.config();
        let buf = SpillBuf::new(
            cfg.global_buffer_size,
            cfg.temp_dir(),
            crate::path::base_name(path),
        );
        Ok(WriteStream {
            sess: Some(sess),
            path: path.to_string(),
            buf: Some(buf),
            append,
            closed: false,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.buf.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    /// Stage the accumulated bytes and, for an ephemeral stream, rebuild and
    /// replace the target. Dropping without close discards the bytes.
    pub fn close(mut self) -> Result<()> {
        let buf = self
            .buf
            .take()
            .ok_or(Error::State("write stream already closed"))?;
        let mut sess = self
            .sess
            .take()
            .ok_or(Error::State("write stream already closed"))?;
        self.closed = true;
        let session: &mut Session<'fs> = match &mut sess {
            SessionRef::Owned(s) => s,
            SessionRef::Borrowed(s) => s,
        };
        if self.append {
            let bytes = buf.freeze()?.read_to_vec()?;
            session.append(&self.path, &bytes)?;
        } else {
            let blob = buf.freeze()?;
            session.write_blob(&self.path, blob, Some(crate::now_unix_ts()))?;
        }
        match sess {
            SessionRef::Owned(s) => s.commit(),
            SessionRef::Borrowed(_) => Ok(()),
        }
    }
}

impl Write for WriteStream<'_, '_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match &mut self.buf {
            Some(b) => b.write(data),
            None => Err(io::Error::other("write stream already closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.buf {
            Some(b) => b.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for WriteStream<'_, '_> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::debug!(path = %self.path, "write stream dropped without close; bytes discarded");
        }
    }
}
