//! Streaming codec layer: gzip, bzip2 and xz, stackable over any byte stream.
//!
//! Decoding wraps a raw reader and yields plain bytes lazily; encoding wraps
//! a sink and accepts plain bytes with no known final size, which TAR+codec
//! rebuild depends on. Corrupt input surfaces as an I/O error at the first
//! read that cannot produce output.

use std::io::{self, Read, Write};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

const XZ_LEVEL: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Gzip,
    Bzip2,
    Xz,
}

impl Codec {
    /// Codec for a bare compression extension (`gz`, `bz2`, `xz`).
    pub fn from_extension(ext: &str) -> Option<Codec> {
        match ext {
            "gz" => Some(Codec::Gzip),
            "bz2" => Some(Codec::Bzip2),
            "xz" => Some(Codec::Xz),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::Gzip => "gzip",
            Codec::Bzip2 => "bzip2",
            Codec::Xz => "xz",
        }
    }

    /// The extension this codec strips from a container name
    /// (`note.txt.gz` → `note.txt`).
    pub fn extension(&self) -> &'static str {
        match self {
            Codec::Gzip => "gz",
            Codec::Bzip2 => "bz2",
            Codec::Xz => "xz",
        }
    }

    /// Wrap a raw stream, yielding decoded plain bytes.
    pub fn decode<'a>(&self, raw: Box<dyn Read + 'a>) -> Box<dyn Read + 'a> {
        match self {
            Codec::Gzip => Box::new(GzDecoder::new(raw)),
            Codec::Bzip2 => Box::new(BzDecoder::new(raw)),
            Codec::Xz => Box::new(XzDecoder::new(raw)),
        }
    }

    /// Wrap a sink; plain bytes written in become encoded bytes out.
    /// `finish_stream` must be called to flush the codec trailer.
    pub fn encode<'a>(&self, sink: Box<dyn Write + 'a>) -> Box<dyn FinishWrite + 'a> {
        match self {
            Codec::Gzip => Box::new(GzEncoder::new(sink, flate2::Compression::default())),
            Codec::Bzip2 => Box::new(BzEncoder::new(sink, bzip2::Compression::default())),
            Codec::Xz => Box::new(XzEncoder::new(sink, XZ_LEVEL)),
        }
    }
}

/// A write sink with an explicit end-of-stream step.
pub trait FinishWrite: Write {
    fn finish_stream(self: Box<Self>) -> io::Result<()>;
}

impl<W: Write> FinishWrite for GzEncoder<W> {
    fn finish_stream(self: Box<Self>) -> io::Result<()> {
        self.finish().map(|_| ())
    }
}

impl<W: Write> FinishWrite for BzEncoder<W> {
    fn finish_stream(self: Box<Self>) -> io::Result<()> {
        self.finish().map(|_| ())
    }
}

impl<W: Write> FinishWrite for XzEncoder<W> {
    fn finish_stream(self: Box<Self>) -> io::Result<()> {
        self.finish().map(|_| ())
    }
}

/// Identity sink for codec-less chains.
pub struct PlainSink<W: Write>(pub W);

impl<W: Write> Write for PlainSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write> FinishWrite for PlainSink<W> {
    fn finish_stream(mut self: Box<Self>) -> io::Result<()> {
        self.0.flush()
    }
}

// ── Chaining ──────────────────────────────────────────────────────────────────

/// Layer decoders over a raw stream. `codecs[0]` sits directly on the raw
/// bytes; later entries decode the output of earlier ones.
pub fn decode_chain<'a>(codecs: &[Codec], raw: Box<dyn Read + 'a>) -> Box<dyn Read + 'a> {
    let mut r = raw;
    for c in codecs {
        r = c.decode(r);
    }
    r
}

/// Layer encoders over a sink, mirroring [`decode_chain`].
pub fn encode_chain<'a>(codecs: &[Codec], sink: Box<dyn Write + 'a>) -> Box<dyn FinishWrite + 'a> {
    let mut codecs = codecs.iter().rev();
    let Some(first) = codecs.next() else {
        return Box::new(PlainSink(sink));
    };
    let mut w = first.encode(sink);
    for c in codecs {
        w = c.encode(Box::new(w));
    }
    w
}

// ── Tests ─────────────────────────────────────────────────────────────────────
