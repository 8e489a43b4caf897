//! arcfs: archive containers as one hierarchical namespace.
//!
//! Any path segment naming a recognized archive (ZIP, TAR, TAR under a
//! codec, or a bare compressed stream) is a virtual directory whose
//! children are the archive's entries, to arbitrary nesting depth:
//!
//! ```no_run
//! use arcfs::ArchiveFs;
//!
//! let fs = ArchiveFs::new();
//! fs.write("backup.zip/logs/app.tar.gz/today.log", b"started")?;
//! let names = fs.list_dir("backup.zip/logs")?;
//! let text = fs.read_to_string("backup.zip/logs/app.tar.gz/today.log")?;
//! # Ok::<(), arcfs::Error>(())
//! ```
//!
//! Mutation is copy-on-write: writes and deletes stage overlays in memory
//! (spilling to temp files past a threshold) and commit by rebuilding each
//! dirty container innermost-first, finally replacing the outer file with
//! an atomic rename. [`ArchiveFs::batch_session`] defers that commit across
//! many operations; [`ArchiveFs::transaction`] makes it all-or-nothing
//! across several outer files.

pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod fs;
pub mod handler;
pub mod path;
pub mod registry;
pub mod spill;
pub mod stream;

mod rebuild;
mod resolve;
mod session;

pub use config::{Config, HandlerConfig};
pub use entry::{ContentSource, Entry, EntryInfo, EntryKind, EntryStore, OriginalRef};
pub use error::{Error, Result};
pub use fs::ArchiveFs;
pub use handler::{ArchiveHandler, Capabilities, EntryReader};
pub use registry::{HandlerFactory, Registry};
pub use session::{Session, Transaction, WalkEntry};
pub use spill::Blob;
pub use stream::{ReadStream, WriteStream};

/// Current time as whole seconds since the Unix epoch, the resolution every
/// supported container format can hold. Staged overlays are stamped with this.
pub fn now_unix_ts() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
