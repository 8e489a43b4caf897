//! Extension → handler-factory lookup.
//!
//! Longest extension wins (`x.tar.gz` is a gzip-layered tar, not a bare
//! gzip stream) and matching is case-insensitive. Every `ArchiveFs`
//! instance owns its copy of the table; user registrations shadow defaults
//! for that instance only.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::codec::Codec;
use crate::config::Config;
use crate::handler::single::SingleHandler;
use crate::handler::tar::TarHandler;
use crate::handler::zip::ZipHandler;
use crate::handler::ArchiveHandler;

pub type HandlerFactory = Arc<dyn Fn(&Config) -> Box<dyn ArchiveHandler> + Send + Sync>;

#[derive(Clone)]
pub struct Registry {
    table: IndexMap<String, HandlerFactory>,
}

impl Registry {
    /// The default format table: zip, tar (plain and codec-layered), and the
    /// bare compression streams.
    pub fn with_defaults() -> Self {
        let mut r = Registry {
            table: IndexMap::new(),
        };
        r.register("zip", Arc::new(|c: &Config| {
            Box::new(ZipHandler::new(c.global_buffer_size, c.temp_dir())) as Box<dyn ArchiveHandler>
        }));
        r.register("tar", Arc::new(|c: &Config| {
            Box::new(TarHandler::plain(c.tar.buffer_size)) as Box<dyn ArchiveHandler>
        }));
        for ext in ["tar.gz", "tgz"] {
            r.register(ext, Arc::new(|c: &Config| {
                Box::new(TarHandler::new(vec![Codec::Gzip], c.tar.buffer_size))
                    as Box<dyn ArchiveHandler>
            }));
        }
        for ext in ["tar.bz2", "tbz2"] {
            r.register(ext, Arc::new(|c: &Config| {
                Box::new(TarHandler::new(vec![Codec::Bzip2], c.tar.buffer_size))
                    as Box<dyn ArchiveHandler>
            }));
        }
        for ext in ["tar.xz", "txz"] {
            r.register(ext, Arc::new(|c: &Config| {
                Box::new(TarHandler::new(vec![Codec::Xz], c.tar.buffer_size))
                    as Box<dyn ArchiveHandler>
            }));
        }
        r.register("gz", Arc::new(|c: &Config| {
            Box::new(SingleHandler::new(Codec::Gzip, c.gzip.buffer_size)) as Box<dyn ArchiveHandler>
        }));
        r.register("bz2", Arc::new(|c: &Config| {
            Box::new(SingleHandler::new(Codec::Bzip2, c.bzip2.buffer_size))
                as Box<dyn ArchiveHandler>
        }));
        r.register("xz", Arc::new(|c: &Config| {
            Box::new(SingleHandler::new(Codec::Xz, c.xz.buffer_size)) as Box<dyn ArchiveHandler>
        }));
        r
    }

    /// Register or shadow a handler for an extension (leading dot optional).
    pub fn register(&mut self, extension: &str, factory: HandlerFactory) {
        let key = extension.trim_start_matches('.').to_ascii_lowercase();
        self.table.insert(key, factory);
    }

    /// Longest-extension match against a file name. Returns the matched
    /// extension and its factory.
    pub fn lookup(&self, filename: &str) -> Option<(&str, &HandlerFactory)> {
        let lower = filename.to_ascii_lowercase();
        let mut best: Option<(&str, &HandlerFactory)> = None;
        for (ext, factory) in &self.table {
            // The extension must be a proper suffix: at least one character
            // of stem before the dot.
            if lower.len() > ext.len() + 1 && lower.ends_with(ext.as_str()) {
                let dot = lower.len() - ext.len() - 1;
                if lower.as_bytes()[dot] == b'.' {
                    match best {
                        Some((b, _)) if b.len() >= ext.len() => {}
                        _ => best = Some((ext.as_str(), factory)),
                    }
                }
            }
        }
        best
    }

    /// Exact extension lookup, for explicit format selection.
    pub fn lookup_extension(&self, extension: &str) -> Option<&HandlerFactory> {
        let key = extension.trim_start_matches('.').to_ascii_lowercase();
        self.table.get(&key)
    }

    /// True when the file name matches any registered format.
    pub fn recognizes(&self, filename: &str) -> bool {
        self.lookup(filename).is_some()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("extensions", &self.table.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_extension_wins() {
        let r = Registry::with_defaults();
        let (ext, _) = r.lookup("backup.tar.gz").unwrap();
        assert_eq!(ext, "tar.gz");
        let (ext, _) = r.lookup("note.txt.gz").unwrap();
        assert_eq!(ext, "gz");
    }

    #[test]
    fn matching_is_case_insensitive() {
        let r = Registry::with_defaults();
        let (ext, _) = r.lookup("DATA.ZIP").unwrap();
        assert_eq!(ext, "zip");
        let (ext, _) = r.lookup("Backup.Tar.GZ").unwrap();
        assert_eq!(ext, "tar.gz");
    }

    #[test]
    fn bare_extension_does_not_match() {
        let r = Registry::with_defaults();
        assert!(r.lookup(".gz").is_none());
        assert!(r.lookup("gz").is_none());
        assert!(r.lookup("notes.txt").is_none());
    }

    #[test]
    fn user_registration_shadows_default() {
        let mut r = Registry::with_defaults();
        let marker: HandlerFactory = Arc::new(|c: &Config| {
            Box::new(crate::handler::tar::TarHandler::plain(c.tar.buffer_size))
                as Box<dyn ArchiveHandler>
        });
        r.register(".ZIP", marker);
        let (_, factory) = r.lookup("a.zip").unwrap();
        let handler = factory(&Config::default());
        assert_eq!(handler.format_name(), "tar");
    }
}
