use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default spill threshold: overlays and rebuild sinks stay in memory up to
/// this many bytes, then migrate to a temp file.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Default per-handler I/O chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;

/// Per-handler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// I/O chunk size used when streaming entry content.
    #[serde(default = "default_chunk")]
    pub buffer_size: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        HandlerConfig {
            buffer_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

fn default_chunk() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_buffer() -> usize {
    DEFAULT_BUFFER_SIZE
}

/// Instance-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bytes of in-memory staging before a buffer spills to a temp file.
    #[serde(default = "default_buffer")]
    pub global_buffer_size: usize,
    /// Directory for spill and commit temp files. `None` means the OS default.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default)]
    pub zip: HandlerConfig,
    #[serde(default)]
    pub tar: HandlerConfig,
    #[serde(default)]
    pub gzip: HandlerConfig,
    #[serde(default)]
    pub bzip2: HandlerConfig,
    #[serde(default)]
    pub xz: HandlerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            global_buffer_size: DEFAULT_BUFFER_SIZE,
            temp_dir: None,
            zip: HandlerConfig::default(),
            tar: HandlerConfig::default(),
            gzip: HandlerConfig::default(),
            bzip2: HandlerConfig::default(),
            xz: HandlerConfig::default(),
        }
    }
}

impl Config {
    /// Effective temp directory.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
