use std::fmt;
use std::str::FromStr;

use flate2::Compression;
use log::Level;

use crate::zip::CompressionMethod;

/// Compression applied to file entries.
///
/// Mirrors the `java.util.zip.Deflater` levels: `-1` is the default level,
/// `0` stores entries uncompressed and `1..=9` trade speed for size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    #[default]
    Default,
    Store,
    Fastest,
    Best,
    Level(u32),
}

impl CompressionLevel {
    pub fn from_i32(level: i32) -> Option<Self> {
        match level {
            -1 => Some(CompressionLevel::Default),
            0 => Some(CompressionLevel::Store),
            1..=9 => Some(CompressionLevel::Level(level as u32)),
            _ => None,
        }
    }

    pub fn method(&self) -> CompressionMethod {
        match self {
            CompressionLevel::Store | CompressionLevel::Level(0) => CompressionMethod::Stored,
            _ => CompressionMethod::Deflate,
        }
    }

    pub fn deflate(&self) -> Compression {
        match self {
            CompressionLevel::Default => Compression::default(),
            CompressionLevel::Store => Compression::none(),
            CompressionLevel::Fastest => Compression::fast(),
            CompressionLevel::Best => Compression::best(),
            CompressionLevel::Level(n) => Compression::new((*n).min(9)),
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionLevel::Default => f.write_str("default"),
            CompressionLevel::Store => f.write_str("store"),
            CompressionLevel::Fastest => f.write_str("fast"),
            CompressionLevel::Best => f.write_str("best"),
            CompressionLevel::Level(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for CompressionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(CompressionLevel::Default),
            "store" | "none" => Ok(CompressionLevel::Store),
            "fast" | "fastest" => Ok(CompressionLevel::Fastest),
            "best" | "max" => Ok(CompressionLevel::Best),
            other => other
                .parse::<i32>()
                .ok()
                .and_then(CompressionLevel::from_i32)
                .ok_or_else(|| {
                    format!("invalid compression level {s:?} (expected default, store, fast, best or -1..=9)")
                }),
        }
    }
}

/// What to do when a single entry fails while the rest of the job can go on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop the job and return the entry's error.
    Abort,
    /// Log the failure, record it in the job report and carry on.
    Continue,
}

pub const MIN_BUFFER_SIZE: usize = 1024;
pub const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Per-call settings for packing, unpacking and relocation.
#[derive(Debug, Clone)]
pub struct JarConfig {
    pub compression: CompressionLevel,

    /// Log per-entry progress at info level instead of debug.
    pub debug: bool,

    pub pack_errors: ErrorPolicy,
    pub unpack_errors: ErrorPolicy,

    /// Sort directory children by file name so archives are reproducible.
    pub sort_entries: bool,

    /// Set the modification time of extracted files from the archive.
    pub restore_timestamps: bool,

    /// Transfer buffer size, clamped to 1 KiB..=64 KiB.
    pub buffer_size: usize,
}

impl Default for JarConfig {
    fn default() -> Self {
        Self {
            compression: CompressionLevel::Default,
            debug: false,
            pack_errors: ErrorPolicy::Continue,
            unpack_errors: ErrorPolicy::Abort,
            sort_entries: false,
            restore_timestamps: false,
            buffer_size: 8 * 1024,
        }
    }
}

impl JarConfig {
    pub fn progress_level(&self) -> Level {
        if self.debug { Level::Info } else { Level::Debug }
    }

    pub(crate) fn transfer_buffer(&self) -> Vec<u8> {
        vec![0u8; self.buffer_size.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE)]
    }
}
