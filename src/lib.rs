//! # jarpack
//!
//! Pack directory trees into JAR/ZIP archives, unpack them again, and
//! relocate package prefixes inside existing archives.
//!
//! Every operation takes a [`JarConfig`] from the caller; there is no global
//! state. Packing and unpacking stream each entry through one fixed-size
//! buffer, so memory use does not grow with file size.
//!
//! ## Features
//!
//! - Deterministic forward-slash entry names with explicit directory entries
//! - STORED and DEFLATE compression, levels compatible with `java.util.zip`
//! - Modification times preserved through the extended timestamp field
//! - Per-entry error policy: skip-and-record or fail fast
//! - CRC-32 verification and path traversal protection on extraction
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use jarpack::{CompressionLevel, JarConfig};
//!
//! fn main() -> jarpack::Result<()> {
//!     let config = JarConfig {
//!         compression: CompressionLevel::Best,
//!         ..JarConfig::default()
//!     };
//!
//!     let jar = jarpack::pack(Path::new("build/classes"), Path::new("app.jar"), &config)?;
//!     let files = jarpack::unpack(&jar, Path::new("unpacked"), &config)?;
//!     for file in &files {
//!         println!("{}", file.display());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod pack;
pub mod relocate;
pub mod unpack;
pub mod zip;

use std::path::{Path, PathBuf};

pub use cli::Cli;
pub use config::{CompressionLevel, ErrorPolicy, JarConfig};
pub use error::{EntryFailure, Error, Result};
pub use io::{LocalFileReader, ReadAt};
pub use pack::{PackReport, Packer};
pub use relocate::{remap, PathRelocator, Relocation, RelocationMap, Relocator};
pub use unpack::{UnpackReport, Unpacker};
pub use zip::{ZipArchive, ZipFileEntry, ZipWriter};

/// Pack `source` into the archive at `destination` and return its path.
///
/// Entries that fail under [`ErrorPolicy::Continue`] are logged and left
/// out; use [`Packer`] directly to inspect them.
pub fn pack(source: &Path, destination: &Path, config: &JarConfig) -> Result<PathBuf> {
    Packer::new(source, destination, config)?
        .run()
        .map(|report| report.archive)
}

/// Extract `archive` into `destination`, returning the absolute paths of
/// the extracted files in archive order.
pub fn unpack(archive: &Path, destination: &Path, config: &JarConfig) -> Result<Vec<PathBuf>> {
    Unpacker::new(archive, destination, config)?
        .run()
        .map(|report| report.files)
}
