//! ZIP archive codec.
//!
//! This module reads and writes the ZIP container format used by JAR files.
//!
//! ## Architecture
//!
//! - `structures`: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - `parser`: Low-level parsing of ZIP structures from raw bytes
//! - `reader`: [`ZipArchive`], entry enumeration and streaming decompression
//! - `writer`: [`ZipWriter`], streaming compression into a seekable sink
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! Entry names use forward slashes; directories are zero-length entries whose
//! name ends with `/`.
//!
//! ## Supported Features
//!
//! - STORED and DEFLATE compression methods
//! - ZIP64 archives on the read side
//! - MS-DOS timestamps plus the extended timestamp (`UT`) extra field
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - The writer refuses output that would need ZIP64 records

mod parser;
mod reader;
mod structures;
mod writer;

pub use parser::ZipParser;
pub use reader::{EntryReader, ZipArchive};
pub use structures::*;
pub use writer::ZipWriter;
