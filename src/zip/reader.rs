use flate2::read::DeflateDecoder;
use std::io::{self, Read};
use std::path::Path;

use crate::error::{Error, Result};
use crate::io::{LocalFileReader, RangeReader, ReadAt};

use super::parser::ZipParser;
use super::structures::{invalid, CompressionMethod, ZipFileEntry};

/// A ZIP archive opened for reading.
///
/// The central directory is parsed once on open; entry data is streamed on
/// demand through [`open_entry`](Self::open_entry). The underlying file is
/// closed when the archive is dropped.
pub struct ZipArchive<R: ReadAt> {
    parser: ZipParser<R>,
    entries: Vec<ZipFileEntry>,
}

impl ZipArchive<LocalFileReader> {
    pub fn open(path: &Path) -> Result<Self> {
        let reader =
            LocalFileReader::new(path).map_err(|e| Error::io_path("failed to open archive", path, e))?;
        Self::new(reader)
    }
}

impl<R: ReadAt> ZipArchive<R> {
    pub fn new(reader: R) -> Result<Self> {
        let parser = ZipParser::new(reader);
        let entries = parser.list_files()?;
        Ok(Self { parser, entries })
    }

    /// Entries in the order they are stored in the central directory.
    pub fn entries(&self) -> &[ZipFileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn by_name(&self, name: &str) -> Option<&ZipFileEntry> {
        self.entries.iter().find(|e| e.file_name == name)
    }

    /// Open a decompressing stream over an entry's data.
    pub fn open_entry(&self, entry: &ZipFileEntry) -> Result<EntryReader<'_, R>> {
        let data_offset = self.parser.get_data_offset(entry)?;
        let raw = RangeReader::new(self.parser.reader(), data_offset, entry.compressed_size);

        let decoder = match entry.compression_method {
            CompressionMethod::Stored => {
                if entry.compressed_size != entry.uncompressed_size {
                    return Err(invalid(format!(
                        "stored entry {:?} has mismatched sizes",
                        entry.file_name
                    )));
                }
                Decoder::Stored(raw)
            }
            CompressionMethod::Deflate => Decoder::Deflate(DeflateDecoder::new(raw)),
            CompressionMethod::Unknown(method) => {
                return Err(Error::UnsupportedCompression(method));
            }
        };

        Ok(EntryReader {
            decoder,
            hasher: crc32fast::Hasher::new(),
            read: 0,
            expected_crc: entry.crc32,
            expected_size: entry.uncompressed_size,
            name: entry.file_name.clone(),
        })
    }

    /// Read a whole entry into memory. Meant for small entries.
    pub fn read_to_vec(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(entry.uncompressed_size.min(1 << 20) as usize);
        self.open_entry(entry)?.read_to_end(&mut out)?;
        Ok(out)
    }
}

enum Decoder<'a, R: ReadAt> {
    Stored(RangeReader<'a, R>),
    Deflate(DeflateDecoder<RangeReader<'a, R>>),
}

/// Streaming reader over one entry's uncompressed bytes.
///
/// The CRC-32 and size recorded in the central directory are checked once
/// the stream is exhausted; a mismatch surfaces as an `InvalidData` error.
pub struct EntryReader<'a, R: ReadAt> {
    decoder: Decoder<'a, R>,
    hasher: crc32fast::Hasher,
    read: u64,
    expected_crc: u32,
    expected_size: u64,
    name: String,
}

impl<R: ReadAt> EntryReader<'_, R> {
    fn verify(&self) -> io::Result<()> {
        if self.read != self.expected_size {
            return Err(invalid(format!(
                "entry {:?} is {} bytes, expected {}",
                self.name, self.read, self.expected_size
            ))
            .into());
        }
        let crc = self.hasher.clone().finalize();
        if crc != self.expected_crc {
            return Err(invalid(format!(
                "CRC mismatch in entry {:?}: {crc:08x} != {:08x}",
                self.name, self.expected_crc
            ))
            .into());
        }
        Ok(())
    }
}

impl<R: ReadAt> Read for EntryReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = match &mut self.decoder {
            Decoder::Stored(r) => r.read(buf)?,
            Decoder::Deflate(r) => r.read(buf)?,
        };
        if n == 0 {
            self.verify()?;
            return Ok(0);
        }
        self.read += n as u64;
        if self.read > self.expected_size {
            return Err(invalid(format!("entry {:?} is larger than recorded", self.name)).into());
        }
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}
