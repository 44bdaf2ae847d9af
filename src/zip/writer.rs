use flate2::write::DeflateEncoder;
use std::collections::HashSet;
use std::io::{self, Seek, SeekFrom, Write};
use std::time::SystemTime;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::config::CompressionLevel;
use crate::error::{Error, Result};

use super::structures::{
    CompressionMethod, EndOfCentralDirectory, EntryHeader, LFH_CRC_OFFSET,
};

/// Streaming ZIP writer.
///
/// Entries are written one at a time: [`start_file`](Self::start_file),
/// then any number of `write` calls, then [`close_entry`](Self::close_entry).
/// Sizes and CRC are not known up front, so the local header is written with
/// zeroed fields and patched in place once the entry is closed; this is why
/// the sink must be `Seek`. Nothing is buffered beyond the deflate window.
///
/// The central directory is only written by [`finish`](Self::finish). A
/// writer dropped without finishing leaves an unreadable archive.
pub struct ZipWriter<W: Write + Seek> {
    inner: W,
    /// Stream position of the first archive byte.
    base: u64,
    /// Bytes written since `base`.
    offset: u64,
    level: CompressionLevel,
    headers: Vec<EntryHeader>,
    names: HashSet<String>,
    current: Option<OpenEntry>,
}

struct OpenEntry {
    header: EntryHeader,
    hasher: crc32fast::Hasher,
    encoder: Option<DeflateEncoder<Vec<u8>>>,
    uncompressed: u64,
    compressed: u64,
}

impl<W: Write + Seek> ZipWriter<W> {
    pub fn new(mut inner: W, level: CompressionLevel) -> Result<Self> {
        let base = inner
            .stream_position()
            .map_err(|e| Error::io("failed to query archive position", e))?;
        Ok(Self {
            inner,
            base,
            offset: 0,
            level,
            headers: Vec::new(),
            names: HashSet::new(),
            current: None,
        })
    }

    /// Begin a file entry. An entry still open is closed first.
    pub fn start_file(&mut self, name: &str, modified: SystemTime) -> Result<()> {
        self.close_entry()?;
        if name.ends_with('/') {
            return Err(Error::InvalidEntryName(name.to_string()));
        }
        self.claim_name(name)?;

        let method = self.level.method();
        let mut header = EntryHeader::new(name.to_string(), method, modified, false);
        header.lfh_offset = self.checked_offset()?;
        self.write_raw_header(&header)?;

        let encoder = match method {
            CompressionMethod::Deflate => {
                Some(DeflateEncoder::new(Vec::new(), self.level.deflate()))
            }
            _ => None,
        };
        self.current = Some(OpenEntry {
            header,
            hasher: crc32fast::Hasher::new(),
            encoder,
            uncompressed: 0,
            compressed: 0,
        });
        Ok(())
    }

    /// Write a directory entry. A trailing slash is appended if missing.
    pub fn add_directory(&mut self, name: &str, modified: SystemTime) -> Result<()> {
        self.close_entry()?;
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };
        self.claim_name(&name)?;

        let mut header = EntryHeader::new(name, CompressionMethod::Stored, modified, true);
        header.lfh_offset = self.checked_offset()?;
        self.write_raw_header(&header)?;
        // Empty entry: CRC and sizes are already correct as zero
        self.headers.push(header);
        Ok(())
    }

    /// Finish the open entry, if any, and patch its local header.
    pub fn close_entry(&mut self) -> Result<()> {
        let Some(mut entry) = self.current.take() else {
            return Ok(());
        };

        if let Some(encoder) = entry.encoder.take() {
            let tail = encoder
                .finish()
                .map_err(|e| Error::io("failed to finish deflate stream", e))?;
            self.write_bytes(&tail)?;
            entry.compressed += tail.len() as u64;
        }

        let (Ok(compressed), Ok(uncompressed)) =
            (u32::try_from(entry.compressed), u32::try_from(entry.uncompressed))
        else {
            return Err(Error::LimitExceeded(format!(
                "entry {:?} is larger than 4 GiB",
                entry.header.file_name
            )));
        };
        entry.header.crc32 = entry.hasher.finalize();
        entry.header.compressed_size = compressed;
        entry.header.uncompressed_size = uncompressed;

        self.patch_local_header(&entry.header)?;
        self.headers.push(entry.header);
        Ok(())
    }

    /// Drop the open entry, if any, and rewind the sink to its local header.
    ///
    /// The entry leaves no record in the central directory and its name can
    /// be used again. Its bytes are overwritten by whatever is written next.
    pub fn discard_entry(&mut self) -> Result<()> {
        let Some(entry) = self.current.take() else {
            return Ok(());
        };
        self.names.remove(&entry.header.file_name);

        let start = entry.header.lfh_offset as u64;
        self.inner
            .seek(SeekFrom::Start(self.base + start))
            .map_err(|e| {
                Error::io(format!("failed to discard entry {:?}", entry.header.file_name), e)
            })?;
        self.offset = start;
        Ok(())
    }

    /// Close any open entry, write the central directory and return the sink.
    ///
    /// The sink is left positioned at the end of the archive. After a
    /// [`discard_entry`](Self::discard_entry), stale bytes may follow that
    /// position; callers that own a file should truncate it there.
    pub fn finish(mut self) -> Result<W> {
        self.close_entry()?;

        let total_entries = u16::try_from(self.headers.len()).map_err(|_| {
            Error::LimitExceeded(format!("{} entries exceed the 65535 limit", self.headers.len()))
        })?;
        let cd_offset = self.checked_offset()?;

        let mut central = Vec::new();
        for header in &self.headers {
            header
                .write_central(&mut central)
                .map_err(|e| Error::io("failed to encode central directory", e))?;
        }
        self.write_bytes(&central)?;

        let cd_size = u32::try_from(central.len())
            .map_err(|_| Error::LimitExceeded("central directory exceeds 4 GiB".to_string()))?;
        let eocd = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: total_entries,
            total_entries,
            cd_size,
            cd_offset,
            comment_len: 0,
        };
        let mut record = Vec::with_capacity(EndOfCentralDirectory::SIZE);
        eocd.write_to(&mut record)
            .map_err(|e| Error::io("failed to encode end of central directory", e))?;
        self.write_bytes(&record)?;

        self.inner
            .flush()
            .map_err(|e| Error::io("failed to flush archive", e))?;
        Ok(self.inner)
    }

    fn claim_name(&mut self, name: &str) -> Result<()> {
        if name.is_empty()
            || name.starts_with('/')
            || name.contains('\\')
            || name.contains("//")
            || name.len() > u16::MAX as usize
        {
            return Err(Error::InvalidEntryName(name.to_string()));
        }
        if !self.names.insert(name.to_string()) {
            return Err(Error::DuplicateEntry(name.to_string()));
        }
        Ok(())
    }

    fn checked_offset(&self) -> Result<u32> {
        u32::try_from(self.offset)
            .map_err(|_| Error::LimitExceeded("archive is larger than 4 GiB".to_string()))
    }

    fn write_raw_header(&mut self, header: &EntryHeader) -> Result<()> {
        let mut buf = Vec::with_capacity(header.local_len() as usize);
        header
            .write_local(&mut buf)
            .map_err(|e| Error::io("failed to encode local header", e))?;
        self.write_bytes(&buf)
    }

    fn patch_local_header(&mut self, header: &EntryHeader) -> Result<()> {
        let end = self.base + self.offset;
        let at = self.base + header.lfh_offset as u64 + LFH_CRC_OFFSET;
        let patch = |inner: &mut W| -> io::Result<()> {
            inner.seek(SeekFrom::Start(at))?;
            inner.write_u32::<LittleEndian>(header.crc32)?;
            inner.write_u32::<LittleEndian>(header.compressed_size)?;
            inner.write_u32::<LittleEndian>(header.uncompressed_size)?;
            inner.seek(SeekFrom::Start(end))?;
            Ok(())
        };
        patch(&mut self.inner).map_err(|e| {
            Error::io(format!("failed to patch local header of {:?}", header.file_name), e)
        })
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner
            .write_all(bytes)
            .map_err(|e| Error::io("failed to write archive", e))?;
        self.offset += bytes.len() as u64;
        Ok(())
    }
}

impl<W: Write + Seek> Write for ZipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(entry) = self.current.as_mut() else {
            return Err(io::Error::other("no entry is open for writing"));
        };
        entry.hasher.update(buf);
        entry.uncompressed += buf.len() as u64;

        match entry.encoder.as_mut() {
            Some(encoder) => {
                encoder.write_all(buf)?;
                // Drain compressed output straight to the sink
                let out = encoder.get_mut();
                if !out.is_empty() {
                    self.inner.write_all(out)?;
                    entry.compressed += out.len() as u64;
                    self.offset += out.len() as u64;
                    out.clear();
                }
            }
            None => {
                self.inner.write_all(buf)?;
                entry.compressed += buf.len() as u64;
                self.offset += buf.len() as u64;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
