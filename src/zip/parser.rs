//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header and data

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::error::Result;
use crate::io::ReadAt;

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Low-level ZIP file parser.
///
/// Typically used through [`ZipArchive`](super::ZipArchive) rather than
/// directly.
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: R,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: R) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Returns the record and its offset. The simple case of an archive
    /// without a comment is tried first; otherwise the tail of the file is
    /// searched backwards for the signature.
    pub fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size >= EndOfCentralDirectory::SIZE as u64 {
            let offset = self.size - EndOfCentralDirectory::SIZE as u64;
            let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
            self.reader.read_exact_at(offset, &mut buf)?;

            // Check for signature and zero-length comment
            if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
                let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
                return Ok((eocd, offset));
            }
        }

        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf)?;

        if buf.len() >= EndOfCentralDirectory::SIZE {
            for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
                if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                    // The comment length must account for every trailing byte
                    let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                    if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                        let eocd = EndOfCentralDirectory::from_bytes(
                            &buf[i..i + EndOfCentralDirectory::SIZE],
                        )?;
                        return Ok((eocd, search_start + i as u64));
                    }
                }
            }
        }

        Err(invalid("not a ZIP file (no end of central directory record)"))
    }

    /// Read the ZIP64 End of Central Directory record, located through the
    /// locator that immediately precedes the regular EOCD.
    pub fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or_else(|| invalid("missing ZIP64 end of central directory locator"))?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.reader.read_exact_at(locator_offset, &mut locator_buf)?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.reader
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)?;

        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// List all entries in central directory order.
    pub fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let (eocd, eocd_offset) = self.find_eocd()?;

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset)?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        if cd_offset.saturating_add(cd_size) > eocd_offset {
            return Err(invalid("central directory extends past end of archive"));
        }
        // Every record is at least CDFH_MIN_SIZE bytes
        if total_entries.saturating_mul(CDFH_MIN_SIZE as u64) > cd_size {
            return Err(invalid("central directory is too small for its entry count"));
        }

        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_exact_at(cd_offset, &mut cd_data)?;

        let mut entries = Vec::with_capacity(total_entries as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for _ in 0..total_entries {
            let entry = self.parse_cdfh(&mut cursor)?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Parse a Central Directory File Header from a cursor.
    fn parse_cdfh(&self, cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CDFH_SIGNATURE {
            return Err(invalid("bad central directory file header"));
        }

        let _version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let _flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let _external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let mut file_name_bytes = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut file_name_bytes)?;
        // Lossy conversion keeps non-UTF-8 legacy names readable
        let file_name = String::from_utf8_lossy(&file_name_bytes).to_string();

        let is_directory = file_name.ends_with('/');

        let extra_field_end = cursor.position() + extra_field_length as u64;
        let mut unix_mtime = None;

        while cursor.position() + 4 <= extra_field_end {
            let header_id = cursor.read_u16::<LittleEndian>()?;
            let field_size = cursor.read_u16::<LittleEndian>()?;
            let field_end = cursor.position() + field_size as u64;

            match header_id {
                EXTRA_ZIP64 => {
                    // Fields are present only if the header field is saturated
                    if uncompressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                        uncompressed_size = cursor.read_u64::<LittleEndian>()?;
                    }
                    if compressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                        compressed_size = cursor.read_u64::<LittleEndian>()?;
                    }
                    if lfh_offset == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                        lfh_offset = cursor.read_u64::<LittleEndian>()?;
                    }
                }
                EXTRA_EXTENDED_TIMESTAMP if field_size >= 5 => {
                    let flags = cursor.read_u8()?;
                    if flags & 0x01 != 0 {
                        unix_mtime = Some(cursor.read_i32::<LittleEndian>()? as i64);
                    }
                }
                _ => {}
            }

            cursor.set_position(field_end);
        }

        cursor.set_position(extra_field_end);

        // Skip over the file comment (we don't use it)
        cursor.set_position(cursor.position() + file_comment_length as u64);

        Ok(ZipFileEntry {
            file_name,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            lfh_offset,
            last_mod_time,
            last_mod_date,
            unix_mtime,
            is_directory,
        })
    }

    /// Get the actual data offset for a file entry.
    ///
    /// The local header's name and extra field can differ in length from
    /// the central directory's copy, so the local header is read to find
    /// where the entry data begins.
    pub fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader.read_exact_at(entry.lfh_offset, &mut lfh_buf)?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(invalid(format!(
                "bad local file header for {:?}",
                entry.file_name
            )));
        }

        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(26); // Offset to filename length field

        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        let data_offset =
            entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length;

        if data_offset.saturating_add(entry.compressed_size) > self.size {
            return Err(invalid(format!(
                "data for {:?} extends past end of archive",
                entry.file_name
            )));
        }

        Ok(data_offset)
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &R {
        &self.reader
    }
}
