use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use std::io::{self, Cursor, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(invalid("bad end of central directory record"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(Self::SIGNATURE)?;
        out.write_u16::<LittleEndian>(self.disk_number)?;
        out.write_u16::<LittleEndian>(self.disk_with_cd)?;
        out.write_u16::<LittleEndian>(self.disk_entries)?;
        out.write_u16::<LittleEndian>(self.total_entries)?;
        out.write_u32::<LittleEndian>(self.cd_size)?;
        out.write_u32::<LittleEndian>(self.cd_offset)?;
        out.write_u16::<LittleEndian>(self.comment_len)
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(invalid("bad ZIP64 end of central directory locator"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(invalid("bad ZIP64 end of central directory record"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;
/// Offset of the CRC-32 field inside a local file header; the sizes follow it.
pub const LFH_CRC_OFFSET: u64 = 14;

/// "Version needed to extract" for deflate and directories (2.0).
pub const VERSION_NEEDED: u16 = 20;
/// Version made by: MS-DOS host, ZIP format version 2.0.
pub const VERSION_MADE_BY: u16 = 20;
/// General purpose flag bit 11: file name is UTF-8.
pub const FLAG_UTF8: u16 = 1 << 11;
/// MS-DOS directory attribute, stored in the external attributes.
pub const DOS_DIRECTORY_ATTR: u32 = 0x10;

pub const EXTRA_ZIP64: u16 = 0x0001;
/// Extended timestamp extra field ("UT"), carrying Unix seconds.
pub const EXTRA_EXTENDED_TIMESTAMP: u16 = 0x5455;

/// Fields shared by the local header and the central directory record of
/// an entry produced by [`ZipWriter`](super::ZipWriter).
#[derive(Debug, Clone)]
pub struct EntryHeader {
    pub file_name: String,
    pub compression_method: CompressionMethod,
    pub dos_time: u16,
    pub dos_date: u16,
    pub unix_mtime: Option<i32>,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub lfh_offset: u32,
    pub is_directory: bool,
}

impl EntryHeader {
    pub fn new(
        file_name: String,
        compression_method: CompressionMethod,
        modified: SystemTime,
        is_directory: bool,
    ) -> Self {
        let (dos_time, dos_date) = to_dos_datetime(modified);
        Self {
            file_name,
            compression_method,
            dos_time,
            dos_date,
            unix_mtime: unix_seconds(modified),
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            lfh_offset: 0,
            is_directory,
        }
    }

    fn extra_field(&self) -> Vec<u8> {
        let mut extra = Vec::new();
        if let Some(mtime) = self.unix_mtime {
            extra.extend_from_slice(&EXTRA_EXTENDED_TIMESTAMP.to_le_bytes());
            extra.extend_from_slice(&5u16.to_le_bytes());
            extra.push(0x01);
            extra.extend_from_slice(&mtime.to_le_bytes());
        }
        extra
    }

    /// Number of bytes [`write_local`](Self::write_local) emits.
    pub fn local_len(&self) -> u64 {
        (LFH_SIZE + self.file_name.len() + self.extra_field().len()) as u64
    }

    pub fn write_local<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let extra = self.extra_field();
        out.write_all(LFH_SIGNATURE)?;
        out.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        out.write_u16::<LittleEndian>(FLAG_UTF8)?;
        out.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        out.write_u16::<LittleEndian>(self.dos_time)?;
        out.write_u16::<LittleEndian>(self.dos_date)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_u32::<LittleEndian>(self.compressed_size)?;
        out.write_u32::<LittleEndian>(self.uncompressed_size)?;
        out.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        out.write_u16::<LittleEndian>(extra.len() as u16)?;
        out.write_all(self.file_name.as_bytes())?;
        out.write_all(&extra)
    }

    pub fn write_central<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let extra = self.extra_field();
        let external_attrs = if self.is_directory { DOS_DIRECTORY_ATTR } else { 0 };
        out.write_all(CDFH_SIGNATURE)?;
        out.write_u16::<LittleEndian>(VERSION_MADE_BY)?;
        out.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        out.write_u16::<LittleEndian>(FLAG_UTF8)?;
        out.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        out.write_u16::<LittleEndian>(self.dos_time)?;
        out.write_u16::<LittleEndian>(self.dos_date)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_u32::<LittleEndian>(self.compressed_size)?;
        out.write_u32::<LittleEndian>(self.uncompressed_size)?;
        out.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        out.write_u16::<LittleEndian>(extra.len() as u16)?;
        out.write_u16::<LittleEndian>(0)?; // comment length
        out.write_u16::<LittleEndian>(0)?; // disk number start
        out.write_u16::<LittleEndian>(0)?; // internal attributes
        out.write_u32::<LittleEndian>(external_attrs)?;
        out.write_u32::<LittleEndian>(self.lfh_offset)?;
        out.write_all(self.file_name.as_bytes())?;
        out.write_all(&extra)
    }

    /// Length of the central directory record for this entry.
    pub fn central_len(&self) -> u64 {
        (CDFH_MIN_SIZE + self.file_name.len() + self.extra_field().len()) as u64
    }
}

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    /// Seconds since the Unix epoch, from the extended timestamp field.
    pub unix_mtime: Option<i64>,
    pub is_directory: bool,
}

impl ZipFileEntry {
    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    /// Modification time, preferring the extended timestamp over the
    /// two-second MS-DOS fields.
    pub fn last_modified(&self) -> Option<SystemTime> {
        match self.unix_mtime {
            Some(secs) if secs >= 0 => Some(UNIX_EPOCH + Duration::from_secs(secs as u64)),
            Some(secs) => UNIX_EPOCH.checked_sub(Duration::from_secs(secs.unsigned_abs())),
            None => from_dos_datetime(self.last_mod_time, self.last_mod_date),
        }
    }
}

/// Encode a timestamp as MS-DOS (time, date) in local time. Times before
/// 1980 clamp to 1980-01-01 00:00:00 and after 2107 to the last DOS date.
pub fn to_dos_datetime(time: SystemTime) -> (u16, u16) {
    let local: DateTime<Local> = time.into();
    let year = local.year();
    if year < 1980 {
        return (0, (1 << 5) | 1);
    }
    if year > 2107 {
        return ((23 << 11) | (59 << 5) | 29, (127 << 9) | (12 << 5) | 31);
    }
    let dos_time = ((local.hour() << 11) | (local.minute() << 5) | (local.second() / 2)) as u16;
    let dos_date = ((((year - 1980) as u32) << 9) | (local.month() << 5) | local.day()) as u16;
    (dos_time, dos_date)
}

/// Decode MS-DOS (time, date) fields, read as local time.
pub fn from_dos_datetime(dos_time: u16, dos_date: u16) -> Option<SystemTime> {
    let year = ((dos_date >> 9) & 0x7F) as i32 + 1980;
    let month = ((dos_date >> 5) & 0x0F) as u32;
    let day = (dos_date & 0x1F) as u32;
    let hour = ((dos_time >> 11) & 0x1F) as u32;
    let minute = ((dos_time >> 5) & 0x3F) as u32;
    let second = ((dos_time & 0x1F) * 2) as u32;
    Local
        .with_ymd_and_hms(year, month, day, hour, minute, second)
        .earliest()
        .map(SystemTime::from)
}

fn unix_seconds(time: SystemTime) -> Option<i32> {
    let secs = match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).ok()?,
        Err(e) => -i64::try_from(e.duration().as_secs()).ok()?,
    };
    i32::try_from(secs).ok()
}

pub(crate) fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidArchive(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dos_datetime_round_trips_to_even_seconds() {
        let local = Local.with_ymd_and_hms(2021, 7, 14, 13, 45, 31).unwrap();
        let (time, date) = to_dos_datetime(local.into());
        let decoded: DateTime<Local> = from_dos_datetime(time, date).unwrap().into();
        assert_eq!(decoded, Local.with_ymd_and_hms(2021, 7, 14, 13, 45, 30).unwrap());
    }

    #[test]
    fn dos_datetime_clamps_before_1980() {
        assert_eq!(to_dos_datetime(UNIX_EPOCH), (0, (1 << 5) | 1));
    }

    #[test]
    fn entry_date_fields_decode() {
        let entry = ZipFileEntry {
            file_name: "a".into(),
            compression_method: CompressionMethod::Stored,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            lfh_offset: 0,
            last_mod_time: (10 << 11) | (30 << 5) | 7,
            last_mod_date: (44 << 9) | (2 << 5) | 29,
            unix_mtime: None,
            is_directory: false,
        };
        assert_eq!(entry.mod_date(), (2024, 2, 29));
        assert_eq!(entry.mod_time(), (10, 30, 14));
    }

    #[test]
    fn extended_timestamp_wins_over_dos_fields() {
        let entry = ZipFileEntry {
            file_name: "a".into(),
            compression_method: CompressionMethod::Stored,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            lfh_offset: 0,
            last_mod_time: 0,
            last_mod_date: (1 << 5) | 1,
            unix_mtime: Some(1_700_000_001),
            is_directory: false,
        };
        assert_eq!(
            entry.last_modified(),
            Some(UNIX_EPOCH + Duration::from_secs(1_700_000_001))
        );
    }

    #[test]
    fn local_header_length_matches_bytes_written() {
        let header = EntryHeader::new(
            "dir/file.txt".into(),
            CompressionMethod::Deflate,
            UNIX_EPOCH + Duration::from_secs(1_600_000_000),
            false,
        );
        let mut out = Vec::new();
        header.write_local(&mut out).unwrap();
        assert_eq!(out.len() as u64, header.local_len());
        assert_eq!(&out[0..4], LFH_SIGNATURE);

        let mut out = Vec::new();
        header.write_central(&mut out).unwrap();
        assert_eq!(out.len() as u64, header.central_len());
    }

    #[test]
    fn rejects_bad_eocd_signature() {
        let data = [0u8; EndOfCentralDirectory::SIZE];
        assert!(matches!(
            EndOfCentralDirectory::from_bytes(&data),
            Err(Error::InvalidArchive(_))
        ));
    }
}
