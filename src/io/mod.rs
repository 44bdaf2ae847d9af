mod local;

pub use local::LocalFileReader;

use std::io::{self, Read, Write};

/// Trait for random access reading from a data source
pub trait ReadAt {
    /// Read data at the specified offset into the buffer
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill `buf` completely from `offset`, failing on a short read.
    fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(offset, buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "unexpected end of archive",
                    ));
                }
                Ok(n) => {
                    offset += n as u64;
                    buf = &mut buf[n..];
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// In-memory archives, mostly useful for tests.
impl ReadAt for Vec<u8> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(self.len());
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

/// A `Read` view over the byte range `[pos, end)` of a [`ReadAt`] source.
pub struct RangeReader<'a, R: ReadAt + ?Sized> {
    reader: &'a R,
    pos: u64,
    end: u64,
}

impl<'a, R: ReadAt + ?Sized> RangeReader<'a, R> {
    pub fn new(reader: &'a R, start: u64, len: u64) -> Self {
        Self {
            reader,
            pos: start,
            end: start.saturating_add(len),
        }
    }
}

impl<R: ReadAt + ?Sized> Read for RangeReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.end - self.pos;
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = self.reader.read_at(self.pos, &mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive truncated inside entry data",
            ));
        }
        self.pos += n as u64;
        Ok(n)
    }
}

/// Stream everything from `reader` into `writer` through the caller's
/// fixed-size buffer. Returns the number of bytes copied.
pub fn copy_with_buffer<R, W>(reader: &mut R, writer: &mut W, buf: &mut [u8]) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut total = 0u64;
    loop {
        let n = match reader.read(buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_reader_stops_at_range_end() {
        let data: Vec<u8> = (0u8..32).collect();
        let mut range = RangeReader::new(&data, 4, 8);
        let mut out = Vec::new();
        range.read_to_end(&mut out).unwrap();
        assert_eq!(out, (4u8..12).collect::<Vec<_>>());
    }

    #[test]
    fn range_reader_reports_truncation() {
        let data = vec![1u8; 10];
        let mut range = RangeReader::new(&data, 6, 8);
        let mut out = Vec::new();
        let err = range.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn copy_uses_small_buffer() {
        let data = vec![7u8; 5000];
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        let n = copy_with_buffer(&mut data.as_slice(), &mut out, &mut buf).unwrap();
        assert_eq!(n, 5000);
        assert_eq!(out, data);
    }
}
