//! Fixed-size page access over a seekable byte source.
//!
//! A 1CD file is an unbounded sequence of 4096-byte pages addressed by
//! zero-based index.  Every read is an independent seek followed by a read;
//! nothing is buffered here.  The store owns its reader and therefore its
//! seek position, so all reads take `&mut self`.

use byteorder::{ByteOrder, LittleEndian};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use tracing::trace;

use crate::error::{Error, Result};

/// Page size of the 1CD format.
pub const PAGE_SIZE: usize = 4096;

/// Zero-based page index.
pub type PageAddr = u32;

pub struct PageStore<R> {
    inner: R,
}

impl<R: Read + Seek> PageStore<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read exactly one full page.
    pub fn read_page(&mut self, addr: PageAddr) -> io::Result<Vec<u8>> {
        self.read_bytes(addr, PAGE_SIZE)
    }

    /// Read the first `count` bytes of a page.  A short read is an error.
    pub fn read_bytes(&mut self, addr: PageAddr, count: usize) -> io::Result<Vec<u8>> {
        if count > PAGE_SIZE {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("read of {count} bytes exceeds page size {PAGE_SIZE}"),
            ));
        }
        trace!(page = addr, count, "read page");
        self.seek_to(addr)?;
        let mut buf = vec![0u8; count];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read a page for sequential scanning.
    ///
    /// Returns `None` once the address is at or past end of file, and the
    /// available bytes when the file ends inside the page.
    pub fn try_read_page(&mut self, addr: PageAddr) -> io::Result<Option<Vec<u8>>> {
        self.seek_to(addr)?;
        let mut buf = Vec::with_capacity(PAGE_SIZE);
        (&mut self.inner).take(PAGE_SIZE as u64).read_to_end(&mut buf)?;
        Ok(if buf.is_empty() { None } else { Some(buf) })
    }

    /// Number of pages in the source, counting a trailing partial page.
    pub fn page_count(&mut self) -> io::Result<u64> {
        let len = self.inner.seek(SeekFrom::End(0))?;
        Ok(len.div_ceil(PAGE_SIZE as u64))
    }

    fn seek_to(&mut self, addr: PageAddr) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(addr as u64 * PAGE_SIZE as u64))?;
        Ok(())
    }
}

// ── Little-endian field access ──────────────────────────────────────────────

fn field<'a>(buf: &'a [u8], offset: usize, width: usize, what: &str) -> Result<&'a [u8]> {
    buf.get(offset..offset + width).ok_or_else(|| {
        Error::format(format!(
            "{what} at offset {offset} lies outside a {}-byte buffer",
            buf.len()
        ))
    })
}

pub(crate) fn le_u32(buf: &[u8], offset: usize, what: &str) -> Result<u32> {
    Ok(LittleEndian::read_u32(field(buf, offset, 4, what)?))
}

pub(crate) fn le_i32(buf: &[u8], offset: usize, what: &str) -> Result<i32> {
    Ok(LittleEndian::read_i32(field(buf, offset, 4, what)?))
}

/// Decode `count` consecutive little-endian u32 values starting at `offset`.
pub(crate) fn le_u32_list(buf: &[u8], offset: usize, count: usize, what: &str) -> Result<Vec<u32>> {
    let bytes = field(buf, offset, count * 4, what)?;
    let mut out = vec![0u32; count];
    LittleEndian::read_u32_into(bytes, &mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn store(pages: usize, tail: usize) -> PageStore<Cursor<Vec<u8>>> {
        let mut data = Vec::new();
        for p in 0..pages {
            data.extend(std::iter::repeat(p as u8).take(PAGE_SIZE));
        }
        data.extend(std::iter::repeat(0xEE).take(tail));
        PageStore::new(Cursor::new(data))
    }

    #[test]
    fn reads_are_positioned_by_address() {
        let mut s = store(3, 0);
        assert_eq!(s.read_page(2).unwrap(), vec![2u8; PAGE_SIZE]);
        assert_eq!(s.read_page(0).unwrap(), vec![0u8; PAGE_SIZE]);
        assert_eq!(s.read_bytes(1, 10).unwrap(), vec![1u8; 10]);
    }

    #[test]
    fn short_read_is_an_io_error() {
        let mut s = store(1, 100);
        assert_eq!(s.read_bytes(1, 100).unwrap(), vec![0xEE; 100]);
        let err = s.read_page(1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
        assert!(s.read_page(5).is_err());
    }

    #[test]
    fn oversized_read_is_rejected() {
        let mut s = store(2, 0);
        let err = s.read_bytes(0, PAGE_SIZE + 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn try_read_page_reports_end_of_file() {
        let mut s = store(2, 10);
        assert_eq!(s.try_read_page(1).unwrap().map(|p| p.len()), Some(PAGE_SIZE));
        assert_eq!(s.try_read_page(2).unwrap(), Some(vec![0xEE; 10]));
        assert_eq!(s.try_read_page(3).unwrap(), None);
        assert_eq!(s.page_count().unwrap(), 3);
    }

    #[test]
    fn le_helpers_check_bounds() {
        let buf = [1u8, 0, 0, 0, 0xff, 0xff, 0xff, 0xff];
        assert_eq!(le_u32(&buf, 0, "x").unwrap(), 1);
        assert_eq!(le_i32(&buf, 4, "x").unwrap(), -1);
        assert_eq!(le_u32_list(&buf, 0, 2, "x").unwrap(), vec![1, u32::MAX]);
        assert!(le_u32(&buf, 6, "x").is_err());
        assert!(le_u32_list(&buf, 4, 2, "x").is_err());
    }
}
