//! Chunked, pull-driven reading of a resolved object.
//!
//! [`ObjectStream`] is an explicit cursor: the leaf position, the carry
//! buffer and the number of bytes fetched so far are plain fields, and the
//! caller drives progress with [`ObjectStream::next_chunk`].  The store is
//! passed on every pull, so one store can serve several cursors (a row
//! stream and a BLOB heap, say) without shared ownership.
//!
//! # Chunking
//!
//! | `chunk_size` | Behaviour |
//! |--------------|-----------|
//! | `== PAGE_SIZE` | one chunk per leaf page, the last one cut to the declared length |
//! | `< PAGE_SIZE`  | exact-size slices of a carry buffer; a new page is fetched only when the carry runs short; the final chunk is shorter only if pages ran out first |
//! | `> PAGE_SIZE`  | pages accumulate until a full chunk is available; a tail shorter than `chunk_size` is discarded and reported by [`ObjectStream::discarded_tail`] |
//!
//! # Truncation
//!
//! A zero leaf address, or a leaf list that runs out, stops the stream
//! without an error.  [`ObjectStream::end`] then reports
//! [`StreamEnd::Truncated`] so callers can decide whether that is fatal.

use std::io::{Read, Seek};
use tracing::warn;

use super::{resolve, ObjectLayout};
use crate::error::{Error, Result};
use crate::page::{PageAddr, PageStore, PAGE_SIZE};

/// How a finished stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Every declared byte was fetched.
    Complete,
    /// Leaf pages ran out (or hit a zero sentinel) before the declared length.
    Truncated { delivered: u64, declared: u64 },
}

#[derive(Debug)]
pub struct ObjectStream {
    layout:     ObjectLayout,
    chunk_size: usize,
    next_leaf:  usize,
    fetched:    u64,
    carry:      Vec<u8>,
    carry_pos:  usize,
    discarded:  usize,
    end:        Option<StreamEnd>,
}

impl ObjectStream {
    /// Resolve the object at `header` and position a cursor at its start.
    pub fn open<R: Read + Seek>(
        store:      &mut PageStore<R>,
        header:     PageAddr,
        chunk_size: usize,
    ) -> Result<Self> {
        let layout = resolve(store, header)?;
        Self::from_layout(layout, chunk_size)
    }

    pub fn from_layout(layout: ObjectLayout, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::format("chunk size must be positive"));
        }
        Ok(Self {
            layout,
            chunk_size,
            next_leaf: 0,
            fetched:   0,
            carry:     Vec::new(),
            carry_pos: 0,
            discarded: 0,
            end:       None,
        })
    }

    /// Declared object length, known before any data is pulled.
    pub fn declared_length(&self) -> u64 {
        self.layout.declared_length
    }

    /// `None` while the stream still has data to hand out.
    pub fn end(&self) -> Option<StreamEnd> {
        self.end
    }

    /// Bytes dropped at the end of a stream whose chunks are larger than a page.
    pub fn discarded_tail(&self) -> usize {
        self.discarded
    }

    /// Pull the next chunk, or `None` once the stream has ended.
    pub fn next_chunk<R: Read + Seek>(&mut self, store: &mut PageStore<R>) -> Result<Option<Vec<u8>>> {
        if self.end.is_some() {
            return Ok(None);
        }
        loop {
            let available = self.carry.len() - self.carry_pos;
            if available >= self.chunk_size {
                let start = self.carry_pos;
                self.carry_pos += self.chunk_size;
                return Ok(Some(self.carry[start..self.carry_pos].to_vec()));
            }
            if self.pull_page(store)? {
                continue;
            }

            self.finish();
            let tail = self.carry.split_off(self.carry_pos);
            self.carry.clear();
            self.carry_pos = 0;
            if tail.is_empty() {
                return Ok(None);
            }
            if self.chunk_size > PAGE_SIZE {
                self.discarded = tail.len();
                return Ok(None);
            }
            return Ok(Some(tail));
        }
    }

    /// Borrowing iterator over the remaining chunks.
    pub fn chunks<'s, R: Read + Seek>(&'s mut self, store: &'s mut PageStore<R>) -> Chunks<'s, R> {
        Chunks { stream: self, store, failed: false }
    }

    /// Fetch the next leaf page into the carry buffer.  Returns `false` when
    /// no more data can be fetched.
    fn pull_page<R: Read + Seek>(&mut self, store: &mut PageStore<R>) -> Result<bool> {
        let remaining = self.layout.declared_length - self.fetched;
        if remaining == 0 {
            return Ok(false);
        }
        let addr = match self.layout.leaves.get(self.next_leaf) {
            Some(&addr) if addr != 0 => addr,
            _ => return Ok(false),
        };
        self.next_leaf += 1;

        let take = remaining.min(PAGE_SIZE as u64) as usize;
        let bytes = store.read_bytes(addr, take)?;
        if self.carry_pos > 0 {
            self.carry.drain(..self.carry_pos);
            self.carry_pos = 0;
        }
        self.carry.extend_from_slice(&bytes);
        self.fetched += take as u64;
        Ok(true)
    }

    fn finish(&mut self) {
        let declared = self.layout.declared_length;
        self.end = Some(if self.fetched == declared {
            StreamEnd::Complete
        } else {
            warn!(
                header = self.layout.header,
                delivered = self.fetched,
                declared,
                "object data ends before its declared length"
            );
            StreamEnd::Truncated { delivered: self.fetched, declared }
        });
    }
}

/// Iterator view of an [`ObjectStream`].  Stops after the first error.
pub struct Chunks<'s, R> {
    stream: &'s mut ObjectStream,
    store:  &'s mut PageStore<R>,
    failed: bool,
}

impl<R: Read + Seek> Iterator for Chunks<'_, R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.stream.next_chunk(self.store) {
            Ok(chunk) => chunk.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Read a whole object page by page.  Truncation is not an error here; the
/// returned [`StreamEnd`] says whether all declared bytes were present.
pub fn read_object<R: Read + Seek>(
    store:  &mut PageStore<R>,
    header: PageAddr,
) -> Result<(Vec<u8>, StreamEnd)> {
    let mut stream = ObjectStream::open(store, header, PAGE_SIZE)?;
    let mut data = Vec::with_capacity(stream.declared_length() as usize);
    while let Some(chunk) = stream.next_chunk(store)? {
        data.extend_from_slice(&chunk);
    }
    Ok((data, stream.end().unwrap_or(StreamEnd::Complete)))
}

/// Like [`read_object`], but a truncated object is an [`Error::Truncated`].
pub fn read_object_strict<R: Read + Seek>(store: &mut PageStore<R>, header: PageAddr) -> Result<Vec<u8>> {
    match read_object(store, header)? {
        (data, StreamEnd::Complete) => Ok(data),
        (_, StreamEnd::Truncated { delivered, declared }) => {
            Err(Error::Truncated { header, declared, delivered })
        }
    }
}
