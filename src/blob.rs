//! BLOB heap reader.
//!
//! A table's BLOB heap is an ordinary object whose pages are divided into
//! 256-byte nodes:
//!
//! ```text
//! +0  next node (LE u32, 0 = end of chain)
//! +4  reserved (2 B)
//! +6  payload (up to 250 B)
//! ```
//!
//! A value is the concatenation of payloads along a chain, cut to the length
//! stored in its [`BlobRef`].  Pages are cached per heap; once the cache
//! holds more than its limit it is emptied in one go.

use std::collections::HashMap;
use std::io::{Read, Seek};
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::object::resolve;
use crate::page::{le_u32, PageAddr, PageStore, PAGE_SIZE};

pub use crate::codec::BlobRef;

pub const HEAP_NODE_SIZE:   usize = 256;
pub const NODE_PAYLOAD:     usize = 250;
const NODE_PAYLOAD_OFFSET:  usize = 6;
const NODES_PER_PAGE:       usize = PAGE_SIZE / HEAP_NODE_SIZE;
/// Default page cache bound.
pub const DEFAULT_CACHE_PAGES: usize = 100;

#[derive(Debug)]
pub struct BlobHeap {
    header:      PageAddr,
    leaves:      Vec<PageAddr>,
    cache:       HashMap<usize, Vec<u8>>,
    cache_limit: usize,
}

impl BlobHeap {
    /// Resolve the heap object's pages once.
    pub fn open<R: Read + Seek>(store: &mut PageStore<R>, header: PageAddr) -> Result<Self> {
        Self::with_cache_limit(store, header, DEFAULT_CACHE_PAGES)
    }

    pub fn with_cache_limit<R: Read + Seek>(
        store:       &mut PageStore<R>,
        header:      PageAddr,
        cache_limit: usize,
    ) -> Result<Self> {
        let mut leaves = resolve(store, header)?.leaves;
        // a zero leaf ends the heap's available pages
        if let Some(end) = leaves.iter().position(|&addr| addr == 0) {
            warn!(heap = header, pages = end, "blob heap leaf list ends at a zero address");
            leaves.truncate(end);
        }
        Ok(Self {
            header,
            leaves,
            cache: HashMap::new(),
            cache_limit,
        })
    }

    pub fn cached_pages(&self) -> usize {
        self.cache.len()
    }

    /// Read the bytes a reference points to.  Empty references give `None`.
    pub fn resolve<R: Read + Seek>(&mut self, store: &mut PageStore<R>, blob: BlobRef) -> Result<Option<Vec<u8>>> {
        if blob.is_empty() {
            return Ok(None);
        }
        let mut remaining = blob.length as usize;
        let mut out = Vec::with_capacity(remaining);
        let mut node = blob.start_node;

        while remaining > 0 {
            let block = self.node(store, node)?;
            let take = remaining.min(NODE_PAYLOAD);
            out.extend_from_slice(&block[NODE_PAYLOAD_OFFSET..NODE_PAYLOAD_OFFSET + take]);
            remaining -= take;
            node = le_u32(&block, 0, "next node")?;
            if node == 0 {
                break;
            }
        }

        if remaining > 0 {
            warn!(
                heap = self.header,
                start = blob.start_node,
                expected = blob.length,
                read = out.len(),
                "blob chain ends before the referenced length"
            );
        }
        Ok(Some(out))
    }

    /// Copy of node `n`.
    fn node<R: Read + Seek>(&mut self, store: &mut PageStore<R>, n: u32) -> Result<Vec<u8>> {
        let n = n as usize;
        let page_index = n / NODES_PER_PAGE;
        let offset = (n % NODES_PER_PAGE) * HEAP_NODE_SIZE;

        if let Some(page) = self.cache.get(&page_index) {
            return Ok(page[offset..offset + HEAP_NODE_SIZE].to_vec());
        }
        let addr = *self.leaves.get(page_index).ok_or_else(|| {
            Error::format(format!(
                "blob node {n} lies past the {} pages of heap {}",
                self.leaves.len(),
                self.header
            ))
        })?;
        trace!(heap = self.header, page = addr, "blob page miss");
        let page = store.read_page(addr)?;
        let node = page[offset..offset + HEAP_NODE_SIZE].to_vec();
        self.cache.insert(page_index, page);
        if self.cache.len() > self.cache_limit {
            self.cache.clear();
        }
        Ok(node)
    }
}
