//! Logical objects: variable-length byte sequences spread over leaf pages.
//!
//! # Layout
//!
//! ```text
//! header page        +0   signature (8 B, informational)
//!                    +8   declared length (LE i32)
//!                    +24  indirection page addresses (LE u32 each)
//! indirection page   +0   leaf count (LE u32)
//!                    +4   leaf page addresses (LE u32 each)
//! ```
//!
//! One indirection page addresses at most 1023 leaves, i.e. `0x3ff000`
//! bytes, so the header holds `ceil(declared_length / 0x3ff000)` indirection
//! addresses.  Concatenating the leaf lists in order gives the object's
//! pages.  The resolver never truncates; [`stream::ObjectStream`] does.

pub mod stream;

pub use stream::{read_object, read_object_strict, ObjectStream, StreamEnd};

use std::io::{Read, Seek};

use crate::error::{Error, Result};
use crate::page::{le_i32, le_u32, le_u32_list, PageAddr, PageStore, PAGE_SIZE};

/// Bytes addressable through one fully populated indirection page.
pub const INDIRECTION_SPAN: u64 = 0x3ff000;

const LENGTH_OFFSET:       usize = 8;
const INDIRECTION_OFFSET:  usize = 24;
const LEAF_LIST_OFFSET:    usize = 4;
const MAX_INDIRECTION:     usize = (PAGE_SIZE - INDIRECTION_OFFSET) / 4;
const MAX_LEAVES_PER_PAGE: usize = (PAGE_SIZE - LEAF_LIST_OFFSET) / 4;

/// Resolved placement of one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLayout {
    pub header:          PageAddr,
    pub declared_length: u64,
    /// Leaf pages in object order.  May contain a zero sentinel.
    pub leaves:          Vec<PageAddr>,
}

impl ObjectLayout {
    /// Bytes the leaf list can deliver, ignoring zero sentinels.
    pub fn capacity(&self) -> u64 {
        self.leaves.len() as u64 * PAGE_SIZE as u64
    }
}

/// Walk the header and indirection pages of the object at `header`.
pub fn resolve<R: Read + Seek>(store: &mut PageStore<R>, header: PageAddr) -> Result<ObjectLayout> {
    let page = store.read_page(header)?;
    let declared = le_i32(&page, LENGTH_OFFSET, "object length")?;
    if declared < 0 {
        return Err(Error::format(format!(
            "object at page {header} declares negative length {declared}"
        )));
    }
    if declared == 0 {
        return Ok(ObjectLayout { header, declared_length: 0, leaves: Vec::new() });
    }

    let declared_length = declared as u64;
    let indirection_count = ((declared_length - 1) / INDIRECTION_SPAN + 1) as usize;
    if indirection_count > MAX_INDIRECTION {
        return Err(Error::format(format!(
            "object at page {header} needs {indirection_count} indirection pages, \
             a header holds at most {MAX_INDIRECTION}"
        )));
    }
    let indirection = le_u32_list(&page, INDIRECTION_OFFSET, indirection_count, "indirection list")?;

    let mut leaves = Vec::new();
    for addr in indirection {
        let block = store.read_page(addr)?;
        let count = le_u32(&block, 0, "leaf count")? as usize;
        if count > MAX_LEAVES_PER_PAGE {
            return Err(Error::format(format!(
                "indirection page {addr} lists {count} leaves, a page holds at most {MAX_LEAVES_PER_PAGE}"
            )));
        }
        leaves.extend(le_u32_list(&block, LEAF_LIST_OFFSET, count, "leaf list")?);
    }

    Ok(ObjectLayout { header, declared_length, leaves })
}
