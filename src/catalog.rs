//! Database catalog: the entry point for reading a 1CD file.
//!
//! # Loading
//!
//! Pages are scanned from address 0.  A `1CDBMSV8` page supplies the
//! format version and base length; the first `1CDBOBV8` page with a
//! non-zero flag at offset 20 is the root object:
//!
//! ```text
//! +0   language tag (32 B, NUL-padded)
//! +32  table count (LE i32)
//! +36  schema object header addresses (LE u32 each)
//! ```
//!
//! Every schema object holds UTF-16LE schema text.  A table whose schema
//! fails to parse aborts the whole load.
//!
//! The catalog owns its [`PageStore`]; row scans and BLOB heaps borrow it
//! for the duration of a call.

use serde::Deserialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::Path;
use tracing::{debug, warn};

use crate::blob::{BlobHeap, BlobRef, DEFAULT_CACHE_PAGES};
use crate::codec::{utf16le, CodecOptions, Value};
use crate::error::{Error, Result};
use crate::object::{read_object, ObjectStream, StreamEnd};
use crate::page::{le_i32, le_u32, le_u32_list, PageAddr, PageStore};
use crate::row::{decode_row, Decoded, Row};
use crate::schema::{parse, FieldDescriptor, FieldId, FieldType, TableSchema, TableSize};

pub const VERSION_SIGNATURE: &[u8; 8] = b"1CDBMSV8";
pub const OBJECT_SIGNATURE:  &[u8; 8] = b"1CDBOBV8";

const ROOT_FLAG_OFFSET:   usize = 20;
const LANGUAGE_LEN:       usize = 32;
const TABLE_COUNT_OFFSET: usize = 32;
const SCHEMA_LIST_OFFSET: usize = 36;

// ── Options ─────────────────────────────────────────────────────────────────

/// Reader configuration.
///
/// | Field | Default | Effect |
/// |-------|---------|--------|
/// | `raw_guids` | `false` | `GUID` fields decode to hex of the stored bytes |
/// | `strict` | `false` | truncated objects are errors instead of a quiet end |
/// | `blob_cache_pages` | `100` | per-heap page cache bound |
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    pub raw_guids:        bool,
    pub strict:           bool,
    pub blob_cache_pages: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            raw_guids:        false,
            strict:           false,
            blob_cache_pages: DEFAULT_CACHE_PAGES,
        }
    }
}

impl ReaderOptions {
    pub fn raw_guids(mut self, on: bool) -> Self {
        self.raw_guids = on;
        self
    }

    pub fn strict(mut self, on: bool) -> Self {
        self.strict = on;
        self
    }

    pub fn blob_cache_pages(mut self, pages: usize) -> Self {
        self.blob_cache_pages = pages;
        self
    }

    fn codec(&self) -> CodecOptions {
        CodecOptions { raw_guids: self.raw_guids }
    }
}

/// Format version from the `1CDBMSV8` page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbVersion(pub [u8; 4]);

impl fmt::Display for DbVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

// ── Catalog ─────────────────────────────────────────────────────────────────

pub struct Catalog<R = File> {
    store:       PageStore<R>,
    options:     ReaderOptions,
    version:     Option<DbVersion>,
    base_length: u32,
    language:    String,
    tables:      Vec<TableSchema>,
    by_name:     HashMap<String, usize>,
    heaps:       HashMap<usize, BlobHeap>,
}

impl Catalog<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ReaderOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        debug!(path = %path.display(), "opening database");
        Self::from_reader(file, options)
    }
}

impl<R: Read + Seek> Catalog<R> {
    /// Scan for the root object and parse every table schema it lists.
    pub fn from_reader(reader: R, options: ReaderOptions) -> Result<Self> {
        let mut store = PageStore::new(reader);
        let mut version = None;
        let mut base_length = 0;

        let mut addr: PageAddr = 0;
        let root = loop {
            let Some(page) = store.try_read_page(addr)? else {
                return Err(Error::format(format!("no root object found in {addr} pages")));
            };
            if page.starts_with(VERSION_SIGNATURE) {
                let bytes = page
                    .get(8..12)
                    .ok_or_else(|| Error::format("version page is cut short"))?;
                version = Some(DbVersion([bytes[0], bytes[1], bytes[2], bytes[3]]));
                base_length = le_u32(&page, 12, "base length")?;
            } else if page.starts_with(OBJECT_SIGNATURE)
                && matches!(le_u32(&page, ROOT_FLAG_OFFSET, "root flag"), Ok(flag) if flag != 0)
            {
                break addr;
            }
            addr = addr
                .checked_add(1)
                .ok_or_else(|| Error::format("page address space exhausted before the root object"))?;
        };

        let payload = read_whole(&mut store, root, options.strict)?;
        let language = payload
            .get(..LANGUAGE_LEN)
            .map(|raw| {
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                String::from_utf8_lossy(&raw[..end]).into_owned()
            })
            .ok_or_else(|| Error::format("root object is shorter than its language tag"))?;
        let count = le_i32(&payload, TABLE_COUNT_OFFSET, "table count")?;
        let count = usize::try_from(count)
            .map_err(|_| Error::format(format!("root object lists {count} tables")))?;
        let schema_headers = le_u32_list(&payload, SCHEMA_LIST_OFFSET, count, "schema address list")?;

        let version_text = version.map(|v| v.to_string()).unwrap_or_default();
        debug!(
            version = %version_text,
            %language,
            base_length,
            tables = count,
            root,
            "catalog header"
        );

        let mut tables: Vec<TableSchema> = Vec::with_capacity(count);
        let mut by_name = HashMap::with_capacity(count);
        for header in schema_headers {
            let text = utf16le(&read_whole(&mut store, header, options.strict)?);
            let schema = parse(&text)?;
            debug!(
                table = %schema.name,
                fields = schema.fields.len(),
                row_size = schema.row_size,
                data = schema.data_addr,
                "table schema"
            );
            match by_name.entry(schema.name.to_uppercase()) {
                Entry::Occupied(slot) => {
                    warn!(table = %schema.name, "duplicate table name, keeping the later schema");
                    tables[*slot.get()] = schema;
                }
                Entry::Vacant(slot) => {
                    slot.insert(tables.len());
                    tables.push(schema);
                }
            }
        }

        Ok(Self {
            store,
            options,
            version,
            base_length,
            language,
            tables,
            by_name,
            heaps: HashMap::new(),
        })
    }

    pub fn version(&self) -> Option<DbVersion> {
        self.version
    }

    pub fn base_length(&self) -> u32 {
        self.base_length
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Case-insensitive table lookup.
    pub fn table(&self, name: &str) -> Result<&TableSchema> {
        self.index_of(name).map(|i| &self.tables[i])
    }

    /// Size of a table's row data, computed from the data object on first use.
    pub fn table_size(&mut self, name: &str) -> Result<TableSize> {
        let idx = self.index_of(name)?;
        if let Some(size) = self.tables[idx].size {
            return Ok(size);
        }
        let layout = crate::object::resolve(&mut self.store, self.tables[idx].data_addr)?;
        Ok(self.record_size(idx, layout.declared_length))
    }

    /// Lazily decode the rows of a table.
    pub fn iterate_rows<'f>(&mut self, name: &str, scan: ScanOptions<'f>) -> Result<TableScan<'_, 'f, R>> {
        let idx = self.index_of(name)?;
        let (data_addr, row_size) = (self.tables[idx].data_addr, self.tables[idx].row_size);
        let stream = ObjectStream::open(&mut self.store, data_addr, row_size)?;
        let size = self.record_size(idx, stream.declared_length());
        debug!(table = %self.tables[idx].name, rows = size.row_count, bytes = size.total_bytes, "scanning table");

        let has_blobs = scan.include_blobs && !self.tables[idx].blob_fields.is_empty();
        let wants_heap = has_blobs && self.tables[idx].blob_addr.is_some();
        if has_blobs && !wants_heap {
            warn!(table = %self.tables[idx].name, "table has BLOB fields but no heap, references stay unresolved");
        }
        let Catalog { store, tables, heaps, options, .. } = self;
        let heap = if wants_heap {
            Some(open_heap(heaps, store, &tables[idx], idx, options.blob_cache_pages)?)
        } else {
            None
        };

        Ok(TableScan {
            store,
            schema: &tables[idx],
            heap,
            stream,
            codec: options.codec(),
            strict: options.strict,
            include_blobs: wants_heap,
            filter: scan.filter,
            header: scan.emit_header.then(|| tables[idx].fields.clone()),
            done: false,
        })
    }

    /// Every non-deleted row of a table, BLOBs unresolved.
    pub fn rows(&mut self, name: &str) -> Result<Vec<Row>> {
        self.iterate_rows(name, ScanOptions::default())?
            .filter_map(|item| match item {
                Ok(ScanItem::Row(row)) => Some(Ok(row)),
                Ok(ScanItem::Header(_)) => None,
                Err(e) => Some(Err(e)),
            })
            .collect()
    }

    /// Read a BLOB of table `name`.  Empty references give `None`.
    pub fn resolve_blob(&mut self, name: &str, blob: BlobRef) -> Result<Option<Vec<u8>>> {
        let idx = self.index_of(name)?;
        if blob.is_empty() {
            return Ok(None);
        }
        let Catalog { store, tables, heaps, options, .. } = self;
        let heap = open_heap(heaps, store, &tables[idx], idx, options.blob_cache_pages)?;
        heap.resolve(store, blob)
    }

    /// Resolve the BLOB reference held in `row` at `field` and store the
    /// content back into the row.  Already resolved or absent values are
    /// left alone.
    pub fn load_blob(&mut self, name: &str, row: &mut Row, field: FieldId) -> Result<()> {
        let schema = self.table(name)?;
        let descriptor = schema.field(field).ok_or_else(|| {
            Error::format(format!("table {} has no field #{}", schema.name, field.0))
        })?;
        if !descriptor.field_type.is_blob() {
            return Err(Error::format(format!(
                "field {} of table {} is {}, not a BLOB",
                descriptor.name, schema.name, descriptor.field_type
            )));
        }
        let as_text = descriptor.field_type == FieldType::NText;
        let Some(blob) = row.get(field).and_then(Value::as_blob_ref) else {
            return Ok(());
        };
        let bytes = self.resolve_blob(name, blob)?;
        row.set_blob(field, bytes, as_text);
        Ok(())
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.by_name
            .get(&name.to_uppercase())
            .copied()
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    fn record_size(&mut self, idx: usize, declared: u64) -> TableSize {
        let schema = &mut self.tables[idx];
        *schema.size.get_or_insert(TableSize {
            total_bytes: declared,
            row_count:   declared / schema.row_size as u64,
        })
    }
}

/// Collect a metadata object in one piece.
fn read_whole<R: Read + Seek>(store: &mut PageStore<R>, header: PageAddr, strict: bool) -> Result<Vec<u8>> {
    match read_object(store, header)? {
        (_, StreamEnd::Truncated { delivered, declared }) if strict => {
            Err(Error::Truncated { header, declared, delivered })
        }
        (data, _) => Ok(data),
    }
}

fn open_heap<'h, R: Read + Seek>(
    heaps:       &'h mut HashMap<usize, BlobHeap>,
    store:       &mut PageStore<R>,
    schema:      &TableSchema,
    idx:         usize,
    cache_pages: usize,
) -> Result<&'h mut BlobHeap> {
    match heaps.entry(idx) {
        Entry::Occupied(slot) => Ok(slot.into_mut()),
        Entry::Vacant(slot) => {
            let addr = schema
                .blob_addr
                .ok_or_else(|| Error::format(format!("table {} has no BLOB heap", schema.name)))?;
            let heap = BlobHeap::with_cache_limit(store, addr, cache_pages)?;
            Ok(slot.insert(heap))
        }
    }
}

// ── Row scans ───────────────────────────────────────────────────────────────

pub type RowFilter<'f> = Box<dyn FnMut(&Row) -> bool + 'f>;

/// Options for [`Catalog::iterate_rows`].
#[derive(Default)]
pub struct ScanOptions<'f> {
    /// Resolve `NT`/`I` references for rows that pass the filter.
    pub include_blobs: bool,
    /// Yield the field list before the first row.
    pub emit_header:   bool,
    /// Rows for which this returns `false` are skipped.  Runs before BLOB
    /// resolution, so it sees unresolved references.
    pub filter:        Option<RowFilter<'f>>,
}

impl<'f> ScanOptions<'f> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_blobs(mut self, on: bool) -> Self {
        self.include_blobs = on;
        self
    }

    pub fn emit_header(mut self, on: bool) -> Self {
        self.emit_header = on;
        self
    }

    pub fn filter(mut self, f: impl FnMut(&Row) -> bool + 'f) -> Self {
        self.filter = Some(Box::new(f));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanItem {
    Header(Vec<FieldDescriptor>),
    Row(Row),
}

/// Lazy row sequence over one table.  Stops after the first error.
pub struct TableScan<'c, 'f, R> {
    store:         &'c mut PageStore<R>,
    schema:        &'c TableSchema,
    heap:          Option<&'c mut BlobHeap>,
    stream:        ObjectStream,
    codec:         CodecOptions,
    strict:        bool,
    include_blobs: bool,
    filter:        Option<RowFilter<'f>>,
    header:        Option<Vec<FieldDescriptor>>,
    done:          bool,
}

impl<R: Read + Seek> TableScan<'_, '_, R> {
    pub fn schema(&self) -> &TableSchema {
        self.schema
    }

    fn advance(&mut self) -> Result<Option<Row>> {
        let schema = self.schema;
        loop {
            let Some(buf) = self.stream.next_chunk(self.store)? else {
                return match self.stream.end() {
                    Some(StreamEnd::Truncated { delivered, declared }) if self.strict => {
                        Err(Error::Truncated { header: schema.data_addr, declared, delivered })
                    }
                    _ => Ok(None),
                };
            };
            // partial row left by a truncated data object
            if buf.len() < schema.row_size {
                continue;
            }
            let mut row = match decode_row(schema, &buf, &self.codec)? {
                Decoded::Deleted => continue,
                Decoded::Row(row) => row,
            };
            if let Some(filter) = self.filter.as_mut() {
                if !filter(&row) {
                    continue;
                }
            }
            if self.include_blobs {
                self.resolve_blobs(&mut row)?;
            }
            return Ok(Some(row));
        }
    }

    fn resolve_blobs(&mut self, row: &mut Row) -> Result<()> {
        let schema = self.schema;
        let Some(heap) = self.heap.as_deref_mut() else {
            return Ok(());
        };
        for &id in &schema.blob_fields {
            let Some(blob) = row.get(id).and_then(Value::as_blob_ref) else {
                continue;
            };
            if blob.is_empty() {
                row.set(id, None);
                continue;
            }
            let bytes = heap.resolve(self.store, blob)?;
            row.set_blob(id, bytes, schema.fields[id.0].field_type == FieldType::NText);
        }
        Ok(())
    }
}

impl<R: Read + Seek> Iterator for TableScan<'_, '_, R> {
    type Item = Result<ScanItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(fields) = self.header.take() {
            return Some(Ok(ScanItem::Header(fields)));
        }
        match self.advance() {
            Ok(Some(row)) => Some(Ok(ScanItem::Row(row))),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
