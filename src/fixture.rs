//! Synthetic 1CD image builder for tests.
//!
//! Std-only so it can be shared with the integration tests through
//! `#[path]` inclusion.
#![allow(dead_code)]

pub const PAGE: usize = 4096;
pub const NODE: usize = 256;
pub const NODE_PAYLOAD: usize = 250;
const LEAVES_PER_INDIRECTION: usize = 1023;

#[derive(Default)]
pub struct ImageBuilder {
    pages: Vec<Vec<u8>>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a zeroed page and return its address.
    pub fn alloc(&mut self) -> u32 {
        self.pages.push(vec![0u8; PAGE]);
        (self.pages.len() - 1) as u32
    }

    pub fn page_mut(&mut self, addr: u32) -> &mut Vec<u8> {
        &mut self.pages[addr as usize]
    }

    pub fn put(&mut self, addr: u32, offset: usize, bytes: &[u8]) {
        self.page_mut(addr)[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Write the `1CDBMSV8` version page.
    pub fn version_page(&mut self, version: [u8; 4], base_length: u32) -> u32 {
        let addr = self.alloc();
        self.put(addr, 0, b"1CDBMSV8");
        self.put(addr, 8, &version);
        self.put(addr, 12, &base_length.to_le_bytes());
        addr
    }

    /// Store `data` as an object and return its header page address.
    pub fn add_object(&mut self, data: &[u8]) -> u32 {
        let header = self.alloc();
        self.write_object(header, data, 0);
        header
    }

    /// Fill a pre-allocated header page with an object description.
    /// A non-zero `flag` marks the root object.
    pub fn write_object(&mut self, header: u32, data: &[u8], flag: u32) {
        let leaves: Vec<u32> = data
            .chunks(PAGE)
            .map(|chunk| {
                let addr = self.alloc();
                self.put(addr, 0, chunk);
                addr
            })
            .collect();
        self.write_header(header, data.len() as i32, &leaves, flag);
    }

    /// Write a header plus indirection pages for an explicit leaf list.
    pub fn write_header(&mut self, header: u32, declared: i32, leaves: &[u32], flag: u32) {
        let indirection: Vec<u32> = leaves
            .chunks(LEAVES_PER_INDIRECTION)
            .map(|group| {
                let addr = self.alloc();
                self.put(addr, 0, &(group.len() as u32).to_le_bytes());
                for (i, leaf) in group.iter().enumerate() {
                    self.put(addr, 4 + i * 4, &leaf.to_le_bytes());
                }
                addr
            })
            .collect();
        self.put(header, 0, b"1CDBOBV8");
        self.put(header, 8, &declared.to_le_bytes());
        self.put(header, 20, &flag.to_le_bytes());
        for (i, addr) in indirection.iter().enumerate() {
            self.put(header, 24 + i * 4, &addr.to_le_bytes());
        }
    }

    /// Store a table's data object, optional BLOB heap and schema text.
    /// Returns the schema object's header page.
    pub fn add_table(&mut self, name: &str, fields: &[FieldSpec], rows: &[u8], heap: Option<&[u8]>) -> u32 {
        let data = self.add_object(rows);
        let blob = heap.map_or(0, |h| self.add_object(h));
        self.add_schema(name, fields, data, blob)
    }

    pub fn add_schema(&mut self, name: &str, fields: &[FieldSpec], data: u32, blob: u32) -> u32 {
        let text = schema_text(name, fields, data, blob);
        self.add_object(&utf16le(&text))
    }

    /// Version page at 0, root header at 1, then the given tables.
    pub fn database(language: &str, tables: &[(&str, &[FieldSpec], Vec<u8>, Option<Vec<u8>>)]) -> Vec<u8> {
        let mut image = Self::new();
        image.version_page([8, 3, 8, 0], 4);
        let root = image.alloc();
        let schemas: Vec<u32> = tables
            .iter()
            .map(|(name, fields, rows, heap)| image.add_table(name, fields, rows, heap.as_deref()))
            .collect();
        image.write_object(root, &root_payload(language, &schemas), 1);
        image.into_bytes()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.pages.concat()
    }
}

pub fn utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// Root object payload: language tag, table count, schema header addresses.
pub fn root_payload(language: &str, schema_headers: &[u32]) -> Vec<u8> {
    let mut out = vec![0u8; 32];
    out[..language.len()].copy_from_slice(language.as_bytes());
    out.extend((schema_headers.len() as i32).to_le_bytes());
    for addr in schema_headers {
        out.extend(addr.to_le_bytes());
    }
    out
}

/// A field tuple: name, type, nullable, length, precision.
pub type FieldSpec<'a> = (&'a str, &'a str, bool, u32, u32);

pub fn schema_text(name: &str, fields: &[FieldSpec], data: u32, blob: u32) -> String {
    let tuples: Vec<String> = fields
        .iter()
        .map(|(n, t, nullable, len, prec)| {
            format!("{{\"{n}\",\"{t}\",{},{len},{prec},\"CS\"}}", u8::from(*nullable))
        })
        .collect();
    format!(
        "{{\"{name}\",0,\n{{\"Fields\",\n{}\n}},\n{{\"Indexes\"}},\n{{\"Recordlock\",\"0\"}},\n{{\"Files\",{data},{blob},0}}\n}}",
        tuples.join(",\n")
    )
}

/// Lay out BLOB values as chained heap nodes.  Node 0 stays unused so that
/// every returned reference has a non-zero start node.
pub fn blob_heap(values: &[&[u8]]) -> (Vec<u8>, Vec<(u32, u32)>) {
    let mut heap = vec![0u8; NODE];
    let mut refs = Vec::new();
    for value in values {
        let first = (heap.len() / NODE) as u32;
        let chunks: Vec<&[u8]> = value.chunks(NODE_PAYLOAD).collect();
        for (i, chunk) in chunks.iter().enumerate() {
            let this = heap.len() / NODE;
            let next = if i + 1 < chunks.len() { this as u32 + 1 } else { 0 };
            let mut node = vec![0u8; NODE];
            node[..4].copy_from_slice(&next.to_le_bytes());
            node[6..6 + chunk.len()].copy_from_slice(chunk);
            heap.extend(node);
        }
        refs.push((first, value.len() as u32));
    }
    (heap, refs)
}

/// One row of the `ID GUID, NAME NC(10) nullable` test table.  Names are
/// space-padded like fixed-width strings in real files.
pub fn id_name_row(deleted: bool, id: [u8; 16], name: Option<&str>) -> Vec<u8> {
    let mut row = vec![u8::from(deleted)];
    row.extend(id);
    row.push(u8::from(name.is_some()));
    row.extend(utf16le(&format!("{:<10}", name.unwrap_or(""))));
    row
}

pub const ID_NAME_FIELDS: &[FieldSpec<'static>] = &[("ID", "B", false, 16, 0), ("NAME", "NC", true, 10, 0)];

/// Packed date-time bytes for `YYYYMMDDHHMMSS` digits.
pub fn packed_digits(digits: &str) -> Vec<u8> {
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| ((pair[0] - b'0') << 4) | (pair[1] - b'0'))
        .collect()
}
