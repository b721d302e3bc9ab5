//! Table schemas: field descriptors and the binary row layout derived from
//! them.
//!
//! Schemas are built once by [`parser::parse`] and are immutable afterwards,
//! apart from [`TableSchema::size`], which the catalog fills on first read.

pub mod parser;

pub use parser::{parse, SchemaError};

use std::collections::HashMap;
use std::fmt;

use crate::page::PageAddr;

// ── Field types ─────────────────────────────────────────────────────────────

/// Physical type tag of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `GUID`: 16-byte identifier (also `B` fields of length 16).
    Guid,
    /// `B`: fixed-length binary.
    Binary,
    /// `L`: boolean.
    Logical,
    /// `N`: packed decimal.
    Numeric,
    /// `NC`: fixed-length UTF-16 string.
    NChar,
    /// `NVC`: length-prefixed UTF-16 string.
    NVarChar,
    /// `RV`: row version vector.
    RowVersion,
    /// `NT`: BLOB reference holding UTF-16 text.
    NText,
    /// `I`: BLOB reference holding raw bytes.
    Image,
    /// `DT`: packed date-time.
    DateTime,
}

impl FieldType {
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "GUID" => FieldType::Guid,
            "B"    => FieldType::Binary,
            "L"    => FieldType::Logical,
            "N"    => FieldType::Numeric,
            "NC"   => FieldType::NChar,
            "NVC"  => FieldType::NVarChar,
            "RV"   => FieldType::RowVersion,
            "NT"   => FieldType::NText,
            "I"    => FieldType::Image,
            "DT"   => FieldType::DateTime,
            _      => return None,
        })
    }

    pub fn tag(self) -> &'static str {
        match self {
            FieldType::Guid       => "GUID",
            FieldType::Binary     => "B",
            FieldType::Logical    => "L",
            FieldType::Numeric    => "N",
            FieldType::NChar      => "NC",
            FieldType::NVarChar   => "NVC",
            FieldType::RowVersion => "RV",
            FieldType::NText      => "NT",
            FieldType::Image      => "I",
            FieldType::DateTime   => "DT",
        }
    }

    /// Stored width in bytes for a field of logical `length`, without the
    /// null flag.
    pub fn storage_width(self, length: u32) -> usize {
        let length = length as usize;
        match self {
            FieldType::Guid       => 16,
            FieldType::Binary     => length,
            FieldType::Logical    => 1,
            FieldType::Numeric    => (length + 2) / 2,
            FieldType::NChar      => length * 2,
            FieldType::NVarChar   => length * 2 + 2,
            FieldType::RowVersion => 16,
            FieldType::NText      => 8,
            FieldType::Image      => 8,
            FieldType::DateTime   => 7,
        }
    }

    /// Whether the row stores a BLOB heap reference for this type.
    pub fn is_blob(self) -> bool {
        matches!(self, FieldType::NText | FieldType::Image)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ── Field descriptors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name:           String,
    pub field_type:     FieldType,
    pub length:         u32,
    pub precision:      u32,
    pub case_sensitive: bool,
    pub nullable:       bool,
    /// Offset of the field (including its null flag) within a row.
    pub offset:         usize,
    /// Stored width including the null flag.
    pub byte_size:      usize,
}

impl FieldDescriptor {
    /// Range of the value bytes within a row, past the null flag.
    pub fn value_range(&self) -> std::ops::Range<usize> {
        let start = self.offset + usize::from(self.nullable);
        start..self.offset + self.byte_size
    }
}

/// Position of a field within its table, resolved once by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub usize);

// ── Table schema ────────────────────────────────────────────────────────────

/// Size of a table's row data, filled lazily on first read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSize {
    pub total_bytes: u64,
    pub row_count:   u64,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name:        String,
    pub fields:      Vec<FieldDescriptor>,
    /// Width of one row, soft-delete marker included.
    pub row_size:    usize,
    pub blob_fields: Vec<FieldId>,
    pub record_lock: bool,
    pub data_addr:   PageAddr,
    pub blob_addr:   Option<PageAddr>,
    pub index_addr:  Option<PageAddr>,
    /// The schema text this table was parsed from.
    pub text:        String,
    pub size:        Option<TableSize>,
    by_name:         HashMap<String, FieldId>,
}

impl TableSchema {
    /// Case-insensitive field lookup.
    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.by_name.get(&name.to_uppercase()).copied()
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldDescriptor> {
        self.fields.get(id.0)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Build the row layout from parsed fields.
    ///
    /// `B` fields of length 16 become `GUID`, the row version field moves to
    /// the front, then offsets are assigned from byte 1.
    pub(crate) fn with_layout(
        name:        String,
        mut fields:  Vec<FieldDescriptor>,
        record_lock: bool,
        files:       [PageAddr; 3],
        text:        String,
    ) -> Self {
        let mut version_pos = None;
        for (i, field) in fields.iter_mut().enumerate() {
            if field.field_type == FieldType::Binary && field.length == 16 {
                field.field_type = FieldType::Guid;
            } else if field.field_type == FieldType::RowVersion {
                version_pos = Some(i);
            }
        }
        if let Some(pos) = version_pos.filter(|&p| p > 0) {
            let version = fields.remove(pos);
            fields.insert(0, version);
        }

        let mut row_size = 1;
        let mut by_name = HashMap::with_capacity(fields.len());
        let mut blob_fields = Vec::new();
        for (i, field) in fields.iter_mut().enumerate() {
            by_name.insert(field.name.to_uppercase(), FieldId(i));
            if field.field_type.is_blob() {
                blob_fields.push(FieldId(i));
            }
            field.byte_size = field.field_type.storage_width(field.length) + usize::from(field.nullable);
            field.offset = row_size;
            row_size += field.byte_size;
        }

        let [data_addr, blob_addr, index_addr] = files;
        Self {
            name,
            fields,
            row_size,
            blob_fields,
            record_lock,
            data_addr,
            blob_addr: (blob_addr != 0).then_some(blob_addr),
            index_addr: (index_addr != 0).then_some(index_addr),
            text,
            size: None,
            by_name,
        }
    }
}
