//! Fixed-width row decoding.
//!
//! Byte 0 of every row is the soft-delete marker; a row starting with `1`
//! is skipped before any field is decoded.  Nullable fields carry one flag
//! byte in front of their value, and a flag of `0` means the value is absent.

use crate::codec::{decode, BlobValue, CodecOptions, Value};
use crate::error::{Error, Result};
use crate::schema::{FieldId, TableSchema};

/// Soft-delete marker value in row byte 0.
pub const DELETED_MARKER: u8 = 1;

/// One decoded record, one slot per schema field.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Option<Value>>,
}

impl Row {
    pub fn new(values: Vec<Option<Value>>) -> Self {
        Self { values }
    }

    pub fn get(&self, id: FieldId) -> Option<&Value> {
        self.values.get(id.0).and_then(Option::as_ref)
    }

    /// Name lookup through the schema; prefer resolving a [`FieldId`] once.
    pub fn by_name(&self, schema: &TableSchema, name: &str) -> Option<&Value> {
        schema.field_id(name).and_then(|id| self.get(id))
    }

    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn set(&mut self, id: FieldId, value: Option<Value>) {
        if let Some(slot) = self.values.get_mut(id.0) {
            *slot = value;
        }
    }

    /// Store a resolved BLOB, decoding `NT` content as UTF-16 text with
    /// one leading byte-order mark dropped.
    pub(crate) fn set_blob(&mut self, id: FieldId, bytes: Option<Vec<u8>>, as_text: bool) {
        let value = bytes.map(|b| {
            Value::Blob(if as_text {
                let text = crate::codec::utf16le(&b);
                BlobValue::Text(match text.strip_prefix('\u{feff}') {
                    Some(rest) => rest.to_owned(),
                    None => text,
                })
            } else {
                BlobValue::Bytes(b)
            })
        });
        self.set(id, value);
    }
}

/// Result of decoding one row slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Row(Row),
    Deleted,
}

/// Decode one row buffer against `schema`.
pub fn decode_row(schema: &TableSchema, buf: &[u8], opts: &CodecOptions) -> Result<Decoded> {
    if buf.len() < schema.row_size {
        return Err(Error::format(format!(
            "row of table {} is {} bytes, layout needs {}",
            schema.name,
            buf.len(),
            schema.row_size
        )));
    }
    if buf[0] == DELETED_MARKER {
        return Ok(Decoded::Deleted);
    }

    let mut values = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        if field.nullable && buf[field.offset] == 0 {
            values.push(None);
            continue;
        }
        values.push(Some(decode(field, &buf[field.value_range()], opts)?));
    }
    Ok(Decoded::Row(Row::new(values)))
}
