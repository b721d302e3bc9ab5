//! Field value codecs: one pure decode function per physical type tag.
//!
//! # Encodings
//!
//! | Tag | Width | Value |
//! |-----|-------|-------|
//! | `GUID` | 16 | mixed-endian GUID: first three groups little-endian, last eight bytes as stored |
//! | `B` | length | hex text |
//! | `L` | 1 | `true` iff the byte is 1 |
//! | `N` | (length+2)/2 | packed decimal: sign nibble (`0` = negative), then `length` digit nibbles |
//! | `NC` | length*2 | fixed-width UTF-16LE |
//! | `NVC` | length*2+2 | LE i16 unit count, then UTF-16LE units |
//! | `RV` | 16 | four LE u32 |
//! | `NT`, `I` | 8 | BLOB reference: LE u32 start node, LE u32 length |
//! | `DT` | 7 | packed digits `YYYYMMDDHHMMSS` |
//!
//! The sign nibble and the date "no time" sentinel (bytes 4–5 zero) were
//! inferred from observed files; values relying on them are display-grade.

use byteorder::{ByteOrder, LittleEndian};
use chrono::NaiveDateTime;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::schema::{FieldDescriptor, FieldType};

// ── Options ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    /// Render `GUID` fields as plain hex of the stored bytes.
    pub raw_guids: bool,
}

// ── Values ──────────────────────────────────────────────────────────────────

/// Reference into a table's BLOB heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobRef {
    pub start_node: u32,
    pub length:     u32,
}

impl BlobRef {
    pub const fn new(start_node: u32, length: u32) -> Self {
        Self { start_node, length }
    }

    /// A zero start node or zero length means "no value".
    pub fn is_empty(&self) -> bool {
        self.start_node == 0 || self.length == 0
    }
}

/// BLOB field content: a reference until resolved, then text or bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobValue {
    Ref(BlobRef),
    Text(String),
    Bytes(Vec<u8>),
}

/// Fixed-point number decoded from a packed decimal with precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    pub mantissa: i128,
    pub scale:    u32,
}

impl Decimal {
    pub fn to_f64(self) -> f64 {
        self.mantissa as f64 / 10f64.powi(self.scale as i32)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = format!("{:0>width$}", self.mantissa.unsigned_abs(), width = self.scale as usize + 1);
        let (int, frac) = digits.split_at(digits.len() - self.scale as usize);
        let sign = if self.mantissa < 0 { "-" } else { "" };
        if frac.is_empty() {
            write!(f, "{sign}{int}")
        } else {
            write!(f, "{sign}{int}.{frac}")
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Guid(Uuid),
    /// Hex text of binary data (also `GUID` fields in raw mode).
    Binary(String),
    Bool(bool),
    Int(i128),
    Decimal(Decimal),
    Text(String),
    RowVersion([u32; 4]),
    Blob(BlobValue),
    DateTime(NaiveDateTime),
    /// Date digits that do not form a calendar value, or carry the
    /// "no time" sentinel.
    RawDate(String),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Binary(s) | Value::RawDate(s) => Some(s),
            Value::Blob(BlobValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob_ref(&self) -> Option<BlobRef> {
        match self {
            Value::Blob(BlobValue::Ref(r)) => Some(*r),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Guid(g)       => write!(f, "{}", g.hyphenated()),
            Value::Binary(s)     => f.write_str(s),
            Value::Bool(b)       => write!(f, "{b}"),
            Value::Int(i)        => write!(f, "{i}"),
            Value::Decimal(d)    => write!(f, "{d}"),
            Value::Text(s)       => f.write_str(s),
            Value::RowVersion(v) => write!(f, "{}.{}.{}.{}", v[0], v[1], v[2], v[3]),
            Value::Blob(BlobValue::Ref(r))   => write!(f, "<blob {}:{}>", r.start_node, r.length),
            Value::Blob(BlobValue::Text(s))  => f.write_str(s),
            Value::Blob(BlobValue::Bytes(b)) => f.write_str(&hex::encode(b)),
            Value::DateTime(dt)  => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::RawDate(s)    => f.write_str(s),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Bool(b)       => serializer.serialize_bool(*b),
            Value::Int(i)        => match i64::try_from(*i) {
                Ok(small) => serializer.serialize_i64(small),
                Err(_)    => serializer.collect_str(i),
            },
            Value::Decimal(d)    => serializer.collect_str(d),
            Value::RowVersion(v) => v.serialize(serializer),
            Value::Blob(BlobValue::Ref(r)) => {
                let mut s = serializer.serialize_struct("BlobRef", 2)?;
                s.serialize_field("start_node", &r.start_node)?;
                s.serialize_field("length", &r.length)?;
                s.end()
            }
            Value::DateTime(dt)  => serializer.collect_str(&dt.format("%Y-%m-%dT%H:%M:%S")),
            other                => serializer.collect_str(other),
        }
    }
}

// ── GUID helpers ────────────────────────────────────────────────────────────

/// The all-zero GUID, used by the format for "no reference".
pub const EMPTY_GUID: Uuid = Uuid::nil();

/// GUID of the 16 stored bytes.
pub fn guid_from_disk(bytes: [u8; 16]) -> Uuid {
    Uuid::from_bytes_le(bytes)
}

/// Stored form of a GUID.
pub fn guid_to_disk(guid: &Uuid) -> [u8; 16] {
    guid.to_bytes_le()
}

/// Parse GUID text into its stored 16-byte form.
pub fn parse_guid(text: &str) -> Result<[u8; 16]> {
    Uuid::parse_str(text)
        .map(|g| guid_to_disk(&g))
        .map_err(|e| Error::format(format!("invalid GUID {text:?}: {e}")))
}

// ── Decoders ────────────────────────────────────────────────────────────────

type DecodeFn = fn(&FieldDescriptor, &[u8], &CodecOptions) -> std::result::Result<Value, String>;

/// Resolve a type tag to its decoder.
fn decoder(field_type: FieldType) -> DecodeFn {
    match field_type {
        FieldType::Guid       => decode_guid,
        FieldType::Binary     => decode_binary,
        FieldType::Logical    => decode_logical,
        FieldType::Numeric    => decode_numeric,
        FieldType::NChar      => decode_nchar,
        FieldType::NVarChar   => decode_nvarchar,
        FieldType::RowVersion => decode_row_version,
        FieldType::NText      => decode_blob_ref,
        FieldType::Image      => decode_blob_ref,
        FieldType::DateTime   => decode_datetime,
    }
}

/// Decode the value bytes of `field`.  `raw` excludes the null flag and must
/// hold at least the type's stored width.
pub fn decode(field: &FieldDescriptor, raw: &[u8], opts: &CodecOptions) -> Result<Value> {
    let width = field.field_type.storage_width(field.length);
    let fail = |reason: String| Error::Decode {
        field:  field.name.clone(),
        tag:    field.field_type.tag(),
        reason,
    };
    let raw = raw
        .get(..width)
        .ok_or_else(|| fail(format!("need {width} bytes, have {}", raw.len())))?;
    decoder(field.field_type)(field, raw, opts).map_err(fail)
}

pub(crate) fn utf16le(raw: &[u8]) -> String {
    let units: Vec<u16> = raw.chunks_exact(2).map(LittleEndian::read_u16).collect();
    String::from_utf16_lossy(&units)
}

fn decode_guid(_: &FieldDescriptor, raw: &[u8], opts: &CodecOptions) -> std::result::Result<Value, String> {
    if opts.raw_guids {
        return Ok(Value::Binary(hex::encode(raw)));
    }
    let bytes: [u8; 16] = raw.try_into().map_err(|_| "GUID needs 16 bytes".to_string())?;
    Ok(Value::Guid(guid_from_disk(bytes)))
}

fn decode_binary(_: &FieldDescriptor, raw: &[u8], _: &CodecOptions) -> std::result::Result<Value, String> {
    Ok(Value::Binary(hex::encode(raw)))
}

fn decode_logical(_: &FieldDescriptor, raw: &[u8], _: &CodecOptions) -> std::result::Result<Value, String> {
    Ok(Value::Bool(raw[0] == 1))
}

fn decode_numeric(field: &FieldDescriptor, raw: &[u8], _: &CodecOptions) -> std::result::Result<Value, String> {
    let length = field.length as usize;
    let scale = field.precision;
    if scale as usize > length {
        return Err(format!("precision {scale} exceeds length {length}"));
    }
    let nibbles: Vec<u8> = raw.iter().flat_map(|b| [b >> 4, b & 0x0f]).collect();
    let negative = nibbles[0] == 0;

    let mut mantissa: i128 = 0;
    for &digit in &nibbles[1..=length] {
        if digit > 9 {
            return Err(format!("invalid digit nibble {digit:#x}"));
        }
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(digit as i128))
            .ok_or_else(|| format!("{length}-digit value overflows"))?;
    }
    if negative {
        mantissa = -mantissa;
    }

    Ok(if scale == 0 {
        Value::Int(mantissa)
    } else {
        Value::Decimal(Decimal { mantissa, scale })
    })
}

fn decode_nvarchar(field: &FieldDescriptor, raw: &[u8], _: &CodecOptions) -> std::result::Result<Value, String> {
    let count = LittleEndian::read_i16(&raw[..2]);
    let units = usize::try_from(count).map_err(|_| format!("negative length {count}"))?;
    if units > field.length as usize {
        return Err(format!("length {units} exceeds declared {}", field.length));
    }
    Ok(Value::Text(utf16le(&raw[2..2 + units * 2])))
}

fn decode_nchar(_: &FieldDescriptor, raw: &[u8], _: &CodecOptions) -> std::result::Result<Value, String> {
    Ok(Value::Text(utf16le(raw)))
}

fn decode_row_version(_: &FieldDescriptor, raw: &[u8], _: &CodecOptions) -> std::result::Result<Value, String> {
    let mut v = [0u32; 4];
    LittleEndian::read_u32_into(raw, &mut v);
    Ok(Value::RowVersion(v))
}

fn decode_blob_ref(_: &FieldDescriptor, raw: &[u8], _: &CodecOptions) -> std::result::Result<Value, String> {
    Ok(Value::Blob(BlobValue::Ref(BlobRef::new(
        LittleEndian::read_u32(&raw[..4]),
        LittleEndian::read_u32(&raw[4..8]),
    ))))
}

fn decode_datetime(_: &FieldDescriptor, raw: &[u8], _: &CodecOptions) -> std::result::Result<Value, String> {
    let digits = hex::encode(raw);
    if raw[4] == 0 && raw[5] == 0 {
        return Ok(Value::RawDate(digits));
    }
    Ok(match NaiveDateTime::parse_from_str(&digits, "%Y%m%d%H%M%S") {
        Ok(dt) => Value::DateTime(dt),
        Err(_) => Value::RawDate(digits),
    })
}
