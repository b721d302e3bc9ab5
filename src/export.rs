//! Table export: console table, CSV and JSON lines.
//!
//! | Format | Header | Row | Absent value |
//! |--------|--------|-----|--------------|
//! | console | `name type(NULL\|0 length)` per field, `\|`-separated | values padded to 32 columns | blank |
//! | CSV | quoted field names | quoted values, `"` doubled | `""` |
//! | JSON lines | none | one object per row keyed by field name | `null` |
//!
//! Writers implement [`RowWriter`]; [`export_table`] drives one from a
//! catalog scan.

use serde_json::{Map, Value as Json};
use std::io::{self, Read, Seek, Write};

use crate::catalog::{Catalog, ScanItem, ScanOptions};
use crate::error::Result;
use crate::row::Row;
use crate::schema::{FieldDescriptor, TableSchema, TableSize};

const NAME_WIDTH:  usize = 20;
const VALUE_WIDTH: usize = 32;

pub trait RowWriter {
    /// Called once with the table's fields before any row.
    fn header(&mut self, fields: &[FieldDescriptor]) -> io::Result<()>;
    fn row(&mut self, row: &Row) -> io::Result<()>;
    fn finish(&mut self) -> io::Result<()>;
}

/// Stream every non-deleted row of `table` into `writer`.  Returns the
/// number of rows written.
pub fn export_table<R, W>(
    catalog:       &mut Catalog<R>,
    table:         &str,
    include_blobs: bool,
    writer:        &mut W,
) -> Result<u64>
where
    R: Read + Seek,
    W: RowWriter + ?Sized,
{
    let scan = ScanOptions::new().emit_header(true).include_blobs(include_blobs);
    let mut written = 0;
    for item in catalog.iterate_rows(table, scan)? {
        match item? {
            ScanItem::Header(fields) => writer.header(&fields)?,
            ScanItem::Row(row) => {
                writer.row(&row)?;
                written += 1;
            }
        }
    }
    writer.finish()?;
    Ok(written)
}

// ── Console table ───────────────────────────────────────────────────────────

pub struct TableWriter<W> {
    out: W,
}

impl<W: Write> TableWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> RowWriter for TableWriter<W> {
    fn header(&mut self, fields: &[FieldDescriptor]) -> io::Result<()> {
        let cells: Vec<String> = fields
            .iter()
            .map(|f| {
                let null = if f.nullable { "NULL" } else { "0" };
                format!("{:NAME_WIDTH$}{:3}({null:4}{:3})", f.name, f.field_type.tag(), f.length)
            })
            .collect();
        writeln!(self.out, "{}", cells.join("|"))
    }

    fn row(&mut self, row: &Row) -> io::Result<()> {
        let cells: Vec<String> = row
            .values()
            .iter()
            .map(|v| format!("{:VALUE_WIDTH$}", v.as_ref().map(ToString::to_string).unwrap_or_default()))
            .collect();
        writeln!(self.out, "{}", cells.join("|"))
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

// ── CSV ─────────────────────────────────────────────────────────────────────

pub struct CsvWriter<W> {
    out: W,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn line<'a>(&mut self, cells: impl Iterator<Item = &'a str>) -> io::Result<()> {
        let quoted: Vec<String> = cells.map(|c| format!("\"{}\"", c.replace('"', "\"\""))).collect();
        writeln!(self.out, "{}", quoted.join(","))
    }
}

impl<W: Write> RowWriter for CsvWriter<W> {
    fn header(&mut self, fields: &[FieldDescriptor]) -> io::Result<()> {
        self.line(fields.iter().map(|f| f.name.as_str()))
    }

    fn row(&mut self, row: &Row) -> io::Result<()> {
        let texts: Vec<String> = row
            .values()
            .iter()
            .map(|v| v.as_ref().map(ToString::to_string).unwrap_or_default())
            .collect();
        self.line(texts.iter().map(String::as_str))
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

// ── JSON lines ──────────────────────────────────────────────────────────────

pub struct JsonLinesWriter<W> {
    out:   W,
    names: Vec<String>,
}

impl<W: Write> JsonLinesWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, names: Vec::new() }
    }
}

impl<W: Write> RowWriter for JsonLinesWriter<W> {
    fn header(&mut self, fields: &[FieldDescriptor]) -> io::Result<()> {
        self.names = fields.iter().map(|f| f.name.clone()).collect();
        Ok(())
    }

    fn row(&mut self, row: &Row) -> io::Result<()> {
        let mut object = Map::with_capacity(self.names.len());
        for (name, value) in self.names.iter().zip(row.values()) {
            object.insert(name.clone(), serde_json::to_value(value)?);
        }
        serde_json::to_writer(&mut self.out, &object)?;
        self.out.write_all(b"\n")
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

// ── Descriptions ────────────────────────────────────────────────────────────

/// Table summary in `label: value` form.
pub fn describe_table(out: &mut impl Write, schema: &TableSchema, size: TableSize) -> io::Result<()> {
    writeln!(out, "          name: {}", schema.name)?;
    writeln!(out, " blob contains: {}", schema.blob_addr.is_some())?;
    writeln!(out, "index contains: {}", schema.index_addr.is_some())?;
    writeln!(out, "   record_lock: {}", schema.record_lock)?;
    writeln!(out, "      row_size: {}", schema.row_size)?;
    writeln!(out, "    table_size: {}", size.total_bytes)?;
    writeln!(out, "    rows_count: {}", size.row_count)
}

/// Field listing with row offsets and stored widths.
pub fn describe_fields(out: &mut impl Write, schema: &TableSchema) -> io::Result<()> {
    writeln!(out, "{:<24} {:<5} {:>6} {:>9} {:>4} {:>8} {:>6} {:>5}",
             "Field", "Type", "Length", "Precision", "CS", "Nullable", "Offset", "Size")?;
    for f in &schema.fields {
        writeln!(out, "{:<24} {:<5} {:>6} {:>9} {:>4} {:>8} {:>6} {:>5}",
                 f.name, f.field_type.tag(), f.length, f.precision,
                 f.case_sensitive, f.nullable, f.offset, f.byte_size)?;
    }
    Ok(())
}
