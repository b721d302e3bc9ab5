pub mod error;
pub mod page;
pub mod object;
pub mod schema;
pub mod codec;
pub mod row;
pub mod blob;
pub mod catalog;
pub mod export;

#[cfg(test)]
mod fixture;

pub use error::{Error, ErrorKind, Result};
pub use page::{PageAddr, PageStore, PAGE_SIZE};
pub use object::{read_object, read_object_strict, ObjectStream, StreamEnd};
pub use schema::{FieldDescriptor, FieldId, FieldType, TableSchema, TableSize};
pub use codec::{BlobRef, BlobValue, CodecOptions, Decimal, Value, EMPTY_GUID};
pub use row::{decode_row, Decoded, Row};
pub use blob::BlobHeap;
pub use catalog::{Catalog, DbVersion, ReaderOptions, ScanItem, ScanOptions, TableScan};
pub use export::{export_table, CsvWriter, JsonLinesWriter, RowWriter, TableWriter};
