#[path = "../src/fixture.rs"]
mod fixture;

use fixture::{blob_heap, id_name_row, root_payload, utf16le, FieldSpec, ImageBuilder, ID_NAME_FIELDS};
use onecd::codec::{guid_from_disk, guid_to_disk, parse_guid};
use onecd::export::{export_table, CsvWriter};
use onecd::{
    BlobValue, Catalog, ErrorKind, ObjectStream, PageStore, ReaderOptions, ScanItem, ScanOptions, StreamEnd,
    Value, EMPTY_GUID, PAGE_SIZE,
};
use proptest::prelude::*;
use std::io::{Cursor, Write};
use tempfile::NamedTempFile;

const GUID_BYTES: [u8; 16] = [
    0x78, 0x56, 0x34, 0x12, 0x34, 0x12, 0x78, 0x56, 0x9a, 0xbc, 0xde, 0xf0, 0x12, 0x34, 0x56, 0x78,
];

fn write_image(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

fn single_table_image() -> Vec<u8> {
    let mut rows = id_name_row(false, GUID_BYTES, Some("Alice"));
    rows.extend(id_name_row(true, [0xff; 16], Some("Deleted")));
    ImageBuilder::database("ru_RU", &[("USERS", ID_NAME_FIELDS, rows, None)])
}

#[test]
fn test_open_and_read_single_table() {
    let file = write_image(&single_table_image());
    let mut db = Catalog::open(file.path()).unwrap();

    assert_eq!(db.language(), "ru_RU");
    assert_eq!(db.version().unwrap().to_string(), "8.3.8.0");
    assert_eq!(db.tables().len(), 1);

    let schema = db.table("users").unwrap();
    let (id, name) = (schema.field_id("ID").unwrap(), schema.field_id("Name").unwrap());
    let rows = db.rows("USERS").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get(id).map(ToString::to_string).as_deref(),
        Some("12345678-1234-5678-9abc-def012345678")
    );
    assert_eq!(rows[0].get(name).and_then(Value::as_text).map(str::trim_end), Some("Alice"));
}

#[test]
fn test_header_then_rows() {
    let file = write_image(&single_table_image());
    let mut db = Catalog::open(file.path()).unwrap();
    let items: Vec<ScanItem> = db
        .iterate_rows("USERS", ScanOptions::new().emit_header(true))
        .unwrap()
        .collect::<onecd::Result<_>>()
        .unwrap();
    assert_eq!(items.len(), 2);
    assert!(matches!(&items[0], ScanItem::Header(fields) if fields.len() == 2));
    assert!(matches!(&items[1], ScanItem::Row(_)));
}

#[test]
fn test_not_found_errors() {
    let file = write_image(&single_table_image());
    let mut db = Catalog::open(file.path()).unwrap();
    assert_eq!(db.rows("MISSING").unwrap_err().kind(), ErrorKind::NotFound);

    let dir = tempfile::tempdir().unwrap();
    let err = Catalog::open(dir.path().join("none.1CD")).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_file_without_root_object() {
    let mut image = ImageBuilder::new();
    image.version_page([8, 3, 8, 0], 2);
    image.add_object(b"not the root");
    let file = write_image(&image.into_bytes());
    let err = Catalog::open(file.path()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_blob_table_with_filter_and_csv() {
    const FILES: &[FieldSpec<'static>] = &[("FILENAME", "NVC", false, 8, 0), ("DATA", "I", true, 0, 0)];
    let big: Vec<u8> = (0..540u32).map(|i| (i % 7) as u8).collect();
    let (heap, refs) = blob_heap(&[&big[..], &b"tiny"[..]]);

    let mut rows = Vec::new();
    for (name, (start, len)) in [("big.bin", refs[0]), ("tiny", refs[1])] {
        rows.push(0);
        rows.extend((name.len() as i16).to_le_bytes());
        let mut text = utf16le(name);
        text.resize(16, 0);
        rows.extend(text);
        rows.push(1);
        rows.extend(start.to_le_bytes());
        rows.extend(len.to_le_bytes());
    }
    let file = write_image(&ImageBuilder::database("en", &[("FILES", FILES, rows, Some(heap))]));
    let mut db = Catalog::open(file.path()).unwrap();

    let filename = db.table("FILES").unwrap().field_id("FILENAME").unwrap();
    let data = db.table("FILES").unwrap().field_id("DATA").unwrap();
    let scan = ScanOptions::new()
        .include_blobs(true)
        .filter(move |row| row.get(filename).and_then(Value::as_text) == Some("big.bin"));
    let rows: Vec<ScanItem> = db.iterate_rows("FILES", scan).unwrap().collect::<onecd::Result<_>>().unwrap();
    let [ScanItem::Row(row)] = rows.as_slice() else { panic!("one row expected") };
    assert_eq!(row.get(data), Some(&Value::Blob(BlobValue::Bytes(big))));

    let out = NamedTempFile::new().unwrap();
    let written = export_table(&mut db, "FILES", true, &mut CsvWriter::new(out.reopen().unwrap())).unwrap();
    assert_eq!(written, 2);
    let csv = std::fs::read_to_string(out.path()).unwrap();
    assert_eq!(csv.lines().nth(2), Some(r#""tiny","74696e79""#));
}

#[test]
fn test_truncated_table_strict_and_lenient() {
    let mut image = ImageBuilder::new();
    image.version_page([8, 3, 8, 0], 1);
    let root = image.alloc();
    let data = image.alloc();
    let leaf = image.alloc();
    image.put(leaf, 0, &id_name_row(false, GUID_BYTES, Some("only")));
    image.write_header(data, (PAGE_SIZE * 2) as i32, &[leaf], 0);
    let schema = image.add_schema("T", ID_NAME_FIELDS, data, 0);
    image.write_object(root, &root_payload("en", &[schema]), 1);
    let file = write_image(&image.into_bytes());

    let mut lenient = Catalog::open(file.path()).unwrap();
    assert_eq!(lenient.rows("T").unwrap().len(), PAGE_SIZE / 38);

    let mut strict = Catalog::open_with(file.path(), ReaderOptions::default().strict(true)).unwrap();
    assert_eq!(strict.rows("T").unwrap_err().kind(), ErrorKind::Truncated);
}

#[test]
fn test_empty_guid_constant() {
    assert_eq!(EMPTY_GUID.to_string(), "00000000-0000-0000-0000-000000000000");
    assert_eq!(parse_guid("00000000-0000-0000-0000-000000000000").unwrap(), [0u8; 16]);
    assert!(parse_guid("not-a-guid").is_err());
}

fn object_image(data: &[u8]) -> (PageStore<Cursor<Vec<u8>>>, u32) {
    let mut image = ImageBuilder::new();
    let header = image.add_object(data);
    (PageStore::new(Cursor::new(image.into_bytes())), header)
}

proptest! {
    #[test]
    fn prop_stream_chunks_concatenate_to_object(
        len in 0usize..20_000,
        chunk in prop::sample::select(vec![1usize, 38, 1000, 4095, 4096, 4097, 8192, 10_000]),
    ) {
        let data: Vec<u8> = (0..len).map(|i| (i * 7 % 253) as u8).collect();
        let (mut store, header) = object_image(&data);
        let mut stream = ObjectStream::open(&mut store, header, chunk).unwrap();
        let chunks: Vec<Vec<u8>> = stream.chunks(&mut store).collect::<onecd::Result<_>>().unwrap();

        prop_assert_eq!(stream.end(), Some(StreamEnd::Complete));
        if chunk <= PAGE_SIZE {
            prop_assert_eq!(chunks.concat(), data);
        } else {
            let kept = len - len % chunk;
            prop_assert!(chunks.iter().all(|c| c.len() == chunk));
            prop_assert_eq!(chunks.concat(), data[..kept].to_vec());
            prop_assert_eq!(stream.discarded_tail(), len - kept);
        }
    }

    #[test]
    fn prop_guid_text_round_trip(bytes in any::<[u8; 16]>()) {
        let text = guid_from_disk(bytes).to_string();
        prop_assert_eq!(parse_guid(&text).unwrap(), bytes);
        prop_assert_eq!(guid_to_disk(&guid_from_disk(bytes)), bytes);
    }
}
