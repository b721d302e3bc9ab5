use criterion::{black_box, criterion_group, criterion_main, Criterion};
use onecd::codec::CodecOptions;
use onecd::schema::parse;
use onecd::{decode_row, ObjectStream, PageStore, PAGE_SIZE};
use std::io::Cursor;

const SCHEMA: &str = "{\"DOCS\",0,\n{\"Fields\",\n\
{\"ID\",\"B\",0,16,0,\"CS\"},\n\
{\"CODE\",\"NVC\",1,25,0,\"CS\"},\n\
{\"AMOUNT\",\"N\",0,15,2,\"CS\"},\n\
{\"POSTED\",\"DT\",0,0,0,\"CS\"},\n\
{\"ACTIVE\",\"L\",0,0,0,\"CS\"}\n\
},\n{\"Indexes\"},\n{\"Recordlock\",\"0\"},\n{\"Files\",5,0,0}\n}";

fn sample_row(row_size: usize) -> Vec<u8> {
    let mut row = vec![0u8; row_size];
    row[1..17].copy_from_slice(&[7u8; 16]);
    row[17] = 1;
    row[18..20].copy_from_slice(&5i16.to_le_bytes());
    for (i, unit) in "HELLO".encode_utf16().enumerate() {
        row[20 + i * 2..22 + i * 2].copy_from_slice(&unit.to_le_bytes());
    }
    let amount = 70;
    row[amount] = 0x10;
    row[amount + 8..amount + 15].copy_from_slice(&[0x20, 0x24, 0x01, 0x31, 0x12, 0x30, 0x45]);
    row[amount + 15] = 1;
    row
}

fn bench_decode_row(c: &mut Criterion) {
    let schema = parse(SCHEMA).unwrap();
    let row = sample_row(schema.row_size);
    let opts = CodecOptions::default();

    c.bench_function("decode_row_mixed", |b| b.iter(|| decode_row(&schema, black_box(&row), &opts).unwrap()));
}

/// Single-object image: header at 0, indirection at 1, leaves from 2.
fn object_image(len: usize) -> Vec<u8> {
    let pages = len.div_ceil(PAGE_SIZE);
    let mut image = vec![0u8; (pages + 2) * PAGE_SIZE];
    image[..8].copy_from_slice(b"1CDBOBV8");
    image[8..12].copy_from_slice(&(len as i32).to_le_bytes());
    image[24..28].copy_from_slice(&1u32.to_le_bytes());
    image[PAGE_SIZE..PAGE_SIZE + 4].copy_from_slice(&(pages as u32).to_le_bytes());
    for i in 0..pages {
        let at = PAGE_SIZE + 4 + i * 4;
        image[at..at + 4].copy_from_slice(&(i as u32 + 2).to_le_bytes());
    }
    image
}

fn bench_stream(c: &mut Criterion) {
    let image = object_image(1000 * PAGE_SIZE);

    for (label, chunk) in [("stream_page_chunks", PAGE_SIZE), ("stream_row_chunks", 150)] {
        c.bench_function(label, |b| {
            b.iter(|| {
                let mut store = PageStore::new(Cursor::new(image.as_slice()));
                let mut stream = ObjectStream::open(&mut store, 0, chunk).unwrap();
                let mut total = 0;
                while let Some(piece) = stream.next_chunk(&mut store).unwrap() {
                    total += piece.len();
                }
                black_box(total)
            })
        });
    }
}

criterion_group!(benches, bench_decode_row, bench_stream);
criterion_main!(benches);
