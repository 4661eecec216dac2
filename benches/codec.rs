//! Benchmarks for row hashing and the serialization codec.
//!
//! These paths sit under every partition lookup and every cursor
//! round-trip, so regressions here show up directly in generated-code
//! throughput.

use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rowcore::codec::{deserialize_row, serialize_row};
use rowcore::types::{ColumnType, CoreType};
use rowcore::{Cursor, RowDescriptor};

fn bench_desc() -> Rc<RowDescriptor> {
    Rc::new(RowDescriptor::new(vec![
        ("id", ColumnType::not_null(CoreType::Int64)),
        ("count", ColumnType::nullable(CoreType::Int32)),
        ("score", ColumnType::not_null(CoreType::Double)),
        ("active", ColumnType::not_null(CoreType::Bool)),
        ("name", ColumnType::not_null(CoreType::Text)),
        ("payload", ColumnType::nullable(CoreType::Blob)),
    ]))
}

fn bench_cursor(payload_len: usize) -> Cursor {
    let mut c = Cursor::new(bench_desc());
    c.set_i64(0, 123_456_789);
    c.set_i32(1, 42);
    c.set_f64(2, 0.125);
    c.set_bool(3, true);
    c.set_text(4, Some(Rc::from("a plausible name")));
    c.set_blob(5, Some(vec![0xA5u8; payload_len].into()));
    c.set_has_row(true);
    c
}

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize_row");
    for payload_len in [16usize, 256, 4096] {
        let cursor = bench_cursor(payload_len);
        group.bench_with_input(
            BenchmarkId::from_parameter(payload_len),
            &cursor,
            |b, cursor| b.iter(|| serialize_row(black_box(cursor)).unwrap()),
        );
    }
    group.finish();
}

fn bench_deserialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("deserialize_row");
    for payload_len in [16usize, 256, 4096] {
        let blob = serialize_row(&bench_cursor(payload_len)).unwrap();
        let mut target = Cursor::new(bench_desc());
        group.bench_with_input(BenchmarkId::from_parameter(payload_len), &blob, |b, blob| {
            b.iter(|| deserialize_row(black_box(blob), &mut target).unwrap())
        });
    }
    group.finish();
}

fn bench_row_hash(c: &mut Criterion) {
    let cursor = bench_cursor(256);
    c.bench_function("cursor_hash", |b| {
        b.iter(|| rowcore::rows::cursor_hash(black_box(&cursor)))
    });
}

criterion_group!(benches, bench_serialize, bench_deserialize, bench_row_hash);
criterion_main!(benches);
