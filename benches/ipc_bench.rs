// In benches/ipc_bench.rs

use std::io::Cursor;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use arrow::buffer::Buffer;
use tambak_ipc::config::IpcConfig;
use tambak_ipc::ipc::{
    deserialize_message_batch, serialize_record_batch, ArrowRecordBatch, MessageChannelReader,
    WriteChannel,
};
use tambak_ipc::memory::HeapAllocator;
use tambak_ipc::types::ArrowFieldNode;
use tambak_ipc::utils::typed_slice_to_buffer;

// --- MOCK DATA GENERATION ---

/// A batch of `rows` rows with one nullable i64 column and one non-null f64 column.
fn generate_batch(rows: usize) -> ArrowRecordBatch {
    let values: Vec<i64> = (0..rows as i64).collect();
    let floats: Vec<f64> = (0..rows).map(|i| i as f64 * 0.5).collect();
    let validity = Buffer::from_vec(vec![0b1011_1111u8; rows.div_ceil(8)]);
    ArrowRecordBatch::new(
        rows as i32,
        vec![
            ArrowFieldNode::new(rows as i32, (rows / 8) as i32),
            ArrowFieldNode::new(rows as i32, 0),
        ],
        vec![
            validity,
            typed_slice_to_buffer(&values),
            Buffer::from_vec(Vec::<u8>::new()),
            typed_slice_to_buffer(&floats),
        ],
    )
}

// --- Benchmark Suite ---

const BENCH_ROWS: usize = 65536;

fn bench_batch_codec(c: &mut Criterion) {
    let batch = generate_batch(BENCH_ROWS);
    let mut out = WriteChannel::new(Vec::new());
    serialize_record_batch(&mut out, &batch).unwrap();
    let encoded = out.into_inner();
    let config = Arc::new(IpcConfig::default());
    let alloc = HeapAllocator::new();

    let mut group = c.benchmark_group("Record Batch Codec");
    group.throughput(criterion::Throughput::Bytes(encoded.len() as u64));

    group.bench_function("serialize", |b| {
        b.iter(|| {
            let mut out = WriteChannel::new(Vec::with_capacity(encoded.len()));
            black_box(serialize_record_batch(&mut out, black_box(&batch)).unwrap());
        })
    });

    group.bench_function("deserialize", |b| {
        b.iter(|| {
            let mut reader = MessageChannelReader::new(Cursor::new(&encoded[..]), config.clone());
            black_box(deserialize_message_batch(&mut reader, &alloc).unwrap());
        })
    });

    group.finish();
}

criterion_group!(benches, bench_batch_codec);
criterion_main!(benches);
