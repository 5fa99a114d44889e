use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use fjoin_exec::{JoinConfig, JoinHashTable};
use fjoin_types::{DataChunk, JoinCondition, JoinType, LogicalType, Value};

const PROBE_CHUNK: usize = 2048;

fn build_chunks(row_count: usize) -> (DataChunk, DataChunk) {
    let keys: Vec<Vec<Value>> = (0..row_count)
        .map(|i| vec![Value::Int64(i64::try_from(i % (row_count / 2).max(1)).unwrap_or(0))])
        .collect();
    let payload: Vec<Vec<Value>> = (0..row_count)
        .map(|i| vec![Value::from(format!("bench-row-{i:06}"))])
        .collect();
    (
        DataChunk::from_rows(&[LogicalType::Int64], &keys).expect("keys should build"),
        DataChunk::from_rows(&[LogicalType::Varchar], &payload).expect("payload should build"),
    )
}

fn build_table(join_type: JoinType, keys: &DataChunk, payload: &DataChunk) -> JoinHashTable {
    let mut ht = JoinHashTable::new(
        vec![JoinCondition::equal(LogicalType::Int64)],
        vec![LogicalType::Varchar],
        join_type,
        JoinConfig::default(),
    )
    .expect("table should initialize");
    ht.build(keys, payload).expect("build should succeed");
    ht.finalize().expect("finalize should succeed");
    ht
}

fn probe_chunk(row_count: usize) -> DataChunk {
    let keys: Vec<Vec<Value>> = (0..PROBE_CHUNK)
        .map(|i| vec![Value::Int64(i64::try_from((i * 7) % row_count).unwrap_or(0))])
        .collect();
    DataChunk::from_rows(&[LogicalType::Int64], &keys).expect("probe keys should build")
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_join_build");
    for row_count in [4_096_usize, 32_768_usize] {
        let (keys, payload) = build_chunks(row_count);
        group.throughput(Throughput::Elements(u64::try_from(row_count).unwrap_or(u64::MAX)));
        group.bench_with_input(
            BenchmarkId::from_parameter(row_count),
            &(keys, payload),
            |b, (keys, payload)| {
                b.iter(|| {
                    let ht = build_table(JoinType::Inner, keys, payload);
                    criterion::black_box(ht.count());
                });
            },
        );
    }
    group.finish();
}

fn bench_probe(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_join_probe");
    for join_type in [JoinType::Inner, JoinType::Left, JoinType::Semi, JoinType::Mark] {
        let row_count = 32_768_usize;
        let (keys, payload) = build_chunks(row_count);
        let ht = build_table(join_type, &keys, &payload);
        let probe = probe_chunk(row_count);
        group.throughput(Throughput::Elements(PROBE_CHUNK as u64));
        group.bench_function(BenchmarkId::new("probe", join_type.as_str()), |b| {
            b.iter(|| {
                let mut scan = ht.probe(&probe).expect("probe should succeed");
                let mut produced = 0_usize;
                loop {
                    let chunk = scan.next(&probe, &probe).expect("next should succeed");
                    if chunk.is_empty() {
                        break;
                    }
                    produced += chunk.len();
                }
                criterion::black_box(produced);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_probe);
criterion_main!(benches);
