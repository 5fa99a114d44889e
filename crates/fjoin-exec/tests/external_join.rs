use fjoin_error::JoinError;
use fjoin_exec::{JoinConfig, JoinHTScanState, JoinHashTable, TaskScheduler};
use fjoin_types::{DataChunk, JoinCondition, JoinType, LogicalType, Value};
use proptest::prelude::*;

type BuildRow = (Option<i64>, String);

fn external_config() -> JoinConfig {
    JoinConfig {
        min_directory_capacity: 4,
        rows_per_block: 6,
        heap_block_size: 48,
        vector_size: 5,
        initial_radix_bits: 2,
        max_initial_radix_bits: 2,
        max_radix_bits: 8,
        force_external: true,
        ..JoinConfig::default()
    }
}

fn conditions() -> Vec<JoinCondition> {
    vec![JoinCondition::equal(LogicalType::Int64)]
}

fn key_chunk(keys: &[Option<i64>]) -> DataChunk {
    DataChunk::from_rows(
        &[LogicalType::Int64],
        &keys.iter().map(|&k| vec![Value::from(k)]).collect::<Vec<_>>(),
    )
    .expect("key chunk")
}

fn build_local(join_type: JoinType, config: &JoinConfig, rows: &[BuildRow]) -> JoinHashTable {
    let mut ht = JoinHashTable::new(
        conditions(),
        vec![LogicalType::Varchar],
        join_type,
        config.clone(),
    )
    .expect("hash table");
    let keys: Vec<Option<i64>> = rows.iter().map(|(k, _)| *k).collect();
    let payload = DataChunk::from_rows(
        &[LogicalType::Varchar],
        &rows
            .iter()
            .map(|(_, v)| vec![Value::from(v.as_str())])
            .collect::<Vec<_>>(),
    )
    .expect("payload");
    ht.build(&key_chunk(&keys), &payload).expect("build");
    ht
}

fn drain(ht: &JoinHashTable, keys: &DataChunk, left: &DataChunk, out: &mut Vec<Vec<Value>>) {
    let mut scan = ht.probe(keys).expect("probe");
    loop {
        let chunk = scan.next(keys, left).expect("next");
        if chunk.is_empty() {
            break;
        }
        out.extend(chunk.rows());
    }
}

fn drain_full_outer(ht: &JoinHashTable, out: &mut Vec<Vec<Value>>) {
    if !ht.join_type().is_right_outer() {
        return;
    }
    let mut state = JoinHTScanState::new();
    let mut addresses = Vec::new();
    while ht.scan_full_outer(&mut state, &mut addresses).expect("scan") > 0 {
        out.extend(
            ht.gather_full_outer(&[LogicalType::Int64], &addresses)
                .expect("gather")
                .rows(),
        );
    }
}

fn in_memory_join(join_type: JoinType, build: &[BuildRow], probe: &[Option<i64>]) -> Vec<Vec<Value>> {
    let mut ht = build_local(join_type, &external_config(), build);
    ht.finalize().expect("finalize");
    let mut out = Vec::new();
    for keys in probe.chunks(9) {
        let keys = key_chunk(keys);
        drain(&ht, &keys, &keys, &mut out);
    }
    drain_full_outer(&ht, &mut out);
    out
}

/// Run the join through partitioned rounds: the first round probes directly
/// and spills, later rounds replay the spilled probe rows.
fn external_join(
    join_type: JoinType,
    build: &[BuildRow],
    probe: &[Option<i64>],
    threads: usize,
) -> Result<(Vec<Vec<Value>>, usize), JoinError> {
    let config = external_config();
    let scheduler = TaskScheduler::new(threads);
    let locals: Vec<JoinHashTable> = build
        .chunks(build.len().div_ceil(3).max(1))
        .map(|rows| build_local(join_type, &config, rows))
        .collect();
    let mut global = JoinHashTable::new(
        conditions(),
        vec![LogicalType::Varchar],
        join_type,
        config.clone(),
    )?;
    global.schedule_partition_tasks(locals, 1 << 20, &scheduler)?;

    let mut out = Vec::new();
    let mut rounds = 0;
    assert!(global.finalize_external()?);
    rounds += 1;
    let mut local_spill =
        JoinHashTable::new_probe_spill(conditions(), vec![LogicalType::Int64], config.clone())?;
    for keys in probe.chunks(9) {
        let keys = key_chunk(keys);
        let mut round = global.probe_and_build(&keys, &keys, &mut local_spill)?;
        loop {
            let chunk = round.scan.next(&round.keys, &round.payload)?;
            if chunk.is_empty() {
                break;
            }
            out.extend(chunk.rows());
        }
    }
    drain_full_outer(&global, &mut out);
    global.unfinalize()?;

    let mut probe_spill =
        JoinHashTable::new_probe_spill(conditions(), vec![LogicalType::Int64], config)?;
    probe_spill.partition_probe_spills(&global, vec![local_spill], &scheduler)?;

    while global.finalize_external()? {
        rounds += 1;
        let mut state = JoinHTScanState::new();
        probe_spill.prepare_partitioned_probe(&global, &mut state)?;
        while let Some(range) = state.claim(4) {
            if let Some((keys, payload)) = probe_spill.gather_probe_tuples(range)? {
                drain(&global, &keys, &payload, &mut out);
            }
        }
        drain_full_outer(&global, &mut out);
        global.unfinalize()?;
    }
    Ok((out, rounds))
}

fn sorted(mut rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    rows.sort_by_key(|row| format!("{row:?}"));
    rows
}

const COMPARED_JOIN_TYPES: [JoinType; 8] = [
    JoinType::Inner,
    JoinType::Left,
    JoinType::Right,
    JoinType::Outer,
    JoinType::Semi,
    JoinType::Anti,
    JoinType::Mark,
    JoinType::Single,
];

/// SINGLE may pick any matching build row, so a valid pick compares as TRUE.
fn comparable(join_type: JoinType, build: &[BuildRow], rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    if join_type != JoinType::Single {
        return sorted(rows);
    }
    let rows = rows
        .into_iter()
        .map(|row| {
            let (key, payload) = (row[0].clone(), row[1].clone());
            let valid_pick = build.iter().any(|(k, v)| {
                Value::from(*k) == key && !key.is_null() && Value::from(v.as_str()) == payload
            });
            if valid_pick {
                vec![key, Value::Boolean(true)]
            } else {
                vec![key, payload]
            }
        })
        .collect();
    sorted(rows)
}

#[test]
fn external_rounds_match_in_memory_join() {
    let build: Vec<BuildRow> = (0..150)
        .map(|i| {
            let key = if i % 23 == 0 { None } else { Some(i % 70) };
            (key, format!("payload-{i}"))
        })
        .collect();
    let probe: Vec<Option<i64>> = (0..90).map(Some).chain([None, None]).collect();
    for join_type in COMPARED_JOIN_TYPES {
        let expected = comparable(join_type, &build, in_memory_join(join_type, &build, &probe));
        let (actual, rounds) = external_join(join_type, &build, &probe, 3).expect("external join");
        assert!(rounds >= 3, "{} ran {rounds} rounds", join_type.as_str());
        assert_eq!(
            comparable(join_type, &build, actual),
            expected,
            "join type {}",
            join_type.as_str()
        );
    }
}

#[test]
fn external_join_with_empty_build_side() {
    let probe = [Some(1), None];
    for join_type in COMPARED_JOIN_TYPES {
        let expected = sorted(in_memory_join(join_type, &[], &probe));
        let (actual, _) = external_join(join_type, &[], &probe, 2).expect("external join");
        assert_eq!(sorted(actual), expected, "join type {}", join_type.as_str());
    }
}

#[test]
fn skewed_key_exhausts_repartitioning() {
    let mut build: Vec<BuildRow> = (0..200).map(|i| (Some(42), format!("dup-{i}"))).collect();
    build.extend((0..10).map(|i| (Some(i), format!("other-{i}"))));
    let err = external_join(JoinType::Inner, &build, &[Some(42)], 2)
        .expect_err("one key cannot be split across rounds");
    assert!(matches!(err, JoinError::ResourceExhausted { .. }), "{err:?}");
    assert!(err.is_fatal());
}

#[test]
fn partition_tasks_fold_null_flags_into_global_table() {
    let config = external_config();
    let locals = vec![
        build_local(JoinType::Mark, &config, &[(None, "n".to_owned())]),
        build_local(JoinType::Mark, &config, &[(Some(1), "a".to_owned())]),
    ];
    let mut global = JoinHashTable::new(
        conditions(),
        vec![LogicalType::Varchar],
        JoinType::Mark,
        config,
    )
    .expect("hash table");
    global
        .schedule_partition_tasks(locals, 1 << 20, &TaskScheduler::new(2))
        .expect("partition");
    assert!(!global.has_null());
    assert!(global.finalize_external().expect("first round"));
    assert!(global.has_null());
}

#[test]
fn requires_external_tracks_table_size() {
    let config = external_config();
    let rows: Vec<BuildRow> = (0..100).map(|i| (Some(i), "x".repeat(20))).collect();
    let tables = vec![build_local(JoinType::Inner, &config, &rows)];
    let size = tables[0].size_in_bytes();
    assert!(JoinHashTable::requires_external(&tables, size));
    assert!(!JoinHashTable::requires_external(&tables, size * 10));
}

/// Whether the most common build key alone overflows a forced round.
fn has_unsplittable_key(join_type: JoinType, build: &[BuildRow]) -> bool {
    let stored: Vec<Option<i64>> = build
        .iter()
        .map(|(k, _)| *k)
        .filter(|k| k.is_some() || join_type.is_right_outer())
        .collect();
    let per_round = stored.len().div_ceil(3).max(1);
    stored
        .iter()
        .any(|k| stored.iter().filter(|other| *other == k).count() > per_round)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn external_join_is_equivalent_to_in_memory(
        build in prop::collection::vec(
            (prop::option::weighted(0.95, 0_i64..40), "[a-z]{0,10}"),
            30..90,
        ),
        probe in prop::collection::vec(prop::option::weighted(0.9, 0_i64..45), 0..40),
        threads in 1_usize..4,
    ) {
        for join_type in COMPARED_JOIN_TYPES {
            let expected = comparable(join_type, &build, in_memory_join(join_type, &build, &probe));
            match external_join(join_type, &build, &probe, threads) {
                Ok((actual, _)) => {
                    prop_assert_eq!(
                        comparable(join_type, &build, actual),
                        expected,
                        "join type {}",
                        join_type.as_str()
                    );
                }
                Err(err) => {
                    prop_assert!(matches!(err, JoinError::ResourceExhausted { .. }), "{:?}", err);
                    prop_assert!(has_unsplittable_key(join_type, &build));
                }
            }
        }
    }
}
