use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::tempdir;

use rusty_ephys::correlation::correlogram::{CorrelogramConfig, CorrelogramEngine, CorrelogramTable};
use rusty_ephys::correlation::pairwise::pairwise_all;
use rusty_ephys::spikes::{SpikeEvent, SpikeTable};

const SEED: u64 = 42;

/// Clusters 1 and 2 fire synchronously every 20 ms, cluster 3 fires at random, and noise spikes are interleaved.
fn spike_table() -> SpikeTable {
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut events = vec![];
    for k in 0..500 {
        let t = k as f64 * 0.02;
        events.push(SpikeEvent::new(t + 0.0002, 1, Some(12)));
        events.push(SpikeEvent::new(t + 0.0003, 2, Some(40)));
        events.push(SpikeEvent::new(t + 0.0050 + rng.gen_range(0.0..0.01), 3, Some(70)));
        events.push(SpikeEvent::new(t + 0.0180, 0, None));
    }
    SpikeTable::build(events).unwrap()
}

#[test]
fn test_correlogram_engine_end_to_end() {
    let dir = tempdir().unwrap();
    let spikes_path = dir.path().join("spikes.json");
    let output_path = dir.path().join("xcorr.json");

    spike_table().save_to(&spikes_path).unwrap();
    let spike_table = SpikeTable::load_from(&spikes_path).unwrap();
    assert_eq!(spike_table.clusters(), vec![1, 2, 3]);

    let config = CorrelogramConfig {
        bin_width_ms: 1,
        max_lag_ms: 10,
        ..CorrelogramConfig::default()
    };
    let engine = CorrelogramEngine::new(config).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let table = engine.compute(&spike_table, &mut rng).unwrap();

    assert_eq!(table.len(), 3);
    assert_eq!(table.lags_ms().len(), 21);

    let synchronous = table.get(1, 2).unwrap();
    assert_eq!(synchronous.observed[10], 500);
    assert_eq!(synchronous.observed.iter().sum::<u64>(), 500);
    assert!(synchronous.probability.unwrap() > 0.9);

    let significant = engine.significant_pairs(&table, &spike_table);
    assert_eq!(significant.len(), 1);
    assert_eq!(significant[0].pair, (1, 2));
    assert_eq!(significant[0].sites, (Some(12), Some(40)));

    table.save_to(&output_path).unwrap();
    let loaded = CorrelogramTable::load_from(&output_path).unwrap();
    assert_eq!(loaded.lags_ms(), table.lags_ms());
    assert_eq!(loaded.get(1, 2).unwrap().observed, synchronous.observed);
}

#[test]
fn test_correlogram_engine_is_reproducible() {
    let spike_table = spike_table();
    let engine = CorrelogramEngine::new(CorrelogramConfig::default()).unwrap();

    let table_1 = engine
        .compute(&spike_table, &mut ChaCha8Rng::seed_from_u64(SEED))
        .unwrap();
    let table_2 = engine
        .compute(&spike_table, &mut ChaCha8Rng::seed_from_u64(SEED))
        .unwrap();
    assert_eq!(table_1, table_2);
}

#[test]
fn test_correlogram_engine_window() {
    let spike_table = spike_table();
    let config = CorrelogramConfig {
        window: Some((2.0, 4.0)),
        max_lag_ms: 5,
        ..CorrelogramConfig::default()
    };
    let engine = CorrelogramEngine::new(config).unwrap();
    let table = engine
        .compute(&spike_table, &mut ChaCha8Rng::seed_from_u64(SEED))
        .unwrap();

    // 100 synchronous spikes in [2, 4] s
    assert_eq!(table.get(1, 2).unwrap().observed[5], 100);
}

#[test]
fn test_pairwise_on_timestamps() {
    let spike_table = spike_table();
    let (correlograms, lags) = pairwise_all(&spike_table, 4, 1).unwrap();

    assert_eq!(lags.len(), 9);
    assert_eq!(correlograms.len(), 3);
    // 0.1 ms apart
    assert_eq!(correlograms[&(1, 2)], vec![0, 0, 0, 0, 0, 500, 0, 0, 0]);
}
