//! This crate provides tools for the analysis of multi-channel electrophysiology recordings in Rust.
//!
//! # Stimulus Timing
//!
//! The stimulus onsets are recovered from the photodiode channel of the recording, see [`stimulus`].
//!
//! ```rust
//! use rusty_ephys::stimulus::pipeline::{extract_onsets, Protocol};
//!
//! let mut waveform = vec![0_i16; 30_000];
//! waveform[5_000] = 1_800;
//!
//! let onsets = extract_onsets(&waveform, &Protocol::Pg.profile(), 1).unwrap();
//! assert_eq!(onsets.samples(), &[5_000 + 60 * rusty_ephys::SAMPLE_RATE]);
//! ```
//!
//! # Spike Correlations
//!
//! Sorted spikes are grouped by cluster and all cluster pairs are cross-correlated against a shuffled null,
//! see [`correlation`].
//!
//! ```rust
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//! use rusty_ephys::correlation::correlogram::{CorrelogramConfig, CorrelogramEngine};
//! use rusty_ephys::spikes::SpikeTable;
//!
//! let spike_table = SpikeTable::from_samples(&[25, 30, 500, 510], &[1, 2, 1, 2], 25_000).unwrap();
//! let engine = CorrelogramEngine::new(CorrelogramConfig::default()).unwrap();
//! let table = engine.compute(&spike_table, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();
//!
//! assert_eq!(table.len(), 1);
//! assert_eq!(table.lags_ms().len(), 101);
//! ```

pub mod correlation;
pub mod error;
pub mod recording;
pub mod spikes;
pub mod stimulus;

/// The sample rate of the recordings, in Hz.
pub const SAMPLE_RATE: usize = 25_000;
/// The number of interleaved channels of a raw recording.
pub const NUM_CHANNELS: usize = 129;
/// The channel carrying the photodiode trace.
pub const PHOTODIODE_CHANNEL: usize = 128;
/// The cluster id of unclustered (noise) spikes; only clusters with larger ids are analysed.
pub const UNCLUSTERED_ID: i64 = 0;
/// The minimum number of cluster pairs to compute the correlograms in parallel.
pub const MIN_PAIRS_PAR: usize = 64;
