//! Module implementing binned cross-correlograms of cluster pairs and their shuffle-based significance.
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::binning::BinnedTable;
use super::shuffle::shuffled;
use crate::error::EphysError;
use crate::spikes::SpikeTable;
use crate::MIN_PAIRS_PAR;

/// The parameters of the correlogram engine.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct CorrelogramConfig {
    /// The bin width, in milliseconds.
    pub bin_width_ms: u32,
    /// The maximum lag, in milliseconds (a multiple of the bin width).
    pub max_lag_ms: u32,
    /// A pair is significant when its correlation probability is strictly above this threshold.
    pub cp_sig: f64,
    /// The analysis window `(start, end)`, in seconds. All spikes are analysed when `None`.
    #[serde(default)]
    pub window: Option<(f64, f64)>,
}

impl CorrelogramConfig {
    /// Check the consistency of the parameters.
    pub fn validate(&self) -> Result<(), EphysError> {
        if self.bin_width_ms == 0 {
            return Err(EphysError::InvalidParameter(
                "The bin width must be positive.".to_string(),
            ));
        }
        if self.max_lag_ms % self.bin_width_ms != 0 {
            return Err(EphysError::InvalidParameter(format!(
                "The maximum lag ({} ms) must be a multiple of the bin width ({} ms).",
                self.max_lag_ms, self.bin_width_ms
            )));
        }
        if !self.cp_sig.is_finite() {
            return Err(EphysError::InvalidParameter(
                "The significance threshold must be finite.".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the maximum lag, in bins.
    pub fn max_lag_bins(&self) -> usize {
        (self.max_lag_ms / self.bin_width_ms) as usize
    }

    /// Returns the lags of the correlogram entries, in milliseconds.
    pub fn lags_ms(&self) -> Vec<i64> {
        let max_lag_bins = self.max_lag_bins() as i64;
        (-max_lag_bins..=max_lag_bins)
            .map(|k| k * self.bin_width_ms as i64)
            .collect()
    }
}

impl Default for CorrelogramConfig {
    fn default() -> Self {
        CorrelogramConfig {
            bin_width_ms: 1,
            max_lag_ms: 50,
            cp_sig: 0.1,
            window: None,
        }
    }
}

/// The observed and shuffled correlograms of one cluster pair.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PairCorrelogram {
    /// The cluster ids, smallest first; the first cluster is the reference.
    pub pair: (i64, i64),
    pub observed: Vec<u64>,
    pub shuffled: Vec<u64>,
    /// The correlation probability, undefined when the observed correlogram is empty.
    pub probability: Option<f64>,
}

impl PairCorrelogram {
    /// Returns true if the correlation probability is strictly above the threshold.
    pub fn is_significant(&self, cp_sig: f64) -> bool {
        matches!(self.probability, Some(p) if p > cp_sig)
    }
}

/// A significant pair, annotated with the dominant recording site of each cluster.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SignificantPair {
    pub pair: (i64, i64),
    pub probability: f64,
    pub sites: (Option<u32>, Option<u32>),
}

/// The correlograms of all analysed cluster pairs, sharing one lag axis.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct CorrelogramTable {
    lags_ms: Vec<i64>,
    /// Sorted by pair.
    pairs: Vec<PairCorrelogram>,
}

impl CorrelogramTable {
    /// Returns the lags of the correlogram entries, in milliseconds.
    pub fn lags_ms(&self) -> &[i64] {
        &self.lags_ms
    }

    /// Returns all pair correlograms, sorted by pair.
    pub fn pairs(&self) -> &[PairCorrelogram] {
        &self.pairs
    }

    /// Returns the number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Returns the correlograms of a pair, in any order of the ids.
    pub fn get(&self, id_1: i64, id_2: i64) -> Option<&PairCorrelogram> {
        let pair = (id_1.min(id_2), id_1.max(id_2));
        self.pairs
            .binary_search_by_key(&pair, |correlogram| correlogram.pair)
            .ok()
            .map(|pos| &self.pairs[pos])
    }

    /// Returns the pairs whose correlation probability is strictly above the threshold.
    pub fn significant_pairs(&self, cp_sig: f64) -> Vec<&PairCorrelogram> {
        self.pairs
            .iter()
            .filter(|correlogram| correlogram.is_significant(cp_sig))
            .collect()
    }

    /// Save the table to a file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), EphysError> {
        let file = File::create(path).map_err(|e| EphysError::IOError(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| EphysError::IOError(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| EphysError::IOError(e.to_string()))
    }

    /// Load a table from a file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, EphysError> {
        let file = File::open(path).map_err(|e| EphysError::IOError(e.to_string()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| EphysError::IOError(e.to_string()))
    }
}

/// Cross-correlogram of two binned series.
///
/// For every lag `j` in `0..=max_lag_bins`, the entry at `+j` (resp. `-j`) sums, over every nonzero bin of the
/// reference, the reference count times the target count `j` bins after (resp. before). Offsets falling outside
/// the series are skipped. Swapping the series mirrors the correlogram.
///
/// # Returns
/// The counts at lags `-max_lag_bins..=max_lag_bins`.
pub fn cross_correlogram(reference: &[u32], target: &[u32], max_lag_bins: usize) -> Vec<u64> {
    let nonzero: Vec<(usize, u64)> = reference
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count > 0)
        .map(|(n, &count)| (n, count as u64))
        .collect();

    let mut counts = vec![0_u64; 2 * max_lag_bins + 1];
    for j in 0..=max_lag_bins {
        counts[max_lag_bins + j] = nonzero
            .iter()
            .filter_map(|&(n, weight)| target.get(n + j).map(|&c| weight * c as u64))
            .sum();
        counts[max_lag_bins - j] = nonzero
            .iter()
            .filter(|&&(n, _)| n >= j)
            .map(|&(n, weight)| weight * target[n - j] as u64)
            .sum();
    }
    counts
}

/// Returns `(observed[0] - shuffled[0]) / sum(observed)`, or `None` if the observed correlogram is empty.
pub fn correlation_probability(observed: &[u64], shuffled: &[u64]) -> Option<f64> {
    let total: u64 = observed.iter().sum();
    if total == 0 {
        return None;
    }
    let center = observed.len() / 2;
    Some((observed[center] as f64 - shuffled[center] as f64) / total as f64)
}

/// Correlograms of every pair of clusters with spikes, computed on an observed table and its shuffled null.
///
/// The reference bins of every pair are taken from the observed table for both correlograms. Clusters without any
/// spike are skipped. The function returns an error if the two tables are not aligned.
pub fn correlate(
    observed: &BinnedTable,
    shuffled: &BinnedTable,
    max_lag_bins: usize,
) -> Result<CorrelogramTable, EphysError> {
    if observed.index() != shuffled.index() || observed.num_bins() != shuffled.num_bins() {
        return Err(EphysError::MalformedInput(
            "The observed and shuffled tables are not aligned".to_string(),
        ));
    }

    let active: Vec<usize> = (0..observed.num_clusters())
        .filter(|&pos| {
            let active = observed.total_at(pos) > 0;
            if !active {
                log::debug!(
                    "Cluster {:?} has no spike and is skipped",
                    observed.index().id(pos)
                );
            }
            active
        })
        .collect();
    let positions: Vec<(usize, usize)> = active.iter().copied().tuple_combinations().collect();

    let correlate_pair = |&(p, q): &(usize, usize)| -> PairCorrelogram {
        let reference = observed.series_at(p);
        let observed_counts = cross_correlogram(reference, observed.series_at(q), max_lag_bins);
        let shuffled_counts = cross_correlogram(reference, shuffled.series_at(q), max_lag_bins);
        let probability = correlation_probability(&observed_counts, &shuffled_counts);
        let pair = (
            observed.index().id(p).unwrap_or_default(),
            observed.index().id(q).unwrap_or_default(),
        );
        if probability.is_none() {
            log::warn!(
                "Pair {:?} has an empty correlogram, its correlation probability is undefined",
                pair
            );
        }
        PairCorrelogram {
            pair,
            observed: observed_counts,
            shuffled: shuffled_counts,
            probability,
        }
    };

    let pairs: Vec<PairCorrelogram> = if positions.len() >= MIN_PAIRS_PAR {
        positions.par_iter().map(correlate_pair).collect()
    } else {
        positions.iter().map(correlate_pair).collect()
    };

    let max_lag_bins = max_lag_bins as i64;
    let lags_ms = (-max_lag_bins..=max_lag_bins)
        .map(|k| k * observed.bin_width_ms() as i64)
        .collect();

    log::info!("Cross-correlograms computed for {} pairs", pairs.len());
    Ok(CorrelogramTable { lags_ms, pairs })
}

/// The correlogram engine: bins a spike table, shuffles it, and correlates every cluster pair.
///
/// # Examples
///
/// ```rust
/// use rand::SeedableRng;
/// use rand_chacha::ChaCha8Rng;
/// use rusty_ephys::correlation::correlogram::{CorrelogramConfig, CorrelogramEngine};
/// use rusty_ephys::spikes::{SpikeEvent, SpikeTable};
///
/// // Two clusters firing together every 10 ms
/// let events = (0..100)
///     .flat_map(|k| {
///         let t = k as f64 * 0.01 + 0.0005;
///         vec![SpikeEvent::new(t, 1, None), SpikeEvent::new(t, 2, None)]
///     })
///     .collect();
/// let spike_table = SpikeTable::build(events).unwrap();
///
/// let config = CorrelogramConfig {
///     max_lag_ms: 5,
///     ..CorrelogramConfig::default()
/// };
/// let engine = CorrelogramEngine::new(config).unwrap();
/// let mut rng = ChaCha8Rng::seed_from_u64(42);
/// let table = engine.compute(&spike_table, &mut rng).unwrap();
///
/// let correlogram = table.get(1, 2).unwrap();
/// assert_eq!(correlogram.observed[table.lags_ms().len() / 2], 100);
/// assert!(correlogram.is_significant(0.1));
/// ```
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct CorrelogramEngine {
    config: CorrelogramConfig,
}

impl CorrelogramEngine {
    /// Create an engine, returning an error for inconsistent parameters.
    pub fn new(config: CorrelogramConfig) -> Result<Self, EphysError> {
        config.validate()?;
        Ok(CorrelogramEngine { config })
    }

    /// Returns the configuration of the engine.
    pub fn config(&self) -> &CorrelogramConfig {
        &self.config
    }

    /// Bin the spikes of all (positive) clusters, shuffle them, and correlate every pair.
    /// With an analysis window, clusters without spikes inside the window are skipped.
    pub fn compute<R: Rng + ?Sized>(
        &self,
        spike_table: &SpikeTable,
        rng: &mut R,
    ) -> Result<CorrelogramTable, EphysError> {
        let clusters = spike_table.clusters();
        if clusters.is_empty() {
            log::warn!("No clustered spikes to correlate");
        }

        let analysed = match self.config.window {
            Some((start, end)) => spike_table.window(start, end)?,
            None => spike_table.clone(),
        };

        let observed = BinnedTable::build(&analysed, &clusters, self.config.bin_width_ms)?;
        let null = shuffled(&observed, rng);
        correlate(&observed, &null, self.config.max_lag_bins())
    }

    /// Returns the significant pairs of a table, with the dominant recording site of each cluster.
    pub fn significant_pairs(
        &self,
        table: &CorrelogramTable,
        spike_table: &SpikeTable,
    ) -> Vec<SignificantPair> {
        table
            .significant_pairs(self.config.cp_sig)
            .into_iter()
            .filter_map(|correlogram| {
                correlogram.probability.map(|probability| SignificantPair {
                    pair: correlogram.pair,
                    probability,
                    sites: (
                        spike_table.dominant_site(correlogram.pair.0),
                        spike_table.dominant_site(correlogram.pair.1),
                    ),
                })
            })
            .collect()
    }
}
