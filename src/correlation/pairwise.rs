//! Module implementing the cross-correlogram of two spike trains computed directly on their timestamps.
use std::collections::BTreeMap;

use itertools::Itertools;

use crate::error::EphysError;
use crate::spikes::SpikeTable;

/// Cross-correlogram of two timestamp sequences at a fixed lag spacing.
///
/// With `d = b - a` for every pair of timestamps, the entry at lag `+i` counts `d` in `(i - spacing, i]` and the
/// entry at lag `-i` counts `d` in `[-i, -(i - spacing))`, so that every difference is counted at most once and
/// swapping `a` and `b` mirrors the correlogram. The zero-lag entry is the number of distinct timestamps present in
/// both sequences (exact match).
///
/// # Returns
/// The counts and their lags, both of length `2 * max_lag / spacing + 1`, or an error if the lags are invalid or
/// the timestamps are not sorted.
///
/// # Examples
///
/// ```rust
/// use rusty_ephys::correlation::pairwise::xcorr;
///
/// let (counts, lags) = xcorr(&[0.0, 5.0, 10.0], &[0.0, 5.0, 10.0], 2, 1).unwrap();
/// assert_eq!(lags, vec![-2, -1, 0, 1, 2]);
/// assert_eq!(counts, vec![0, 0, 3, 0, 0]);
/// ```
pub fn xcorr(
    a: &[f64],
    b: &[f64],
    max_lag: u32,
    spacing: u32,
) -> Result<(Vec<u64>, Vec<i64>), EphysError> {
    let num_steps = num_steps(max_lag, spacing)?;
    check_sorted(a)?;
    check_sorted(b)?;

    let mut counts = vec![0_u64; 2 * num_steps + 1];
    let lags = lag_axis(num_steps, spacing);

    counts[num_steps] = num_common(a, b);

    for k in 1..=num_steps {
        let outer = (k as u32 * spacing) as f64;
        let inner = ((k as u32 - 1) * spacing) as f64;

        counts[num_steps - k] = a
            .iter()
            .map(|&t| {
                let start = b.partition_point(|&x| x < t - outer);
                let end = b.partition_point(|&x| x < t - inner);
                (end - start) as u64
            })
            .sum();
        counts[num_steps + k] = a
            .iter()
            .map(|&t| {
                let start = b.partition_point(|&x| x <= t + inner);
                let end = b.partition_point(|&x| x <= t + outer);
                (end - start) as u64
            })
            .sum();
    }

    Ok((counts, lags))
}

/// Cross-correlograms of every unordered pair of clusters of a spike table, with timestamps in milliseconds.
///
/// # Returns
/// The counts keyed by `(smaller id, larger id)`, and the lags shared by all pairs.
pub fn pairwise_all(
    spike_table: &SpikeTable,
    max_lag: u32,
    spacing: u32,
) -> Result<(BTreeMap<(i64, i64), Vec<u64>>, Vec<i64>), EphysError> {
    let num_steps = num_steps(max_lag, spacing)?;
    let clusters = spike_table.clusters();
    let times: Vec<Vec<f64>> = clusters
        .iter()
        .map(|&id| {
            spike_table
                .times(id)
                .into_iter()
                .map(|t| t * 1000.0)
                .collect()
        })
        .collect();

    let mut correlograms = BTreeMap::new();
    for ((i, id_1), (j, id_2)) in clusters.iter().enumerate().tuple_combinations() {
        let (counts, _) = xcorr(&times[i], &times[j], max_lag, spacing)?;
        log::trace!(
            "Pair ({}, {}): {} events",
            id_1,
            id_2,
            counts.iter().sum::<u64>()
        );
        correlograms.insert((*id_1, *id_2), counts);
    }

    log::info!("{} pairwise cross-correlograms computed", correlograms.len());
    Ok((correlograms, lag_axis(num_steps, spacing)))
}

/// Returns the number of lag steps on each side of zero.
fn num_steps(max_lag: u32, spacing: u32) -> Result<usize, EphysError> {
    if spacing == 0 || max_lag % spacing != 0 {
        return Err(EphysError::InvalidParameter(format!(
            "The maximum lag ({}) must be a multiple of a positive spacing ({}).",
            max_lag, spacing
        )));
    }
    Ok((max_lag / spacing) as usize)
}

/// Returns the symmetric lag axis `-num_steps * spacing, ..., num_steps * spacing`.
fn lag_axis(num_steps: usize, spacing: u32) -> Vec<i64> {
    (-(num_steps as i64)..=num_steps as i64)
        .map(|k| k * spacing as i64)
        .collect()
}

/// Returns the number of distinct values present in both sorted sequences.
fn num_common(a: &[f64], b: &[f64]) -> u64 {
    let (mut i, mut j, mut common) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        if a[i] < b[j] {
            i += 1;
        } else if a[i] > b[j] {
            j += 1;
        } else {
            common += 1;
            let value = a[i];
            while i < a.len() && a[i] == value {
                i += 1;
            }
            while j < b.len() && b[j] == value {
                j += 1;
            }
        }
    }
    common
}

fn check_sorted(times: &[f64]) -> Result<(), EphysError> {
    if times.iter().any(|t| !t.is_finite()) {
        return Err(EphysError::MalformedInput(
            "Spike times must be finite".to_string(),
        ));
    }
    if let Some((t1, t2)) = times.iter().tuple_windows().find(|(t1, t2)| t2 < t1) {
        return Err(EphysError::MalformedInput(format!(
            "Non-monotonic spike times: {} is followed by {}",
            t1, t2
        )));
    }
    Ok(())
}
