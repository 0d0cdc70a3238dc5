//! Module implementing the removal of inter-trial artifacts from classified photodiode peaks.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::peaks::{Peak, PeakSet};
use crate::error::EphysError;

/// Filter separating genuine trial boundaries from signal creep.
///
/// A gap between consecutive high peaks larger than `trial_break_gap` is a candidate boundary.
/// The candidate is noise when the high peak opening the gap was itself preceded by a high peak closer than
/// `noise_gap` (e.g., a stuck frame). Otherwise the boundary is confirmed: every low peak strictly inside the gap
/// is a creep artifact, and the two high peaks bracketing the gap are the end and onset pulses of the trials.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct TrialBoundaryFilter {
    /// The minimum gap (in samples) between high peaks for a candidate trial boundary.
    pub trial_break_gap: usize,
    /// The gap (in samples) below which a candidate boundary is considered noise.
    pub noise_gap: usize,
}

impl TrialBoundaryFilter {
    pub fn new(trial_break_gap: usize, noise_gap: usize) -> Self {
        TrialBoundaryFilter {
            trial_break_gap,
            noise_gap,
        }
    }

    /// Returns the indices `i` such that the gap between the high peaks `i` and `i + 1` exceeds the trial break gap.
    pub fn candidate_boundaries(&self, high: &[Peak]) -> Vec<usize> {
        high.windows(2)
            .enumerate()
            .filter(|(_, pair)| pair[1].sample - pair[0].sample > self.trial_break_gap)
            .map(|(i, _)| i)
            .collect()
    }

    /// Returns the candidate boundaries which are not noise.
    /// The first high peak has no predecessor, so a boundary right after it is always confirmed.
    pub fn confirmed_boundaries(&self, high: &[Peak]) -> Vec<usize> {
        self.candidate_boundaries(high)
            .into_iter()
            .filter(|&idx| {
                let noise = idx > 0 && high[idx].sample - high[idx - 1].sample < self.noise_gap;
                if noise {
                    log::debug!(
                        "Trial boundary after sample {} discarded as noise",
                        high[idx].sample
                    );
                }
                !noise
            })
            .collect()
    }

    /// Apply the filter to a classified peak set.
    /// The result is a subsequence of the input: creep peaks inside confirmed boundaries, the peaks bracketing each
    /// confirmed boundary, and the first and last remaining high peaks (session calibration pulses) are removed.
    /// The function returns an error if there are fewer than two high peaks.
    pub fn apply(&self, peak_set: &PeakSet) -> Result<PeakSet, EphysError> {
        let high = &peak_set.high;
        if high.len() < 2 {
            return Err(EphysError::InsufficientPeaks {
                found: high.len(),
                required: 2,
            });
        }

        let boundaries = self.confirmed_boundaries(high);

        let mut low = peak_set.low.clone();
        for &idx in boundaries.iter() {
            let (start, end) = (high[idx].sample, high[idx + 1].sample);
            let before = low.len();
            low.retain(|peak| peak.sample <= start || peak.sample >= end);
            log::debug!(
                "Trial boundary between samples {} and {}: {} creep peaks removed",
                start,
                end,
                before - low.len()
            );
        }

        let to_delete: BTreeSet<usize> = boundaries
            .iter()
            .flat_map(|&idx| [idx, idx + 1])
            .collect();

        let kept: Vec<Peak> = high
            .iter()
            .enumerate()
            .filter(|(i, _)| !to_delete.contains(i))
            .map(|(_, peak)| *peak)
            .collect();

        let high = match kept.len() {
            0 | 1 => vec![],
            n => kept[1..n - 1].to_vec(),
        };

        log::info!(
            "{} trial boundaries confirmed: {} high and {} low peaks kept",
            boundaries.len(),
            high.len(),
            low.len()
        );

        Ok(PeakSet { high, low })
    }
}

impl Default for TrialBoundaryFilter {
    fn default() -> Self {
        TrialBoundaryFilter::new(5000, 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn high_peaks(samples: &[usize]) -> Vec<Peak> {
        samples.iter().map(|&s| Peak::new(s, 2000)).collect()
    }

    fn low_peaks(samples: &[usize]) -> Vec<Peak> {
        samples.iter().map(|&s| Peak::new(s, 900)).collect()
    }

    fn samples(peaks: &[Peak]) -> Vec<usize> {
        peaks.iter().map(|peak| peak.sample).collect()
    }

    #[test]
    fn test_single_real_boundary() {
        let filter = TrialBoundaryFilter::default();
        let peak_set = PeakSet {
            high: high_peaks(&[100, 50100]),
            low: vec![],
        };

        assert_eq!(filter.confirmed_boundaries(&peak_set.high), vec![0]);

        let filtered = filter.apply(&peak_set).unwrap();
        assert!(filtered.high.is_empty());
        assert!(filtered.low.is_empty());
    }

    #[test]
    fn test_noise_boundary_is_discarded() {
        let filter = TrialBoundaryFilter::default();
        let peak_set = PeakSet {
            high: high_peaks(&[100, 450, 10000, 10300]),
            low: low_peaks(&[5000]),
        };

        assert_eq!(filter.candidate_boundaries(&peak_set.high), vec![1]);
        assert!(filter.confirmed_boundaries(&peak_set.high).is_empty());

        let filtered = filter.apply(&peak_set).unwrap();
        assert_eq!(samples(&filtered.high), vec![450, 10000]);
        assert_eq!(samples(&filtered.low), vec![5000]);
    }

    #[test]
    fn test_creep_peaks_are_removed() {
        let filter = TrialBoundaryFilter::default();
        let peak_set = PeakSet {
            high: high_peaks(&[100, 1000, 2000, 20000, 20500, 21000, 22000]),
            low: low_peaks(&[1500, 5000, 10000, 20700]),
        };

        let filtered = filter.apply(&peak_set).unwrap();
        assert_eq!(samples(&filtered.high), vec![1000, 20500, 21000]);
        assert_eq!(samples(&filtered.low), vec![1500, 20700]);
    }

    #[test]
    fn test_output_is_subsequence() {
        let filter = TrialBoundaryFilter::default();
        let peak_set = PeakSet {
            high: high_peaks(&[0, 300, 900, 7000, 7400, 7700, 30000, 30400, 31000]),
            low: low_peaks(&[150, 2000, 4000, 7200, 12000, 30200]),
        };

        let filtered = filter.apply(&peak_set).unwrap();
        let mut input = peak_set.high.iter();
        assert!(filtered.high.iter().all(|peak| input.any(|p| p == peak)));
        let mut input = peak_set.low.iter();
        assert!(filtered.low.iter().all(|peak| input.any(|p| p == peak)));
        // Creep inside the confirmed boundary is removed, the noisy one keeps its low peaks
        assert_eq!(samples(&filtered.low), vec![150, 7200, 12000, 30200]);
        assert_eq!(samples(&filtered.high), vec![300, 7400, 7700, 30000, 30400]);
    }

    #[test]
    fn test_insufficient_peaks() {
        let filter = TrialBoundaryFilter::default();
        let peak_set = PeakSet {
            high: high_peaks(&[100]),
            low: low_peaks(&[200, 300]),
        };
        assert_eq!(
            filter.apply(&peak_set),
            Err(EphysError::InsufficientPeaks {
                found: 1,
                required: 2
            })
        );
    }
}
