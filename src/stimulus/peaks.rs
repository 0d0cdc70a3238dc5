//! Module implementing the detection and amplitude classification of photodiode peaks.
use serde::{Deserialize, Serialize};

/// A local maximum of the photodiode waveform.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct Peak {
    /// The sample offset of the peak within the analysed segment.
    pub sample: usize,
    /// The amplitude of the waveform at the peak.
    pub amplitude: i16,
}

impl Peak {
    pub fn new(sample: usize, amplitude: i16) -> Self {
        Peak { sample, amplitude }
    }
}

/// The amplitude class of a retained peak.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum PeakClass {
    /// Amplitude strictly above the high cut.
    High,
    /// Amplitude strictly between the low and the high cuts.
    Low,
}

/// Peaks split into two disjoint amplitude classes, each sorted by sample offset.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct PeakSet {
    pub high: Vec<Peak>,
    pub low: Vec<Peak>,
}

impl PeakSet {
    /// Split peaks at the two amplitude thresholds.
    /// Peaks at or below `lo_cut`, or exactly at `hi_cut`, belong to neither class and are discarded.
    pub fn classify(peaks: &[Peak], hi_cut: i16, lo_cut: i16) -> Self {
        let mut high: Vec<Peak> = peaks
            .iter()
            .filter(|peak| peak.amplitude > hi_cut)
            .copied()
            .collect();
        let mut low: Vec<Peak> = peaks
            .iter()
            .filter(|peak| peak.amplitude > lo_cut && peak.amplitude < hi_cut)
            .copied()
            .collect();
        high.sort_by_key(|peak| peak.sample);
        low.sort_by_key(|peak| peak.sample);
        PeakSet { high, low }
    }

    /// Returns the number of high peaks.
    pub fn num_high(&self) -> usize {
        self.high.len()
    }

    /// Returns the number of low peaks.
    pub fn num_low(&self) -> usize {
        self.low.len()
    }

    /// Returns all peaks of both classes, tagged with their class and sorted by sample offset.
    pub fn merged(&self) -> Vec<(Peak, PeakClass)> {
        let mut merged: Vec<(Peak, PeakClass)> = self
            .high
            .iter()
            .map(|peak| (*peak, PeakClass::High))
            .chain(self.low.iter().map(|peak| (*peak, PeakClass::Low)))
            .collect();
        merged.sort_by_key(|(peak, _)| peak.sample);
        merged
    }
}

/// Detect local maxima of the waveform.
///
/// A sample is a candidate when it rises strictly above its left neighbour and is not exceeded by its right
/// neighbour (the first sample of a flat top qualifies). The first and last samples of the segment are never peaks.
/// Candidates not strictly above `min_height` are dropped. Among the remaining ones, no two retained peaks are closer than
/// `min_distance` samples: the taller peak wins, and ties go to the earlier one.
///
/// # Returns
/// The retained peaks, sorted by sample offset.
pub fn detect_peaks(waveform: &[i16], min_height: i16, min_distance: usize) -> Vec<Peak> {
    if waveform.len() < 3 {
        return vec![];
    }

    let candidates: Vec<Peak> = waveform
        .windows(3)
        .enumerate()
        .filter(|(_, w)| w[1] > w[0] && w[1] >= w[2] && w[1] > min_height)
        .map(|(i, w)| Peak::new(i + 1, w[1]))
        .collect();

    if min_distance <= 1 || candidates.len() < 2 {
        return candidates;
    }

    // Visit candidates from the tallest down, earliest first among equals
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[b]
            .amplitude
            .cmp(&candidates[a].amplitude)
            .then(candidates[a].sample.cmp(&candidates[b].sample))
    });

    let mut removed = vec![false; candidates.len()];
    for &k in order.iter() {
        if removed[k] {
            continue;
        }
        let sample = candidates[k].sample;
        for j in (0..k).rev() {
            if sample - candidates[j].sample >= min_distance {
                break;
            }
            removed[j] = true;
        }
        for j in k + 1..candidates.len() {
            if candidates[j].sample - sample >= min_distance {
                break;
            }
            removed[j] = true;
        }
    }

    candidates
        .into_iter()
        .zip(removed)
        .filter(|(_, removed)| !removed)
        .map(|(peak, _)| peak)
        .collect()
}
