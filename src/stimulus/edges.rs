//! Module implementing the rising-edge state machine turning classified peaks into stimulus onsets.
use serde::{Deserialize, Serialize};

use super::peaks::{Peak, PeakClass};

/// The state of the edge extractor while scanning classified peaks.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum EdgeState {
    /// No peak seen yet.
    Scanning,
    /// Inside a run of high peaks.
    InHighRun,
    /// Inside a run of low peaks.
    InLowRun,
}

impl EdgeState {
    fn entered_by(class: PeakClass) -> Self {
        match class {
            PeakClass::High => EdgeState::InHighRun,
            PeakClass::Low => EdgeState::InLowRun,
        }
    }
}

/// Rising-edge extractor.
///
/// An onset is emitted on the first peak of every maximal run of peaks sharing a class.
/// With a `group_gap`, a peak further than `group_gap` samples from the previous peak also opens a new run,
/// regardless of its class.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct EdgeExtractor {
    pub group_gap: Option<usize>,
}

impl EdgeExtractor {
    /// An extractor splitting runs on class changes only.
    pub fn by_class() -> Self {
        EdgeExtractor { group_gap: None }
    }

    /// An extractor also splitting runs on gaps larger than `group_gap`.
    pub fn by_gap(group_gap: usize) -> Self {
        EdgeExtractor {
            group_gap: Some(group_gap),
        }
    }

    /// Returns the sample offsets of the rising edges, in the order of the (sorted) input peaks.
    pub fn extract(&self, peaks: &[(Peak, PeakClass)]) -> Vec<usize> {
        let mut state = EdgeState::Scanning;
        let mut last_sample: Option<usize> = None;
        let mut onsets: Vec<usize> = vec![];

        for &(peak, class) in peaks.iter() {
            let next = EdgeState::entered_by(class);
            let gap_break = match (self.group_gap, last_sample) {
                (Some(gap), Some(last)) => peak.sample - last > gap,
                _ => false,
            };
            if state != next || gap_break {
                onsets.push(peak.sample);
            }
            state = next;
            last_sample = Some(peak.sample);
        }

        log::trace!("{} rising edges out of {} peaks", onsets.len(), peaks.len());
        onsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(items: &[(usize, PeakClass)]) -> Vec<(Peak, PeakClass)> {
        items
            .iter()
            .map(|&(sample, class)| {
                let amplitude = match class {
                    PeakClass::High => 2000,
                    PeakClass::Low => 900,
                };
                (Peak::new(sample, amplitude), class)
            })
            .collect()
    }

    #[test]
    fn test_extract_by_class() {
        use PeakClass::*;
        let peaks = classified(&[
            (10, High),
            (20, High),
            (30, Low),
            (40, Low),
            (50, Low),
            (60, High),
            (70, Low),
        ]);
        assert_eq!(EdgeExtractor::by_class().extract(&peaks), vec![10, 30, 60, 70]);
    }

    #[test]
    fn test_extract_empty() {
        assert!(EdgeExtractor::by_class().extract(&[]).is_empty());
        assert!(EdgeExtractor::by_gap(100).extract(&[]).is_empty());
    }

    #[test]
    fn test_extract_by_gap() {
        use PeakClass::*;
        let peaks = classified(&[
            (0, High),
            (400, High),
            (800, High),
            (20000, High),
            (20400, High),
            (30401, High),
        ]);
        assert_eq!(
            EdgeExtractor::by_gap(10000).extract(&peaks),
            vec![0, 20000, 30401]
        );
    }

    #[test]
    fn test_extract_is_strictly_increasing() {
        use PeakClass::*;
        let peaks = classified(&[(5, Low), (6, High), (7, Low), (8, Low), (9, High)]);
        let onsets = EdgeExtractor::by_class().extract(&peaks);
        assert_eq!(onsets, vec![5, 6, 7, 9]);
        assert!(onsets.windows(2).all(|w| w[0] < w[1]));
    }
}
