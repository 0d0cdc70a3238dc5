//! Module implementing the stimulus timing pipeline for the supported photodiode protocols.
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::boundary::TrialBoundaryFilter;
use super::edges::EdgeExtractor;
use super::peaks::{detect_peaks, PeakClass, PeakSet};
use crate::error::EphysError;
use crate::recording::{minutes_to_samples, Recording};

/// The stimulation protocols producing the photodiode trace.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Protocol {
    /// Flashed stimuli: one light pulse per frame, trials separated by long dark gaps.
    Fh,
    /// Grouped stimuli: one onset per group of pulses.
    Pg,
}

impl Protocol {
    /// Returns the default profile of the protocol.
    pub fn profile(&self) -> ProtocolProfile {
        match self {
            Protocol::Fh => ProtocolProfile::fh(),
            Protocol::Pg => ProtocolProfile::pg(),
        }
    }
}

impl FromStr for Protocol {
    type Err = EphysError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fh" => Ok(Protocol::Fh),
            "pg" => Ok(Protocol::Pg),
            _ => Err(EphysError::InvalidParameter(format!(
                "Unknown protocol '{}', expected 'fh' or 'pg'.",
                s
            ))),
        }
    }
}

/// How onsets are delimited once peaks are detected.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub enum BoundaryStrategy {
    /// Classify peaks as high/low, remove creep and calibration pulses, then emit one onset per same-class run.
    CreepFiltered(TrialBoundaryFilter),
    /// Treat every peak as high and emit one onset per group of peaks separated by more than `onset_group_gap`.
    GapGrouped { onset_group_gap: usize },
}

/// The parameters of the stimulus timing pipeline for one protocol.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct ProtocolProfile {
    /// Peaks strictly above this amplitude are high.
    pub hi_cut: i16,
    /// Peaks strictly between this amplitude and `hi_cut` are low.
    pub lo_cut: i16,
    /// The minimum distance (in samples) between two detected peaks.
    pub min_distance: usize,
    pub strategy: BoundaryStrategy,
}

impl ProtocolProfile {
    /// The profile of the fh protocol.
    pub fn fh() -> Self {
        ProtocolProfile {
            hi_cut: 1500,
            lo_cut: 600,
            min_distance: 200,
            strategy: BoundaryStrategy::CreepFiltered(TrialBoundaryFilter::default()),
        }
    }

    /// The profile of the pg protocol.
    pub fn pg() -> Self {
        ProtocolProfile {
            hi_cut: 1500,
            lo_cut: 1500,
            min_distance: 200,
            strategy: BoundaryStrategy::GapGrouped {
                onset_group_gap: 10000,
            },
        }
    }

    /// Check the consistency of the profile.
    pub fn validate(&self) -> Result<(), EphysError> {
        if self.min_distance == 0 {
            return Err(EphysError::InvalidParameter(
                "The minimum peak distance must be positive.".to_string(),
            ));
        }
        if let BoundaryStrategy::CreepFiltered(_) = self.strategy {
            if self.lo_cut >= self.hi_cut {
                return Err(EphysError::InvalidParameter(format!(
                    "The low cut ({}) must be below the high cut ({}).",
                    self.lo_cut, self.hi_cut
                )));
            }
        }
        Ok(())
    }

    /// Returns the minimum height for peak detection.
    fn min_height(&self) -> i16 {
        match self.strategy {
            BoundaryStrategy::CreepFiltered(_) => self.lo_cut,
            BoundaryStrategy::GapGrouped { .. } => self.hi_cut,
        }
    }
}

impl Default for ProtocolProfile {
    fn default() -> Self {
        ProtocolProfile::fh()
    }
}

/// Strictly increasing stimulus onsets, in absolute session samples.
#[derive(Debug, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
pub struct StimulusOnsets {
    samples: Vec<usize>,
}

impl StimulusOnsets {
    /// Create onsets from sample offsets.
    /// The function returns an error if the offsets are not strictly increasing.
    pub fn build(samples: Vec<usize>) -> Result<Self, EphysError> {
        if let Some(pair) = samples.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(EphysError::MalformedInput(format!(
                "Stimulus onsets must be strictly increasing: {} is followed by {}",
                pair[0], pair[1]
            )));
        }
        Ok(StimulusOnsets { samples })
    }

    /// Returns the onsets as a slice of sample offsets.
    pub fn samples(&self) -> &[usize] {
        &self.samples
    }

    /// Returns the number of onsets.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the onsets in seconds, given the sample rate.
    pub fn times(&self, sample_rate: usize) -> Vec<f64> {
        self.samples
            .iter()
            .map(|&s| s as f64 / sample_rate as f64)
            .collect()
    }

    /// Save the onsets to a file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), EphysError> {
        let file = File::create(path).map_err(|e| EphysError::IOError(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).map_err(|e| EphysError::IOError(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| EphysError::IOError(e.to_string()))
    }

    /// Load onsets from a file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, EphysError> {
        let file = File::open(path).map_err(|e| EphysError::IOError(e.to_string()))?;
        let reader = BufReader::new(file);
        let onsets: StimulusOnsets =
            serde_json::from_reader(reader).map_err(|e| EphysError::IOError(e.to_string()))?;
        StimulusOnsets::build(onsets.samples)
    }
}

/// Extract the stimulus onsets from a photodiode segment starting `start_min` minutes into the session.
///
/// # Returns
/// The onsets in absolute session samples, or an error if the segment has too few peaks for the protocol.
pub fn extract_onsets(
    waveform: &[i16],
    profile: &ProtocolProfile,
    start_min: usize,
) -> Result<StimulusOnsets, EphysError> {
    profile.validate()?;

    let peaks = detect_peaks(waveform, profile.min_height(), profile.min_distance);
    log::info!(
        "{} peaks detected in {} photodiode samples",
        peaks.len(),
        waveform.len()
    );

    let (classified, extractor) = match profile.strategy {
        BoundaryStrategy::CreepFiltered(filter) => {
            let peak_set = PeakSet::classify(&peaks, profile.hi_cut, profile.lo_cut);
            log::debug!(
                "{} high and {} low peaks before trial boundary filtering",
                peak_set.num_high(),
                peak_set.num_low()
            );
            (filter.apply(&peak_set)?.merged(), EdgeExtractor::by_class())
        }
        BoundaryStrategy::GapGrouped { onset_group_gap } => {
            if peaks.is_empty() {
                return Err(EphysError::InsufficientPeaks {
                    found: 0,
                    required: 1,
                });
            }
            let classified = peaks
                .into_iter()
                .map(|peak| (peak, PeakClass::High))
                .collect::<Vec<_>>();
            (classified, EdgeExtractor::by_gap(onset_group_gap))
        }
    };

    let offset = minutes_to_samples(start_min);
    let samples: Vec<usize> = extractor
        .extract(&classified)
        .into_iter()
        .map(|s| s + offset)
        .collect();
    log::info!("{} stimulus onsets extracted", samples.len());

    StimulusOnsets::build(samples)
}

/// Extract the stimulus onsets from the photodiode channel of a recording between two bounds in minutes.
pub fn extract_onsets_from_recording(
    recording: &Recording,
    profile: &ProtocolProfile,
    start_min: usize,
    end_min: Option<usize>,
) -> Result<StimulusOnsets, EphysError> {
    let waveform = recording.photodiode_segment(start_min, end_min)?;
    extract_onsets(&waveform, profile, start_min)
}
