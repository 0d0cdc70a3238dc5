//! Read-only access to raw multi-channel recordings.
//!
//! A recording is a binary file of interleaved little-endian `i16` samples, one frame of `num_channels` samples per
//! time step. The file is memory-mapped, so only the pages touched while copying a channel are loaded.
//!
//! # Examples
//!
//! ```no_run
//! use rusty_ephys::recording::Recording;
//! use rusty_ephys::NUM_CHANNELS;
//!
//! let recording = Recording::open("session/data.bin", NUM_CHANNELS).unwrap();
//! let photodiode = recording.photodiode_segment(2, Some(10)).unwrap();
//! println!("{} photodiode samples", photodiode.len());
//! ```
use std::fs::File;
use std::ops::Range;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};

use crate::error::EphysError;
use crate::{PHOTODIODE_CHANNEL, SAMPLE_RATE};

const BYTES_PER_SAMPLE: usize = std::mem::size_of::<i16>();

/// A memory-mapped multi-channel recording.
#[derive(Debug)]
pub struct Recording {
    mmap: Mmap,
    num_channels: usize,
}

impl Recording {
    /// Memory-map the recording at the given path.
    /// The function returns an error if the file size is not a whole number of frames.
    pub fn open<P: AsRef<Path>>(path: P, num_channels: usize) -> Result<Self, EphysError> {
        if num_channels == 0 {
            return Err(EphysError::InvalidParameter(
                "The number of channels must be positive.".to_string(),
            ));
        }

        let file = File::open(path.as_ref()).map_err(|e| EphysError::IOError(e.to_string()))?;
        // SAFETY: the mapping is read-only and the recording is never written while analysed.
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .map_err(|e| EphysError::IOError(e.to_string()))?;

        let frame_size = num_channels * BYTES_PER_SAMPLE;
        if mmap.len() % frame_size != 0 {
            return Err(EphysError::MalformedInput(format!(
                "File size {} is not a multiple of the frame size {} ({} channels)",
                mmap.len(),
                frame_size,
                num_channels
            )));
        }

        log::debug!(
            "Recording {:?} mapped: {} samples on {} channels",
            path.as_ref(),
            mmap.len() / frame_size,
            num_channels
        );

        Ok(Recording { mmap, num_channels })
    }

    /// Returns the number of channels per frame.
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Returns the number of samples (frames) per channel.
    pub fn num_samples(&self) -> usize {
        self.mmap.len() / (self.num_channels * BYTES_PER_SAMPLE)
    }

    /// Copy the samples of one channel over a range of sample offsets.
    /// The end of the range is clipped to the recording length.
    pub fn channel(&self, channel: usize, range: Range<usize>) -> Result<Vec<i16>, EphysError> {
        if channel >= self.num_channels {
            return Err(EphysError::MalformedInput(format!(
                "Channel {} requested from a recording with {} channels",
                channel, self.num_channels
            )));
        }

        let end = range.end.min(self.num_samples());
        if range.start > end {
            return Err(EphysError::MalformedInput(format!(
                "Sample {} is beyond the end of the recording ({} samples)",
                range.start,
                self.num_samples()
            )));
        }

        let frame_size = self.num_channels * BYTES_PER_SAMPLE;
        let offset = channel * BYTES_PER_SAMPLE;
        let samples = self.mmap[range.start * frame_size..end * frame_size]
            .chunks_exact(frame_size)
            .map(|frame| i16::from_le_bytes([frame[offset], frame[offset + 1]]))
            .collect();

        Ok(samples)
    }

    /// Copy the photodiode channel between two bounds expressed in minutes.
    /// Without an end bound, the segment runs until the end of the recording.
    pub fn photodiode_segment(
        &self,
        start_min: usize,
        end_min: Option<usize>,
    ) -> Result<Vec<i16>, EphysError> {
        if let Some(end_min) = end_min {
            if end_min < start_min {
                return Err(EphysError::InvalidParameter(format!(
                    "The end time ({} min) precedes the start time ({} min).",
                    end_min, start_min
                )));
            }
        }
        let start = minutes_to_samples(start_min);
        let end = end_min.map_or(self.num_samples(), minutes_to_samples);
        self.channel(PHOTODIODE_CHANNEL, start..end)
    }
}

/// Convert a time in minutes to a number of samples at the nominal sample rate.
pub fn minutes_to_samples(minutes: usize) -> usize {
    minutes * 60 * SAMPLE_RATE
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_recording(frames: &[Vec<i16>]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for frame in frames {
            for sample in frame {
                file.write_all(&sample.to_le_bytes()).unwrap();
            }
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_recording_channel() {
        let frames: Vec<Vec<i16>> = (0..5_i16).map(|t| vec![t, -t, 100 * t]).collect();
        let file = write_recording(&frames);

        let recording = Recording::open(file.path(), 3).unwrap();
        assert_eq!(recording.num_samples(), 5);
        assert_eq!(recording.channel(0, 0..5).unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(recording.channel(1, 1..3).unwrap(), vec![-1, -2]);
        assert_eq!(recording.channel(2, 3..100).unwrap(), vec![300, 400]);
        assert_eq!(recording.channel(2, 5..100).unwrap(), Vec::<i16>::new());
    }

    #[test]
    fn test_recording_errors() {
        let frames: Vec<Vec<i16>> = (0..4_i16).map(|t| vec![t, t]).collect();
        let file = write_recording(&frames);

        // 8 samples cannot be split into frames of 3 channels
        assert!(matches!(
            Recording::open(file.path(), 3),
            Err(EphysError::MalformedInput(_))
        ));
        assert!(matches!(
            Recording::open(file.path(), 0),
            Err(EphysError::InvalidParameter(_))
        ));

        let recording = Recording::open(file.path(), 2).unwrap();
        assert!(matches!(
            recording.channel(2, 0..1),
            Err(EphysError::MalformedInput(_))
        ));
        assert!(matches!(
            recording.channel(0, 10..20),
            Err(EphysError::MalformedInput(_))
        ));
        assert!(matches!(
            recording.photodiode_segment(3, Some(2)),
            Err(EphysError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_minutes_to_samples() {
        assert_eq!(minutes_to_samples(0), 0);
        assert_eq!(minutes_to_samples(2), 3_000_000);
    }
}
