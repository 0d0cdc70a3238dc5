//! Stimulus timing from the photodiode trace.
//!
//! The photodiode records one light pulse per stimulus frame. Onsets are recovered in three stages:
//!
//! - [`peaks`]: detects local maxima and splits them into high and low amplitude classes
//! - [`boundary`]: removes creep artifacts between trials and the calibration pulses around them
//! - [`edges`]: emits one onset per run of same-class peaks
//!
//! [`pipeline`] chains the stages according to a [`pipeline::ProtocolProfile`].
//!
//! # Examples
//!
//! ```
//! use rusty_ephys::stimulus::pipeline::{extract_onsets, ProtocolProfile};
//!
//! // Pulses grouped in two trials, 20000 samples apart
//! let mut waveform = vec![0_i16; 30_000];
//! for center in [1_000, 1_500, 2_000, 21_000, 21_500] {
//!     waveform[center] = 1_800;
//! }
//!
//! let onsets = extract_onsets(&waveform, &ProtocolProfile::pg(), 0).unwrap();
//! assert_eq!(onsets.samples(), &[1_000, 21_000]);
//! ```
pub mod boundary;
pub mod edges;
pub mod peaks;
pub mod pipeline;
