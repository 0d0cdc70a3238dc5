//! Error module for the Rusty Ephys library.
use std::error::Error;
use std::fmt;

/// Error types for the library.
#[derive(Debug, PartialEq)]
pub enum EphysError {
    /// Error for malformed input data, e.g., channel count mismatch, empty or non-monotonic timestamps.
    MalformedInput(String),
    /// Error for a segment without enough peaks to compute the required gaps.
    InsufficientPeaks {
        found: usize,
        required: usize,
    },
    /// Error for invalid parameters
    InvalidParameter(String),
    /// Error for I/O operations.
    IOError(String),
}

impl fmt::Display for EphysError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EphysError::MalformedInput(e) => write!(f, "Malformed input: {}", e),
            EphysError::InsufficientPeaks { found, required } => write!(
                f,
                "Insufficient peaks: found {} but at least {} are required",
                found, required
            ),
            EphysError::InvalidParameter(e) => write!(f, "Invalid parameters: {}", e),
            EphysError::IOError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl Error for EphysError {}
