//! Pairwise correlation of sorted spike trains.
//!
//! - [`binning`]: per-cluster spike counts over fixed-width bins
//! - [`shuffle`]: the null model, obtained by permuting the bins of every cluster independently
//! - [`correlogram`]: binned cross-correlograms, correlation probability and significance
//! - [`pairwise`]: cross-correlograms computed directly on the spike timestamps
pub mod binning;
pub mod correlogram;
pub mod pairwise;
pub mod shuffle;
