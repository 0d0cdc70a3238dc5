//! Module implementing the binning of spike times into fixed-width occupancy counts.
use crate::error::EphysError;
use crate::spikes::{ClusterIndex, SpikeTable};
use crate::UNCLUSTERED_ID;

/// The tolerance (in milliseconds) absorbing the rounding of spike times converted from samples.
pub const BIN_TOLERANCE_MS: f64 = 1e-6;

/// Per-cluster spike counts over fixed-width time bins spanning `[0, max spike time]`.
#[derive(Debug, PartialEq, Clone)]
pub struct BinnedTable {
    index: ClusterIndex,
    bin_width_ms: u32,
    /// One series of counts per cluster, in index order.
    counts: Vec<Vec<u32>>,
}

impl BinnedTable {
    /// Bin the spikes of the given clusters.
    ///
    /// Times are converted to milliseconds. Bin `k` covers `[k * w, (k + 1) * w)` and the last bin is closed, so that
    /// every spike of the table is counted. Non-positive cluster ids are ignored; a listed cluster without spikes
    /// gets an all-zero series.
    pub fn build(
        spike_table: &SpikeTable,
        clusters: &[i64],
        bin_width_ms: u32,
    ) -> Result<Self, EphysError> {
        if bin_width_ms == 0 {
            return Err(EphysError::InvalidParameter(
                "The bin width must be positive.".to_string(),
            ));
        }

        let clusters: Vec<i64> = clusters
            .iter()
            .copied()
            .filter(|&id| id > UNCLUSTERED_ID)
            .collect();
        let index = ClusterIndex::new(&clusters);
        let num_bins = num_bins(spike_table.max_time() * 1000.0, bin_width_ms);

        let mut counts = vec![vec![0_u32; num_bins]; index.len()];
        for event in spike_table.events() {
            if let Some(pos) = index.position(event.cluster_id) {
                counts[pos][bin_of(event.time, bin_width_ms).min(num_bins - 1)] += 1;
            }
        }

        log::debug!(
            "{} clusters binned into {} bins of {} ms",
            index.len(),
            num_bins,
            bin_width_ms
        );

        Ok(BinnedTable {
            index,
            bin_width_ms,
            counts,
        })
    }

    /// Create a table from precomputed counts, one series per cluster (in the order of `clusters`).
    /// The function returns an error if the ids are not unique and positive, or if the series lengths differ.
    pub fn from_counts(
        clusters: &[i64],
        counts: Vec<Vec<u32>>,
        bin_width_ms: u32,
    ) -> Result<Self, EphysError> {
        if bin_width_ms == 0 {
            return Err(EphysError::InvalidParameter(
                "The bin width must be positive.".to_string(),
            ));
        }
        if clusters.len() != counts.len() {
            return Err(EphysError::MalformedInput(format!(
                "{} clusters but {} count series",
                clusters.len(),
                counts.len()
            )));
        }
        if clusters.iter().any(|&id| id <= UNCLUSTERED_ID) {
            return Err(EphysError::MalformedInput(
                "Binned clusters must have positive ids".to_string(),
            ));
        }
        if counts.iter().any(|series| series.len() != counts[0].len()) {
            return Err(EphysError::MalformedInput(
                "All count series must have the same number of bins".to_string(),
            ));
        }

        let index = ClusterIndex::new(clusters);
        if index.len() != clusters.len() {
            return Err(EphysError::MalformedInput(
                "Duplicate cluster ids".to_string(),
            ));
        }

        // Reorder the series by ascending id to match the index positions
        let mut counts: Vec<(i64, Vec<u32>)> = clusters.iter().copied().zip(counts).collect();
        counts.sort_by_key(|(id, _)| *id);

        Ok(BinnedTable {
            index,
            bin_width_ms,
            counts: counts.into_iter().map(|(_, series)| series).collect(),
        })
    }

    /// Returns the cluster index of the table.
    pub fn index(&self) -> &ClusterIndex {
        &self.index
    }

    /// Returns the bin width, in milliseconds.
    pub fn bin_width_ms(&self) -> u32 {
        self.bin_width_ms
    }

    /// Returns the number of clusters.
    pub fn num_clusters(&self) -> usize {
        self.counts.len()
    }

    /// Returns the number of bins.
    pub fn num_bins(&self) -> usize {
        self.counts.first().map_or(0, |series| series.len())
    }

    /// Returns the counts of a cluster, if binned.
    pub fn series(&self, cluster_id: i64) -> Option<&[u32]> {
        self.index
            .position(cluster_id)
            .map(|pos| &self.counts[pos][..])
    }

    /// Returns the counts of the cluster at the given position.
    pub fn series_at(&self, position: usize) -> &[u32] {
        &self.counts[position]
    }

    /// Returns the total count of the cluster at the given position.
    pub fn total_at(&self, position: usize) -> u64 {
        self.counts[position].iter().map(|&c| c as u64).sum()
    }

    pub(crate) fn with_counts(&self, counts: Vec<Vec<u32>>) -> Self {
        BinnedTable {
            index: self.index.clone(),
            bin_width_ms: self.bin_width_ms,
            counts,
        }
    }
}

/// Returns the number of bins of width `bin_width_ms` needed to cover `[0, ceil(max_time_ms)]`, at least one.
pub fn num_bins(max_time_ms: f64, bin_width_ms: u32) -> usize {
    let span = (max_time_ms - BIN_TOLERANCE_MS).max(0.0).ceil() as usize;
    let width = bin_width_ms as usize;
    ((span + width - 1) / width).max(1)
}

/// Returns the bin of a spike time given in seconds.
/// A time within `BIN_TOLERANCE_MS` below a bin edge falls in the bin starting at that edge.
pub fn bin_of(time: f64, bin_width_ms: u32) -> usize {
    ((time * 1000.0 + BIN_TOLERANCE_MS) / bin_width_ms as f64).floor() as usize
}
