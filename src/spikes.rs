//! Spike events produced by an external spike sorter, and the cluster index used to address them.
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::EphysError;
use crate::UNCLUSTERED_ID;

/// A sorted spike.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SpikeEvent {
    /// The time of the spike, in seconds.
    pub time: f64,
    /// The cluster the spike was assigned to; non-positive ids are unclustered (noise).
    pub cluster_id: i64,
    /// The recording site with the largest amplitude, if known.
    #[serde(default)]
    pub site_id: Option<u32>,
}

impl SpikeEvent {
    pub fn new(time: f64, cluster_id: i64, site_id: Option<u32>) -> Self {
        SpikeEvent {
            time,
            cluster_id,
            site_id,
        }
    }
}

/// A time-ordered collection of spike events, serialized as a plain array of events.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpikeTable {
    events: Vec<SpikeEvent>,
}

impl SpikeTable {
    /// Create a spike table.
    /// The function returns an error if there are no events, or if the times are not finite, non-negative and
    /// non-decreasing.
    pub fn build(events: Vec<SpikeEvent>) -> Result<Self, EphysError> {
        if events.is_empty() {
            return Err(EphysError::MalformedInput(
                "The spike table is empty".to_string(),
            ));
        }

        if let Some(event) = events
            .iter()
            .find(|event| !event.time.is_finite() || event.time < 0.0)
        {
            return Err(EphysError::MalformedInput(format!(
                "Invalid spike time {} (cluster {})",
                event.time, event.cluster_id
            )));
        }

        if let Some((e1, e2)) = events
            .iter()
            .tuple_windows()
            .find(|(e1, e2)| e2.time < e1.time)
        {
            return Err(EphysError::MalformedInput(format!(
                "Non-monotonic spike times: {} is followed by {}",
                e1.time, e2.time
            )));
        }

        Ok(SpikeTable { events })
    }

    /// Create a spike table from spike times in samples and their cluster labels.
    pub fn from_samples(
        samples: &[u64],
        clusters: &[i64],
        sample_rate: usize,
    ) -> Result<Self, EphysError> {
        if samples.len() != clusters.len() {
            return Err(EphysError::MalformedInput(format!(
                "{} spike times but {} cluster labels",
                samples.len(),
                clusters.len()
            )));
        }
        if sample_rate == 0 {
            return Err(EphysError::InvalidParameter(
                "The sample rate must be positive.".to_string(),
            ));
        }

        let events = samples
            .iter()
            .zip(clusters.iter())
            .map(|(&s, &c)| SpikeEvent::new(s as f64 / sample_rate as f64, c, None))
            .collect();
        SpikeTable::build(events)
    }

    /// Save the spike table to a file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), EphysError> {
        let file = File::create(path).map_err(|e| EphysError::IOError(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).map_err(|e| EphysError::IOError(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| EphysError::IOError(e.to_string()))
    }

    /// Load a spike table from a file.
    /// The function returns an error if the file cannot be read or if its events are malformed.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, EphysError> {
        let file = File::open(path).map_err(|e| EphysError::IOError(e.to_string()))?;
        let reader = BufReader::new(file);
        let table: SpikeTable =
            serde_json::from_reader(reader).map_err(|e| EphysError::IOError(e.to_string()))?;
        SpikeTable::build(table.events)
    }

    /// Returns a slice of all events.
    pub fn events(&self) -> &[SpikeEvent] {
        &self.events
    }

    /// Returns the total number of events, unclustered ones included.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the time of the last event.
    pub fn max_time(&self) -> f64 {
        self.events.last().map_or(0.0, |event| event.time)
    }

    /// Returns the sorted ids of all clusters, unclustered events excluded.
    pub fn clusters(&self) -> Vec<i64> {
        self.events
            .iter()
            .map(|event| event.cluster_id)
            .filter(|&id| id > UNCLUSTERED_ID)
            .sorted()
            .dedup()
            .collect()
    }

    /// Returns the spike times of a cluster, in seconds.
    pub fn times(&self, cluster_id: i64) -> Vec<f64> {
        self.events
            .iter()
            .filter(|event| event.cluster_id == cluster_id)
            .map(|event| event.time)
            .collect()
    }

    /// Returns a new table restricted to the events in `[start, end]` (in seconds).
    /// The function returns an error if no event falls in the window.
    pub fn window(&self, start: f64, end: f64) -> Result<SpikeTable, EphysError> {
        if !(start <= end) {
            return Err(EphysError::InvalidParameter(format!(
                "Invalid analysis window [{}, {}]",
                start, end
            )));
        }
        let events = self
            .events
            .iter()
            .filter(|event| event.time >= start && event.time <= end)
            .cloned()
            .collect();
        SpikeTable::build(events)
    }

    /// Returns the most frequent recording site of a cluster (the smallest site id among ties).
    pub fn dominant_site(&self, cluster_id: i64) -> Option<u32> {
        self.events
            .iter()
            .filter(|event| event.cluster_id == cluster_id)
            .filter_map(|event| event.site_id)
            .counts()
            .into_iter()
            .max_by(|(s1, c1), (s2, c2)| c1.cmp(c2).then(s2.cmp(s1)))
            .map(|(site, _)| site)
    }
}

/// A mapping between cluster ids and their positions (columns) in per-cluster tables.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct ClusterIndex {
    ids: Vec<i64>,
    positions: HashMap<i64, usize>,
}

impl ClusterIndex {
    /// Create an index over the given ids; duplicates are merged and positions follow ascending id order.
    pub fn new(ids: &[i64]) -> Self {
        let ids: Vec<i64> = ids.iter().copied().sorted().dedup().collect();
        let positions = ids.iter().enumerate().map(|(pos, &id)| (id, pos)).collect();
        ClusterIndex { ids, positions }
    }

    /// Returns the position of a cluster, if indexed.
    pub fn position(&self, cluster_id: i64) -> Option<usize> {
        self.positions.get(&cluster_id).copied()
    }

    /// Returns the id of the cluster at the given position.
    pub fn id(&self, position: usize) -> Option<i64> {
        self.ids.get(position).copied()
    }

    /// Returns the indexed ids, in position order.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn spike_table() -> SpikeTable {
        SpikeTable::build(vec![
            SpikeEvent::new(0.001, 3, Some(10)),
            SpikeEvent::new(0.002, 0, None),
            SpikeEvent::new(0.002, 1, Some(4)),
            SpikeEvent::new(0.010, 3, Some(11)),
            SpikeEvent::new(0.015, 3, Some(11)),
            SpikeEvent::new(0.020, -1, None),
            SpikeEvent::new(0.030, 1, Some(4)),
        ])
        .unwrap()
    }

    #[test]
    fn test_spike_table_build() {
        assert!(matches!(
            SpikeTable::build(vec![]),
            Err(EphysError::MalformedInput(_))
        ));
        assert!(matches!(
            SpikeTable::build(vec![
                SpikeEvent::new(0.5, 1, None),
                SpikeEvent::new(0.4, 1, None)
            ]),
            Err(EphysError::MalformedInput(_))
        ));
        assert!(matches!(
            SpikeTable::build(vec![SpikeEvent::new(f64::NAN, 1, None)]),
            Err(EphysError::MalformedInput(_))
        ));
        assert!(matches!(
            SpikeTable::build(vec![SpikeEvent::new(-0.1, 1, None)]),
            Err(EphysError::MalformedInput(_))
        ));

        let spike_table = spike_table();
        assert_eq!(spike_table.len(), 7);
        assert_eq!(spike_table.max_time(), 0.030);
    }

    #[test]
    fn test_spike_table_from_samples() {
        let spike_table = SpikeTable::from_samples(&[25, 50, 25_000], &[1, 2, 1], 25_000).unwrap();
        assert_eq!(spike_table.times(1), vec![0.001, 1.0]);
        assert_eq!(spike_table.times(2), vec![0.002]);

        assert!(matches!(
            SpikeTable::from_samples(&[25, 50], &[1], 25_000),
            Err(EphysError::MalformedInput(_))
        ));
        assert!(matches!(
            SpikeTable::from_samples(&[25], &[1], 0),
            Err(EphysError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_spike_table_clusters() {
        let spike_table = spike_table();
        assert_eq!(spike_table.clusters(), vec![1, 3]);
        assert_eq!(spike_table.times(3), vec![0.001, 0.010, 0.015]);
        assert!(spike_table.times(42).is_empty());
    }

    #[test]
    fn test_spike_table_window() {
        let spike_table = spike_table();
        let windowed = spike_table.window(0.005, 0.020).unwrap();
        assert_eq!(windowed.len(), 3);
        assert_eq!(windowed.clusters(), vec![3]);

        assert!(matches!(
            spike_table.window(1.0, 2.0),
            Err(EphysError::MalformedInput(_))
        ));
        assert!(matches!(
            spike_table.window(2.0, 1.0),
            Err(EphysError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_spike_table_dominant_site() {
        let spike_table = spike_table();
        assert_eq!(spike_table.dominant_site(3), Some(11));
        assert_eq!(spike_table.dominant_site(1), Some(4));
        assert_eq!(spike_table.dominant_site(0), None);

        let tied = SpikeTable::build(vec![
            SpikeEvent::new(0.1, 5, Some(8)),
            SpikeEvent::new(0.2, 5, Some(2)),
        ])
        .unwrap();
        assert_eq!(tied.dominant_site(5), Some(2));
    }

    #[test]
    fn test_spike_table_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spikes.json");

        let spike_table = spike_table();
        spike_table.save_to(&path).unwrap();
        assert_eq!(SpikeTable::load_from(&path).unwrap(), spike_table);

        std::fs::write(&path, r#"[{"time": 0.5, "cluster_id": 1}, {"time": 0.1, "cluster_id": 1}]"#)
            .unwrap();
        assert!(matches!(
            SpikeTable::load_from(&path),
            Err(EphysError::MalformedInput(_))
        ));
        assert!(matches!(
            SpikeTable::load_from(dir.path().join("missing.json")),
            Err(EphysError::IOError(_))
        ));
    }

    #[test]
    fn test_cluster_index() {
        let index = ClusterIndex::new(&[7, 2, 7, 5]);
        assert_eq!(index.ids(), &[2, 5, 7]);
        assert_eq!(index.len(), 3);
        assert_eq!(index.position(5), Some(1));
        assert_eq!(index.position(3), None);
        assert_eq!(index.id(2), Some(7));
        assert_eq!(index.id(3), None);
    }
}
