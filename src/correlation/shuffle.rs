//! Module implementing the shuffled null of a binned spike table.
use rand::seq::SliceRandom;
use rand::Rng;

use super::binning::BinnedTable;

/// Returns a copy of the table where the bins of every cluster are permuted independently.
///
/// Each cluster keeps its position in the index and its multiset of counts (hence its firing-rate distribution),
/// while the temporal alignment between clusters is destroyed.
pub fn shuffled<R: Rng + ?Sized>(table: &BinnedTable, rng: &mut R) -> BinnedTable {
    let num_bins = table.num_bins();
    let counts = (0..table.num_clusters())
        .map(|pos| {
            let series = table.series_at(pos);
            let mut permutation: Vec<usize> = (0..num_bins).collect();
            permutation.shuffle(rng);
            permutation.into_iter().map(|k| series[k]).collect()
        })
        .collect();

    log::debug!(
        "{} clusters shuffled over {} bins",
        table.num_clusters(),
        num_bins
    );
    table.with_counts(counts)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    const SEED: u64 = 42;

    fn binned_table() -> BinnedTable {
        let counts = vec![
            (0..200).map(|k| (k % 3 == 0) as u32).collect(),
            (0..200).map(|k| (k % 7) as u32 / 3).collect(),
            vec![0; 200],
        ];
        BinnedTable::from_counts(&[2, 5, 9], counts, 1).unwrap()
    }

    #[test]
    fn test_shuffled_is_permutation() {
        let mut rng = ChaCha8Rng::seed_from_u64(SEED);
        let table = binned_table();
        let shuffled = shuffled(&table, &mut rng);

        assert_eq!(shuffled.index(), table.index());
        assert_eq!(shuffled.num_bins(), table.num_bins());
        for pos in 0..table.num_clusters() {
            let mut original = table.series_at(pos).to_vec();
            let mut permuted = shuffled.series_at(pos).to_vec();
            assert_eq!(table.total_at(pos), shuffled.total_at(pos));
            original.sort();
            permuted.sort();
            assert_eq!(original, permuted);
        }
        assert_ne!(shuffled.series_at(0), table.series_at(0));
    }

    #[test]
    fn test_shuffled_is_reproducible() {
        let table = binned_table();
        let shuffled_1 = shuffled(&table, &mut ChaCha8Rng::seed_from_u64(SEED));
        let shuffled_2 = shuffled(&table, &mut ChaCha8Rng::seed_from_u64(SEED));
        assert_eq!(shuffled_1, shuffled_2);
    }

    #[test]
    fn test_shuffled_clusters_independently() {
        // Identical series end up with different permutations
        let counts = vec![(0..100).map(|k| k as u32).collect(); 2];
        let table = BinnedTable::from_counts(&[1, 2], counts, 1).unwrap();
        let shuffled = shuffled(&table, &mut ChaCha8Rng::seed_from_u64(SEED));
        assert_ne!(shuffled.series_at(0), shuffled.series_at(1));
    }
}
