//! Seeded k-means over RGB samples.
//!
//! A fixed number of Lloyd rounds is run rather than iterating to convergence;
//! sample sets are already bounded, and a fixed count keeps the cost predictable.

use tracing::debug;

use crate::sample::Sample;
use crate::settings::MAX_COLORS;

/// Lloyd iterations per clustering.
pub const ROUNDS: usize = 10;

/// Xorshift generator owned by a single [`cluster`] call.
#[derive(Debug, Clone)]
pub struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    pub fn new(seed: u32) -> Self {
        // Xorshift is stuck at zero forever.
        let state = if seed == 0 { 0x9E37_79B9 } else { seed };
        Self { state }
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform index in `0..len`. `len` must be non-zero.
    pub fn next_index(&mut self, len: usize) -> usize {
        ((self.next_u32() as u64 * len as u64) >> 32) as usize
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clustering {
    /// Unrounded RGB centroids, one per cluster.
    pub centroids: Vec<[f64; 3]>,
    /// Cluster index of every sample, from the final assignment step.
    pub assignments: Vec<usize>,
    /// Number of times an empty cluster was moved onto a random sample.
    pub reseeds: usize,
}

impl Clustering {
    pub fn counts(&self) -> Vec<u64> {
        let mut counts = vec![0u64; self.centroids.len()];
        for &cluster in &self.assignments {
            counts[cluster] += 1;
        }
        counts
    }
}

#[inline(always)]
pub fn distance_sq(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr * dr + dg * dg + db * db
}

/// Index of the closest centroid; on a tie the lowest index wins.
#[inline]
pub fn nearest_index(point: [f64; 3], centroids: &[[f64; 3]]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (idx, centroid) in centroids.iter().enumerate() {
        let dist = distance_sq(point, *centroid);
        if dist < best_dist {
            best_dist = dist;
            best = idx;
        }
    }
    best
}

/// Partitions `samples` into `k` clusters (clamped to `1..=MAX_COLORS`).
///
/// Initial centroids are `k` samples drawn with replacement from a generator
/// seeded with `seed`, so identical input always yields identical output. A
/// cluster left without samples after a round is re-seeded from a random sample.
pub fn cluster(samples: &[Sample], k: usize, seed: u32) -> Clustering {
    if samples.is_empty() {
        return Clustering::default();
    }

    let k = k.clamp(1, MAX_COLORS);
    let n = samples.len();
    let mut rng = XorShift32::new(seed);

    let mut centroids: Vec<[f64; 3]> = (0..k).map(|_| samples[rng.next_index(n)]).collect();
    let mut assignments = vec![0usize; n];
    let mut sums = vec![[0.0f64; 3]; k];
    let mut counts = vec![0u64; k];
    let mut reseeds = 0usize;

    for _ in 0..ROUNDS {
        sums.fill([0.0; 3]);
        counts.fill(0);

        for (sample, slot) in samples.iter().zip(assignments.iter_mut()) {
            let nearest = nearest_index(*sample, &centroids);
            *slot = nearest;
            counts[nearest] += 1;
            for c in 0..3 {
                sums[nearest][c] += sample[c];
            }
        }

        for (idx, centroid) in centroids.iter_mut().enumerate() {
            if counts[idx] == 0 {
                *centroid = samples[rng.next_index(n)];
                reseeds += 1;
            } else {
                let count = counts[idx] as f64;
                *centroid = sums[idx].map(|sum| sum / count);
            }
        }
    }

    debug!(
        "k-means: {} samples, k={}, seed={}, cluster sizes {:?}, {} re-seeds",
        n, k, seed, counts, reseeds
    );

    Clustering {
        centroids,
        assignments,
        reseeds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_tone(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| if i % 2 == 0 { [0.0, 0.0, 0.0] } else { [255.0, 255.0, 255.0] })
            .collect()
    }

    #[test]
    fn test_xorshift_is_deterministic_and_never_zero() {
        let mut a = XorShift32::new(42);
        let mut b = XorShift32::new(42);
        for _ in 0..100 {
            let value = a.next_u32();
            assert_eq!(value, b.next_u32());
            assert_ne!(value, 0);
        }

        let mut zero = XorShift32::new(0);
        assert_ne!(zero.next_u32(), 0);
    }

    #[test]
    fn test_xorshift_known_sequence() {
        let mut rng = XorShift32::new(1);
        assert_eq!(rng.next_u32(), 270369);
        assert_eq!(rng.next_u32(), 67634689);
    }

    #[test]
    fn test_next_index_in_range() {
        let mut rng = XorShift32::new(7);
        for len in [1usize, 2, 3, 10, 1000] {
            for _ in 0..200 {
                assert!(rng.next_index(len) < len);
            }
        }
    }

    #[test]
    fn test_empty_samples() {
        let clustering = cluster(&[], 4, 1);
        assert!(clustering.centroids.is_empty());
        assert!(clustering.assignments.is_empty());
    }

    #[test]
    fn test_cluster_is_deterministic() {
        let samples: Vec<Sample> = (0..500)
            .map(|i| {
                let v = (i * 37 % 256) as f64;
                [v, 255.0 - v, (i % 7) as f64 * 30.0]
            })
            .collect();

        let first = cluster(&samples, 5, 99);
        let second = cluster(&samples, 5, 99);
        assert_eq!(first, second);
        assert_eq!(first.centroids.len(), 5);
        assert_eq!(first.assignments.len(), samples.len());
    }

    #[test]
    fn test_k_is_clamped() {
        let samples = two_tone(20);
        assert_eq!(cluster(&samples, 0, 3).centroids.len(), 1);
        assert_eq!(cluster(&samples, 50, 3).centroids.len(), MAX_COLORS);
    }

    #[test]
    fn test_single_color_collapses_into_first_cluster() {
        let samples = vec![[200.0, 30.0, 30.0]; 64];
        let clustering = cluster(&samples, 8, 1337);

        assert_eq!(clustering.centroids.len(), 8);
        assert!(clustering.assignments.iter().all(|&a| a == 0));
        assert_eq!(clustering.centroids[0], [200.0, 30.0, 30.0]);
        // Re-seeded clusters still point at a real sample.
        assert!(clustering.centroids.iter().all(|c| *c == [200.0, 30.0, 30.0]));
    }

    #[test]
    fn test_empty_cluster_is_reseeded_from_a_sample() {
        // Seed 1 draws sample 0 twice, so cluster 1 starts on top of cluster 0
        // and is left empty by the first round.
        let samples = vec![[0.0, 0.0, 0.0], [255.0, 255.0, 255.0]];
        let mut rng = XorShift32::new(1);
        assert_eq!([rng.next_index(2), rng.next_index(2), rng.next_index(2)], [0, 0, 1]);

        let clustering = cluster(&samples, 2, 1);

        assert_eq!(clustering.reseeds, 1);
        assert_eq!(clustering.centroids, vec![[0.0, 0.0, 0.0], [255.0, 255.0, 255.0]]);
        assert_eq!(clustering.assignments, vec![0, 1]);
        assert_eq!(clustering.counts(), vec![1, 1]);
    }

    #[test]
    fn test_two_tone_separates() {
        let samples = two_tone(200);
        let clustering = cluster(&samples, 2, 1337);
        let counts = clustering.counts();

        assert_eq!(counts, vec![100, 100]);
        for (sample, &cluster) in samples.iter().zip(&clustering.assignments) {
            assert_eq!(clustering.centroids[cluster], *sample);
        }
    }

    #[test]
    fn test_assignments_follow_nearest_rule() {
        let samples = vec![[10.0, 10.0, 10.0], [12.0, 10.0, 10.0], [240.0, 240.0, 240.0]];
        let clustering = cluster(&samples, 2, 5);
        assert_eq!(clustering.assignments[0], clustering.assignments[1]);
        assert_ne!(clustering.assignments[0], clustering.assignments[2]);
    }

    #[test]
    fn test_nearest_index_ties_pick_lowest() {
        let centroids = [[0.0, 0.0, 0.0], [20.0, 0.0, 0.0], [20.0, 0.0, 0.0]];
        assert_eq!(nearest_index([10.0, 0.0, 0.0], &centroids), 0);
        assert_eq!(nearest_index([19.0, 0.0, 0.0], &centroids), 1);
    }
}
