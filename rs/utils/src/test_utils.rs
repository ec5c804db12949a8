use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::distance::l2::L2DistanceCalculator;
use crate::DistanceCalculator;

// Generate a random vector with a given dimension
pub fn generate_random_vector(dimension: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    let mut vector = vec![];
    for _ in 0..dimension {
        vector.push(rng.gen::<f32>());
    }
    vector
}

/// Flattened `num_vectors x dimension` dataset with values in [0, 1).
pub fn generate_random_dataset(num_vectors: usize, dimension: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..num_vectors * dimension)
        .map(|_| rng.gen::<f32>())
        .collect()
}

/// Gaussian-ish blobs around well separated centers. Returns the flattened data and the blob
/// each vector was drawn from.
pub fn generate_clustered_dataset(
    num_clusters: usize,
    vectors_per_cluster: usize,
    dimension: usize,
    spread: f32,
    seed: u64,
) -> (Vec<f32>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let centers: Vec<Vec<f32>> = (0..num_clusters)
        .map(|_| (0..dimension).map(|_| rng.gen_range(0.0..100.0)).collect())
        .collect();

    let mut data = Vec::with_capacity(num_clusters * vectors_per_cluster * dimension);
    let mut labels = Vec::with_capacity(num_clusters * vectors_per_cluster);
    for _ in 0..vectors_per_cluster {
        for (label, center) in centers.iter().enumerate() {
            for &c in center.iter() {
                // Sum of uniforms, close enough to a normal for test data
                let noise: f32 = (0..4).map(|_| rng.gen_range(-1.0..1.0)).sum::<f32>() / 2.0;
                data.push(c + noise * spread);
            }
            labels.push(label);
        }
    }
    (data, labels)
}

/// Exact top-k by squared L2 distance, ascending, ties broken by id.
pub fn brute_force_top_k(
    data: &[f32],
    dimension: usize,
    query: &[f32],
    k: usize,
) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = data
        .chunks_exact(dimension)
        .enumerate()
        .map(|(id, v)| (id, L2DistanceCalculator::calculate(v, query)))
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    scored.truncate(k);
    scored
}
