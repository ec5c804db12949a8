use anyhow::{ensure, Result};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::distance::l2::L2DistanceCalculator;
use crate::kmeans::lloyd::{run_lloyd, ClusteringSpace};
use crate::DistanceCalculator;

pub struct KMeansBuilder {
    pub num_clusters: usize,
    pub num_iterations: usize,

    // data shape
    pub dimension: usize,

    pub seed: u64,
}

pub struct KMeansResult {
    // Flattened centroids
    pub centroids: Vec<f32>,
    pub assignments: Vec<usize>,
    pub errors: Vec<f64>,
}

impl KMeansResult {
    pub fn centroid(&self, idx: usize, dimension: usize) -> &[f32] {
        &self.centroids[idx * dimension..(idx + 1) * dimension]
    }
}

/// Row-major float observations. Centroids are means, accumulated in f64.
struct FlatSpace<'a> {
    data: &'a [f32],
    dimension: usize,
}

impl<'a> FlatSpace<'a> {
    fn point(&self, idx: usize) -> &[f32] {
        &self.data[idx * self.dimension..(idx + 1) * self.dimension]
    }
}

impl<'a> ClusteringSpace for FlatSpace<'a> {
    type Centroid = Vec<f32>;

    fn num_points(&self) -> usize {
        self.data.len() / self.dimension
    }

    fn centroid_from_point(&self, point: usize) -> Vec<f32> {
        self.point(point).to_vec()
    }

    fn distance(&self, point: usize, centroid: &Vec<f32>) -> f32 {
        L2DistanceCalculator::calculate(self.point(point), centroid)
    }

    fn update_centroid(&self, members: &[usize], _previous: &Vec<f32>) -> Vec<f32> {
        let mut sum = vec![0.0f64; self.dimension];
        for &member in members {
            for (s, &x) in sum.iter_mut().zip(self.point(member)) {
                *s += x as f64;
            }
        }
        let count = members.len() as f64;
        sum.into_iter().map(|s| (s / count) as f32).collect()
    }
}

impl KMeansBuilder {
    pub fn new(num_clusters: usize, num_iterations: usize, dimension: usize) -> Self {
        Self {
            num_clusters,
            num_iterations,
            dimension,
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn fit(&self, flattened_data: &[f32]) -> Result<KMeansResult> {
        ensure!(self.dimension > 0, "dimension must be positive");
        ensure!(self.num_clusters >= 1, "number of clusters must be at least 1");
        ensure!(
            flattened_data.len() % self.dimension == 0,
            "Data length {} is not a multiple of dimension {}",
            flattened_data.len(),
            self.dimension
        );
        let num_points = flattened_data.len() / self.dimension;
        ensure!(num_points >= 1, "k-means needs at least one data point");

        let space = FlatSpace {
            data: flattened_data,
            dimension: self.dimension,
        };

        // Independent draws, so the same observation may seed several centroids
        let mut rng = StdRng::seed_from_u64(self.seed);
        let initial_points = (0..self.num_clusters)
            .map(|_| rng.gen_range(0..num_points))
            .collect::<Vec<usize>>();

        debug!(
            "Running k-means: {} points, {} clusters, {} iterations",
            num_points, self.num_clusters, self.num_iterations
        );
        let result = run_lloyd(&space, &initial_points, self.num_iterations)?;

        Ok(KMeansResult {
            centroids: result.centroids.into_iter().flatten().collect(),
            assignments: result.assignments,
            errors: result.errors,
        })
    }
}
