use anyhow::{ensure, Result};
use log::{debug, warn};
use rayon::prelude::*;

/// The point set a Lloyd iteration runs over. Points are addressed by index so the same driver
/// works for float rows and for PQ codes; only the distance and the centroid update rule differ.
pub trait ClusteringSpace: Sync {
    type Centroid: Clone + Send + Sync;

    fn num_points(&self) -> usize;

    /// Centroid placed exactly on a point, used for initialization.
    fn centroid_from_point(&self, point: usize) -> Self::Centroid;

    fn distance(&self, point: usize, centroid: &Self::Centroid) -> f32;

    /// Recomputes a centroid from its (non-empty) member list.
    fn update_centroid(&self, members: &[usize], previous: &Self::Centroid) -> Self::Centroid;
}

pub struct LloydResult<C> {
    pub centroids: Vec<C>,
    pub assignments: Vec<usize>,

    // Mean squared assignment error of each round
    pub errors: Vec<f64>,
}

/// Returns the index of the closest centroid and its distance. Ties go to the lower index.
pub fn nearest_centroid<S: ClusteringSpace>(
    space: &S,
    point: usize,
    centroids: &[S::Centroid],
) -> (usize, f32) {
    let mut best = (0, f32::MAX);
    for (idx, centroid) in centroids.iter().enumerate() {
        let distance = space.distance(point, centroid);
        if distance < best.1 {
            best = (idx, distance);
        }
    }
    best
}

/// Runs exactly `num_iterations` rounds of Lloyd's algorithm seeded with the given points.
/// Centroids are updated after every round except the last one, so the returned assignments
/// are always consistent with the returned centroids. A centroid that loses all its members
/// keeps its previous value.
pub fn run_lloyd<S: ClusteringSpace>(
    space: &S,
    initial_points: &[usize],
    num_iterations: usize,
) -> Result<LloydResult<S::Centroid>> {
    let num_points = space.num_points();
    ensure!(num_iterations >= 1, "k-means needs at least one iteration");
    ensure!(num_points >= 1, "k-means needs at least one point");
    ensure!(!initial_points.is_empty(), "k-means needs at least one cluster");
    ensure!(
        initial_points.iter().all(|&p| p < num_points),
        "initial point out of range (num points: {})",
        num_points
    );

    let mut centroids: Vec<S::Centroid> = initial_points
        .iter()
        .map(|&p| space.centroid_from_point(p))
        .collect();
    let mut assignments = vec![0; num_points];
    let mut errors = Vec::with_capacity(num_iterations);

    for iteration in 0..num_iterations {
        let nearest = (0..num_points)
            .into_par_iter()
            .map(|point| nearest_centroid(space, point, &centroids))
            .collect::<Vec<(usize, f32)>>();

        let mut total_error = 0.0f64;
        for (point, (label, distance)) in nearest.into_iter().enumerate() {
            assignments[point] = label;
            total_error += distance as f64;
        }
        let mse = total_error / num_points as f64;
        debug!("Iteration {}: mean squared error {:.6}", iteration, mse);
        errors.push(mse);

        if iteration + 1 == num_iterations {
            break;
        }

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); centroids.len()];
        for (point, &label) in assignments.iter().enumerate() {
            members[label].push(point);
        }

        let empty = members.iter().filter(|m| m.is_empty()).count();
        if empty > 0 {
            warn!(
                "Iteration {}: {} empty cluster(s), keeping their previous centroids",
                iteration, empty
            );
        }

        centroids = centroids
            .par_iter()
            .zip(members.par_iter())
            .map(|(previous, members)| {
                if members.is_empty() {
                    previous.clone()
                } else {
                    space.update_centroid(members, previous)
                }
            })
            .collect();
    }

    Ok(LloydResult {
        centroids,
        assignments,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // One-dimensional points, centroid is a single value.
    struct Line {
        points: Vec<f32>,
    }

    impl ClusteringSpace for Line {
        type Centroid = f32;

        fn num_points(&self) -> usize {
            self.points.len()
        }

        fn centroid_from_point(&self, point: usize) -> f32 {
            self.points[point]
        }

        fn distance(&self, point: usize, centroid: &f32) -> f32 {
            (self.points[point] - centroid).powi(2)
        }

        fn update_centroid(&self, members: &[usize], _previous: &f32) -> f32 {
            members.iter().map(|&m| self.points[m]).sum::<f32>() / members.len() as f32
        }
    }

    #[test]
    fn test_lloyd_two_groups() {
        let space = Line {
            points: vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0],
        };
        let result = run_lloyd(&space, &[0, 3], 5).expect("lloyd should succeed");
        assert_eq!(result.centroids, vec![1.0, 11.0]);
        assert_eq!(result.assignments, vec![0, 0, 0, 1, 1, 1]);
        assert_eq!(result.errors.len(), 5);
        assert!(result.errors[4] <= result.errors[0]);
    }

    #[test]
    fn test_lloyd_last_round_does_not_move_centroids() {
        let space = Line {
            points: vec![0.0, 4.0, 10.0],
        };
        // With a single round, centroids are exactly the seeds.
        let result = run_lloyd(&space, &[0, 2], 1).expect("lloyd should succeed");
        assert_eq!(result.centroids, vec![0.0, 10.0]);
        assert_eq!(result.assignments, vec![0, 0, 1]);
    }

    #[test]
    fn test_lloyd_empty_cluster_keeps_centroid() {
        let space = Line {
            points: vec![0.0, 0.0, 0.0],
        };
        // Duplicate seeds: the second cluster never wins a tie and stays empty.
        let result = run_lloyd(&space, &[1, 2], 3).expect("lloyd should succeed");
        assert_eq!(result.centroids, vec![0.0, 0.0]);
        assert!(result.assignments.iter().all(|&a| a == 0));
    }

    #[test]
    fn test_lloyd_preconditions() {
        let space = Line {
            points: vec![0.0, 1.0],
        };
        assert!(run_lloyd(&space, &[0], 0).is_err());
        assert!(run_lloyd(&space, &[], 3).is_err());
        assert!(run_lloyd(&space, &[5], 3).is_err());

        let empty = Line { points: vec![] };
        assert!(run_lloyd(&empty, &[0], 3).is_err());
    }

    #[test]
    fn test_nearest_centroid_tie_goes_to_lower_index() {
        let space = Line {
            points: vec![5.0],
        };
        assert_eq!(nearest_centroid(&space, 0, &[4.0, 6.0]), (0, 1.0));
    }
}
