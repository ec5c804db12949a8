use anyhow::{ensure, Result};
use log::info;
use utils::distance::l2::L2DistanceCalculator;
use utils::kmeans::lloyd::{run_lloyd, ClusteringSpace};
use utils::sampling::shuffled_ids;
use utils::DistanceCalculator;

use crate::codebook::Codebooks;

/// Pairwise squared distances between codewords of the same subspace,
/// laid out `[subspace][codeword][codeword]`.
pub struct SymmetricDistanceTable {
    num_subspaces: usize,
    num_codewords: usize,
    table: Vec<f32>,
}

impl SymmetricDistanceTable {
    pub fn new(codebooks: &Codebooks) -> Result<Self> {
        let num_codewords = codebooks.num_codewords();
        ensure!(
            num_codewords <= 256,
            "codes with {} codewords per subspace do not fit in a byte",
            num_codewords
        );
        let num_subspaces = codebooks.num_subspaces();
        let mut table = Vec::with_capacity(num_subspaces * num_codewords * num_codewords);
        for m in 0..num_subspaces {
            for k1 in 0..num_codewords {
                for k2 in 0..num_codewords {
                    table.push(L2DistanceCalculator::calculate(
                        codebooks.codeword(m, k1),
                        codebooks.codeword(m, k2),
                    ));
                }
            }
        }
        Ok(Self {
            num_subspaces,
            num_codewords,
            table,
        })
    }

    pub fn num_subspaces(&self) -> usize {
        self.num_subspaces
    }

    pub fn num_codewords(&self) -> usize {
        self.num_codewords
    }

    #[inline]
    pub fn get(&self, m: usize, k1: usize, k2: usize) -> f32 {
        self.table[(m * self.num_codewords + k1) * self.num_codewords + k2]
    }

    #[inline]
    pub fn distance(&self, a: &[u8], b: &[u8]) -> f32 {
        a.iter()
            .zip(b.iter())
            .enumerate()
            .map(|(m, (&x, &y))| self.get(m, x as usize, y as usize))
            .sum()
    }
}

/// PQ codes as clustering points. A centroid is itself a code; it is updated per subspace to
/// the codeword minimizing the summed symmetric distance to the members' codewords.
struct CodeSpace<'a> {
    codes: &'a [u8],
    table: &'a SymmetricDistanceTable,
}

impl<'a> CodeSpace<'a> {
    fn code(&self, idx: usize) -> &[u8] {
        let m = self.table.num_subspaces;
        &self.codes[idx * m..(idx + 1) * m]
    }
}

impl<'a> ClusteringSpace for CodeSpace<'a> {
    type Centroid = Vec<u8>;

    fn num_points(&self) -> usize {
        self.codes.len() / self.table.num_subspaces
    }

    fn centroid_from_point(&self, point: usize) -> Vec<u8> {
        self.code(point).to_vec()
    }

    fn distance(&self, point: usize, centroid: &Vec<u8>) -> f32 {
        self.table.distance(self.code(point), centroid)
    }

    fn update_centroid(&self, members: &[usize], _previous: &Vec<u8>) -> Vec<u8> {
        let ks = self.table.num_codewords;
        let mut frequency = vec![0usize; ks];
        let mut votes = vec![0.0f32; ks];
        (0..self.table.num_subspaces)
            .map(|m| {
                frequency.iter_mut().for_each(|f| *f = 0);
                for &member in members {
                    frequency[self.code(member)[m] as usize] += 1;
                }

                // Only codewords that actually occur contribute a vote
                votes.iter_mut().for_each(|v| *v = 0.0);
                for (k1, &count) in frequency.iter().enumerate() {
                    if count == 0 {
                        continue;
                    }
                    for (k2, vote) in votes.iter_mut().enumerate() {
                        *vote += count as f32 * self.table.get(m, k1, k2);
                    }
                }

                let mut best = 0;
                for k2 in 1..ks {
                    if votes[k2] < votes[best] {
                        best = k2;
                    }
                }
                best as u8
            })
            .collect()
    }
}

/// K-means that runs directly on PQ codes using symmetric distances.
pub struct PQKMeans {
    table: SymmetricDistanceTable,
    num_clusters: usize,
    num_iterations: usize,
    seed: u64,

    // Flattened `num_clusters x num_subspaces`
    centroids: Vec<u8>,
    assignments: Vec<usize>,
    errors: Vec<f64>,
}

impl PQKMeans {
    pub fn new(codebooks: &Codebooks, num_clusters: usize, num_iterations: usize) -> Result<Self> {
        ensure!(num_clusters >= 1, "number of clusters must be at least 1");
        Ok(Self {
            table: SymmetricDistanceTable::new(codebooks)?,
            num_clusters,
            num_iterations,
            seed: 0,
            centroids: Vec::new(),
            assignments: Vec::new(),
            errors: Vec::new(),
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn num_subspaces(&self) -> usize {
        self.table.num_subspaces
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    pub fn fit(&mut self, codes: &[u8]) -> Result<()> {
        let m = self.num_subspaces();
        ensure!(
            codes.len() % m == 0,
            "Code buffer length {} is not a multiple of {} subspaces",
            codes.len(),
            m
        );
        let num_codes = codes.len() / m;
        ensure!(
            self.num_clusters <= num_codes,
            "cannot form {} clusters from {} codes",
            self.num_clusters,
            num_codes
        );

        info!(
            "Running PQ k-means: {} codes, {} clusters, {} iterations",
            num_codes, self.num_clusters, self.num_iterations
        );
        let initial_points: Vec<usize> = shuffled_ids(num_codes, self.seed)
            .into_iter()
            .take(self.num_clusters)
            .collect();
        let space = CodeSpace {
            codes,
            table: &self.table,
        };
        let result = run_lloyd(&space, &initial_points, self.num_iterations)?;

        self.centroids = result.centroids.into_iter().flatten().collect();
        self.assignments = result.assignments;
        self.errors = result.errors;
        Ok(())
    }

    /// Nearest centroid of one code. Ties go to the lower index.
    pub fn predict_one(&self, code: &[u8]) -> Result<usize> {
        ensure!(!self.centroids.is_empty(), "PQ k-means has no centroids");
        ensure!(
            code.len() == self.num_subspaces(),
            "code has {} bytes, expected {}",
            code.len(),
            self.num_subspaces()
        );
        let mut best = (0, f32::MAX);
        for (k, centroid) in self.centroids.chunks_exact(self.num_subspaces()).enumerate() {
            let distance = self.table.distance(code, centroid);
            if distance < best.1 {
                best = (k, distance);
            }
        }
        Ok(best.0)
    }

    pub fn symmetric_distance(&self, a: &[u8], b: &[u8]) -> f32 {
        self.table.distance(a, b)
    }

    pub fn symmetric_table(&self) -> &SymmetricDistanceTable {
        &self.table
    }

    pub fn centroids(&self) -> &[u8] {
        &self.centroids
    }

    pub fn centroid(&self, k: usize) -> &[u8] {
        let m = self.num_subspaces();
        &self.centroids[k * m..(k + 1) * m]
    }

    pub fn set_centroids(&mut self, centroids: Vec<u8>) -> Result<()> {
        ensure!(
            !centroids.is_empty() && centroids.len() % self.num_subspaces() == 0,
            "centroid buffer length {} is not a positive multiple of {}",
            centroids.len(),
            self.num_subspaces()
        );
        ensure!(
            centroids
                .iter()
                .all(|&c| (c as usize) < self.table.num_codewords),
            "centroid refers to a codeword out of range"
        );
        self.num_clusters = centroids.len() / self.num_subspaces();
        self.centroids = centroids;
        self.assignments.clear();
        self.errors.clear();
        Ok(())
    }

    pub fn assignments(&self) -> &[usize] {
        &self.assignments
    }

    pub fn errors(&self) -> &[f64] {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use utils::test_utils::generate_clustered_dataset;

    use super::*;
    use crate::generic::GenericQuantizer;

    fn line_codebooks() -> Codebooks {
        // One subspace, codewords on a line at 0, 1, 2, 10
        Codebooks::new(1, 4, 1, vec![0.0, 1.0, 2.0, 10.0]).unwrap()
    }

    #[test]
    fn test_symmetric_table() {
        let table = SymmetricDistanceTable::new(&line_codebooks()).unwrap();
        assert_eq!(table.get(0, 0, 3), 100.0);
        assert_eq!(table.get(0, 3, 0), 100.0);
        assert_eq!(table.get(0, 2, 2), 0.0);
        assert_eq!(table.distance(&[1], &[2]), 1.0);

        let too_many = Codebooks::new(1, 257, 1, vec![0.0; 257]).unwrap();
        assert!(SymmetricDistanceTable::new(&too_many).is_err());
    }

    #[test]
    fn test_sparse_vote_picks_medoid_codeword() {
        let table = SymmetricDistanceTable::new(&line_codebooks()).unwrap();
        let codes = vec![0u8, 0, 2, 3];
        let space = CodeSpace {
            codes: &codes,
            table: &table,
        };
        // Sum of squared distances: to 0 -> 4+100, to 1 -> 2+1+81, to 2 -> 8+64
        assert_eq!(space.update_centroid(&[0, 1, 2, 3], &vec![3]), vec![2]);
        assert_eq!(space.update_centroid(&[0, 1], &vec![3]), vec![0]);
    }

    #[test]
    fn test_pqkmeans_fit() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (data, _) = generate_clustered_dataset(6, 50, 8, 0.5, 4);
        let mut pq = GenericQuantizer::new(8, 4, 16).unwrap();
        pq.fit(&data, 6, 123).unwrap();
        let codes = pq.encode(&data).unwrap();

        let mut kmeans = PQKMeans::new(pq.centroids().unwrap(), 6, 5).unwrap();
        kmeans.fit(&codes).unwrap();
        assert_eq!(kmeans.centroids().len(), 6 * 4);
        assert_eq!(kmeans.assignments().len(), 300);
        assert_eq!(kmeans.errors().len(), 5);
        for window in kmeans.errors().windows(2) {
            assert!(window[1] <= window[0] * (1.0 + 1e-6) + 1e-9);
        }

        // Returned labels agree with the returned centroids
        for (i, code) in codes.chunks_exact(4).enumerate() {
            let label = kmeans.assignments()[i];
            let own = kmeans.symmetric_distance(code, kmeans.centroid(label));
            let best = (0..6)
                .map(|k| kmeans.symmetric_distance(code, kmeans.centroid(k)))
                .fold(f32::MAX, f32::min);
            assert_eq!(own, best);
            assert_eq!(kmeans.predict_one(code).unwrap(), label);
        }
    }

    #[test]
    fn test_pqkmeans_preconditions() {
        let codebooks = Codebooks::new(2, 4, 1, vec![0.0, 1.0, 2.0, 3.0, 0.0, 1.0, 2.0, 3.0])
            .unwrap();
        let mut kmeans = PQKMeans::new(&codebooks, 3, 2).unwrap();
        assert!(kmeans.predict_one(&[0, 0]).is_err());
        assert!(kmeans.fit(&[0, 1, 2]).is_err());
        assert!(kmeans.fit(&[0, 1, 2, 3]).is_err());
        assert!(kmeans.set_centroids(vec![0, 9]).is_err());

        kmeans.set_centroids(vec![0, 0, 3, 3]).unwrap();
        assert_eq!(kmeans.num_clusters(), 2);
        assert_eq!(kmeans.predict_one(&[3, 2]).unwrap(), 1);
    }
}
