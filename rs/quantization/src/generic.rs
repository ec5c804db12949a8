use anyhow::{anyhow, ensure, Result};
use log::info;
use rayon::prelude::*;

use crate::codebook::Codebooks;
use crate::distance_table::DistanceTable;

/// Largest codeword count addressable by a one-byte code.
const MAX_BYTE_CODEWORDS: usize = 256;

/// Product quantizer with free `num_subspaces` / `num_codewords`. With a single subspace it is a
/// coarse quantizer over whole vectors and may hold more than 256 centroids, since those labels
/// are never packed into bytes.
pub struct GenericQuantizer {
    dimension: usize,
    num_subspaces: usize,
    num_codewords: usize,
    codebooks: Option<Codebooks>,
    assignments: Vec<Vec<usize>>,
}

impl GenericQuantizer {
    pub fn new(dimension: usize, num_subspaces: usize, num_codewords: usize) -> Result<Self> {
        ensure!(dimension > 0, "dimension must be positive");
        ensure!(
            num_subspaces > 0 && dimension % num_subspaces == 0,
            "dimension {} is not divisible by number of subspaces {}",
            dimension,
            num_subspaces
        );
        ensure!(num_codewords > 0, "number of codewords must be positive");
        ensure!(
            num_subspaces == 1 || num_codewords <= MAX_BYTE_CODEWORDS,
            "{} codewords per subspace cannot be encoded in one byte",
            num_codewords
        );
        Ok(Self {
            dimension,
            num_subspaces,
            num_codewords,
            codebooks: None,
            assignments: Vec::new(),
        })
    }

    pub fn fit(&mut self, data: &[f32], num_iterations: usize, seed: u64) -> Result<()> {
        info!(
            "Fitting quantizer: {} vectors, {} subspaces, {} codewords, {} iterations",
            data.len() / self.dimension,
            self.num_subspaces,
            self.num_codewords,
            num_iterations
        );
        let (codebooks, assignments) = Codebooks::train(
            data,
            self.dimension,
            self.num_subspaces,
            self.num_codewords,
            num_iterations,
            seed,
        )?;
        self.codebooks = Some(codebooks);
        self.assignments = assignments;
        Ok(())
    }

    pub fn is_trained(&self) -> bool {
        self.codebooks.is_some()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn num_subspaces(&self) -> usize {
        self.num_subspaces
    }

    pub fn num_codewords(&self) -> usize {
        self.num_codewords
    }

    pub fn subvector_dimension(&self) -> usize {
        self.dimension / self.num_subspaces
    }

    pub fn centroids(&self) -> Result<&Codebooks> {
        self.codebooks
            .as_ref()
            .ok_or_else(|| anyhow!("quantizer is not trained"))
    }

    /// Replaces the codebooks, e.g. with ones trained elsewhere. Training labels are dropped.
    pub fn set_centroids(&mut self, codebooks: Codebooks) -> Result<()> {
        ensure!(
            codebooks.num_subspaces() == self.num_subspaces
                && codebooks.num_codewords() == self.num_codewords
                && codebooks.subvector_dimension() == self.subvector_dimension(),
            "codebook shape ({}, {}, {}) does not match quantizer ({}, {}, {})",
            codebooks.num_subspaces(),
            codebooks.num_codewords(),
            codebooks.subvector_dimension(),
            self.num_subspaces,
            self.num_codewords,
            self.subvector_dimension()
        );
        self.codebooks = Some(codebooks);
        self.assignments.clear();
        Ok(())
    }

    /// Training labels, one vector per subspace. Empty until `fit` runs.
    pub fn assignments(&self) -> &[Vec<usize>] {
        &self.assignments
    }

    /// Nearest codeword of `subspace` for one subvector.
    pub fn predict_one(&self, subvector: &[f32], subspace: usize) -> Result<usize> {
        let codebooks = self.centroids()?;
        ensure!(
            subspace < self.num_subspaces,
            "subspace {} out of range",
            subspace
        );
        ensure!(
            subvector.len() == self.subvector_dimension(),
            "subvector has dimension {}, expected {}",
            subvector.len(),
            self.subvector_dimension()
        );
        Ok(codebooks.nearest(subspace, subvector).0)
    }

    /// Encodes a row-major batch into `num_subspaces` bytes per vector.
    pub fn encode(&self, data: &[f32]) -> Result<Vec<u8>> {
        let codebooks = self.centroids()?;
        ensure!(
            self.num_codewords <= MAX_BYTE_CODEWORDS,
            "{} codewords cannot be encoded in one byte",
            self.num_codewords
        );
        ensure!(
            data.len() % self.dimension == 0,
            "Data length {} is not a multiple of dimension {}",
            data.len(),
            self.dimension
        );
        Ok(data
            .par_chunks_exact(self.dimension)
            .flat_map_iter(|v| codebooks.encode_one(v))
            .collect())
    }

    pub fn decode(&self, code: &[u8]) -> Result<Vec<f32>> {
        let codebooks = self.centroids()?;
        ensure!(
            code.len() == self.num_subspaces,
            "code has {} bytes, expected {}",
            code.len(),
            self.num_subspaces
        );
        Ok(codebooks.reconstruct(code))
    }

    pub fn distance_table(&self, query: &[f32]) -> Result<DistanceTable> {
        DistanceTable::new(self.centroids()?, query)
    }
}

#[cfg(test)]
mod tests {
    use utils::test_utils::{generate_clustered_dataset, generate_random_dataset};

    use super::*;

    #[test]
    fn test_new_preconditions() {
        assert!(GenericQuantizer::new(10, 3, 16).is_err());
        assert!(GenericQuantizer::new(8, 2, 257).is_err());
        assert!(GenericQuantizer::new(8, 2, 0).is_err());
        assert!(GenericQuantizer::new(0, 1, 16).is_err());
        assert!(GenericQuantizer::new(8, 1, 1000).is_ok());
    }

    #[test]
    fn test_untrained_quantizer_fails() {
        let q = GenericQuantizer::new(4, 2, 4).unwrap();
        assert!(!q.is_trained());
        assert!(q.predict_one(&[0.0, 0.0], 0).is_err());
        assert!(q.encode(&[0.0; 4]).is_err());
        assert!(q.distance_table(&[0.0; 4]).is_err());
    }

    #[test]
    fn test_coarse_quantizer_predicts_training_labels() {
        let (data, _) = generate_clustered_dataset(4, 50, 8, 0.5, 9);
        let mut q = GenericQuantizer::new(8, 1, 4).unwrap();
        q.fit(&data, 10, 0).unwrap();
        assert!(q.is_trained());
        assert_eq!(q.assignments().len(), 1);

        for (i, v) in data.chunks_exact(8).enumerate() {
            assert_eq!(q.predict_one(v, 0).unwrap(), q.assignments()[0][i]);
        }
    }

    #[test]
    fn test_coarse_quantizer_more_than_256_codewords() {
        let data = generate_random_dataset(400, 2, 5);
        let mut q = GenericQuantizer::new(2, 1, 300).unwrap();
        q.fit(&data, 2, 0).unwrap();
        assert!(q.predict_one(&[0.5, 0.5], 0).unwrap() < 300);
        // Labels above 255 do not fit in a byte
        assert!(q.encode(&data).is_err());
    }

    #[test]
    fn test_fit_requires_enough_vectors() {
        let data = generate_random_dataset(10, 4, 5);
        let mut q = GenericQuantizer::new(4, 2, 16).unwrap();
        assert!(q.fit(&data, 3, 0).is_err());
    }

    #[test]
    fn test_encode_and_set_centroids() {
        let data = generate_random_dataset(200, 8, 2);
        let mut q = GenericQuantizer::new(8, 4, 16).unwrap();
        q.fit(&data, 4, 123).unwrap();
        let codes = q.encode(&data).unwrap();
        assert_eq!(codes.len(), 200 * 4);
        for m in 0..4 {
            assert_eq!(codes[m] as usize, q.assignments()[m][0]);
        }

        let codebooks = q.centroids().unwrap().clone();
        let mut other = GenericQuantizer::new(8, 4, 16).unwrap();
        other.set_centroids(codebooks).unwrap();
        assert_eq!(other.encode(&data).unwrap(), codes);
        assert!(other.assignments().is_empty());

        let wrong = Codebooks::new(2, 16, 4, vec![0.0; 2 * 16 * 4]).unwrap();
        assert!(other.set_centroids(wrong).is_err());
        assert_eq!(other.decode(&codes[..4]).unwrap().len(), 8);
    }
}
