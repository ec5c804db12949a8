use anyhow::{ensure, Result};
use log::debug;
use utils::distance::l2::L2DistanceCalculator;
use utils::kmeans::kmeans::KMeansBuilder;
use utils::DistanceCalculator;

/// Centroids of every subspace, flattened as `[subspace][codeword][subvector dimension]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Codebooks {
    num_subspaces: usize,
    num_codewords: usize,
    subvector_dimension: usize,
    data: Vec<f32>,
}

impl Codebooks {
    pub fn new(
        num_subspaces: usize,
        num_codewords: usize,
        subvector_dimension: usize,
        data: Vec<f32>,
    ) -> Result<Self> {
        ensure!(
            num_subspaces > 0 && num_codewords > 0 && subvector_dimension > 0,
            "codebook shape must be non-empty"
        );
        ensure!(
            data.len() == num_subspaces * num_codewords * subvector_dimension,
            "codebook has {} values, expected {} x {} x {}",
            data.len(),
            num_subspaces,
            num_codewords,
            subvector_dimension
        );
        Ok(Self {
            num_subspaces,
            num_codewords,
            subvector_dimension,
            data,
        })
    }

    /// Runs k-means independently on each block of `dimension / num_subspaces` contiguous
    /// columns. Also returns the training labels of every subspace.
    pub fn train(
        data: &[f32],
        dimension: usize,
        num_subspaces: usize,
        num_codewords: usize,
        num_iterations: usize,
        seed: u64,
    ) -> Result<(Self, Vec<Vec<usize>>)> {
        ensure!(dimension > 0, "dimension must be positive");
        ensure!(
            num_subspaces > 0 && dimension % num_subspaces == 0,
            "dimension {} is not divisible by number of subspaces {}",
            dimension,
            num_subspaces
        );
        ensure!(
            data.len() % dimension == 0,
            "Data length {} is not a multiple of dimension {}",
            data.len(),
            dimension
        );
        let num_vectors = data.len() / dimension;
        ensure!(
            num_codewords <= num_vectors,
            "cannot train {} codewords from {} vectors",
            num_codewords,
            num_vectors
        );

        let subvector_dimension = dimension / num_subspaces;
        let mut codebook = Vec::with_capacity(num_subspaces * num_codewords * subvector_dimension);
        let mut assignments = Vec::with_capacity(num_subspaces);
        for m in 0..num_subspaces {
            let samples: Vec<f32> = data
                .chunks_exact(dimension)
                .flat_map(|v| &v[m * subvector_dimension..(m + 1) * subvector_dimension])
                .cloned()
                .collect();
            let result = KMeansBuilder::new(num_codewords, num_iterations, subvector_dimension)
                .with_seed(seed)
                .fit(&samples)?;
            if let Some(error) = result.errors.last() {
                debug!("Subspace {}: final error {:.6}", m, error);
            }
            codebook.extend_from_slice(&result.centroids);
            assignments.push(result.assignments);
        }

        Ok((
            Self::new(num_subspaces, num_codewords, subvector_dimension, codebook)?,
            assignments,
        ))
    }

    pub fn num_subspaces(&self) -> usize {
        self.num_subspaces
    }

    pub fn num_codewords(&self) -> usize {
        self.num_codewords
    }

    pub fn subvector_dimension(&self) -> usize {
        self.subvector_dimension
    }

    pub fn dimension(&self) -> usize {
        self.num_subspaces * self.subvector_dimension
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn subspace(&self, m: usize) -> &[f32] {
        let size = self.num_codewords * self.subvector_dimension;
        &self.data[m * size..(m + 1) * size]
    }

    pub fn codeword(&self, m: usize, k: usize) -> &[f32] {
        let offset = (m * self.num_codewords + k) * self.subvector_dimension;
        &self.data[offset..offset + self.subvector_dimension]
    }

    /// Closest codeword of subspace `m` by linear scan. Ties go to the lower index.
    pub fn nearest(&self, m: usize, subvector: &[f32]) -> (usize, f32) {
        let mut best = (0, f32::MAX);
        for (k, codeword) in self
            .subspace(m)
            .chunks_exact(self.subvector_dimension)
            .enumerate()
        {
            let distance = L2DistanceCalculator::calculate(subvector, codeword);
            if distance < best.1 {
                best = (k, distance);
            }
        }
        best
    }

    /// Byte code of a full vector. Caller guarantees `num_codewords <= 256`.
    pub fn encode_one(&self, vector: &[f32]) -> Vec<u8> {
        vector
            .chunks_exact(self.subvector_dimension)
            .enumerate()
            .map(|(m, subvector)| self.nearest(m, subvector).0 as u8)
            .collect()
    }

    pub fn reconstruct(&self, code: &[u8]) -> Vec<f32> {
        let mut result = Vec::with_capacity(self.dimension());
        for (m, &k) in code.iter().enumerate() {
            result.extend_from_slice(self.codeword(m, k as usize));
        }
        result
    }

    pub fn to_nested(&self) -> Vec<Vec<Vec<f32>>> {
        (0..self.num_subspaces)
            .map(|m| {
                self.subspace(m)
                    .chunks_exact(self.subvector_dimension)
                    .map(|c| c.to_vec())
                    .collect()
            })
            .collect()
    }

    pub fn from_nested(nested: &[Vec<Vec<f32>>]) -> Result<Self> {
        ensure!(!nested.is_empty(), "codebook has no subspaces");
        let num_codewords = nested[0].len();
        ensure!(num_codewords > 0, "codebook has no codewords");
        let subvector_dimension = nested[0][0].len();
        let mut data = Vec::with_capacity(nested.len() * num_codewords * subvector_dimension);
        for subspace in nested {
            ensure!(
                subspace.len() == num_codewords,
                "subspaces have different codeword counts"
            );
            for codeword in subspace {
                ensure!(
                    codeword.len() == subvector_dimension,
                    "codewords have different dimensions"
                );
                data.extend_from_slice(codeword);
            }
        }
        Self::new(nested.len(), num_codewords, subvector_dimension, data)
    }
}
