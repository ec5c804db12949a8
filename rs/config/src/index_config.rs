use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::enums::IndexType;

/// Config for an IVF index over raw vectors.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct IvfConfig {
    /// Number of dimensions of the vectors.
    /// Default: 128
    pub num_features: usize,

    /// Number of coarse centroids, i.e. posting lists.
    /// Default: 1024
    pub num_lists: usize,

    /// Number of k-means rounds for the coarse quantizer.
    /// Default: 10
    pub num_iterations: usize,

    /// At most this many vectors are used to train the coarse quantizer. Larger inputs are
    /// subsampled after a seeded shuffle.
    /// Default: 200000
    pub max_training_samples: usize,

    /// Default: 123
    pub seed: u64,
}

impl Default for IvfConfig {
    fn default() -> Self {
        Self {
            num_features: 128,
            num_lists: 1024,
            num_iterations: 10,
            max_training_samples: 200_000,
            seed: 123,
        }
    }
}

impl IvfConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.num_features >= 1, "num_features must be at least 1");
        ensure!(self.num_lists >= 1, "num_lists must be at least 1");
        ensure!(self.num_iterations >= 1, "num_iterations must be at least 1");
        ensure!(
            self.max_training_samples >= self.num_lists,
            "max_training_samples ({}) is smaller than num_lists ({})",
            self.max_training_samples,
            self.num_lists
        );
        Ok(())
    }
}

/// Config for an IVF index whose posting lists hold PQ codes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct IvfPqConfig {
    /// Number of dimensions of the vectors.
    /// Default: 128
    pub num_features: usize,

    /// Number of coarse centroids, i.e. posting lists.
    /// Default: 1024
    pub num_lists: usize,

    /// Number of PQ subspaces (M). Must divide `num_features`.
    /// Default: 16
    pub num_subspaces: usize,

    /// Bits per PQ code, at most 8.
    /// Default: 8
    pub num_bits: u8,

    /// Default: 12
    pub coarse_iterations: usize,

    /// Default: 6
    pub pq_iterations: usize,

    /// Default: 200000
    pub max_training_samples: usize,

    /// Default: 123
    pub seed: u64,
}

impl Default for IvfPqConfig {
    fn default() -> Self {
        Self {
            num_features: 128,
            num_lists: 1024,
            num_subspaces: 16,
            num_bits: 8,
            coarse_iterations: 12,
            pq_iterations: 6,
            max_training_samples: 200_000,
            seed: 123,
        }
    }
}

impl IvfPqConfig {
    pub fn num_codewords(&self) -> usize {
        1 << self.num_bits
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.num_features >= 1, "num_features must be at least 1");
        ensure!(self.num_lists >= 1, "num_lists must be at least 1");
        validate_pq(self.num_features, self.num_subspaces, self.num_bits)?;
        ensure!(
            self.coarse_iterations >= 1 && self.pq_iterations >= 1,
            "iteration counts must be at least 1"
        );
        ensure!(
            self.max_training_samples >= self.num_lists.max(self.num_codewords()),
            "max_training_samples ({}) is too small",
            self.max_training_samples
        );
        Ok(())
    }
}

/// Config for an index whose coarse quantizer is trained directly on PQ codes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RiiConfig {
    /// Number of dimensions of the vectors.
    /// Default: 128
    pub num_features: usize,

    /// Number of PQ subspaces (M). Must divide `num_features`.
    /// Default: 16
    pub num_subspaces: usize,

    /// Bits per PQ code, at most 8.
    /// Default: 8
    pub num_bits: u8,

    /// Number of k-means rounds when training the PQ codebooks.
    /// Default: 20
    pub pq_iterations: usize,

    /// At most this many vectors are used to train the PQ codebooks.
    /// Default: 100000
    pub max_training_samples: usize,

    /// Number of posting lists built by `reconfigure`. When unset, `sqrt(N)` is used.
    /// Default: None
    pub num_lists: Option<usize>,

    /// Number of PQ k-means rounds run by `reconfigure`.
    /// Default: 5
    pub reconfigure_iterations: usize,

    /// `reconfigure` trains on at most `num_lists * samples_per_list` codes.
    /// Default: 5000
    pub samples_per_list: usize,

    /// Default: 123
    pub seed: u64,
}

impl Default for RiiConfig {
    fn default() -> Self {
        Self {
            num_features: 128,
            num_subspaces: 16,
            num_bits: 8,
            pq_iterations: 20,
            max_training_samples: 100_000,
            num_lists: None,
            reconfigure_iterations: 5,
            samples_per_list: 5000,
            seed: 123,
        }
    }
}

impl RiiConfig {
    pub fn num_codewords(&self) -> usize {
        1 << self.num_bits
    }

    pub fn validate(&self) -> Result<()> {
        validate_pq(self.num_features, self.num_subspaces, self.num_bits)?;
        ensure!(self.pq_iterations >= 1, "pq_iterations must be at least 1");
        ensure!(
            self.reconfigure_iterations >= 1,
            "reconfigure_iterations must be at least 1"
        );
        ensure!(
            self.samples_per_list >= 1,
            "samples_per_list must be at least 1"
        );
        if let Some(num_lists) = self.num_lists {
            ensure!(num_lists >= 1, "num_lists must be at least 1");
        }
        Ok(())
    }
}

fn validate_pq(num_features: usize, num_subspaces: usize, num_bits: u8) -> Result<()> {
    ensure!(num_features >= 1, "num_features must be at least 1");
    ensure!(
        num_subspaces >= 1 && num_features % num_subspaces == 0,
        "num_features ({}) is not divisible by num_subspaces ({})",
        num_features,
        num_subspaces
    );
    ensure!(
        (1..=8).contains(&num_bits),
        "num_bits must be in [1, 8], got {}",
        num_bits
    );
    Ok(())
}

/// Any of the index configs, tagged by `index_type` when serialized.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "index_type")]
pub enum IndexConfig {
    Ivf(IvfConfig),
    IvfPq(IvfPqConfig),
    Rii(RiiConfig),
}

impl IndexConfig {
    pub fn index_type(&self) -> IndexType {
        match self {
            IndexConfig::Ivf(_) => IndexType::Ivf,
            IndexConfig::IvfPq(_) => IndexType::IvfPq,
            IndexConfig::Rii(_) => IndexType::Rii,
        }
    }

    pub fn num_features(&self) -> usize {
        match self {
            IndexConfig::Ivf(c) => c.num_features,
            IndexConfig::IvfPq(c) => c.num_features,
            IndexConfig::Rii(c) => c.num_features,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            IndexConfig::Ivf(c) => c.validate(),
            IndexConfig::IvfPq(c) => c.validate(),
            IndexConfig::Rii(c) => c.validate(),
        }
    }
}
