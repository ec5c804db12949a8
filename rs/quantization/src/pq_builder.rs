use anyhow::{ensure, Result};
use log::info;
use utils::sampling::sample_rows;

use crate::codebook::Codebooks;
use crate::pq::{ProductQuantizer, ProductQuantizerConfig};

pub struct ProductQuantizerBuilderConfig {
    pub max_iteration: usize,
    pub max_training_samples: usize,
    pub seed: u64,
}

impl Default for ProductQuantizerBuilderConfig {
    fn default() -> Self {
        Self {
            max_iteration: 20,
            max_training_samples: 100_000,
            seed: 123,
        }
    }
}

pub struct ProductQuantizerBuilder {
    pq_config: ProductQuantizerConfig,
    builder_config: ProductQuantizerBuilderConfig,
    dataset: Vec<f32>,
}

impl ProductQuantizerBuilder {
    /// Create a new ProductQuantizerBuilder
    pub fn new(
        config: ProductQuantizerConfig,
        builder_config: ProductQuantizerBuilderConfig,
    ) -> Self {
        Self {
            pq_config: config,
            builder_config,
            dataset: Vec::new(),
        }
    }

    /// Add a new vector to the dataset for training
    pub fn add(&mut self, data: &[f32]) -> Result<()> {
        ensure!(
            data.len() == self.pq_config.dimension,
            "vector has dimension {}, expected {}",
            data.len(),
            self.pq_config.dimension
        );
        self.dataset.extend_from_slice(data);
        Ok(())
    }

    pub fn num_vectors(&self) -> usize {
        self.dataset.len() / self.pq_config.dimension.max(1)
    }

    /// Train k-means on every subspace of the (possibly subsampled) dataset, and returns the
    /// product quantizer
    pub fn build(&self) -> Result<ProductQuantizer> {
        self.pq_config.validate()?;
        let samples = sample_rows(
            &self.dataset,
            self.pq_config.dimension,
            self.builder_config.max_training_samples,
            self.builder_config.seed,
        )?;
        info!(
            "Training product quantizer on {} of {} vectors ({} subspaces, {} codewords)",
            samples.len() / self.pq_config.dimension,
            self.num_vectors(),
            self.pq_config.num_subspaces,
            self.pq_config.num_codewords()
        );
        let (codebooks, _) = Codebooks::train(
            &samples,
            self.pq_config.dimension,
            self.pq_config.num_subspaces,
            self.pq_config.num_codewords(),
            self.builder_config.max_iteration,
            self.builder_config.seed,
        )?;
        ProductQuantizer::new(self.pq_config.clone(), codebooks)
    }
}
