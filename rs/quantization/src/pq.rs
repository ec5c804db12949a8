use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{ensure, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use utils::distance::l2::{L2Accumulator, L2DistanceCalculator, L2DistanceCalculatorImpl};
use utils::StreamingDistanceCalculator;

use crate::codebook::Codebooks;
use crate::distance_table::DistanceTable;
use crate::quantization::Quantizer;

const CODEBOOK_NAME: &str = "codebook";
const CONFIG_NAME: &str = "product_quantizer_config.yaml";

/// Codes are single bytes, so a subspace holds at most 256 codewords.
pub const MAX_NUM_BITS: u8 = 8;

pub struct ProductQuantizer {
    pub dimension: usize,
    pub num_subspaces: usize,
    pub num_bits: u8,
    codebooks: Codebooks,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProductQuantizerConfig {
    pub dimension: usize,
    pub num_subspaces: usize,
    pub num_bits: u8,
}

impl ProductQuantizerConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.num_subspaces > 0 && self.dimension % self.num_subspaces == 0,
            "dimension {} is not divisible by number of subspaces {}",
            self.dimension,
            self.num_subspaces
        );
        ensure!(
            self.num_bits >= 1 && self.num_bits <= MAX_NUM_BITS,
            "num_bits must be in [1, {}], got {}",
            MAX_NUM_BITS,
            self.num_bits
        );
        Ok(())
    }

    pub fn num_codewords(&self) -> usize {
        1 << self.num_bits
    }

    pub fn subvector_dimension(&self) -> usize {
        self.dimension / self.num_subspaces
    }
}

pub struct ProductQuantizerReader {
    base_directory: String,
}

impl ProductQuantizerReader {
    pub fn new(base_directory: String) -> Self {
        Self { base_directory }
    }

    pub fn read(&self) -> Result<ProductQuantizer> {
        let config_path = Path::new(&self.base_directory).join(CONFIG_NAME);
        ensure!(
            config_path.is_file(),
            "Config file {} does not exist",
            config_path.display()
        );

        let config_buffer = std::fs::read(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config: ProductQuantizerConfig = serde_yaml::from_slice(&config_buffer)?;
        config.validate()?;

        let codebook_path = Path::new(&self.base_directory).join(CODEBOOK_NAME);
        let file = File::open(&codebook_path)
            .with_context(|| format!("failed to open {}", codebook_path.display()))?;
        let num_values =
            config.num_subspaces * config.num_codewords() * config.subvector_dimension();
        let mut data = vec![0.0f32; num_values];
        BufReader::new(file)
            .read_f32_into::<LittleEndian>(&mut data)
            .context("codebook file is truncated")?;

        let codebooks = Codebooks::new(
            config.num_subspaces,
            config.num_codewords(),
            config.subvector_dimension(),
            data,
        )?;
        ProductQuantizer::new(config, codebooks)
    }
}

pub struct ProductQuantizerWriter {
    base_directory: String,
}

impl ProductQuantizerWriter {
    pub fn new(base_directory: String) -> Self {
        Self { base_directory }
    }

    pub fn write(&self, quantizer: &ProductQuantizer) -> Result<()> {
        std::fs::create_dir_all(&self.base_directory)?;

        // Write codebook
        let codebook_file = File::create(Path::new(&self.base_directory).join(CODEBOOK_NAME))?;
        let mut writer = BufWriter::new(codebook_file);
        for &value in quantizer.codebooks.data() {
            writer.write_f32::<LittleEndian>(value)?;
        }
        writer.flush()?;

        // Write config
        let mut config_file = File::create(Path::new(&self.base_directory).join(CONFIG_NAME))?;
        config_file.write_all(serde_yaml::to_string(&quantizer.config())?.as_bytes())?;
        Ok(())
    }
}

impl ProductQuantizer {
    pub fn new(config: ProductQuantizerConfig, codebooks: Codebooks) -> Result<Self> {
        config.validate()?;
        ensure!(
            codebooks.num_subspaces() == config.num_subspaces
                && codebooks.num_codewords() == config.num_codewords()
                && codebooks.subvector_dimension() == config.subvector_dimension(),
            "codebook shape does not match config {:?}",
            config
        );
        Ok(Self {
            dimension: config.dimension,
            num_subspaces: config.num_subspaces,
            num_bits: config.num_bits,
            codebooks,
        })
    }

    pub fn config(&self) -> ProductQuantizerConfig {
        ProductQuantizerConfig {
            dimension: self.dimension,
            num_subspaces: self.num_subspaces,
            num_bits: self.num_bits,
        }
    }

    pub fn codebooks(&self) -> &Codebooks {
        &self.codebooks
    }

    /// Codewords as `num_subspaces x num_codewords x subvector_dimension` arrays.
    pub fn codewords(&self) -> Vec<Vec<Vec<f32>>> {
        self.codebooks.to_nested()
    }

    /// Encodes a row-major batch of vectors into `num_subspaces` bytes each.
    pub fn encode(&self, vectors: &[f32]) -> Result<Vec<u8>> {
        ensure!(
            vectors.len() % self.dimension == 0,
            "Data length {} is not a multiple of dimension {}",
            vectors.len(),
            self.dimension
        );
        Ok(vectors
            .par_chunks_exact(self.dimension)
            .flat_map_iter(|v| self.codebooks.encode_one(v))
            .collect())
    }
}

impl Quantizer for ProductQuantizer {
    fn quantize(&self, value: &[f32]) -> Vec<u8> {
        self.codebooks.encode_one(value)
    }

    fn quantized_dimension(&self) -> usize {
        self.num_subspaces
    }

    fn original_vector(&self, quantized_vector: &[u8]) -> Vec<f32> {
        self.codebooks.reconstruct(quantized_vector)
    }

    fn distance(&self, a: &[u8], b: &[u8], implem: L2DistanceCalculatorImpl) -> f32 {
        let pairs = a.iter().zip(b.iter()).enumerate().map(|(m, (&x, &y))| {
            (
                self.codebooks.codeword(m, x as usize),
                self.codebooks.codeword(m, y as usize),
            )
        });
        match implem {
            L2DistanceCalculatorImpl::Scalar => pairs
                .map(|(x, y)| L2DistanceCalculator::calculate_scalar(x, y))
                .sum(),
            L2DistanceCalculatorImpl::SIMD => {
                let mut accumulator = L2Accumulator::new();
                pairs.for_each(|(x, y)| accumulator.stream(x, y));
                accumulator.finalize()
            }
        }
    }

    fn distance_table(&self, query: &[f32]) -> Result<DistanceTable> {
        DistanceTable::new(&self.codebooks, query)
    }
}
