use anyhow::Result;
use utils::distance::l2::L2DistanceCalculatorImpl;

use crate::distance_table::DistanceTable;

pub trait Quantizer {
    fn quantize(&self, value: &[f32]) -> Vec<u8>;

    /// Number of bytes per quantized vector.
    fn quantized_dimension(&self) -> usize;

    /// Get the original vector from the quantized vector.
    fn original_vector(&self, quantized_vector: &[u8]) -> Vec<f32>;

    /// Squared distance between the reconstructions of two quantized vectors.
    fn distance(&self, a: &[u8], b: &[u8], implem: L2DistanceCalculatorImpl) -> f32;

    fn distance_table(&self, query: &[f32]) -> Result<DistanceTable>;
}
