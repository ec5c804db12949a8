use strum::EnumIter;

use crate::{DistanceCalculator, StreamingDistanceCalculator};

/// Number of independent partial sums kept by the lane-chunked implementation.
const LANES: usize = 8;

/// Below this many dimensions the lane setup costs more than it saves.
const SIMD_THRESHOLD: usize = 32;

#[derive(Debug, EnumIter, PartialEq, Clone, Copy)]
pub enum L2DistanceCalculatorImpl {
    Scalar,
    SIMD,
}

/// Squared euclidean distance. Only the squared value is ever needed by the index: ranking
/// is identical and the quantizers sum squared distances across subspaces.
pub struct L2DistanceCalculator {}

impl L2DistanceCalculator {
    pub fn calculate_scalar(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(&x, &y)| (x - y) * (x - y))
            .sum::<f32>()
    }

    /// Lane-chunked version. The compiler vectorizes the fixed-width inner loop; the lanes are
    /// reduced in index order so the result only differs from the scalar one by float
    /// reassociation.
    pub fn calculate_simd(a: &[f32], b: &[f32]) -> f32 {
        let mut lanes = [0.0f32; LANES];
        accumulate_lanes(a, b, &mut lanes);
        let tail_start = a.len() - a.len() % LANES;
        let tail = Self::calculate_scalar(&a[tail_start..], &b[tail_start..]);
        lanes.iter().sum::<f32>() + tail
    }

    pub fn calculate_with(implem: L2DistanceCalculatorImpl, a: &[f32], b: &[f32]) -> f32 {
        match implem {
            L2DistanceCalculatorImpl::Scalar => Self::calculate_scalar(a, b),
            L2DistanceCalculatorImpl::SIMD => Self::calculate_simd(a, b),
        }
    }
}

impl DistanceCalculator for L2DistanceCalculator {
    fn calculate(a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        if a.len() < SIMD_THRESHOLD {
            Self::calculate_scalar(a, b)
        } else {
            Self::calculate_simd(a, b)
        }
    }
}

#[inline(always)]
fn accumulate_lanes(a: &[f32], b: &[f32], lanes: &mut [f32; LANES]) {
    for (a_chunk, b_chunk) in a.chunks_exact(LANES).zip(b.chunks_exact(LANES)) {
        for i in 0..LANES {
            let diff = a_chunk[i] - b_chunk[i];
            lanes[i] += diff * diff;
        }
    }
}

/// Squared L2 distance between two float vectors.
#[inline]
pub fn l2sqr(a: &[f32], b: &[f32]) -> f32 {
    L2DistanceCalculator::calculate(a, b)
}

/// Squared L2 distance between two byte vectors. Both operands are widened to i16 before the
/// subtraction so 0 - 255 does not wrap, and the sum is kept in i32 until the very end.
pub fn l2sqr_u8(a: &[u8], b: &[u8]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let sum: i32 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let diff = x as i16 - y as i16;
            diff as i32 * diff as i32
        })
        .sum();
    sum as f32
}

/// Squared L2 distance between a byte vector and a float vector.
pub fn l2sqr_u8_f32(a: &[u8], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let diff = x as f32 - y;
            diff * diff
        })
        .sum::<f32>()
}

/// Caller-owned accumulator for many small distance evaluations that are summed together.
/// Equivalent to adding up `l2sqr` over every streamed pair.
pub struct L2Accumulator {
    lanes: [f32; LANES],
    tail: f32,
}

impl L2Accumulator {
    pub fn new() -> Self {
        Self {
            lanes: [0.0; LANES],
            tail: 0.0,
        }
    }

    fn reset(&mut self) {
        self.lanes = [0.0; LANES];
        self.tail = 0.0;
    }
}

impl Default for L2Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingDistanceCalculator for L2Accumulator {
    fn stream(&mut self, a: &[f32], b: &[f32]) {
        debug_assert_eq!(a.len(), b.len());
        accumulate_lanes(a, b, &mut self.lanes);
        let tail_start = a.len() - a.len() % LANES;
        self.tail += L2DistanceCalculator::calculate_scalar(&a[tail_start..], &b[tail_start..]);
    }

    fn finalize(&mut self) -> f32 {
        let res = self.lanes.iter().sum::<f32>() + self.tail;
        self.reset();
        res
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::test_utils::generate_random_vector;

    #[test]
    fn test_l2_impls() {
        for dimension in [1, 7, 8, 31, 32, 128, 1000] {
            let a = generate_random_vector(dimension);
            let b = generate_random_vector(dimension);

            let reference = L2DistanceCalculator::calculate_scalar(&a, &b);
            for implem in L2DistanceCalculatorImpl::iter() {
                let distance = L2DistanceCalculator::calculate_with(implem.clone(), &a, &b);
                assert_relative_eq!(distance, reference, max_relative = 1e-5);
            }
            assert_relative_eq!(l2sqr(&a, &b), reference, max_relative = 1e-5);
        }
    }

    #[test]
    fn test_l2_symmetric_and_non_negative() {
        let a = generate_random_vector(64);
        let b = generate_random_vector(64);
        assert_eq!(l2sqr(&a, &b), l2sqr(&b, &a));
        assert!(l2sqr(&a, &b) >= 0.0);
        assert_eq!(l2sqr(&a, &a), 0.0);
        assert_eq!(L2DistanceCalculator::calculate_scalar(&a, &a), 0.0);
    }

    #[test]
    fn test_l2_known_value() {
        let a = [0.0, 0.0, 0.0];
        let b = [1.0, 2.0, 2.0];
        assert_eq!(l2sqr(&a, &b), 9.0);
    }

    #[test]
    fn test_l2_u8_does_not_wrap() {
        let a = [0u8; 16];
        let b = [255u8; 16];
        assert_eq!(l2sqr_u8(&a, &b), 16.0 * 255.0 * 255.0);
        assert_eq!(l2sqr_u8(&b, &a), l2sqr_u8(&a, &b));
        assert_eq!(l2sqr_u8(&b, &b), 0.0);
    }

    #[test]
    fn test_l2_u8_f32() {
        let a = [1u8, 2, 3];
        let b = [1.5f32, 2.0, 0.0];
        assert_relative_eq!(l2sqr_u8_f32(&a, &b), 0.25 + 9.0);
    }

    #[test]
    fn test_accumulator_matches_sum_of_distances() {
        let pairs: Vec<(Vec<f32>, Vec<f32>)> = (0..10)
            .map(|i| (generate_random_vector(4 + i), generate_random_vector(4 + i)))
            .collect();

        let mut accumulator = L2Accumulator::new();
        for (a, b) in pairs.iter() {
            accumulator.stream(a, b);
        }
        let streamed = accumulator.finalize();
        let expected: f32 = pairs.iter().map(|(a, b)| l2sqr(a, b)).sum();
        assert_relative_eq!(streamed, expected, max_relative = 1e-5);

        // finalize resets the accumulator
        assert_eq!(accumulator.finalize(), 0.0);
    }
}
