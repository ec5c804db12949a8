pub mod distance;
pub mod kmeans;
pub mod sampling;
pub mod test_utils;

/// Distance between two float vectors of equal length.
pub trait DistanceCalculator {
    fn calculate(a: &[f32], b: &[f32]) -> f32;
}

/// Distance accumulated over several slice pairs, e.g. the subvectors of two PQ codes.
/// The accumulator is owned by the caller, so one instance must not be shared across threads
/// while streaming.
pub trait StreamingDistanceCalculator {
    fn stream(&mut self, a: &[f32], b: &[f32]);

    /// Returns the accumulated distance and resets the accumulator.
    fn finalize(&mut self) -> f32;
}
