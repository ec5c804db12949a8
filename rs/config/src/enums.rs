use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub enum IndexType {
    /// Coarse quantizer over raw vectors, posting lists store the raw vectors.
    #[default]
    Ivf,
    /// Coarse quantizer over raw vectors, posting lists store PQ codes.
    IvfPq,
    /// Coarse quantizer trained on PQ codes, posting lists store PQ codes.
    Rii,
}
