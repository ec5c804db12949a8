use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchParams {
    /// Number of results to return.
    pub top_k: usize,

    /// Number of posting lists to visit (W / nprobe).
    pub num_probes: usize,

    /// Size of the candidate pool (L) kept before truncating to `top_k`.
    /// Default: same as `top_k`
    pub max_candidates: Option<usize>,
}

impl SearchParams {
    pub fn new(top_k: usize, num_probes: usize) -> Self {
        Self {
            top_k,
            num_probes,
            max_candidates: None,
        }
    }

    pub fn max_candidates(&self) -> usize {
        self.max_candidates.unwrap_or(self.top_k)
    }

    pub fn with_max_candidates(mut self, max_candidates: Option<usize>) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.top_k >= 1, "top_k must be at least 1");
        ensure!(self.num_probes >= 1, "num_probes must be at least 1");
        ensure!(
            self.max_candidates() >= self.top_k,
            "max_candidates ({}) must not be smaller than top_k ({})",
            self.max_candidates(),
            self.top_k
        );
        Ok(())
    }
}

/// Knobs of the predicted-radius window. A list is scanned over the fraction
/// `[cq - r - offset, cq + r - offset]` of its members, where `cq` is the query's coarse
/// distance relative to the list's farthest member and `r = radius / num_segments`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PruningParams {
    /// Any non-zero predicted radius below `cut` is raised to `cut`.
    /// Default: 1 (no effect)
    pub cut: u32,

    /// Number of segments a posting list is divided into by the radius predictor.
    /// Default: 20
    pub num_segments: u32,

    /// Shift of the window towards the head of the list, in segments.
    /// Default: 3.5
    pub window_offset: f32,
}

impl Default for PruningParams {
    fn default() -> Self {
        Self {
            cut: 1,
            num_segments: 20,
            window_offset: 3.5,
        }
    }
}

impl PruningParams {
    pub fn with_cut(mut self, cut: u32) -> Self {
        self.cut = cut;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.num_segments >= 1, "num_segments must be at least 1");
        ensure!(
            self.window_offset.is_finite() && self.window_offset >= 0.0,
            "window_offset must be a non-negative number"
        );
        Ok(())
    }
}
