use anyhow::{ensure, Result};
use utils::distance::l2::L2DistanceCalculator;
use utils::DistanceCalculator;

use crate::codebook::Codebooks;

/// Squared distances from one query to every codeword, laid out `[subspace][codeword]`.
/// Built once per query and only read while scanning.
#[derive(Debug, Clone)]
pub struct DistanceTable {
    num_subspaces: usize,
    num_codewords: usize,
    table: Vec<f32>,
}

impl DistanceTable {
    pub fn new(codebooks: &Codebooks, query: &[f32]) -> Result<Self> {
        ensure!(
            query.len() == codebooks.dimension(),
            "query has dimension {}, expected {}",
            query.len(),
            codebooks.dimension()
        );
        let ds = codebooks.subvector_dimension();
        let mut table = Vec::with_capacity(codebooks.num_subspaces() * codebooks.num_codewords());
        for (m, subquery) in query.chunks_exact(ds).enumerate() {
            for codeword in codebooks.subspace(m).chunks_exact(ds) {
                table.push(L2DistanceCalculator::calculate(subquery, codeword));
            }
        }
        Ok(Self {
            num_subspaces: codebooks.num_subspaces(),
            num_codewords: codebooks.num_codewords(),
            table,
        })
    }

    pub fn num_subspaces(&self) -> usize {
        self.num_subspaces
    }

    #[inline]
    pub fn get(&self, m: usize, k: usize) -> f32 {
        self.table[m * self.num_codewords + k]
    }

    /// Asymmetric distance: sum over subspaces of the looked-up query-to-codeword distances.
    #[inline]
    pub fn adist(&self, code: &[u8]) -> f32 {
        debug_assert_eq!(code.len(), self.num_subspaces);
        code.iter()
            .enumerate()
            .map(|(m, &k)| self.table[m * self.num_codewords + k as usize])
            .sum()
    }
}
