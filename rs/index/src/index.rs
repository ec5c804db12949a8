use anyhow::Result;
use config::index_config::IndexConfig;
use config::search_params::{PruningParams, SearchParams};
use log::info;

use crate::ivf::index::Ivf;
use crate::ivf::ivfpq::IvfPq;
use crate::ivf::rii::Rii;
use crate::utils::{IdWithScore, SearchContext};

/// Query answer, ascending by distance. `ids` and `dists` have the same length, which is
/// `top_k` unless the probed lists held fewer candidates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub ids: Vec<usize>,
    pub dists: Vec<f32>,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl From<Vec<IdWithScore>> for SearchResult {
    fn from(results: Vec<IdWithScore>) -> Self {
        let (ids, dists) = results.into_iter().map(|r| (r.id, r.score)).unzip();
        Self { ids, dists }
    }
}

/// Main trait for index
pub trait Searchable {
    /// Scans every member of the `num_probes` lists closest to the query.
    fn search(
        &self,
        query: &[f32],
        params: &SearchParams,
        context: &mut SearchContext,
    ) -> Result<SearchResult>;

    /// Like `search`, but only scans a window of each list sized by the caller's predicted
    /// radius (one entry per list). A radius of zero skips the list.
    fn search_with_radius(
        &self,
        query: &[f32],
        pred_radius: &[u32],
        pruning: &PruningParams,
        params: &SearchParams,
        context: &mut SearchContext,
    ) -> Result<SearchResult>;
}

pub type BoxedSearchable = Box<dyn Searchable + Send + Sync>;

/// Trains the index variant described by `config` on `data` and populates it with the same
/// vectors.
pub fn build_index(config: &IndexConfig, data: &[f32]) -> Result<BoxedSearchable> {
    config.validate()?;
    info!(
        "Building {:?} index over {} vectors",
        config.index_type(),
        data.len() / config.num_features()
    );
    Ok(match config {
        IndexConfig::Ivf(c) => Box::new(Ivf::build(c.clone(), data)?),
        IndexConfig::IvfPq(c) => Box::new(IvfPq::build(c.clone(), data)?),
        IndexConfig::Rii(c) => Box::new(Rii::build(c.clone(), data)?),
    })
}

#[cfg(test)]
mod tests {
    use config::index_config::{IvfConfig, IvfPqConfig, RiiConfig};
    use rayon::prelude::*;
    use utils::test_utils::generate_clustered_dataset;

    use super::*;

    const DIMENSION: usize = 8;

    fn assert_send_sync<T: Send + Sync>() {}

    fn configs() -> Vec<IndexConfig> {
        vec![
            IndexConfig::Ivf(IvfConfig {
                num_features: DIMENSION,
                num_lists: 4,
                ..Default::default()
            }),
            IndexConfig::IvfPq(IvfPqConfig {
                num_features: DIMENSION,
                num_lists: 4,
                num_subspaces: 2,
                num_bits: 4,
                ..Default::default()
            }),
            IndexConfig::Rii(RiiConfig {
                num_features: DIMENSION,
                num_subspaces: 2,
                num_bits: 4,
                num_lists: Some(4),
                ..Default::default()
            }),
        ]
    }

    #[test]
    fn test_indexes_are_send_and_sync() {
        assert_send_sync::<Ivf>();
        assert_send_sync::<IvfPq>();
        assert_send_sync::<Rii>();
        assert_send_sync::<BoxedSearchable>();
    }

    #[test]
    fn test_build_index_from_config() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (data, _) = generate_clustered_dataset(4, 50, DIMENSION, 1.0, 3);
        let params = SearchParams::new(5, 4);
        for config in configs() {
            let index = build_index(&config, &data).unwrap();
            let mut context = SearchContext::new();
            let result = index.search(&data[..DIMENSION], &params, &mut context).unwrap();
            assert_eq!(result.len(), 5);
            assert!(result.dists.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(context.num_scanned, 200);
            if let IndexConfig::Ivf(_) = config {
                assert_eq!(result.ids[0], 0);
                assert_eq!(result.dists[0], 0.0);
            }
        }
    }

    #[test]
    fn test_build_index_rejects_invalid_config() {
        let config = IndexConfig::Rii(RiiConfig {
            num_features: 0,
            ..Default::default()
        });
        assert!(build_index(&config, &[]).is_err());
    }

    #[test]
    fn test_concurrent_searches_match_sequential() {
        let (data, _) = generate_clustered_dataset(4, 50, DIMENSION, 1.0, 3);
        let params = SearchParams::new(10, 2);
        for config in configs() {
            let index = build_index(&config, &data).unwrap();
            let sequential: Vec<SearchResult> = data
                .chunks_exact(DIMENSION)
                .map(|query| {
                    index
                        .search(query, &params, &mut SearchContext::new())
                        .unwrap()
                })
                .collect();
            let parallel: Vec<SearchResult> = data
                .par_chunks_exact(DIMENSION)
                .map(|query| {
                    index
                        .search(query, &params, &mut SearchContext::new())
                        .unwrap()
                })
                .collect();
            assert_eq!(parallel, sequential);
        }
    }

    #[test]
    fn test_search_result_from_candidates() {
        let result = SearchResult::from(vec![
            IdWithScore { score: 0.5, id: 3 },
            IdWithScore { score: 2.0, id: 1 },
        ]);
        assert_eq!(result.ids, vec![3, 1]);
        assert_eq!(result.dists, vec![0.5, 2.0]);
        assert_eq!(result.len(), 2);
        assert!(SearchResult::default().is_empty());
    }
}
