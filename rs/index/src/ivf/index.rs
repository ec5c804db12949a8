use anyhow::{anyhow, ensure, Result};
use config::index_config::IvfConfig;
use config::search_params::{PruningParams, SearchParams};
use log::info;
use quantization::generic::GenericQuantizer;
use utils::distance::l2::l2sqr;
use utils::sampling::sample_rows;

use crate::index::{SearchResult, Searchable};
use crate::ivf::builder::build_posting_lists;
use crate::ivf::search::{
    check_query, check_radius, observe_hit_windows, run_search, select_nearest_lists, HitWindow,
};
use crate::posting_list::PostingLists;
use crate::utils::SearchContext;

/// Inverted file over raw vectors. Posting lists keep a copy of each member vector and are
/// scanned with exact distances.
pub struct Ivf {
    config: IvfConfig,

    // Whole-vector quantizer, one codeword per list
    coarse: GenericQuantizer,

    posting_lists: Option<PostingLists<f32>>,
    num_vectors: usize,
}

impl Ivf {
    pub fn new(config: IvfConfig) -> Result<Self> {
        config.validate()?;
        let coarse = GenericQuantizer::new(config.num_features, 1, config.num_lists)?;
        Ok(Self {
            config,
            coarse,
            posting_lists: None,
            num_vectors: 0,
        })
    }

    /// Trains, then populates with the same data.
    pub fn build(config: IvfConfig, data: &[f32]) -> Result<Self> {
        let mut index = Self::new(config)?;
        index.train(data)?;
        index.populate(data)?;
        Ok(index)
    }

    /// Fits the coarse quantizer. Existing posting lists are dropped, so `populate` has to run
    /// again before querying.
    pub fn train(&mut self, data: &[f32]) -> Result<()> {
        let samples = sample_rows(
            data,
            self.config.num_features,
            self.config.max_training_samples,
            self.config.seed,
        )?;
        self.coarse
            .fit(&samples, self.config.num_iterations, self.config.seed)?;
        self.posting_lists = None;
        self.num_vectors = 0;
        Ok(())
    }

    pub fn populate(&mut self, data: &[f32]) -> Result<()> {
        let centroids = self.coarse.centroids()?;
        let dimension = self.config.num_features;
        ensure!(
            data.len() % dimension == 0,
            "Data length {} is not a multiple of dimension {}",
            data.len(),
            dimension
        );

        let coarse = &self.coarse;
        let lists = build_posting_lists(
            self.config.num_lists,
            data,
            dimension,
            |item| coarse.predict_one(&data[item * dimension..(item + 1) * dimension], 0),
            |list, item| {
                l2sqr(
                    &data[item * dimension..(item + 1) * dimension],
                    centroids.codeword(0, list),
                )
            },
        )?;
        self.num_vectors = data.len() / dimension;
        info!(
            "Populated IVF index: {} vectors in {} lists",
            self.num_vectors, self.config.num_lists
        );
        self.posting_lists = Some(lists);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.coarse.is_trained() && self.posting_lists.is_some() && self.num_vectors > 0
    }

    pub fn num_vectors(&self) -> usize {
        self.num_vectors
    }

    pub fn num_lists(&self) -> usize {
        self.config.num_lists
    }

    pub fn dimension(&self) -> usize {
        self.config.num_features
    }

    pub fn posting_lists(&self) -> Option<&PostingLists<f32>> {
        self.posting_lists.as_ref()
    }

    pub fn coarse_quantizer(&self) -> &GenericQuantizer {
        &self.coarse
    }

    fn lists(&self) -> Result<&PostingLists<f32>> {
        self.posting_lists
            .as_ref()
            .ok_or_else(|| anyhow!("index is not populated"))
    }

    fn coarse_distances(&self, query: &[f32]) -> Result<Vec<(usize, f32)>> {
        let centroids = self.coarse.centroids()?;
        Ok((0..self.config.num_lists)
            .map(|list| (list, l2sqr(query, centroids.codeword(0, list))))
            .collect())
    }

    /// Where the given true neighbors of `query` sit inside each of the `num_probes` closest
    /// lists.
    pub fn observe_hit_windows(
        &self,
        query: &[f32],
        ground_truth: &[usize],
        num_probes: usize,
        pruning: &PruningParams,
    ) -> Result<Vec<HitWindow>> {
        check_query(
            self.is_ready(),
            self.dimension(),
            self.num_vectors,
            query,
            &SearchParams::new(1, num_probes),
        )?;
        let probes = select_nearest_lists(self.coarse_distances(query)?, num_probes);
        observe_hit_windows(self.lists()?, &probes, ground_truth, pruning)
    }
}

impl Searchable for Ivf {
    fn search(
        &self,
        query: &[f32],
        params: &SearchParams,
        context: &mut SearchContext,
    ) -> Result<SearchResult> {
        check_query(
            self.is_ready(),
            self.dimension(),
            self.num_vectors,
            query,
            params,
        )?;
        run_search(
            self.lists()?,
            self.coarse_distances(query)?,
            params,
            None,
            |member| l2sqr(query, member),
            context,
        )
    }

    fn search_with_radius(
        &self,
        query: &[f32],
        pred_radius: &[u32],
        pruning: &PruningParams,
        params: &SearchParams,
        context: &mut SearchContext,
    ) -> Result<SearchResult> {
        check_query(
            self.is_ready(),
            self.dimension(),
            self.num_vectors,
            query,
            params,
        )?;
        check_radius(pred_radius, self.num_lists(), pruning)?;
        run_search(
            self.lists()?,
            self.coarse_distances(query)?,
            params,
            Some((pred_radius, pruning)),
            |member| l2sqr(query, member),
            context,
        )
    }
}
