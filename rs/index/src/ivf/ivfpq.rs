use anyhow::{anyhow, Result};
use config::index_config::IvfPqConfig;
use config::search_params::{PruningParams, SearchParams};
use log::info;
use quantization::distance_table::DistanceTable;
use quantization::generic::GenericQuantizer;
use rayon::prelude::*;
use utils::distance::l2::l2sqr;
use utils::sampling::sample_rows;

use crate::index::{SearchResult, Searchable};
use crate::ivf::builder::build_posting_lists;
use crate::ivf::search::{
    check_query, check_radius, observe_hit_windows, run_search, select_nearest_lists, HitWindow,
};
use crate::posting_list::PostingLists;
use crate::utils::SearchContext;

/// Inverted file whose posting lists hold PQ codes of the original vectors. Lists are probed
/// with exact coarse distances and scanned with asymmetric (table lookup) distances.
pub struct IvfPq {
    config: IvfPqConfig,
    coarse: GenericQuantizer,
    pq: GenericQuantizer,
    posting_lists: Option<PostingLists<u8>>,
    num_vectors: usize,
}

impl IvfPq {
    pub fn new(config: IvfPqConfig) -> Result<Self> {
        config.validate()?;
        let coarse = GenericQuantizer::new(config.num_features, 1, config.num_lists)?;
        let pq = GenericQuantizer::new(
            config.num_features,
            config.num_subspaces,
            config.num_codewords(),
        )?;
        Ok(Self {
            config,
            coarse,
            pq,
            posting_lists: None,
            num_vectors: 0,
        })
    }

    pub fn build(config: IvfPqConfig, data: &[f32]) -> Result<Self> {
        let mut index = Self::new(config)?;
        index.train(data)?;
        index.populate(data)?;
        Ok(index)
    }

    /// Fits the coarse quantizer and the product quantizer on the same sample.
    pub fn train(&mut self, data: &[f32]) -> Result<()> {
        let samples = sample_rows(
            data,
            self.config.num_features,
            self.config.max_training_samples,
            self.config.seed,
        )?;
        self.coarse
            .fit(&samples, self.config.coarse_iterations, self.config.seed)?;
        self.pq
            .fit(&samples, self.config.pq_iterations, self.config.seed)?;
        self.posting_lists = None;
        self.num_vectors = 0;
        Ok(())
    }

    pub fn populate(&mut self, data: &[f32]) -> Result<()> {
        let centroids = self.coarse.centroids()?;
        let dimension = self.config.num_features;
        let codes = self.pq.encode(data)?;

        // Members are ordered by the asymmetric distance of their code to the centroid.
        let center_tables = (0..self.config.num_lists)
            .into_par_iter()
            .map(|list| self.pq.distance_table(centroids.codeword(0, list)))
            .collect::<Result<Vec<DistanceTable>>>()?;

        let m = self.config.num_subspaces;
        let coarse = &self.coarse;
        let lists = build_posting_lists(
            self.config.num_lists,
            &codes,
            m,
            |item| coarse.predict_one(&data[item * dimension..(item + 1) * dimension], 0),
            |list, item| center_tables[list].adist(&codes[item * m..(item + 1) * m]),
        )?;
        self.num_vectors = data.len() / dimension;
        info!(
            "Populated IVFPQ index: {} vectors in {} lists, {} bytes per code",
            self.num_vectors, self.config.num_lists, m
        );
        self.posting_lists = Some(lists);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.coarse.is_trained()
            && self.pq.is_trained()
            && self.posting_lists.is_some()
            && self.num_vectors > 0
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

    pub fn posting_lists(&self) -> Option<&PostingLists<u8>> {
        self.posting_lists.as_ref()
    }

    pub fn coarse_quantizer(&self) -> &GenericQuantizer {
        &self.coarse
    }

    pub fn product_quantizer(&self) -> &GenericQuantizer {
        &self.pq
    }

    fn lists(&self) -> Result<&PostingLists<u8>> {
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

    fn query(
        &self,
        query: &[f32],
        radius: Option<(&[u32], &PruningParams)>,
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
        if let Some((pred_radius, pruning)) = radius {
            check_radius(pred_radius, self.num_lists(), pruning)?;
        }
        let table = self.pq.distance_table(query)?;
        run_search(
            self.lists()?,
            self.coarse_distances(query)?,
            params,
            radius,
            |code| table.adist(code),
            context,
        )
    }
}

impl Searchable for IvfPq {
    fn search(
        &self,
        query: &[f32],
        params: &SearchParams,
        context: &mut SearchContext,
    ) -> Result<SearchResult> {
        self.query(query, None, params, context)
    }

    fn search_with_radius(
        &self,
        query: &[f32],
        pred_radius: &[u32],
        pruning: &PruningParams,
        params: &SearchParams,
        context: &mut SearchContext,
    ) -> Result<SearchResult> {
        self.query(query, Some((pred_radius, pruning)), params, context)
    }
}
