use anyhow::{anyhow, ensure, Result};
use config::index_config::RiiConfig;
use config::search_params::{PruningParams, SearchParams};
use log::{info, warn};
use quantization::codebook::Codebooks;
use quantization::distance_table::DistanceTable;
use quantization::pq::ProductQuantizerConfig;
use quantization::pq_builder::{ProductQuantizerBuilder, ProductQuantizerBuilderConfig};
use quantization::pqkmeans::PQKMeans;
use rayon::prelude::*;
use utils::sampling::shuffled_ids;

use crate::index::{SearchResult, Searchable};
use crate::ivf::builder::build_posting_lists;
use crate::ivf::search::{
    check_query, check_radius, observe_hit_windows, run_search, select_nearest_lists, HitWindow,
};
use crate::posting_list::PostingLists;
use crate::utils::SearchContext;

/// Inverted file built entirely in PQ code space: the coarse centers are themselves PQ codes
/// found by PQ k-means, so codes can be added and lists rebuilt without the raw vectors.
pub struct Rii {
    config: RiiConfig,
    codebooks: Codebooks,

    // Flattened `num_vectors x num_subspaces`
    codes: Vec<u8>,

    // Holds the coarse centers once `reconfigure` ran
    coarse: Option<PQKMeans>,
    posting_lists: Option<PostingLists<u8>>,
}

impl Rii {
    pub fn new(config: RiiConfig, codebooks: Codebooks) -> Result<Self> {
        config.validate()?;
        ensure!(
            codebooks.num_subspaces() == config.num_subspaces
                && codebooks.num_codewords() == config.num_codewords()
                && codebooks.dimension() == config.num_features,
            "codewords ({} x {} x {}) do not match config {:?}",
            codebooks.num_subspaces(),
            codebooks.num_codewords(),
            codebooks.subvector_dimension(),
            config
        );
        Ok(Self {
            config,
            codebooks,
            codes: Vec::new(),
            coarse: None,
            posting_lists: None,
        })
    }

    /// Builds from codewords given as `num_subspaces x num_codewords x subvector_dimension`.
    pub fn from_codewords(config: RiiConfig, codewords: &[Vec<Vec<f32>>]) -> Result<Self> {
        Self::new(config, Codebooks::from_nested(codewords)?)
    }

    pub fn train_codebooks(config: &RiiConfig, data: &[f32]) -> Result<Codebooks> {
        config.validate()?;
        let mut builder = ProductQuantizerBuilder::new(
            ProductQuantizerConfig {
                dimension: config.num_features,
                num_subspaces: config.num_subspaces,
                num_bits: config.num_bits,
            },
            ProductQuantizerBuilderConfig {
                max_iteration: config.pq_iterations,
                max_training_samples: config.max_training_samples,
                seed: config.seed,
            },
        );
        for vector in data.chunks(config.num_features) {
            builder.add(vector)?;
        }
        Ok(builder.build()?.codebooks().clone())
    }

    /// Trains codewords on `data`, adds all of it and builds the posting lists.
    pub fn build(config: RiiConfig, data: &[f32]) -> Result<Self> {
        let codebooks = Self::train_codebooks(&config, data)?;
        let mut index = Self::new(config, codebooks)?;
        index.add(data, false)?;
        let num_lists = index.default_num_lists();
        index.reconfigure(num_lists, index.config.reconfigure_iterations)?;
        Ok(index)
    }

    /// The configured number of lists, or the square root of the number of codes.
    pub fn default_num_lists(&self) -> usize {
        self.config
            .num_lists
            .unwrap_or_else(|| ((self.num_vectors() as f64).sqrt().round() as usize).max(1))
    }

    pub fn encode(&self, vector: &[f32]) -> Result<Vec<u8>> {
        ensure!(
            vector.len() == self.config.num_features,
            "vector has dimension {}, expected {}",
            vector.len(),
            self.config.num_features
        );
        Ok(self.codebooks.encode_one(vector))
    }

    /// Encodes and appends vectors. See `add_codes`.
    pub fn add(&mut self, vectors: &[f32], update_posting_lists: bool) -> Result<()> {
        let dimension = self.config.num_features;
        ensure!(
            vectors.len() % dimension == 0,
            "Data length {} is not a multiple of dimension {}",
            vectors.len(),
            dimension
        );
        let codes = vectors
            .par_chunks_exact(dimension)
            .flat_map_iter(|v| self.codebooks.encode_one(v))
            .collect::<Vec<u8>>();
        self.add_codes(&codes, update_posting_lists)
    }

    /// Appends codes; their ids continue after the existing ones. With `update_posting_lists`
    /// every list is rebuilt against the current coarse centers, which requires a prior
    /// `reconfigure`. Without it the new codes are stored but not searchable until the next
    /// rebuild.
    pub fn add_codes(&mut self, codes: &[u8], update_posting_lists: bool) -> Result<()> {
        ensure!(
            !update_posting_lists || self.coarse.is_some(),
            "reconfigure must run before adding codes with update_posting_lists"
        );
        let m = self.config.num_subspaces;
        ensure!(
            codes.len() % m == 0,
            "Code buffer length {} is not a multiple of {} subspaces",
            codes.len(),
            m
        );
        ensure!(
            codes
                .iter()
                .all(|&c| (c as usize) < self.codebooks.num_codewords()),
            "code refers to a codeword out of range"
        );

        self.codes.extend_from_slice(codes);
        info!(
            "Added {} codes, {} in total",
            codes.len() / m,
            self.num_vectors()
        );
        if update_posting_lists {
            self.update_posting_lists()?;
        } else if self.posting_lists.is_some() {
            warn!("Posting lists are stale until the next update or reconfigure");
        }
        Ok(())
    }

    /// Trains `num_lists` coarse centers with PQ k-means on a sample of the stored codes and
    /// rebuilds every posting list.
    pub fn reconfigure(&mut self, num_lists: usize, num_iterations: usize) -> Result<()> {
        let num_vectors = self.num_vectors();
        ensure!(num_lists >= 1, "number of lists must be at least 1");
        ensure!(
            num_lists <= num_vectors,
            "cannot build {} lists from {} codes",
            num_lists,
            num_vectors
        );

        let num_samples = num_vectors.min(num_lists.saturating_mul(self.config.samples_per_list));
        info!(
            "Reconfiguring with {} lists, training on {} of {} codes",
            num_lists, num_samples, num_vectors
        );
        let m = self.config.num_subspaces;
        let mut samples = Vec::with_capacity(num_samples * m);
        for id in shuffled_ids(num_vectors, self.config.seed)
            .into_iter()
            .take(num_samples)
        {
            samples.extend_from_slice(&self.codes[id * m..(id + 1) * m]);
        }

        let mut kmeans =
            PQKMeans::new(&self.codebooks, num_lists, num_iterations)?.with_seed(self.config.seed);
        kmeans.fit(&samples)?;
        self.coarse = Some(kmeans);
        self.update_posting_lists()
    }

    fn update_posting_lists(&mut self) -> Result<()> {
        let coarse = self
            .coarse
            .as_ref()
            .ok_or_else(|| anyhow!("index has no coarse centers"))?;
        let m = self.config.num_subspaces;
        let codes = &self.codes;
        let lists = build_posting_lists(
            coarse.num_clusters(),
            codes,
            m,
            |item| coarse.predict_one(&codes[item * m..(item + 1) * m]),
            |list, item| {
                coarse.symmetric_distance(coarse.centroid(list), &codes[item * m..(item + 1) * m])
            },
        )?;
        self.posting_lists = Some(lists);
        Ok(())
    }

    /// Drops codes, coarse centers and posting lists. Codewords are kept.
    pub fn clear(&mut self) {
        self.codes.clear();
        self.coarse = None;
        self.posting_lists = None;
    }

    pub fn is_ready(&self) -> bool {
        self.coarse.is_some() && self.posting_lists.is_some() && self.num_vectors() > 0
    }

    pub fn num_vectors(&self) -> usize {
        self.codes.len() / self.config.num_subspaces
    }

    pub fn num_lists(&self) -> usize {
        self.coarse.as_ref().map(|c| c.num_clusters()).unwrap_or(0)
    }

    pub fn dimension(&self) -> usize {
        self.config.num_features
    }

    pub fn codebooks(&self) -> &Codebooks {
        &self.codebooks
    }

    pub fn codes(&self) -> &[u8] {
        &self.codes
    }

    /// Coarse centers as `num_lists x num_subspaces` codes.
    pub fn coarse_centers(&self) -> Option<&[u8]> {
        self.coarse.as_ref().map(|c| c.centroids())
    }

    pub fn posting_lists(&self) -> Option<&PostingLists<u8>> {
        self.posting_lists.as_ref()
    }

    fn lists(&self) -> Result<&PostingLists<u8>> {
        self.posting_lists
            .as_ref()
            .ok_or_else(|| anyhow!("index has no posting lists"))
    }

    fn coarse_distances(&self, table: &DistanceTable) -> Result<Vec<(usize, f32)>> {
        let coarse = self
            .coarse
            .as_ref()
            .ok_or_else(|| anyhow!("index has no coarse centers"))?;
        Ok((0..coarse.num_clusters())
            .map(|list| (list, table.adist(coarse.centroid(list))))
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
            self.num_vectors(),
            query,
            &SearchParams::new(1, num_probes),
        )?;
        let table = DistanceTable::new(&self.codebooks, query)?;
        let probes = select_nearest_lists(self.coarse_distances(&table)?, num_probes);
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
            self.num_vectors(),
            query,
            params,
        )?;
        if let Some((pred_radius, pruning)) = radius {
            check_radius(pred_radius, self.num_lists(), pruning)?;
        }
        let table = DistanceTable::new(&self.codebooks, query)?;
        run_search(
            self.lists()?,
            self.coarse_distances(&table)?,
            params,
            radius,
            |code| table.adist(code),
            context,
        )
    }
}

impl Searchable for Rii {
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
