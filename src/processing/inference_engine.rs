use ndarray::Array2;
use rayon::prelude::*;

use crate::ancestors::ancestor_builder::AncestorBuilder;
use crate::ancestors::ancestor_store::{AncestorRecord, AncestorStore};
use crate::ancestors::ancestor_store_builder::AncestorStoreBuilder;
use crate::matching::ancestor_matcher::AncestorMatcher;
use crate::matching::traceback::Traceback;
use crate::tree_sequence::tables::TreeSequenceTables;
use crate::tree_sequence::tree_sequence_builder::TreeSequenceBuilder;
use crate::utils::errors::BrolgaError;
use crate::utils::interval_utils::IntervalUtils;

/**
 * Tunables for one inference run. Rates parameterize the copying model;
 * block sizes set the growth granularity of the pooled and pre-reserved
 * buffers.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    pub recombination_rate: f64,
    pub error_rate: f64,
    pub segment_block_size: usize,
    pub node_mapping_block_size: usize,
    pub edgeset_block_size: usize,
    pub mutation_list_node_block_size: usize,
}

impl Default for InferenceConfig {
    fn default() -> InferenceConfig {
        InferenceConfig {
            recombination_rate: 1e-2,
            error_rate: 1e-3,
            segment_block_size: 1024,
            node_mapping_block_size: 1024,
            edgeset_block_size: 1024,
            mutation_list_node_block_size: 1024,
        }
    }
}

impl InferenceConfig {
    pub fn validate(&self) -> Result<(), BrolgaError> {
        if !(0.0..=1.0).contains(&self.recombination_rate) {
            return Err(BrolgaError::InvalidConfiguration(format!(
                "recombination rate {} outside [0, 1]",
                self.recombination_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.error_rate) {
            return Err(BrolgaError::InvalidConfiguration(format!(
                "error rate {} outside [0, 1]",
                self.error_rate
            )));
        }
        if self.segment_block_size == 0
            || self.node_mapping_block_size == 0
            || self.edgeset_block_size == 0
            || self.mutation_list_node_block_size == 0
        {
            return Err(BrolgaError::InvalidConfiguration(
                "block sizes must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

/// One query's match output, carried from the parallel matching fan-out to
/// the serial tree-builder updates at the epoch barrier.
#[derive(Debug)]
struct MatchedPath {
    child: usize,
    haplotype: Vec<i8>,
    start_site: usize,
    end_site: usize,
    end_parent: usize,
    traceback: Traceback,
}

/**
 * The top-level inference pipeline.
 *
 * Phases: validate the panel, synthesize ancestors oldest first, freeze the
 * run-length store, then walk epochs from oldest to youngest matching every
 * epoch member against the strictly older ancestors. Queries within an
 * epoch are independent and fan out across the rayon pool, each worker
 * carrying its own matcher and traceback; their paths are fed serially to
 * the tree sequence builder and resolved at the epoch barrier before any
 * younger query begins. Samples are matched last, against the full
 * ancestor set.
 */
#[derive(Debug)]
pub struct InferenceEngine {
    positions: Vec<f64>,
    haplotypes: Array2<u8>,
    config: InferenceConfig,
}

impl InferenceEngine {
    pub fn new(
        positions: Vec<f64>,
        haplotypes: Array2<u8>,
        config: InferenceConfig,
    ) -> Result<InferenceEngine, BrolgaError> {
        config.validate()?;
        Ok(InferenceEngine {
            positions,
            haplotypes,
            config,
        })
    }

    pub fn run(&self) -> Result<TreeSequenceTables, BrolgaError> {
        let builder = AncestorBuilder::new(&self.positions, &self.haplotypes)?;
        let num_sites = builder.num_sites();
        let num_samples = builder.num_samples();
        info!(
            "Inferring tree sequence for {} samples over {} sites",
            num_samples, num_sites
        );

        let descriptors = builder.ancestor_descriptors();
        let mut store_builder = AncestorStoreBuilder::new(num_sites);
        let mut records = Vec::with_capacity(descriptors.len() + 1);

        let mut scratch = vec![0i8; num_sites];
        store_builder.add(&scratch)?;
        records.push(AncestorRecord {
            age: builder.oldest_age(),
            start_site: 0,
            end_site: num_sites,
            focal_sites: Vec::new(),
        });
        for descriptor in &descriptors {
            let (start_site, end_site) =
                builder.make_ancestor(&descriptor.focal_sites, &mut scratch)?;
            store_builder.add(&scratch)?;
            records.push(AncestorRecord {
                age: descriptor.age,
                start_site,
                end_site,
                focal_sites: descriptor.focal_sites.clone(),
            });
        }
        debug!(
            "Ancestor store: {} ancestors, {} segments",
            store_builder.num_ancestors(),
            store_builder.total_segments()
        );
        let store = AncestorStore::new(num_sites, store_builder.dump(), records)?;

        let mut tree = TreeSequenceBuilder::new(
            &store,
            num_samples,
            self.config.edgeset_block_size,
            self.config.mutation_list_node_block_size,
            self.config.node_mapping_block_size,
        )?;

        // the oldest epoch holds only the ultimate ancestor, which has no
        // parents to copy from
        for epoch in store.epochs().iter().skip(1) {
            info!(
                "Matching epoch {} ({} ancestors)",
                epoch.age, epoch.num_ancestors
            );
            let coverage = tree.live_coverage(epoch.first_ancestor);
            let matches: Vec<MatchedPath> = epoch
                .ancestors()
                .into_par_iter()
                .map(|ancestor| self.match_ancestor(&store, ancestor, &coverage))
                .collect::<Result<Vec<MatchedPath>, BrolgaError>>()?;
            for matched in matches {
                tree.add_path(
                    matched.child,
                    &matched.haplotype,
                    matched.start_site,
                    matched.end_site,
                    matched.end_parent,
                    &matched.traceback,
                )?;
            }
            tree.resolve()?;
        }

        info!("Matching {} samples", num_samples);
        let coverage = tree.live_coverage(store.num_ancestors());
        let matches: Vec<MatchedPath> = (0..num_samples)
            .into_par_iter()
            .map(|sample| self.match_sample(&store, sample, &coverage))
            .collect::<Result<Vec<MatchedPath>, BrolgaError>>()?;
        for matched in matches {
            tree.add_path(
                matched.child,
                &matched.haplotype,
                matched.start_site,
                matched.end_site,
                matched.end_parent,
                &matched.traceback,
            )?;
        }
        tree.resolve()?;

        info!(
            "Inference complete: {} nodes, {} edgesets, {} mutations",
            tree.num_nodes(),
            tree.num_edgesets(),
            tree.num_mutations()
        );
        tree.dump_tables(&self.positions)
    }

    fn match_ancestor(
        &self,
        store: &AncestorStore,
        ancestor: usize,
        coverage: &[(usize, usize)],
    ) -> Result<MatchedPath, BrolgaError> {
        let num_sites = store.num_sites();
        let mut haplotype = vec![0i8; num_sites];
        let (start_site, end_site, num_older, focal_sites) =
            store.get_ancestor(ancestor, &mut haplotype);
        let (start_site, end_site) = Self::clip_to_coverage(coverage, start_site, end_site)?;

        let mut traceback = Traceback::new(num_sites);
        let mut matcher = AncestorMatcher::new(
            store,
            self.config.recombination_rate,
            self.config.error_rate,
            self.config.segment_block_size,
        );
        let end_parent = matcher.find_path(
            &haplotype,
            start_site,
            end_site,
            focal_sites,
            num_older,
            &mut traceback,
        )?;
        Ok(MatchedPath {
            child: ancestor,
            haplotype,
            start_site,
            end_site,
            end_parent,
            traceback,
        })
    }

    fn match_sample(
        &self,
        store: &AncestorStore,
        sample: usize,
        coverage: &[(usize, usize)],
    ) -> Result<MatchedPath, BrolgaError> {
        let num_sites = store.num_sites();
        let haplotype: Vec<i8> = self
            .haplotypes
            .row(sample)
            .iter()
            .map(|allele| *allele as i8)
            .collect();
        let (start_site, end_site) = Self::clip_to_coverage(coverage, 0, num_sites)?;

        let mut traceback = Traceback::new(num_sites);
        let mut matcher = AncestorMatcher::new(
            store,
            self.config.recombination_rate,
            self.config.error_rate,
            self.config.segment_block_size,
        );
        let end_parent = matcher.find_path(
            &haplotype,
            start_site,
            end_site,
            &[],
            store.num_ancestors(),
            &mut traceback,
        )?;
        Ok(MatchedPath {
            child: store.num_ancestors() + sample,
            haplotype,
            start_site,
            end_site,
            end_parent,
            traceback,
        })
    }

    /// Restrict a query's match range to the region where viable parents
    /// exist. The ultimate ancestor spans every site, so in practice this
    /// is the identity; a genuinely uncovered query is a fatal error.
    fn clip_to_coverage(
        coverage: &[(usize, usize)],
        start_site: usize,
        end_site: usize,
    ) -> Result<(usize, usize), BrolgaError> {
        let clipped = IntervalUtils::intersect(coverage, &[(start_site, end_site)]);
        IntervalUtils::hull(&clipped).ok_or_else(|| {
            BrolgaError::NoEligibleParents(format!(
                "no live parent covers any of [{}, {})",
                start_site, end_site
            ))
        })
    }
}
