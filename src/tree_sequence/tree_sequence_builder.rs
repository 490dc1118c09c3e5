use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};

use crate::ancestors::ancestor_store::AncestorStore;
use crate::matching::traceback::Traceback;
use crate::model::edgeset::Edgeset;
use crate::model::mutation::Mutation;
use crate::model::segment::{LiveSegment, UNDEFINED_ALLELE};
use crate::tree_sequence::node_mapping::NodeMapping;
use crate::tree_sequence::tables::TreeSequenceTables;
use crate::utils::errors::BrolgaError;
use crate::utils::interval_utils::IntervalUtils;

/**
 * Resolves copying paths into a conflict-free forest of edgesets and
 * mutations.
 *
 * Paths arrive one query at a time within an epoch and are held as pending
 * single-child edgesets; `resolve` runs at the epoch barrier, merging the
 * pending set into the per-parent interval structure so that a parent's
 * edgesets stay disjoint and no `(parent, left, right)` triple is
 * duplicated. Live segments record where each newly attached node now
 * represents its lineage, so younger epochs can be clipped to regions with
 * viable parents.
 *
 * Node ids: ancestors `[0, A)` as in the store, samples `[A, A + N)`.
 */
#[derive(Debug)]
pub struct TreeSequenceBuilder<'a> {
    store: &'a AncestorStore,
    num_samples: usize,
    pending: Vec<Edgeset>,
    resolved: BTreeMap<usize, Vec<Edgeset>>,
    mutations: Vec<Mutation>,
    node_mapping: NodeMapping,
}

impl<'a> TreeSequenceBuilder<'a> {
    /**
     * @param edgeset_block_size capacity granularity for the pending buffer
     * @param mutation_block_size capacity granularity for the mutation list
     * @param node_mapping_block_size pool block size for live-segment links
     */
    pub fn new(
        store: &'a AncestorStore,
        num_samples: usize,
        edgeset_block_size: usize,
        mutation_block_size: usize,
        node_mapping_block_size: usize,
    ) -> Result<TreeSequenceBuilder<'a>, BrolgaError> {
        if edgeset_block_size == 0 || mutation_block_size == 0 {
            return Err(BrolgaError::InvalidConfiguration(
                "edgeset and mutation block sizes must be nonzero".to_string(),
            ));
        }
        let num_nodes = store.num_ancestors() + num_samples;
        let mut node_mapping = NodeMapping::new(num_nodes, node_mapping_block_size)?;
        // the ultimate ancestor roots every lineage
        node_mapping.set_live_segments(0, &[(0, store.num_sites())]);
        Ok(TreeSequenceBuilder {
            store,
            num_samples,
            pending: Vec::with_capacity(edgeset_block_size),
            resolved: BTreeMap::new(),
            mutations: Vec::with_capacity(mutation_block_size),
            node_mapping,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.store.num_ancestors() + self.num_samples
    }

    fn node_age(&self, node: usize) -> u32 {
        if node < self.store.num_ancestors() {
            self.store.age(node)
        } else {
            0
        }
    }

    /**
     * Record one query's copying path and its disagreements.
     *
     * The traceback is walked from `end_site - 1` down to `start_site` to
     * recover the piecewise-constant parent sequence; each interval becomes
     * a pending single-child edgeset and every site where the query's
     * haplotype disagrees with the chosen parent's allele emits a mutation
     * on the child's branch.
     */
    pub fn add_path(
        &mut self,
        child: usize,
        haplotype: &[i8],
        start_site: usize,
        end_site: usize,
        end_parent: usize,
        traceback: &Traceback,
    ) -> Result<(), BrolgaError> {
        if child >= self.num_nodes() {
            return Err(BrolgaError::InvariantViolation(format!(
                "child {} out of range for {} nodes",
                child,
                self.num_nodes()
            )));
        }
        let path = traceback.best_path(start_site, end_site, end_parent);
        debug_assert_eq!(path.first().map(|s| s.left), Some(start_site));
        debug_assert_eq!(path.last().map(|s| s.right), Some(end_site));

        for segment in &path {
            let parent = segment.parent;
            if parent >= self.store.num_ancestors() {
                return Err(BrolgaError::InvariantViolation(format!(
                    "path for child {} names non-ancestor parent {}",
                    child, parent
                )));
            }
            if self.node_age(parent) <= self.node_age(child) {
                return Err(BrolgaError::InvariantViolation(format!(
                    "parent {} is not older than child {}",
                    parent, child
                )));
            }
            // outside its defined interval the chosen parent carries the
            // neutral state, which is the ultimate ancestor's haplotype;
            // those stretches attach to the ultimate ancestor so edgesets
            // stay inside their parent's interval
            let (parent_start, parent_end) = self.store.ancestor_interval(parent);
            let mid_left = std::cmp::max(segment.left, parent_start);
            let mid_right = std::cmp::min(segment.right, parent_end);
            let mut pieces: Vec<(usize, usize, usize)> = Vec::with_capacity(3);
            if segment.left < std::cmp::min(segment.right, parent_start) {
                pieces.push((segment.left, std::cmp::min(segment.right, parent_start), 0));
            }
            if mid_left < mid_right {
                pieces.push((mid_left, mid_right, parent));
            }
            if std::cmp::max(segment.left, parent_end) < segment.right {
                pieces.push((std::cmp::max(segment.left, parent_end), segment.right, 0));
            }

            for (left, right, piece_parent) in pieces {
                self.pending
                    .push(Edgeset::new(left, right, piece_parent, vec![child]));
                for site in left..right {
                    let parent_state = match self.store.get_state(site, piece_parent) {
                        UNDEFINED_ALLELE => 0,
                        state => state,
                    };
                    if haplotype[site] != parent_state {
                        self.mutations.push(Mutation::new(site, child, haplotype[site]));
                    }
                }
            }
        }
        trace!(
            "Path for child {} over [{}, {}): {} edgesets",
            child,
            start_site,
            end_site,
            path.len()
        );
        Ok(())
    }

    /**
     * Epoch barrier: fold all pending edgesets into the resolved per-parent
     * structure and recompute live segments for the children just attached.
     * Identical intervals under one parent merge by child-set union;
     * partially overlapping intervals are split so the parent's edgesets
     * stay disjoint.
     */
    pub fn resolve(&mut self) -> Result<(), BrolgaError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        debug!("Resolving {} pending edgesets", pending.len());

        let mut child_intervals: BTreeMap<usize, Vec<(usize, usize)>> = BTreeMap::new();
        let mut by_parent: BTreeMap<usize, Vec<Edgeset>> = BTreeMap::new();
        for edgeset in pending {
            for child in &edgeset.children {
                child_intervals
                    .entry(*child)
                    .or_insert_with(Vec::new)
                    .push((edgeset.left, edgeset.right));
            }
            by_parent
                .entry(edgeset.parent)
                .or_insert_with(Vec::new)
                .push(edgeset);
        }

        for (parent, mut edgesets) in by_parent {
            if let Some(existing) = self.resolved.remove(&parent) {
                edgesets.extend(existing);
            }
            let squashed = Self::squash(parent, edgesets);
            self.resolved.insert(parent, squashed);
        }

        for (child, intervals) in child_intervals {
            let union = IntervalUtils::union(&intervals);
            self.node_mapping.set_live_segments(child, &union);
        }
        Ok(())
    }

    /// Sweep a parent's edgesets into sorted disjoint intervals, each
    /// carrying the sorted unique union of the children covering it.
    fn squash(parent: usize, edgesets: Vec<Edgeset>) -> Vec<Edgeset> {
        let mut bounds = BTreeSet::new();
        for edgeset in &edgesets {
            bounds.insert(edgeset.left);
            bounds.insert(edgeset.right);
        }
        let bounds: Vec<usize> = bounds.into_iter().collect();

        let mut squashed: Vec<Edgeset> = Vec::new();
        for window in bounds.windows(2) {
            let (lo, hi) = (window[0], window[1]);
            let mut children = BTreeSet::new();
            for edgeset in &edgesets {
                if edgeset.left <= lo && hi <= edgeset.right {
                    children.extend(edgeset.children.iter().copied());
                }
            }
            if children.is_empty() {
                continue;
            }
            let children: Vec<usize> = children.into_iter().collect();
            match squashed.last_mut() {
                Some(last) if last.right == lo && last.children == children => {
                    last.right = hi;
                }
                _ => squashed.push(Edgeset::new(lo, hi, parent, children)),
            }
        }
        squashed
    }

    /// The node's current live segments; empty if it has not been attached.
    pub fn get_live_segments(&self, node: usize) -> Vec<LiveSegment> {
        self.node_mapping.live_segments(node)
    }

    /// Union of the live segments of nodes `[0, num_nodes)` — the region
    /// where a younger query can find a viable parent.
    pub fn live_coverage(&self, num_nodes: usize) -> Vec<(usize, usize)> {
        let mut intervals = Vec::new();
        for node in 0..num_nodes {
            intervals.extend(self.node_mapping.live_intervals(node));
        }
        IntervalUtils::union(&intervals)
    }

    pub fn num_edgesets(&self) -> usize {
        self.resolved.values().map(|edgesets| edgesets.len()).sum()
    }

    pub fn num_mutations(&self) -> usize {
        self.mutations.len()
    }

    pub fn edgesets_for(&self, parent: usize) -> &[Edgeset] {
        self.resolved
            .get(&parent)
            .map(|edgesets| edgesets.as_slice())
            .unwrap_or(&[])
    }

    /**
     * Dump the parallel-array tables. Edgesets are ordered by parent time
     * ascending (parent id, then left, within ties); interval boundaries are
     * converted to position space, with the right edge of a final interval
     * mapping one past the last site's position. Mutations are ordered by
     * `(site, node)`.
     */
    pub fn dump_tables(&self, positions: &[f64]) -> Result<TreeSequenceTables, BrolgaError> {
        let num_sites = self.store.num_sites();
        if positions.len() != num_sites {
            return Err(BrolgaError::ShapeMismatch(format!(
                "{} positions for {} sites",
                positions.len(),
                num_sites
            )));
        }
        let mut tables = TreeSequenceTables::default();

        for ancestor in 0..self.store.num_ancestors() {
            tables.flags.push(0);
            tables.time.push(self.store.age(ancestor) as f64);
        }
        for _ in 0..self.num_samples {
            tables.flags.push(TreeSequenceTables::NODE_IS_SAMPLE);
            tables.time.push(0.0);
        }

        let mut all_edgesets: Vec<&Edgeset> = self
            .resolved
            .values()
            .flat_map(|edgesets| edgesets.iter())
            .collect();
        all_edgesets.sort_by_key(|e| (self.node_age(e.parent), e.parent, e.left));
        for edgeset in all_edgesets {
            tables.left.push(positions[edgeset.left]);
            tables.right.push(if edgeset.right == num_sites {
                positions[num_sites - 1] + 1.0
            } else {
                positions[edgeset.right]
            });
            tables.parent.push(edgeset.parent);
            tables.children.extend_from_slice(&edgeset.children);
            tables.children_length.push(edgeset.children.len());
        }

        for mutation in self.mutations.iter().sorted_by_key(|m| (m.site, m.node)) {
            tables.site.push(mutation.site);
            tables.node.push(mutation.node);
            tables.derived_state.push(mutation.derived_state);
        }
        Ok(tables)
    }
}
