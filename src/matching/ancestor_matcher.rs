use approx::relative_eq;
use ordered_float::OrderedFloat;

use crate::ancestors::ancestor_store::AncestorStore;
use crate::matching::traceback::Traceback;
use crate::model::segment::{LikelihoodSegment, UNDEFINED_ALLELE};
use crate::utils::errors::BrolgaError;

/**
 * Li-Stephens copying model over the ancestor store.
 *
 * A query haplotype is modelled as a recombining, occasionally mismatching
 * copy of the eligible ancestors (ids `[0, K)` where K is the number of
 * strictly older ancestors). Rather than a likelihood per ancestor, the
 * matcher maintains value segments `[start, end, L]` over ancestor ids; the
 * store's run-length layout keeps the segment count small because runs of
 * ancestors share alleles, hence likelihoods.
 *
 * Per site: max-find, recombination transition (recording traceback entries
 * where the jump branch wins), emission by piecewise intersection with the
 * store's runs, then normalization so the maximum likelihood is exactly 1,
 * which is both the underflow guard and a testable invariant.
 *
 * One matcher per worker; scratch segment lists are reused across queries.
 */
#[derive(Debug)]
pub struct AncestorMatcher<'a> {
    store: &'a AncestorStore,
    recombination_rate: f64,
    mismatch_probability: f64,
    likelihoods: Vec<LikelihoodSegment>,
    scratch: Vec<LikelihoodSegment>,
}

impl<'a> AncestorMatcher<'a> {
    /**
     * @param recombination_rate per-site probability of a copying switch
     * @param error_rate per-site mismatch probability
     * @param segment_block_size initial capacity of the segment scratch
     */
    pub fn new(
        store: &'a AncestorStore,
        recombination_rate: f64,
        error_rate: f64,
        segment_block_size: usize,
    ) -> AncestorMatcher<'a> {
        AncestorMatcher {
            store,
            recombination_rate,
            mismatch_probability: error_rate,
            likelihoods: Vec::with_capacity(segment_block_size),
            scratch: Vec::with_capacity(segment_block_size),
        }
    }

    /**
     * Compute the maximum-likelihood copying path for `haplotype` over
     * `[start_site, end_site)`, writing recombination transitions into
     * `traceback`.
     *
     * At the query's focal sites the declared derived allele is forced:
     * parents disagreeing are zeroed, unless no eligible parent carries the
     * derived allele at all, in which case the emission is skipped and the
     * derivation is left to surface as a mutation on the query's branch.
     *
     * @param num_eligible number of strictly older ancestors (K); parents
     *                     are drawn from ids [0, K)
     * @return the best parent at the final matched site
     */
    pub fn find_path(
        &mut self,
        haplotype: &[i8],
        start_site: usize,
        end_site: usize,
        focal_sites: &[usize],
        num_eligible: usize,
        traceback: &mut Traceback,
    ) -> Result<usize, BrolgaError> {
        if num_eligible == 0 {
            return Err(BrolgaError::NoEligibleParents(format!(
                "query over [{}, {}) has no older ancestors to copy from",
                start_site, end_site
            )));
        }
        assert!(start_site < end_site && end_site <= self.store.num_sites());
        assert!(num_eligible <= self.store.num_ancestors());

        self.likelihoods.clear();
        self.likelihoods
            .push(LikelihoodSegment::new(0, num_eligible, 1.0));

        let mut focal_index = 0;
        for site in start_site..end_site {
            while focal_index < focal_sites.len() && focal_sites[focal_index] < site {
                focal_index += 1;
            }
            let is_focal = focal_index < focal_sites.len() && focal_sites[focal_index] == site;
            debug_assert!(!is_focal || haplotype[site] == 1);
            self.process_site(site, haplotype[site], is_focal, num_eligible, traceback)?;
        }

        Ok(self.best_segment().start)
    }

    /// Lowest ancestor id inside a maximal likelihood segment.
    fn best_segment(&self) -> &LikelihoodSegment {
        let mut best = &self.likelihoods[0];
        for segment in &self.likelihoods[1..] {
            if OrderedFloat(segment.likelihood) > OrderedFloat(best.likelihood) {
                best = segment;
            }
        }
        best
    }

    fn process_site(
        &mut self,
        site: usize,
        query_allele: i8,
        is_focal: bool,
        num_eligible: usize,
        traceback: &mut Traceback,
    ) -> Result<(), BrolgaError> {
        let best = self.best_segment();
        let l_max = best.likelihood;
        let best_ancestor = best.start;

        let n = num_eligible as f64;
        let rho = self.recombination_rate;
        let no_recomb_factor = 1.0 - rho + rho / n;
        let recomb_probability = l_max * rho / n;
        let match_probability = 1.0 - self.mismatch_probability;

        let runs = self.store.runs_at(site);
        // when no eligible parent carries the derived allele the focal
        // derivation is new on the query's branch; emission is skipped
        let derived_available = is_focal
            && runs
                .iter()
                .any(|run| run.state == 1 && run.start < num_eligible);

        self.scratch.clear();
        let mut run_index = 0;
        for segment in &self.likelihoods {
            let no_recomb = segment.likelihood * no_recomb_factor;
            let value = if recomb_probability > no_recomb {
                traceback.add_recombination(site, segment.start, segment.end, best_ancestor);
                recomb_probability
            } else {
                no_recomb
            };

            while runs[run_index].end <= segment.start {
                run_index += 1;
            }
            let mut i = run_index;
            while i < runs.len() && runs[i].start < segment.end {
                let piece_start = std::cmp::max(segment.start, runs[i].start);
                let piece_end = std::cmp::min(segment.end, runs[i].end);
                let state = if runs[i].state == UNDEFINED_ALLELE {
                    0
                } else {
                    runs[i].state
                };
                let emitted = if is_focal {
                    if !derived_available {
                        value
                    } else if state == 1 {
                        value
                    } else {
                        0.0
                    }
                } else if state == query_allele {
                    value * match_probability
                } else {
                    value * self.mismatch_probability
                };
                Self::push_merged(&mut self.scratch, piece_start, piece_end, emitted);
                i += 1;
            }
        }

        let new_max = self
            .scratch
            .iter()
            .fold(0.0f64, |max, segment| max.max(segment.likelihood));
        if new_max <= 0.0 {
            return Err(BrolgaError::LikelihoodUnderflow(format!(
                "all copying likelihoods vanished at site {}",
                site
            )));
        }
        for segment in self.scratch.iter_mut() {
            segment.likelihood /= new_max;
        }
        debug_assert!(relative_eq!(
            self.scratch
                .iter()
                .fold(0.0f64, |max, segment| max.max(segment.likelihood)),
            1.0
        ));

        std::mem::swap(&mut self.likelihoods, &mut self.scratch);
        Ok(())
    }

    /// Append `[start, end, likelihood]`, coalescing with the previous
    /// segment when adjacent and equal-valued.
    fn push_merged(
        segments: &mut Vec<LikelihoodSegment>,
        start: usize,
        end: usize,
        likelihood: f64,
    ) {
        match segments.last_mut() {
            Some(last) if last.end == start && last.likelihood == likelihood => {
                last.end = end;
            }
            _ => segments.push(LikelihoodSegment::new(start, end, likelihood)),
        }
    }

    /// Current segment count; bounded by the coalescing merge.
    pub fn num_segments(&self) -> usize {
        self.likelihoods.len()
    }
}
