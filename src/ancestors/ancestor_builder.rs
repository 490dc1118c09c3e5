use itertools::Itertools;
use ndarray::Array2;
use std::collections::HashMap;

use crate::model::segment::UNDEFINED_ALLELE;
use crate::model::site::Site;
use crate::utils::errors::BrolgaError;

/**
 * A synthetic ancestor to be generated: the frequency-class age it will carry
 * and the focal sites it is built for. Focal sites are sorted and all share
 * one carrier sample set.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorDescriptor {
    pub age: u32,
    pub focal_sites: Vec<usize>,
}

/**
 * Synthesizes ancestral haplotypes from the sample panel.
 *
 * Sites are grouped into frequency classes (identical derived-allele count
 * among samples); higher-frequency classes are older. Within a class, focal
 * sites sharing an identical carrier sample set collapse into one ancestor.
 * The ancestor's alleles are the majority vote of the carrier set over the
 * focal span, extended outward while the vote stays decisive.
 */
#[derive(Debug)]
pub struct AncestorBuilder<'a> {
    haplotypes: &'a Array2<u8>,
    sites: Vec<Site>,
    num_samples: usize,
}

impl<'a> AncestorBuilder<'a> {
    /**
     * Validate the panel and index its sites. All input validation errors are
     * raised here, before any ancestor work begins.
     *
     * @param positions per-site genomic positions, nondecreasing, one per column
     * @param haplotypes N x L panel of alleles in {0, 1}, sample-major
     */
    pub fn new(
        positions: &[f64],
        haplotypes: &'a Array2<u8>,
    ) -> Result<AncestorBuilder<'a>, BrolgaError> {
        let num_samples = haplotypes.nrows();
        let num_sites = haplotypes.ncols();
        if num_samples == 0 {
            return Err(BrolgaError::EmptyPanel("zero samples".to_string()));
        }
        if num_sites == 0 {
            return Err(BrolgaError::EmptyPanel("zero sites".to_string()));
        }
        if positions.len() != num_sites {
            return Err(BrolgaError::ShapeMismatch(format!(
                "{} positions for {} sites",
                positions.len(),
                num_sites
            )));
        }
        if let Some(w) = positions.windows(2).find(|w| w[0] > w[1]) {
            return Err(BrolgaError::NonMonotonicPositions(format!(
                "{} followed by {}",
                w[0], w[1]
            )));
        }
        for ((row, col), allele) in haplotypes.indexed_iter() {
            if *allele > 1 {
                return Err(BrolgaError::InvalidAllele(format!(
                    "allele {} at sample {} site {}",
                    allele, row, col
                )));
            }
        }

        let sites = (0..num_sites)
            .map(|s| {
                let frequency = haplotypes.column(s).iter().filter(|a| **a == 1).count();
                Site::new(s, positions[s], frequency)
            })
            .collect();

        Ok(AncestorBuilder {
            haplotypes,
            sites,
            num_samples,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn num_sites(&self) -> usize {
        self.sites.len()
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    /**
     * Plan the synthetic ancestors, oldest first.
     *
     * Classes are ordered by decreasing frequency; with C classes the oldest
     * gets age C and the youngest age 1. Within a class, sites with an
     * identical carrier sample set share one descriptor; descriptors are
     * ordered by their leftmost focal site. Sites with derived count < 2
     * carry no sharing signal and are left for mutation calling on sample
     * branches.
     */
    pub fn ancestor_descriptors(&self) -> Vec<AncestorDescriptor> {
        // frequency -> focal site ids, ascending
        let classes: HashMap<usize, Vec<usize>> = self
            .sites
            .iter()
            .filter(|site| site.frequency >= 2)
            .map(|site| (site.frequency, site.id))
            .into_group_map();
        let frequencies: Vec<usize> = classes.keys().copied().sorted().rev().collect();
        let num_classes = frequencies.len() as u32;

        let mut descriptors = Vec::new();
        for (class_index, frequency) in frequencies.iter().enumerate() {
            let age = num_classes - class_index as u32;
            // carrier set -> focal sites, insertion in ascending site order
            let groups: HashMap<Vec<usize>, Vec<usize>> = classes[frequency]
                .iter()
                .map(|site_id| (self.site_carriers(*site_id), *site_id))
                .into_group_map();
            let mut class_descriptors: Vec<AncestorDescriptor> = groups
                .into_values()
                .map(|focal_sites| AncestorDescriptor { age, focal_sites })
                .collect();
            class_descriptors.sort_by_key(|d| d.focal_sites[0]);
            descriptors.extend(class_descriptors);
        }
        debug!(
            "Planned {} ancestors over {} frequency classes",
            descriptors.len(),
            num_classes
        );
        descriptors
    }

    /// Age carried by the all-zeros ultimate ancestor: one epoch older than
    /// the oldest frequency class.
    pub fn oldest_age(&self) -> u32 {
        let num_classes = self
            .sites
            .iter()
            .filter(|s| s.frequency >= 2)
            .map(|s| s.frequency)
            .unique()
            .count() as u32;
        num_classes + 1
    }

    /**
     * Synthesize the ancestral haplotype for a focal site group.
     *
     * Within the focal span the allele is the majority vote of the carrier
     * set, ties toward the ancestral state. The span is then extended
     * outward site by site: samples disagreeing with a site's consensus are
     * evicted from the live set, and the extension stops once fewer than a
     * strict majority of the original carriers remain in agreement.
     *
     * @param focal_sites sorted site ids sharing one carrier set
     * @param haplotype scratch of length num_sites; written with -1 outside
     *                  the returned interval
     * @return the defined interval [start_site, end_site)
     */
    pub fn make_ancestor(
        &self,
        focal_sites: &[usize],
        haplotype: &mut [i8],
    ) -> Result<(usize, usize), BrolgaError> {
        if focal_sites.is_empty() {
            return Err(BrolgaError::InvariantViolation(
                "ancestor requested with no focal sites".to_string(),
            ));
        }
        if haplotype.len() != self.num_sites() {
            return Err(BrolgaError::ShapeMismatch(format!(
                "haplotype scratch of length {} for {} sites",
                haplotype.len(),
                self.num_sites()
            )));
        }
        let carriers = self.site_carriers_all(focal_sites);
        if carriers.is_empty() {
            return Err(BrolgaError::InvariantViolation(format!(
                "no sample carries all of the focal sites {:?}",
                focal_sites
            )));
        }

        for state in haplotype.iter_mut() {
            *state = UNDEFINED_ALLELE;
        }
        let focal_first = focal_sites[0];
        let focal_last = *focal_sites.last().unwrap();
        for x in focal_first..=focal_last {
            haplotype[x] = self.consensus_allele(&carriers, x);
        }

        let start_site = self.extend(haplotype, &carriers, (0..focal_first).rev())
            .unwrap_or(focal_first);
        let end_site = self
            .extend(haplotype, &carriers, (focal_last + 1)..self.num_sites())
            .map(|last| last + 1)
            .unwrap_or(focal_last + 1);

        trace!(
            "Ancestor for focal sites {:?}: {} carriers, interval [{}, {})",
            focal_sites,
            carriers.len(),
            start_site,
            end_site
        );
        Ok((start_site, end_site))
    }

    /// Walk sites outward from the focal span, writing consensus alleles
    /// until the vote loses its majority backing. Returns the last site
    /// written, or `None` if the very first site already broke consensus.
    fn extend<I: Iterator<Item = usize>>(
        &self,
        haplotype: &mut [i8],
        carriers: &[usize],
        site_order: I,
    ) -> Option<usize> {
        let original = carriers.len();
        let mut live = carriers.to_vec();
        let mut boundary = None;
        for x in site_order {
            let ones = live
                .iter()
                .filter(|sample| self.haplotypes[[**sample, x]] == 1)
                .count();
            let consensus: u8 = if 2 * ones > live.len() { 1 } else { 0 };
            live.retain(|sample| self.haplotypes[[*sample, x]] == consensus);
            if 2 * live.len() <= original {
                break;
            }
            haplotype[x] = consensus as i8;
            boundary = Some(x);
        }
        boundary
    }

    /// Samples carrying the derived allele at `site`, ascending.
    fn site_carriers(&self, site: usize) -> Vec<usize> {
        (0..self.num_samples)
            .filter(|sample| self.haplotypes[[*sample, site]] == 1)
            .collect()
    }

    /// Samples carrying the derived allele at every focal site, ascending.
    fn site_carriers_all(&self, focal_sites: &[usize]) -> Vec<usize> {
        (0..self.num_samples)
            .filter(|sample| {
                focal_sites
                    .iter()
                    .all(|site| self.haplotypes[[*sample, *site]] == 1)
            })
            .collect()
    }

    /// Majority allele among `carriers` at `site`, ties toward ancestral.
    fn consensus_allele(&self, carriers: &[usize], site: usize) -> i8 {
        let ones = carriers
            .iter()
            .filter(|sample| self.haplotypes[[**sample, site]] == 1)
            .count();
        if 2 * ones > carriers.len() {
            1
        } else {
            0
        }
    }
}
