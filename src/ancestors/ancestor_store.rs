use crate::ancestors::ancestor_store_builder::SegmentDump;
use crate::model::segment::{AlleleRun, UNDEFINED_ALLELE};
use crate::utils::errors::BrolgaError;

/// Per-ancestor metadata recorded while the store is assembled: the age
/// epoch, the defined site interval, and the focal sites the ancestor was
/// built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorRecord {
    pub age: u32,
    pub start_site: usize,
    pub end_site: usize,
    pub focal_sites: Vec<usize>,
}

/// A contiguous run of ancestor ids sharing one age.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Epoch {
    pub age: u32,
    pub first_ancestor: usize,
    pub num_ancestors: usize,
}

impl Epoch {
    pub fn ancestors(&self) -> std::ops::Range<usize> {
        self.first_ancestor..self.first_ancestor + self.num_ancestors
    }
}

/**
 * Immutable random-access view of the ancestor-by-site allele matrix.
 *
 * Runs for each site live in one contiguous buffer with per-site offsets;
 * `get_state` binary searches the site's slice. Ancestors are laid out
 * oldest epoch first, so each epoch occupies a contiguous id range and
 * `num_older_ancestors` of an ancestor is the first id of its own epoch.
 * Shared read-only by all matcher workers.
 */
#[derive(Debug)]
pub struct AncestorStore {
    num_sites: usize,
    num_ancestors: usize,
    runs: Vec<AlleleRun>,
    site_offsets: Vec<usize>,
    ages: Vec<u32>,
    start_sites: Vec<usize>,
    end_sites: Vec<usize>,
    num_older_ancestors: Vec<usize>,
    focal_sites_flat: Vec<usize>,
    focal_offsets: Vec<usize>,
    epochs: Vec<Epoch>,
}

impl AncestorStore {
    /**
     * Assemble the finalized store from a builder dump and the per-ancestor
     * records, validating the layout invariants: the dump sorted by
     * `(site, start)`, every site's runs covering `[0, A)` without gap or
     * overlap, and ages nonincreasing in ancestor id.
     */
    pub fn new(
        num_sites: usize,
        dump: SegmentDump,
        records: Vec<AncestorRecord>,
    ) -> Result<AncestorStore, BrolgaError> {
        let num_ancestors = records.len();
        if num_ancestors == 0 {
            return Err(BrolgaError::EmptyPanel("no ancestors in store".to_string()));
        }

        let mut runs = Vec::with_capacity(dump.len());
        let mut site_offsets = vec![0usize; num_sites + 1];
        let mut previous_site = 0usize;
        for i in 0..dump.len() {
            let site = dump.site[i];
            if site >= num_sites || site < previous_site {
                return Err(BrolgaError::InvariantViolation(format!(
                    "segment dump not sorted by site at entry {}",
                    i
                )));
            }
            previous_site = site;
            runs.push(AlleleRun::new(dump.start[i], dump.end[i], dump.state[i]));
            site_offsets[site + 1] += 1;
        }
        for site in 0..num_sites {
            site_offsets[site + 1] += site_offsets[site];
        }

        let ages: Vec<u32> = records.iter().map(|r| r.age).collect();
        if let Some(a) = (1..num_ancestors).find(|a| ages[*a] > ages[a - 1]) {
            return Err(BrolgaError::InvariantViolation(format!(
                "ancestor {} is older than its predecessor",
                a
            )));
        }

        let mut epochs: Vec<Epoch> = Vec::new();
        let mut num_older_ancestors = vec![0usize; num_ancestors];
        for (ancestor, age) in ages.iter().enumerate() {
            match epochs.last_mut() {
                Some(epoch) if epoch.age == *age => epoch.num_ancestors += 1,
                _ => epochs.push(Epoch {
                    age: *age,
                    first_ancestor: ancestor,
                    num_ancestors: 1,
                }),
            }
            num_older_ancestors[ancestor] = epochs.last().unwrap().first_ancestor;
        }

        let mut focal_sites_flat = Vec::new();
        let mut focal_offsets = vec![0usize; num_ancestors + 1];
        for (ancestor, record) in records.iter().enumerate() {
            focal_sites_flat.extend_from_slice(&record.focal_sites);
            focal_offsets[ancestor + 1] = focal_sites_flat.len();
        }

        let store = AncestorStore {
            num_sites,
            num_ancestors,
            runs,
            site_offsets,
            ages,
            start_sites: records.iter().map(|r| r.start_site).collect(),
            end_sites: records.iter().map(|r| r.end_site).collect(),
            num_older_ancestors,
            focal_sites_flat,
            focal_offsets,
            epochs,
        };
        store.check_integrity()?;
        Ok(store)
    }

    pub fn num_sites(&self) -> usize {
        self.num_sites
    }

    pub fn num_ancestors(&self) -> usize {
        self.num_ancestors
    }

    pub fn num_epochs(&self) -> usize {
        self.epochs.len()
    }

    /// Epochs oldest first.
    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    pub fn age(&self, ancestor: usize) -> u32 {
        self.ages[ancestor]
    }

    pub fn ancestor_interval(&self, ancestor: usize) -> (usize, usize) {
        (self.start_sites[ancestor], self.end_sites[ancestor])
    }

    pub fn num_older_ancestors(&self, ancestor: usize) -> usize {
        self.num_older_ancestors[ancestor]
    }

    pub fn focal_sites(&self, ancestor: usize) -> &[usize] {
        &self.focal_sites_flat[self.focal_offsets[ancestor]..self.focal_offsets[ancestor + 1]]
    }

    /// All runs at `site`, sorted by start, covering `[0, num_ancestors)`.
    pub fn runs_at(&self, site: usize) -> &[AlleleRun] {
        &self.runs[self.site_offsets[site]..self.site_offsets[site + 1]]
    }

    /// Allele of `ancestor` at `site`; -1 when the site lies outside the
    /// ancestor's defined interval. O(log R_s).
    pub fn get_state(&self, site: usize, ancestor: usize) -> i8 {
        let runs = self.runs_at(site);
        let index = runs.partition_point(|run| run.end <= ancestor);
        debug_assert!(index < runs.len() && runs[index].contains(ancestor));
        runs[index].state
    }

    /**
     * Materialize the ancestor's allele vector by scanning each in-range
     * site's runs; sites outside the defined interval are emitted as the
     * neutral state 0.
     *
     * @return (start_site, end_site, num_older_ancestors, focal_sites)
     */
    pub fn get_ancestor(
        &self,
        ancestor: usize,
        haplotype: &mut [i8],
    ) -> (usize, usize, usize, &[usize]) {
        assert_eq!(haplotype.len(), self.num_sites);
        for state in haplotype.iter_mut() {
            *state = 0;
        }
        let (start_site, end_site) = self.ancestor_interval(ancestor);
        for site in start_site..end_site {
            let state = self.get_state(site, ancestor);
            haplotype[site] = if state == UNDEFINED_ALLELE { 0 } else { state };
        }
        (
            start_site,
            end_site,
            self.num_older_ancestors[ancestor],
            self.focal_sites(ancestor),
        )
    }

    /// Contiguous id range of the ancestors in the epoch with the given age.
    pub fn get_epoch_ancestors(&self, age: u32) -> Option<std::ops::Range<usize>> {
        self.epochs
            .iter()
            .find(|epoch| epoch.age == age)
            .map(|epoch| epoch.ancestors())
    }

    /// Validate the partition invariant at every site: runs sorted, no gap,
    /// no overlap, covering `[0, num_ancestors)` exactly.
    pub fn check_integrity(&self) -> Result<(), BrolgaError> {
        for site in 0..self.num_sites {
            let runs = self.runs_at(site);
            let mut expected_start = 0usize;
            for run in runs {
                if run.start != expected_start {
                    return Err(BrolgaError::InvariantViolation(format!(
                        "site {}: run starts at {} but {} expected",
                        site, run.start, expected_start
                    )));
                }
                expected_start = run.end;
            }
            if expected_start != self.num_ancestors {
                return Err(BrolgaError::InvariantViolation(format!(
                    "site {}: runs cover [0, {}) but [0, {}) required",
                    site, expected_start, self.num_ancestors
                )));
            }
        }
        for ancestor in 0..self.num_ancestors {
            let (start_site, end_site) = self.ancestor_interval(ancestor);
            if start_site >= end_site || end_site > self.num_sites {
                return Err(BrolgaError::InvariantViolation(format!(
                    "ancestor {} carries empty or out-of-range interval [{}, {})",
                    ancestor, start_site, end_site
                )));
            }
        }
        Ok(())
    }
}
