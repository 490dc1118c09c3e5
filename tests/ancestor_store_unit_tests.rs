#![allow(unused_imports)]

extern crate brolga;

use brolga::ancestors::ancestor_store::{AncestorRecord, AncestorStore};
use brolga::ancestors::ancestor_store_builder::{AncestorStoreBuilder, SegmentDump};
use brolga::model::segment::UNDEFINED_ALLELE;
use brolga::utils::errors::BrolgaError;

/// Assemble a store from full-length ancestor haplotypes; defined intervals
/// are derived from the -1 flanks.
fn build_store(
    ancestors: &[Vec<i8>],
    ages: &[u32],
    focal_sites: &[Vec<usize>],
) -> AncestorStore {
    let num_sites = ancestors[0].len();
    let mut builder = AncestorStoreBuilder::new(num_sites);
    let mut records = Vec::new();
    for (index, haplotype) in ancestors.iter().enumerate() {
        builder.add(haplotype).unwrap();
        let start_site = haplotype.iter().position(|s| *s != UNDEFINED_ALLELE).unwrap();
        let end_site = haplotype.iter().rposition(|s| *s != UNDEFINED_ALLELE).unwrap() + 1;
        records.push(AncestorRecord {
            age: ages[index],
            start_site,
            end_site,
            focal_sites: focal_sites[index].clone(),
        });
    }
    AncestorStore::new(num_sites, builder.dump(), records).unwrap()
}

fn four_ancestor_store() -> AncestorStore {
    build_store(
        &[
            vec![0, 0, 0, 0],
            vec![-1, 1, 1, -1],
            vec![0, 1, 0, 0],
            vec![1, 1, 0, -1],
        ],
        &[4, 3, 2, 1],
        &[vec![], vec![1, 2], vec![1], vec![0]],
    )
}

#[test]
fn test_get_state_round_trip() {
    let ancestors = vec![
        vec![0, 0, 0, 0],
        vec![-1, 1, 1, -1],
        vec![0, 1, 0, 0],
        vec![1, 1, 0, -1],
    ];
    let store = build_store(&ancestors, &[4, 3, 2, 1], &[vec![], vec![], vec![], vec![]]);
    for (ancestor, haplotype) in ancestors.iter().enumerate() {
        for (site, expected) in haplotype.iter().enumerate() {
            assert_eq!(
                store.get_state(site, ancestor),
                *expected,
                "ancestor {} site {}",
                ancestor,
                site
            );
        }
    }
}

#[test]
fn test_get_ancestor_materializes_neutral_flanks() {
    let store = four_ancestor_store();
    let mut haplotype = vec![0i8; 4];
    let (start_site, end_site, num_older, focal) = store.get_ancestor(1, &mut haplotype);
    assert_eq!((start_site, end_site), (1, 3));
    assert_eq!(num_older, 1);
    assert_eq!(focal, &[1, 2]);
    // -1 flanks come back as the neutral state
    assert_eq!(haplotype, vec![0, 1, 1, 0]);
}

#[test]
fn test_get_ancestor_matches_get_state_within_interval() {
    let store = four_ancestor_store();
    let mut haplotype = vec![0i8; 4];
    for ancestor in 0..store.num_ancestors() {
        let (start_site, end_site, _, _) = store.get_ancestor(ancestor, &mut haplotype);
        for site in start_site..end_site {
            assert_eq!(haplotype[site], store.get_state(site, ancestor));
        }
    }
}

#[test]
fn test_epoch_index() {
    let store = build_store(
        &[
            vec![0, 0],
            vec![1, 0],
            vec![0, 1],
            vec![1, 1],
        ],
        &[3, 2, 2, 1],
        &[vec![], vec![], vec![], vec![]],
    );
    assert_eq!(store.num_epochs(), 3);
    assert_eq!(store.get_epoch_ancestors(3), Some(0..1));
    assert_eq!(store.get_epoch_ancestors(2), Some(1..3));
    assert_eq!(store.get_epoch_ancestors(1), Some(3..4));
    assert_eq!(store.get_epoch_ancestors(7), None);

    let older: Vec<usize> = (0..4).map(|a| store.num_older_ancestors(a)).collect();
    assert_eq!(older, vec![0, 1, 1, 3]);

    let ages: Vec<u32> = store.epochs().iter().map(|e| e.age).collect();
    assert_eq!(ages, vec![3, 2, 1]);
}

#[test]
fn test_check_integrity_accepts_valid_store() {
    let store = four_ancestor_store();
    assert!(store.check_integrity().is_ok());
}

#[test]
fn test_gap_in_site_coverage_rejected() {
    // site 0 only covers ancestor 0 of two
    let dump = SegmentDump {
        site: vec![0, 1, 1],
        start: vec![0, 0, 1],
        end: vec![1, 1, 2],
        state: vec![0, 0, 1],
    };
    let records = vec![
        AncestorRecord {
            age: 2,
            start_site: 0,
            end_site: 2,
            focal_sites: vec![],
        },
        AncestorRecord {
            age: 1,
            start_site: 0,
            end_site: 2,
            focal_sites: vec![],
        },
    ];
    let result = AncestorStore::new(2, dump, records);
    assert!(matches!(result, Err(BrolgaError::InvariantViolation(_))));
}

#[test]
fn test_increasing_age_order_rejected() {
    let mut builder = AncestorStoreBuilder::new(1);
    builder.add(&[0]).unwrap();
    builder.add(&[1]).unwrap();
    let records = vec![
        AncestorRecord {
            age: 1,
            start_site: 0,
            end_site: 1,
            focal_sites: vec![],
        },
        AncestorRecord {
            age: 2,
            start_site: 0,
            end_site: 1,
            focal_sites: vec![],
        },
    ];
    let result = AncestorStore::new(1, builder.dump(), records);
    assert!(matches!(result, Err(BrolgaError::InvariantViolation(_))));
}

#[test]
fn test_store_builder_compression() {
    // 50 identical ancestors collapse to one run per site
    let mut builder = AncestorStoreBuilder::new(3);
    for _ in 0..50 {
        builder.add(&[0, 1, 0]).unwrap();
    }
    assert_eq!(builder.num_ancestors(), 50);
    assert_eq!(builder.total_segments(), 3);
}
