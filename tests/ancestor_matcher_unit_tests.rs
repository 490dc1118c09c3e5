#![allow(unused_imports)]

extern crate brolga;

use brolga::ancestors::ancestor_store::{AncestorRecord, AncestorStore};
use brolga::ancestors::ancestor_store_builder::AncestorStoreBuilder;
use brolga::matching::ancestor_matcher::AncestorMatcher;
use brolga::matching::traceback::Traceback;
use brolga::model::segment::UNDEFINED_ALLELE;
use brolga::utils::errors::BrolgaError;

fn build_store(ancestors: &[Vec<i8>], ages: &[u32]) -> AncestorStore {
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
            focal_sites: vec![],
        });
    }
    AncestorStore::new(num_sites, builder.dump(), records).unwrap()
}

#[test]
fn test_perfect_copy_stays_on_one_parent() {
    let store = build_store(
        &[vec![0, 0, 0], vec![1, 0, 1], vec![0, 1, 1]],
        &[3, 2, 2],
    );
    let mut traceback = Traceback::new(3);
    let mut matcher = AncestorMatcher::new(&store, 0.01, 0.001, 64);
    let end_parent = matcher
        .find_path(&[1, 0, 1], 0, 3, &[], 3, &mut traceback)
        .unwrap();
    assert_eq!(end_parent, 1);
    let path = traceback.best_path(0, 3, end_parent);
    assert_eq!(path.len(), 1);
    assert_eq!(path[0].parent, 1);
    assert_eq!((path[0].left, path[0].right), (0, 3));
}

#[test]
fn test_recombination_switches_parent() {
    // query [1, 1, 1] is a mosaic of [1, 1, 0] and [0, 1, 1]
    let store = build_store(
        &[vec![0, 0, 0], vec![1, 1, 0], vec![0, 1, 1]],
        &[2, 1, 1],
    );
    let mut traceback = Traceback::new(3);
    let mut matcher = AncestorMatcher::new(&store, 0.1, 0.01, 64);
    let end_parent = matcher
        .find_path(&[1, 1, 1], 0, 3, &[], 3, &mut traceback)
        .unwrap();
    assert_eq!(end_parent, 2);
    assert!(traceback.total_segments() > 0);

    let path = traceback.best_path(0, 3, end_parent);
    assert_eq!(path.len(), 2, "expected one switch, got {:?}", path);
    assert_eq!(path[0].parent, 1);
    assert_eq!(path[1].parent, 2);
    assert_eq!(path[0].left, 0);
    assert_eq!(path[1].right, 3);
    assert_eq!(path[0].right, path[1].left);
}

#[test]
fn test_focal_site_forces_derived_carrier() {
    // without the focal declaration the cheapest explanation of the query
    // is to stay on ancestor 1 and absorb one mismatch
    let store = build_store(
        &[vec![0, 0, 0], vec![1, 0, 1], vec![0, 1, 0]],
        &[3, 2, 1],
    );

    let mut traceback = Traceback::new(3);
    let mut matcher = AncestorMatcher::new(&store, 0.001, 0.1, 64);
    let end_parent = matcher
        .find_path(&[1, 1, 1], 0, 3, &[], 3, &mut traceback)
        .unwrap();
    let path = traceback.best_path(0, 3, end_parent);
    let covering = path.iter().find(|s| s.left <= 1 && 1 < s.right).unwrap();
    assert_eq!(covering.parent, 1);

    // declaring site 1 focal bans the mismatch there; the only parent
    // carrying the derived allele is ancestor 2
    traceback.reset();
    let end_parent = matcher
        .find_path(&[1, 1, 1], 0, 3, &[1], 3, &mut traceback)
        .unwrap();
    let path = traceback.best_path(0, 3, end_parent);
    let covering = path.iter().find(|s| s.left <= 1 && 1 < s.right).unwrap();
    assert_eq!(covering.parent, 2);
}

#[test]
fn test_focal_site_with_no_derived_carrier_matches_through() {
    // the sole eligible parent is the all-zeros ultimate ancestor: the
    // focal derivation is new on the query's branch, so the match must
    // succeed rather than zero out
    let store = build_store(&[vec![0, 0], vec![1, 1]], &[2, 1]);
    let mut traceback = Traceback::new(2);
    let mut matcher = AncestorMatcher::new(&store, 0.01, 0.001, 64);
    let end_parent = matcher
        .find_path(&[1, 1], 0, 2, &[0, 1], 1, &mut traceback)
        .unwrap();
    assert_eq!(end_parent, 0);
    let path = traceback.best_path(0, 2, end_parent);
    assert_eq!(path.len(), 1);
    assert_eq!(path[0].parent, 0);
}

#[test]
fn test_no_eligible_parents_is_fatal() {
    let store = build_store(&[vec![0, 0]], &[1]);
    let mut traceback = Traceback::new(2);
    let mut matcher = AncestorMatcher::new(&store, 0.01, 0.001, 64);
    let result = matcher.find_path(&[0, 0], 0, 2, &[], 0, &mut traceback);
    assert!(matches!(result, Err(BrolgaError::NoEligibleParents(_))));
}

#[test]
fn test_total_mismatch_with_zero_error_rate_underflows() {
    let store = build_store(&[vec![0, 0]], &[1]);
    let mut traceback = Traceback::new(2);
    let mut matcher = AncestorMatcher::new(&store, 0.01, 0.0, 64);
    let result = matcher.find_path(&[1, 1], 0, 2, &[], 1, &mut traceback);
    assert!(matches!(result, Err(BrolgaError::LikelihoodUnderflow(_))));
}

#[test]
fn test_undefined_parent_state_is_treated_as_ancestral() {
    // ancestor 1 is only defined over [1, 3); a query of zeros outside that
    // interval still matches it there
    let store = build_store(
        &[vec![0, 0, 0, 0], vec![-1, 1, 1, -1]],
        &[2, 1],
    );
    let mut traceback = Traceback::new(4);
    let mut matcher = AncestorMatcher::new(&store, 0.01, 0.001, 64);
    let end_parent = matcher
        .find_path(&[0, 1, 1, 0], 0, 4, &[], 2, &mut traceback)
        .unwrap();
    let path = traceback.best_path(0, 4, end_parent);
    let covering = path.iter().find(|s| s.left <= 1 && 1 < s.right).unwrap();
    assert_eq!(covering.parent, 1);
}

#[test]
fn test_segment_count_stays_bounded_by_merging() {
    // 40 interchangeable older ancestors collapse into few segments
    let mut ancestors = vec![vec![0i8; 8]];
    for _ in 0..40 {
        ancestors.push(vec![0, 1, 0, 1, 0, 1, 0, 1]);
    }
    let ages: Vec<u32> = std::iter::once(2u32)
        .chain(std::iter::repeat(1u32).take(40))
        .collect();
    let store = build_store(&ancestors, &ages);
    let mut traceback = Traceback::new(8);
    let mut matcher = AncestorMatcher::new(&store, 0.01, 0.001, 64);
    matcher
        .find_path(&[0, 1, 0, 1, 0, 1, 0, 1], 0, 8, &[], 41, &mut traceback)
        .unwrap();
    assert!(matcher.num_segments() <= 2);
}
