// Properties of the pairwise distance models
use clonedef::distance::{DistanceModel, DistanceParams, Normalization, Symmetry};
use proptest::prelude::*;

fn params(model: DistanceModel, norm: Normalization) -> DistanceParams {
    DistanceParams::new(model, norm, Symmetry::Avg, None).unwrap()
}

const EMBEDDED_MODELS: [DistanceModel; 6] = [
    DistanceModel::Ham,
    DistanceModel::Aa,
    DistanceModel::HhS1f,
    DistanceModel::MkRs1nf,
    DistanceModel::Hs1fCompat,
    DistanceModel::M1nCompat,
];

#[test]
fn self_distance_zero_under_every_model() {
    for model in EMBEDDED_MODELS {
        for norm in [Normalization::None, Normalization::Len, Normalization::Mut] {
            let p = params(model, norm);
            let seq = p.prepare("TGTGCACGAACTAGT");
            assert_eq!(
                p.pair_distance(&seq, &seq),
                0.0,
                "model {} norm {}",
                model.name(),
                norm.name()
            );
        }
    }
}

#[test]
fn hamming_with_length_norm_matches_fraction() {
    let p = params(DistanceModel::Ham, Normalization::Len);
    // 2 mismatches over 10 positions
    assert!((p.pair_distance("ACGTACGTAC", "ACGTACGTGG") - 0.2).abs() < 1e-12);
}

#[test]
fn aa_model_groups_synonymous_junctions() {
    let p = params(DistanceModel::Aa, Normalization::None);
    // CTG and CTA both encode leucine
    let a = p.prepare("TGTCTGTGG");
    let b = p.prepare("TGTCTATGG");
    assert_eq!(a, b);
    assert_eq!(p.pair_distance(&a, &b), 0.0);
}

#[test]
fn compat_matrices_score_transitions_below_transversions() {
    for model in [DistanceModel::Hs1fCompat, DistanceModel::M1nCompat] {
        let p = params(model, Normalization::None);
        let transition = p.pair_distance("G", "A");
        let transversion = p.pair_distance("T", "A");
        assert!(
            transition < transversion,
            "model {} transition {} !< transversion {}",
            model.name(),
            transition,
            transversion
        );
    }
}

#[test]
fn min_symmetry_never_exceeds_avg() {
    let avg = DistanceParams::new(
        DistanceModel::HhS1f,
        Normalization::None,
        Symmetry::Avg,
        None,
    )
    .unwrap();
    let min = DistanceParams::new(
        DistanceModel::HhS1f,
        Normalization::None,
        Symmetry::Min,
        None,
    )
    .unwrap();
    let a = "ACGTACGT";
    let b = "TGCATGCA";
    assert!(min.pair_distance(a, b) <= avg.pair_distance(a, b));
}

proptest! {
    #[test]
    fn matrix_symmetric_with_zero_diagonal(
        seqs in proptest::collection::vec("[ACGTN]{12}", 2..8)
    ) {
        let p = params(DistanceModel::Ham, Normalization::Len);
        let prepared: Vec<String> = seqs.iter().map(|s| p.prepare(s)).collect();
        let m = p.pairwise(&prepared);
        for i in 0..prepared.len() {
            prop_assert_eq!(m[i][i], 0.0);
            for j in 0..prepared.len() {
                prop_assert_eq!(m[i][j], m[j][i]);
                prop_assert!(m[i][j] >= 0.0);
            }
        }
    }

    #[test]
    fn distance_bounded_by_one_under_length_norm(
        a in "[ACGT]{15}",
        b in "[ACGT]{15}",
    ) {
        let p = params(DistanceModel::Ham, Normalization::Len);
        let d = p.pair_distance(&a, &b);
        prop_assert!((0.0..=1.0).contains(&d));
    }
}
