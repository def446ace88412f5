//! Structural properties of fitted trees and forests.

use proptest::collection::vec as prop_vec;
use proptest::prelude::*;

use airq_rf::{
    Dataset, ErrorKind, ForestError, MaxFeatures, Node, RandomForest, RandomForestConfig,
};

// =============================================================================
// Generators
// =============================================================================

/// Small tables on a coarse integer grid, so ties and duplicate rows are common.
fn arb_dataset() -> impl Strategy<Value = Dataset> {
    (1usize..4, 2usize..30)
        .prop_flat_map(|(width, n)| {
            (
                prop_vec(prop_vec(0i32..8, width), n),
                prop_vec(-50.0f64..50.0, n),
            )
        })
        .prop_map(|(rows, targets)| {
            let rows = rows
                .into_iter()
                .map(|r| r.into_iter().map(f64::from).collect())
                .collect();
            Dataset::new(rows, targets).unwrap()
        })
}

fn arb_config() -> impl Strategy<Value = RandomForestConfig> {
    (
        1usize..6,
        prop::option::of(0usize..5),
        2usize..5,
        prop_oneof![
            Just(MaxFeatures::All),
            Just(MaxFeatures::Sqrt),
            Just(MaxFeatures::Log2),
            (1usize..4).prop_map(MaxFeatures::Fixed),
        ],
        any::<bool>(),
        any::<u64>(),
    )
        .prop_map(|(n, max_depth, min_split, max_features, bootstrap, seed)| {
            RandomForestConfig::new(n)
                .unwrap()
                .with_max_depth(max_depth)
                .with_min_samples_split(min_split)
                .with_max_features(max_features)
                .with_bootstrap(bootstrap)
                .with_seed(seed)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn depth_respects_max_depth(ds in arb_dataset(), config in arb_config()) {
        let forest = config.fit(&ds).unwrap().into_forest();
        if let Some(max_depth) = config.max_depth() {
            for tree in forest.trees() {
                prop_assert!(tree.depth() <= max_depth, "depth {} > {}", tree.depth(), max_depth);
            }
        }
    }

    #[test]
    fn split_nodes_meet_min_samples_split(ds in arb_dataset(), config in arb_config()) {
        let forest = config.fit(&ds).unwrap().into_forest();
        for tree in forest.trees() {
            for node in tree.nodes() {
                if let Node::Split { n_samples, .. } = node {
                    prop_assert!(
                        *n_samples >= config.min_samples_split(),
                        "split over {} rows with min_samples_split {}",
                        n_samples,
                        config.min_samples_split()
                    );
                }
            }
        }
    }

    #[test]
    fn leaf_value_is_mean_of_routed_rows(ds in arb_dataset(), config in arb_config()) {
        let result = config.fit(&ds).unwrap();
        for (tree, in_bag) in result.forest().trees().iter().zip(result.in_bag_indices_per_tree()) {
            for (leaf_idx, node) in tree.nodes().iter().enumerate() {
                let Node::Leaf { value, n_samples, .. } = node else { continue };
                let routed: Vec<f64> = in_bag
                    .iter()
                    .filter(|&&i| tree.apply(&ds.rows()[i]).unwrap().index() == leaf_idx)
                    .map(|&i| ds.targets()[i])
                    .collect();
                prop_assert_eq!(routed.len(), *n_samples);
                let mean = routed.iter().sum::<f64>() / routed.len() as f64;
                prop_assert!((mean - value).abs() < 1e-9, "leaf {} = {}, mean {}", leaf_idx, value, mean);
            }
        }
    }

    #[test]
    fn forest_is_mean_of_trees(ds in arb_dataset(), config in arb_config()) {
        let forest = config.fit(&ds).unwrap().into_forest();
        for row in ds.rows() {
            let per_tree = forest
                .trees()
                .iter()
                .map(|t| t.predict(row).unwrap())
                .sum::<f64>()
                / forest.n_trees() as f64;
            prop_assert!((forest.predict(row).unwrap() - per_tree).abs() < 1e-9);
        }
    }

    #[test]
    fn bytes_round_trip_predicts_identically(ds in arb_dataset(), config in arb_config()) {
        let forest = config.fit(&ds).unwrap().into_forest();
        let restored = RandomForest::from_bytes(&forest.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(restored.params(), forest.params());
        for row in ds.rows() {
            let a = forest.predict(row).unwrap();
            let b = restored.predict(row).unwrap();
            prop_assert!((a - b).abs() <= 1e-9);
        }
    }

    #[test]
    fn identical_rows_give_root_leaf(
        row in prop_vec(-5.0f64..5.0, 1..4),
        targets in prop_vec(-10.0f64..10.0, 1..20),
    ) {
        let ds = Dataset::new(vec![row; targets.len()], targets.clone()).unwrap();
        let forest = RandomForestConfig::new(3)
            .unwrap()
            .with_bootstrap(false)
            .fit(&ds)
            .unwrap()
            .into_forest();
        let mean = targets.iter().sum::<f64>() / targets.len() as f64;
        for tree in forest.trees() {
            match tree.root_node() {
                Node::Leaf { value, .. } => prop_assert!((value - mean).abs() < 1e-9),
                Node::Split { .. } => prop_assert!(false, "expected a root leaf"),
            }
        }
    }
}

#[test]
fn single_tree_without_bootstrap_is_reproducible() {
    let rows: Vec<Vec<f64>> = (0..40)
        .map(|i| vec![f64::from(i % 9), f64::from(i % 4), f64::from(i / 10)])
        .collect();
    let targets: Vec<f64> = (0..40).map(|i| f64::from((i * 13) % 17)).collect();
    let ds = Dataset::new(rows, targets).unwrap();
    let config = RandomForestConfig::new(1)
        .unwrap()
        .with_bootstrap(false)
        .with_max_features(MaxFeatures::All)
        .with_seed(5);
    let first = config.fit(&ds).unwrap().into_forest();
    let second = config.fit(&ds).unwrap().into_forest();
    assert_eq!(first.trees()[0], second.trees()[0]);
}

#[test]
fn three_row_scenario() {
    let ds = Dataset::new(
        vec![vec![1.0, 2.0], vec![1.0, 2.0], vec![5.0, 1.0]],
        vec![10.0, 12.0, 50.0],
    )
    .unwrap();
    let forest = RandomForestConfig::new(1)
        .unwrap()
        .with_min_samples_split(2)
        .with_max_depth(Some(2))
        .with_max_features(MaxFeatures::All)
        .with_bootstrap(false)
        .fit(&ds)
        .unwrap()
        .into_forest();

    assert!((forest.predict(&[1.0, 2.0]).unwrap() - 11.0).abs() < 1e-9);
    assert!((forest.predict(&[5.0, 1.0]).unwrap() - 50.0).abs() < 1e-9);
    let tree = &forest.trees()[0];
    assert_ne!(
        tree.apply(&[1.0, 2.0]).unwrap(),
        tree.apply(&[5.0, 1.0]).unwrap()
    );
}

#[test]
fn error_kinds_at_the_boundary() {
    let empty = Dataset::new(vec![], vec![]).unwrap();
    let err = RandomForestConfig::new(3).unwrap().fit(&empty).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let ds = Dataset::new(vec![vec![1.0, 2.0], vec![2.0, 1.0]], vec![0.0, 1.0]).unwrap();
    let forest = RandomForestConfig::new(2).unwrap().fit(&ds).unwrap().into_forest();
    let err = forest.predict(&[1.0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = RandomForest::from_bytes(b"").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelCorrupt);

    let err = "most".parse::<MaxFeatures>().unwrap_err();
    assert!(matches!(err, ForestError::UnknownMaxFeatures { .. }));
    assert_eq!(err.kind(), ErrorKind::Config);
}
