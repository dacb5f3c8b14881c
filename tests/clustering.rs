//! Integration tests for optimising over representative days.
use float_cmp::approx_eq;
use rec_sizing::backpack::Backpack;
use rec_sizing::clustering::ClusteringOutputs;
use rec_sizing::optimisation::run_collective_pool_milp;
use rec_sizing::optimisation::solver::{HighsSolver, MilpStatus};
use rec_sizing::outputs::PoolResults;
use std::path::Path;

fn solve(backpack: &Backpack) -> PoolResults {
    let solver = HighsSolver {
        mip_rel_gap: Some(1e-9),
        ..HighsSolver::default()
    };
    let outputs = run_collective_pool_milp(backpack, &solver).unwrap();
    assert_eq!(outputs.milp_status, MilpStatus::Optimal);
    outputs.results.unwrap()
}

fn load() -> (Backpack, ClusteringOutputs) {
    let data_dir = Path::new("tests/data");
    (
        Backpack::from_path(&data_dir.join("clustering_backpack.toml")).unwrap(),
        ClusteringOutputs::from_path(&data_dir.join("clustering_outputs.toml")).unwrap(),
    )
}

#[test]
fn test_representative_days() {
    let (backpack, clustering) = load();
    let reduced = backpack.with_representative_days(&clustering).unwrap();

    let horizon = reduced.resolve().unwrap();
    assert_eq!(horizon.len(), 24);
    assert_eq!(horizon.represented_days(), 2.0);
    assert_eq!(horizon.weight(0), 2.0);

    let results = solve(&reduced);
    assert_eq!(results.dual_prices.len(), 24);
    assert_eq!(results.meters.len(), 3);

    // CPE#1 and CPE#3 have identical data, so must be charged the same
    let (cpe1, cpe3) = (&results.meters["CPE#1"], &results.meters["CPE#3"]);
    assert!(
        approx_eq!(f64, cpe1.c_ind2pool, cpe3.c_ind2pool, epsilon = 1e-5),
        "{} != {}",
        cpe1.c_ind2pool,
        cpe3.c_ind2pool
    );
}

#[test]
fn test_representative_day_weighting() {
    // Without storage, each step is independent, so a representative day weighted by two must
    // cost the same as that day repeated twice
    let (backpack, clustering) = load();
    let reduced = backpack.with_representative_days(&clustering).unwrap();

    let mut repeated = reduced.clone();
    repeated.nr_days = 2.0;
    repeated.day_weights = None;
    repeated.l_grid = reduced.l_grid.repeat(2);
    for meter in repeated.meters.values_mut() {
        meter.e_c = meter.e_c.repeat(2);
        meter.e_g_factor = meter.e_g_factor.repeat(2);
        meter.l_buy = meter.l_buy.repeat(2);
        meter.l_sell = meter.l_sell.repeat(2);
    }

    let weighted = solve(&reduced).obj_value;
    let expected = solve(&repeated).obj_value;
    assert!(
        approx_eq!(f64, weighted, expected, epsilon = 1e-5),
        "{weighted} != {expected}"
    );
}
