//! Fixtures for tests
use crate::backpack::Backpack;
use crate::meter::Meter;
use crate::optimisation::run_collective_pool_milp;
use crate::optimisation::solver::{HighsSolver, MilpStatus};
use crate::outputs::PoolOutputs;
use crate::units::{Energy, Hours, Power};
use indexmap::indexmap;
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!($result.unwrap_err().to_string(), $msg);
    };
}
pub(crate) use assert_error;

/// A meter with a small battery over four six-hour steps
#[fixture]
pub fn meter() -> Meter {
    Meter {
        e_c: vec![1.0, 3.0, 2.0, 4.0],
        e_g_factor: vec![0.0, 1.5, 2.0, 0.0],
        l_buy: vec![0.15, 0.2, 0.2, 0.25],
        l_sell: vec![0.04, 0.05, 0.05, 0.04],
        l_cont: 0.1,
        l_gic: 0.01,
        l_bic: 0.02,
        p_meter_max: Power(10.0),
        p_gn_init: Power(2.0),
        p_gn_min: None,
        p_gn_max: None,
        e_bn_init: Energy(5.0),
        e_bn_min: None,
        e_bn_max: None,
        soc_min: 0.2,
        soc_max: 1.0,
        eff_bc: 0.95,
        eff_bd: 0.95,
    }
}

/// A single day community with one meter
#[fixture]
pub fn backpack(meter: Meter) -> Backpack {
    Backpack {
        nr_days: 1.0,
        delta_t: Hours(6.0),
        l_grid: vec![0.01, 0.02, 0.02, 0.01],
        storage_ratio: 1.0,
        strict_pos_coeffs: false,
        total_share_coeffs: true,
        day_weights: None,
        nominal_daily_cycles: 1.0,
        meters: indexmap! {"CPE#1".into() => meter},
    }
}

/// The outputs of optimising the [`backpack`] fixture
#[fixture]
pub fn pool_outputs(backpack: Backpack) -> PoolOutputs {
    let outputs = run_collective_pool_milp(&backpack, &HighsSolver::default()).unwrap();
    assert_eq!(outputs.milp_status, MilpStatus::Optimal);

    outputs
}
