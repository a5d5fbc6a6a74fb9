use super::error::ConfigError;
use super::series::MarketSeries;
use super::types::{DecumulationParams, WindowOutcome, WindowStats, WindowTrajectory};
use super::validation::validate_decumulation;
use super::window::{deflate_to_window_start, window_start};

/// Simulates one withdrawal window ending at `window_end`.
pub fn simulate(
    market: &MarketSeries,
    params: &DecumulationParams,
    window_end: usize,
) -> Result<WindowOutcome, ConfigError> {
    validate_decumulation(params, market)?;
    Ok(simulate_validated(market, params, window_end))
}

pub(crate) fn simulate_validated(
    market: &MarketSeries,
    params: &DecumulationParams,
    window_end: usize,
) -> WindowOutcome {
    let Some(start) = window_start(market.len(), params.horizon, window_end) else {
        return WindowOutcome::Undefined;
    };
    let mut values = vec![0.0; params.horizon];
    let stats = fill_window(market, params, start, &mut values);
    WindowOutcome::Complete(WindowTrajectory {
        window_end,
        values,
        stats,
    })
}

/// Withdraws on interval boundaries and grows what is left.
///
/// Ruin is absorbing: once a withdrawal leaves nothing, every remaining
/// offset is zero and no further periods are evaluated. There is no forced
/// withdrawal on the last period.
pub(crate) fn fill_window(
    market: &MarketSeries,
    params: &DecumulationParams,
    start: usize,
    out: &mut [f64],
) -> WindowStats {
    debug_assert_eq!(out.len(), params.horizon);
    let returns = market.returns();
    let fees = params.fees;
    let withdrawals = withdrawal_schedule(market, params, start);

    let mut balance = params.initial_capital;
    let mut withdrawn = 0.0;
    let mut ruined_at = None;

    for k in 0..params.horizon {
        if k % params.withdrawal_interval == 0 {
            let amount = withdrawals[k];
            if balance - amount <= 0.0 {
                withdrawn += balance;
                out[k..].fill(0.0);
                ruined_at = Some(k);
                break;
            }
            balance -= amount;
            withdrawn += amount;
        }
        balance *= fees.growth_factor(returns[start + k + 1]);
        out[k] = balance;
    }

    if params.real_values {
        deflate_to_window_start(market, start, out);
    }

    WindowStats {
        contributed: params.initial_capital,
        contributed_real: params.initial_capital,
        withdrawn,
        ruined_at,
        real_values: params.real_values,
    }
}

/// Gross amount leaving the portfolio at each offset, fees included. Only the
/// offsets on interval boundaries are ever drawn.
fn withdrawal_schedule(
    market: &MarketSeries,
    params: &DecumulationParams,
    start: usize,
) -> Vec<f64> {
    let base = params.base_withdrawal();
    let fees = params.fees;
    (0..params.horizon)
        .map(|k| {
            let scaled = if params.index_withdrawals {
                base * market.price_ratio(start, start + k)
            } else {
                base
            };
            scaled * (1.0 + fees.variable) + fees.fixed
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Fees;
    use proptest::collection::vec;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn trajectory(outcome: WindowOutcome) -> WindowTrajectory {
        match outcome {
            WindowOutcome::Complete(trajectory) => trajectory,
            WindowOutcome::Undefined => panic!("expected a complete window"),
        }
    }

    #[test]
    fn third_withdrawal_exhausts_the_balance() {
        let market = MarketSeries::new(vec![0.0; 6]).expect("valid returns");
        let params = DecumulationParams::new(100.0, 40.0, 3);

        let window = trajectory(simulate(&market, &params, 3).expect("valid params"));
        assert_eq!(window.values, vec![60.0, 20.0, 0.0]);
        assert_eq!(window.stats.ruined_at, Some(2));
        assert_approx(window.stats.withdrawn, 100.0);
    }

    #[test]
    fn exact_depletion_counts_as_ruin() {
        let market = MarketSeries::new(vec![0.0; 3]).expect("valid returns");
        let params = DecumulationParams::new(100.0, 50.0, 2);

        let window = trajectory(simulate(&market, &params, 2).expect("valid params"));
        assert_eq!(window.values, vec![50.0, 0.0]);
        assert_eq!(window.stats.ruined_at, Some(1));
    }

    #[test]
    fn surviving_window_has_no_ruin_marker() {
        let market = MarketSeries::new(vec![0.0, 0.10, 0.10, 0.10]).expect("valid returns");
        let params = DecumulationParams::new(1_000.0, 100.0, 3);

        let window = trajectory(simulate(&market, &params, 3).expect("valid params"));
        // (1000 - 100) * 1.1 = 990; (990 - 100) * 1.1 = 979; (979 - 100) * 1.1 = 966.9
        assert_approx(window.values[0], 990.0);
        assert_approx(window.values[1], 979.0);
        assert_approx(window.values[2], 966.9);
        assert_eq!(window.stats.ruined_at, None);
        assert!(!window.view().is_ruined());
    }

    #[test]
    fn withdrawals_happen_only_on_interval_boundaries() {
        let market = MarketSeries::new(vec![0.0; 6]).expect("valid returns");
        let mut params = DecumulationParams::new(1_000.0, 10.0, 5);
        params.withdrawal_interval = 2;

        let window = trajectory(simulate(&market, &params, 5).expect("valid params"));
        // 20 leaves at offsets 0, 2 and 4; nothing is forced on the last period.
        assert_eq!(window.values, vec![980.0, 980.0, 960.0, 960.0, 940.0]);
        assert_approx(window.stats.withdrawn, 60.0);
    }

    #[test]
    fn withdrawal_fees_increase_the_amount_taken() {
        let market = MarketSeries::new(vec![0.0; 3]).expect("valid returns");
        let mut params = DecumulationParams::new(1_000.0, 100.0, 2);
        params.fees = Fees {
            variable: 0.01,
            fixed: 2.0,
            annual_holding: 0.0,
        };

        let window = trajectory(simulate(&market, &params, 2).expect("valid params"));
        // 100 * 1.01 + 2 = 103 per withdrawal.
        assert_approx(window.values[0], 897.0);
        assert_approx(window.values[1], 794.0);
    }

    #[test]
    fn indexed_withdrawals_follow_cpi() {
        let market = MarketSeries::new(vec![0.0; 4])
            .and_then(|m| m.with_cpi(vec![100.0, 110.0, 121.0, 121.0]))
            .expect("valid series");
        let mut params = DecumulationParams::new(1_000.0, 100.0, 3);
        params.index_withdrawals = true;

        let window = trajectory(simulate(&market, &params, 3).expect("valid params"));
        assert_approx(window.values[0], 900.0);
        assert_approx(window.values[1], 790.0);
        assert_approx(window.values[2], 669.0);
    }

    #[test]
    fn real_values_deflate_balances_and_keep_ruin_at_zero() {
        let market = MarketSeries::new(vec![0.0; 4])
            .and_then(|m| m.with_cpi(vec![100.0, 110.0, 121.0, 125.0]))
            .expect("valid series");
        let mut params = DecumulationParams::new(100.0, 40.0, 3);
        params.real_values = true;

        let window = trajectory(simulate(&market, &params, 3).expect("valid params"));
        assert_approx(window.values[0], 60.0 / 1.1);
        assert_approx(window.values[1], 20.0 / 1.21);
        assert_eq!(window.values[2], 0.0);
        assert_eq!(window.stats.ruined_at, Some(2));
        assert!(window.stats.real_values);
    }

    #[test]
    fn short_history_is_undefined_not_ruin() {
        let market = MarketSeries::new(vec![0.0; 3]).expect("valid returns");
        let params = DecumulationParams::new(100.0, 40.0, 3);
        assert!(simulate(&market, &params, 2).expect("valid").is_undefined());
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_ruin_is_absorbing(
            returns in vec(-0.1f64..0.3, 2..48),
            horizon_seed in 0usize..48,
            interval_seed in 0usize..12,
            capital in 100.0f64..10_000.0,
            withdrawal in 1.0f64..2_000.0,
            holding in 0.0f64..0.05,
        ) {
            let n = returns.len();
            let horizon = 1 + horizon_seed % (n - 1);
            let interval = 1 + interval_seed % horizon;
            let market = MarketSeries::new(returns).expect("valid returns");
            let mut params = DecumulationParams::new(capital, withdrawal, horizon);
            params.withdrawal_interval = interval;
            params.fees.annual_holding = holding;

            for window_end in horizon..n {
                let window = trajectory(simulate(&market, &params, window_end).expect("valid"));
                prop_assert_eq!(window.values.len(), horizon);
                prop_assert!(window.values.iter().all(|v| *v >= 0.0 && v.is_finite()));
                match window.stats.ruined_at {
                    Some(k) => {
                        prop_assert!(window.values[k..].iter().all(|v| *v == 0.0));
                        prop_assert!(window.values[..k].iter().all(|v| *v > 0.0));
                    }
                    None => prop_assert!(window.values.iter().all(|v| *v > 0.0)),
                }
            }
        }
    }
}
