use super::error::ConfigError;
use super::series::MarketSeries;
use super::types::{
    AccumulationParams, Funding, WindowOutcome, WindowStats, WindowTrajectory, cash_factor,
};
use super::validation::validate_accumulation;
use super::window::{deflate_to_window_start, window_start};

/// Simulates one accumulation window ending at `window_end`.
pub fn simulate(
    market: &MarketSeries,
    params: &AccumulationParams,
    window_end: usize,
) -> Result<WindowOutcome, ConfigError> {
    validate_accumulation(params, market)?;
    Ok(simulate_validated(market, params, window_end))
}

pub(crate) fn simulate_validated(
    market: &MarketSeries,
    params: &AccumulationParams,
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

/// Replays the contribution schedule and hold phase of the window starting at
/// `start`, writing one invested value per period into `out`.
///
/// Capital goes in as equal tranches at the start of each interval, each one
/// carrying the interest earned by the idle remainder since the previous
/// tranche. Periodic cash accumulates and is deployed at the end of each
/// interval, and always on the final contribution period. Idle cash then
/// earns interest and the invested position grows by the fee-adjusted
/// return of the period. `out` must hold `params.horizon` values and
/// `start + params.horizon` must be a valid index into `market`.
pub(crate) fn fill_window(
    market: &MarketSeries,
    params: &AccumulationParams,
    start: usize,
    out: &mut [f64],
) -> WindowStats {
    debug_assert_eq!(out.len(), params.horizon);
    let returns = market.returns();
    let fees = params.fees;
    let interval = params.dca_interval;
    let per_period = params.per_period_amount();
    let last = params.dca_length - 1;

    // For capital, `undeployed` is the principal still waiting for its
    // tranche; `cash` is that principal plus the interest it has earned.
    let (mut cash, mut undeployed, mut contributed) = match params.funding {
        Funding::Capital { total_investment } => {
            (total_investment, total_investment, total_investment)
        }
        Funding::Periodic { .. } => (0.0, 0.0, 0.0),
    };
    let mut contributed_real = contributed;
    let mut invested = 0.0;

    for (k, slot) in out[..params.dca_length].iter_mut().enumerate() {
        let t = start + k;
        match params.funding {
            Funding::Capital { .. } => {
                if k % interval == 0 {
                    undeployed = if k + interval > last {
                        0.0
                    } else {
                        undeployed - per_period
                    };
                    invested += (cash - undeployed) * (1.0 - fees.variable) - fees.fixed;
                    cash = undeployed;
                }
            }
            Funding::Periodic { .. } => {
                let price_ratio = market.price_ratio(start, t);
                let amount = if params.index_contributions {
                    per_period * price_ratio
                } else {
                    per_period
                };
                cash += amount;
                contributed += amount;
                contributed_real += amount / price_ratio;

                if (k + 1) % interval == 0 || k == last {
                    invested += cash * (1.0 - fees.variable) - fees.fixed;
                    cash = 0.0;
                }
            }
        }

        cash *= cash_factor(market.rate_at(t + 1));
        invested *= fees.growth_factor(returns[t + 1]);
        *slot = invested;
    }

    for (k, slot) in out.iter_mut().enumerate().skip(params.dca_length) {
        invested *= fees.growth_factor(returns[start + k + 1]);
        *slot = invested;
    }

    if params.real_values {
        deflate_to_window_start(market, start, out);
    }

    WindowStats {
        contributed,
        contributed_real,
        withdrawn: 0.0,
        ruined_at: None,
        real_values: params.real_values,
    }
}
