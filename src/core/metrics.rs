use serde::Serialize;

use super::window::Backtest;

const PERIODS_PER_YEAR: f64 = 12.0;

pub fn net_return(ending_value: f64, cost_basis: f64) -> f64 {
    (ending_value - cost_basis) / cost_basis
}

/// Converts a cumulative return over `periods` months to a yearly rate.
pub fn annualized_return(cumulative: f64, periods: usize) -> f64 {
    (1.0 + cumulative).powf(PERIODS_PER_YEAR / periods as f64) - 1.0
}

/// Largest peak-to-trough fall as a non-positive fraction of the peak.
///
/// Leading zeros (nothing invested yet) have no peak and are skipped; a
/// ruined trajectory ends at -1.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = 0.0_f64;
    let mut worst = 0.0_f64;
    for &value in values {
        if value > peak {
            peak = value;
        } else if peak > 0.0 {
            worst = worst.min(value / peak - 1.0);
        }
    }
    worst
}

/// Cross-window distribution of one backtest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestSummary {
    pub horizon: usize,
    pub windows: usize,
    pub undefined_windows: usize,
    pub ruined_windows: usize,
    pub ruin_rate: f64,
    pub p10_ending_value: Option<f64>,
    pub median_ending_value: Option<f64>,
    pub p90_ending_value: Option<f64>,
    pub p10_net_return: Option<f64>,
    pub median_net_return: Option<f64>,
    pub p90_net_return: Option<f64>,
    pub median_annualized_return: Option<f64>,
    pub median_max_drawdown: Option<f64>,
    pub worst_max_drawdown: Option<f64>,
}

pub fn summarize(backtest: &Backtest) -> BacktestSummary {
    let mut ending = Vec::new();
    let mut net = Vec::new();
    let mut drawdowns = Vec::new();
    let mut ruined_windows = 0;

    for window in backtest.windows() {
        ending.push(window.ending_value());
        net.push(window.net_return());
        drawdowns.push(window.max_drawdown());
        if window.is_ruined() {
            ruined_windows += 1;
        }
    }

    let windows = ending.len();
    let median_net_return = percentile(&mut net, 50.0);
    BacktestSummary {
        horizon: backtest.horizon(),
        windows,
        undefined_windows: backtest.len() - windows,
        ruined_windows,
        ruin_rate: if windows == 0 {
            0.0
        } else {
            ruined_windows as f64 / windows as f64
        },
        p10_ending_value: percentile(&mut ending, 10.0),
        median_ending_value: percentile(&mut ending, 50.0),
        p90_ending_value: percentile(&mut ending, 90.0),
        p10_net_return: percentile(&mut net, 10.0),
        median_net_return,
        p90_net_return: percentile(&mut net, 90.0),
        median_annualized_return: median_net_return
            .map(|r| annualized_return(r, backtest.horizon())),
        median_max_drawdown: percentile(&mut drawdowns, 50.0),
        worst_max_drawdown: drawdowns.iter().copied().reduce(f64::min),
    }
}

/// Per window-end difference in net return, `a - b`, where both are defined.
/// Typical use is lump sum against DCA over the same series and horizon.
pub fn compare(a: &Backtest, b: &Backtest) -> Vec<Option<f64>> {
    a.net_returns()
        .into_iter()
        .zip(b.net_returns())
        .map(|pair| match pair {
            (Some(left), Some(right)) => Some(left - right),
            _ => None,
        })
        .collect()
}

fn percentile(values: &mut [f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return Some(values[0]);
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        Some(values[lower])
    } else {
        let w = rank - lower as f64;
        Some(values[lower] * (1.0 - w) + values[upper] * w)
    }
}
