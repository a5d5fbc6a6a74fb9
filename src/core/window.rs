use rayon::prelude::*;
use tracing::debug;

use super::error::ConfigError;
use super::series::MarketSeries;
use super::types::{Strategy, WindowOutcome, WindowStats, WindowTrajectory, WindowView};
use super::validation::{validate, warn_coarse_interval};
use super::{accumulation, decumulation};

/// Start offset of the window ending at `window_end`, if it has `horizon`
/// periods of history and lies inside the series.
pub fn window_start(len: usize, horizon: usize, window_end: usize) -> Option<usize> {
    (horizon <= window_end && window_end < len).then(|| window_end - horizon)
}

/// Expresses each recorded value in window-start money, using the price level
/// at the end of the period it was recorded for.
pub(crate) fn deflate_to_window_start(market: &MarketSeries, start: usize, out: &mut [f64]) {
    for (k, value) in out.iter_mut().enumerate() {
        *value /= market.price_ratio(start, start + k + 1);
    }
}

/// Validates `strategy` and simulates a single window.
pub fn simulate_window(
    market: &MarketSeries,
    strategy: &Strategy,
    window_end: usize,
) -> Result<WindowOutcome, ConfigError> {
    validate(strategy, market)?;
    Ok(match strategy {
        Strategy::Accumulation(params) => {
            accumulation::simulate_validated(market, params, window_end)
        }
        Strategy::Decumulation(params) => {
            decumulation::simulate_validated(market, params, window_end)
        }
    })
}

/// Every window of one strategy over one series.
///
/// Trajectories live in a single row-major buffer of `len × horizon` values;
/// row `i` belongs to the window ending at `i`. Rows without enough history
/// are NaN and have no stats.
#[derive(Debug, Clone, PartialEq)]
pub struct Backtest {
    horizon: usize,
    values: Vec<f64>,
    stats: Vec<Option<WindowStats>>,
}

impl Backtest {
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Number of window ends, i.e. the series length.
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn defined_windows(&self) -> usize {
        self.stats.iter().filter(|s| s.is_some()).count()
    }

    /// Raw trajectory row for `window_end`; NaN when the window is undefined.
    pub fn row(&self, window_end: usize) -> Option<&[f64]> {
        if window_end >= self.len() {
            return None;
        }
        let from = window_end * self.horizon;
        Some(&self.values[from..from + self.horizon])
    }

    pub fn window(&self, window_end: usize) -> Option<WindowView<'_>> {
        let stats = self.stats.get(window_end)?.as_ref()?;
        let values = self.row(window_end)?;
        Some(WindowView {
            window_end,
            values,
            stats,
        })
    }

    pub fn outcome(&self, window_end: usize) -> WindowOutcome {
        match self.window(window_end) {
            Some(view) => WindowOutcome::Complete(WindowTrajectory {
                window_end,
                values: view.values.to_vec(),
                stats: *view.stats,
            }),
            None => WindowOutcome::Undefined,
        }
    }

    /// Defined windows in ascending window-end order.
    pub fn windows(&self) -> impl Iterator<Item = WindowView<'_>> + '_ {
        (0..self.len()).filter_map(|window_end| self.window(window_end))
    }

    pub fn ending_values(&self) -> Vec<Option<f64>> {
        (0..self.len())
            .map(|i| self.window(i).map(|w| w.ending_value()))
            .collect()
    }

    pub fn net_returns(&self) -> Vec<Option<f64>> {
        (0..self.len())
            .map(|i| self.window(i).map(|w| w.net_return()))
            .collect()
    }
}

/// Simulates every window end in `[horizon, len)`.
///
/// Parameters are validated once up front; a bad configuration aborts the
/// whole batch before any window runs. Windows are independent and are
/// filled in parallel, each into its own row of the output buffer.
pub fn run_backtest(market: &MarketSeries, strategy: &Strategy) -> Result<Backtest, ConfigError> {
    validate(strategy, market)?;
    warn_coarse_interval(strategy);

    let horizon = strategy.horizon();
    let len = market.len();
    let mut values = vec![f64::NAN; len * horizon];
    let mut stats: Vec<Option<WindowStats>> = vec![None; len];

    values
        .par_chunks_mut(horizon)
        .zip(stats.par_iter_mut())
        .enumerate()
        .skip(horizon)
        .for_each(|(window_end, (row, slot))| {
            let start = window_end - horizon;
            let window_stats = match strategy {
                Strategy::Accumulation(params) => {
                    accumulation::fill_window(market, params, start, row)
                }
                Strategy::Decumulation(params) => {
                    decumulation::fill_window(market, params, start, row)
                }
            };
            *slot = Some(window_stats);
        });

    debug!(
        periods = len,
        horizon,
        windows = len.saturating_sub(horizon),
        "backtest complete"
    );

    Ok(Backtest {
        horizon,
        values,
        stats,
    })
}
