mod accumulation;
mod decumulation;
mod error;
mod metrics;
mod series;
mod types;
mod validation;
mod window;

pub use error::ConfigError;
pub use metrics::{
    BacktestSummary, annualized_return, compare, max_drawdown, net_return, summarize,
};
pub use series::{MarketSeries, forward_fill, returns_from_prices};
pub use types::{
    AccumulationParams, DecumulationParams, Fees, Funding, Strategy, WindowOutcome, WindowStats,
    WindowTrajectory, WindowView, cash_factor,
};
pub use validation::{validate, validate_accumulation, validate_decumulation};
pub use window::{Backtest, run_backtest, simulate_window, window_start};

pub mod simulate {
    //! Single-window entry points per strategy kind.
    pub use super::accumulation::simulate as accumulation;
    pub use super::decumulation::simulate as decumulation;
}
