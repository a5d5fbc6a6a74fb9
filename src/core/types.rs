use serde::Serialize;

const PERIODS_PER_YEAR: i32 = 12;

/// Transaction and holding costs shared by both strategy kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Fees {
    /// Fraction of each deployment (or withdrawal) paid as a fee, in `[0, 1)`.
    pub variable: f64,
    /// Flat fee per deployment or withdrawal event.
    pub fixed: f64,
    /// Annualised drag on invested value, e.g. `0.002` for 0.2 % a year.
    pub annual_holding: f64,
}

impl Fees {
    /// Monthly growth factor for a period return net of the holding fee.
    ///
    /// The annual fee is taken off the annualised return and converted back to
    /// a single period. A total loss (or a fee larger than the annualised
    /// gross factor) clamps to zero growth.
    pub fn growth_factor(&self, period_return: f64) -> f64 {
        let gross = (1.0 + period_return).max(0.0);
        if self.annual_holding == 0.0 {
            return gross;
        }
        (gross.powi(PERIODS_PER_YEAR) - self.annual_holding)
            .max(0.0)
            .powf(1.0 / PERIODS_PER_YEAR as f64)
    }
}

/// Periodic growth of idle cash for an annualised rate quoted in percent.
pub fn cash_factor(annual_rate_percent: f64) -> f64 {
    if annual_rate_percent == 0.0 {
        return 1.0;
    }
    (1.0 + annual_rate_percent / 100.0).powf(1.0 / PERIODS_PER_YEAR as f64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Funding {
    /// Whole amount available at the start of the window. Undeployed capital
    /// sits in cash until its tranche is due.
    Capital { total_investment: f64 },
    /// Fresh cash arriving every period of the contribution schedule.
    Periodic { amount: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccumulationParams {
    pub dca_length: usize,
    pub dca_interval: usize,
    pub horizon: usize,
    pub funding: Funding,
    pub fees: Fees,
    /// Scale each periodic contribution by CPI growth since the window start.
    pub index_contributions: bool,
    /// Report portfolio values in window-start money.
    pub real_values: bool,
}

impl AccumulationParams {
    pub fn lump_sum(total_investment: f64, horizon: usize) -> Self {
        Self {
            dca_length: 1,
            dca_interval: 1,
            horizon,
            funding: Funding::Capital { total_investment },
            fees: Fees::default(),
            index_contributions: false,
            real_values: false,
        }
    }

    pub fn dca(amount: f64, dca_length: usize, horizon: usize) -> Self {
        Self {
            dca_length,
            dca_interval: 1,
            horizon,
            funding: Funding::Periodic { amount },
            fees: Fees::default(),
            index_contributions: false,
            real_values: false,
        }
    }

    /// Principal moved into the market at each deployment event for capital
    /// funding, or the fresh cash of one contribution period for periodic
    /// funding.
    pub fn per_period_amount(&self) -> f64 {
        match self.funding {
            Funding::Capital { total_investment } => {
                total_investment / self.dca_length.div_ceil(self.dca_interval) as f64
            }
            Funding::Periodic { amount } => amount,
        }
    }

    /// Principal of the smallest deployment.
    ///
    /// Capital goes in as equal tranches at the start of each interval.
    /// Periodic cash is deployed per full interval, plus a shorter forced
    /// tranche at the end of the schedule when the length does not divide.
    pub fn smallest_tranche(&self) -> f64 {
        match self.funding {
            Funding::Capital { .. } => self.per_period_amount(),
            Funding::Periodic { amount } => {
                let tail = self.dca_length % self.dca_interval;
                let periods = if tail == 0 { self.dca_interval } else { tail };
                amount * periods as f64
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecumulationParams {
    pub horizon: usize,
    pub withdrawal_interval: usize,
    pub initial_capital: f64,
    pub periodic_withdrawal: f64,
    pub fees: Fees,
    /// Scale each withdrawal by CPI growth since the window start.
    pub index_withdrawals: bool,
    /// Report portfolio values in window-start money.
    pub real_values: bool,
}

impl DecumulationParams {
    pub fn new(initial_capital: f64, periodic_withdrawal: f64, horizon: usize) -> Self {
        Self {
            horizon,
            withdrawal_interval: 1,
            initial_capital,
            periodic_withdrawal,
            fees: Fees::default(),
            index_withdrawals: false,
            real_values: false,
        }
    }

    /// Withdrawal taken at each event before CPI scaling and fees.
    pub fn base_withdrawal(&self) -> f64 {
        self.periodic_withdrawal * self.withdrawal_interval as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    Accumulation(AccumulationParams),
    Decumulation(DecumulationParams),
}

impl Strategy {
    pub fn horizon(&self) -> usize {
        match self {
            Strategy::Accumulation(params) => params.horizon,
            Strategy::Decumulation(params) => params.horizon,
        }
    }

    pub fn real_values(&self) -> bool {
        match self {
            Strategy::Accumulation(params) => params.real_values,
            Strategy::Decumulation(params) => params.real_values,
        }
    }
}

/// Cash-flow totals recorded alongside one window's trajectory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    /// Money put in: contributions for accumulation, starting capital for
    /// decumulation.
    pub contributed: f64,
    /// `contributed` expressed in window-start money.
    pub contributed_real: f64,
    /// Withdrawals actually taken, fees included.
    pub withdrawn: f64,
    /// Offset at which the balance was exhausted.
    pub ruined_at: Option<usize>,
    /// Whether the trajectory is deflated by CPI.
    pub real_values: bool,
}

impl WindowStats {
    pub fn cost_basis(&self) -> f64 {
        if self.real_values {
            self.contributed_real
        } else {
            self.contributed
        }
    }
}

/// One simulated window, owned.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowTrajectory {
    pub window_end: usize,
    pub values: Vec<f64>,
    pub stats: WindowStats,
}

impl WindowTrajectory {
    pub fn view(&self) -> WindowView<'_> {
        WindowView {
            window_end: self.window_end,
            values: &self.values,
            stats: &self.stats,
        }
    }
}

/// Result for a single requested window end.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowOutcome {
    /// Not enough history before the window end (or past the series end).
    Undefined,
    Complete(WindowTrajectory),
}

impl WindowOutcome {
    pub fn trajectory(&self) -> Option<&WindowTrajectory> {
        match self {
            WindowOutcome::Undefined => None,
            WindowOutcome::Complete(trajectory) => Some(trajectory),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, WindowOutcome::Undefined)
    }
}

/// Borrowed view of one window inside a [`crate::core::Backtest`].
#[derive(Debug, Clone, Copy)]
pub struct WindowView<'a> {
    pub window_end: usize,
    pub values: &'a [f64],
    pub stats: &'a WindowStats,
}

impl WindowView<'_> {
    pub fn ending_value(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }

    pub fn net_return(&self) -> f64 {
        super::metrics::net_return(self.ending_value(), self.stats.cost_basis())
    }

    pub fn max_drawdown(&self) -> f64 {
        super::metrics::max_drawdown(self.values)
    }

    pub fn is_ruined(&self) -> bool {
        self.stats.ruined_at.is_some()
    }
}
