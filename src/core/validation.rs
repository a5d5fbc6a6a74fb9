use tracing::warn;

use super::error::ConfigError;
use super::series::MarketSeries;
use super::types::{AccumulationParams, DecumulationParams, Fees, Funding, Strategy};

/// Checks a strategy against the series it will run on.
///
/// Called once per batch before any window is simulated.
pub fn validate(strategy: &Strategy, market: &MarketSeries) -> Result<(), ConfigError> {
    match strategy {
        Strategy::Accumulation(params) => validate_accumulation(params, market),
        Strategy::Decumulation(params) => validate_decumulation(params, market),
    }
}

pub fn validate_accumulation(
    params: &AccumulationParams,
    market: &MarketSeries,
) -> Result<(), ConfigError> {
    if params.horizon == 0 {
        return Err(ConfigError::ZeroHorizon);
    }
    if params.dca_length == 0 {
        return Err(ConfigError::ZeroDcaLength);
    }
    if params.dca_interval == 0 {
        return Err(ConfigError::ZeroInterval { name: "DCA" });
    }
    if params.dca_interval > params.dca_length {
        return Err(ConfigError::IntervalExceedsLength {
            interval: params.dca_interval,
            length: params.dca_length,
        });
    }
    if params.horizon < params.dca_length {
        return Err(ConfigError::HorizonShorterThanSchedule {
            horizon: params.horizon,
            length: params.dca_length,
        });
    }

    match params.funding {
        Funding::Capital { total_investment } => {
            positive("total investment", total_investment)?;
            if params.index_contributions {
                return Err(ConfigError::IndexedCapital);
            }
        }
        Funding::Periodic { amount } => positive("periodic amount", amount)?,
    }

    validate_fees(&params.fees)?;
    let smallest = params.smallest_tranche();
    if params.fees.fixed >= smallest {
        return Err(ConfigError::FixedFeeTooLarge {
            fee: params.fees.fixed,
            amount: smallest,
        });
    }

    if (params.index_contributions || params.real_values) && market.cpi().is_none() {
        return Err(ConfigError::MissingCpi);
    }

    Ok(())
}

/// True when deployments are so sparse that each window sees only a couple of
/// them, which makes cross-window figures unrepresentative.
pub(crate) fn has_coarse_interval(params: &AccumulationParams) -> bool {
    params.dca_length > 1 && params.dca_interval as f64 >= params.horizon as f64 / 2.0
}

/// Logs the coarse-interval warning. Emitted once per batch, not per window.
pub(crate) fn warn_coarse_interval(strategy: &Strategy) {
    let Strategy::Accumulation(params) = strategy else {
        return;
    };
    if has_coarse_interval(params) {
        warn!(
            dca_interval = params.dca_interval,
            horizon = params.horizon,
            "DCA interval is large relative to the horizon; figures may not be representative"
        );
    }
}

pub fn validate_decumulation(
    params: &DecumulationParams,
    market: &MarketSeries,
) -> Result<(), ConfigError> {
    if params.horizon == 0 {
        return Err(ConfigError::ZeroHorizon);
    }
    if params.withdrawal_interval == 0 {
        return Err(ConfigError::ZeroInterval { name: "withdrawal" });
    }
    if params.withdrawal_interval > params.horizon {
        return Err(ConfigError::IntervalExceedsHorizon {
            interval: params.withdrawal_interval,
            horizon: params.horizon,
        });
    }

    positive("initial capital", params.initial_capital)?;
    positive("periodic withdrawal", params.periodic_withdrawal)?;
    validate_fees(&params.fees)?;

    let base = params.base_withdrawal();
    if params.fees.fixed >= base {
        return Err(ConfigError::FixedFeeTooLarge {
            fee: params.fees.fixed,
            amount: base,
        });
    }

    if (params.index_withdrawals || params.real_values) && market.cpi().is_none() {
        return Err(ConfigError::MissingCpi);
    }

    Ok(())
}

fn validate_fees(fees: &Fees) -> Result<(), ConfigError> {
    if !(0.0..1.0).contains(&fees.variable) {
        return Err(ConfigError::OutOfRange {
            name: "variable fee",
            range: "[0, 1)",
            value: fees.variable,
        });
    }
    if !fees.fixed.is_finite() || fees.fixed < 0.0 {
        return Err(ConfigError::OutOfRange {
            name: "fixed fee",
            range: "[0, inf)",
            value: fees.fixed,
        });
    }
    if !fees.annual_holding.is_finite() || fees.annual_holding < 0.0 {
        return Err(ConfigError::OutOfRange {
            name: "annual holding fee",
            range: "[0, inf)",
            value: fees.annual_holding,
        });
    }
    Ok(())
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::OutOfRange {
            name,
            range: "(0, inf)",
            value,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_market(periods: usize) -> MarketSeries {
        MarketSeries::new(vec![0.0; periods]).expect("valid returns")
    }

    #[test]
    fn interval_longer_than_schedule_is_rejected() {
        let mut params = AccumulationParams::dca(100.0, 2, 4);
        params.dca_interval = 3;
        let err = validate_accumulation(&params, &flat_market(8)).expect_err("interval > length");
        assert_eq!(
            err,
            ConfigError::IntervalExceedsLength {
                interval: 3,
                length: 2
            }
        );
    }

    #[test]
    fn horizon_shorter_than_schedule_is_rejected() {
        let params = AccumulationParams::dca(100.0, 6, 3);
        let err = validate_accumulation(&params, &flat_market(8)).expect_err("horizon < length");
        assert!(matches!(err, ConfigError::HorizonShorterThanSchedule { .. }));
    }

    #[test]
    fn fixed_fee_must_be_below_smallest_tranche() {
        let mut params = AccumulationParams::dca(100.0, 5, 5);
        params.dca_interval = 2;
        params.fees.fixed = 100.0;
        // Tranches are 200, 200 and a forced final 100.
        let err = validate_accumulation(&params, &flat_market(8)).expect_err("fee eats tranche");
        assert_eq!(
            err,
            ConfigError::FixedFeeTooLarge {
                fee: 100.0,
                amount: 100.0
            }
        );

        params.fees.fixed = 99.0;
        assert!(validate_accumulation(&params, &flat_market(8)).is_ok());
    }

    #[test]
    fn fixed_fee_must_be_below_base_withdrawal() {
        let mut params = DecumulationParams::new(1_000.0, 40.0, 3);
        params.fees.fixed = 40.0;
        let err = validate_decumulation(&params, &flat_market(8)).expect_err("fee >= withdrawal");
        assert!(matches!(err, ConfigError::FixedFeeTooLarge { .. }));
    }

    #[test]
    fn coarse_interval_is_flagged_but_valid() {
        let mut params = AccumulationParams::dca(100.0, 6, 8);
        params.dca_interval = 4;
        assert!(has_coarse_interval(&params));
        assert!(validate_accumulation(&params, &flat_market(10)).is_ok());

        params.dca_interval = 3;
        assert!(!has_coarse_interval(&params));

        // A single deployment is never flagged.
        assert!(!has_coarse_interval(&AccumulationParams::lump_sum(1_000.0, 1)));
    }

    #[test]
    fn variable_fee_outside_unit_interval_is_rejected() {
        let mut params = AccumulationParams::lump_sum(1_000.0, 3);
        params.fees.variable = 1.0;
        let err = validate_accumulation(&params, &flat_market(8)).expect_err("variable fee 100%");
        assert!(matches!(err, ConfigError::OutOfRange { name: "variable fee", .. }));
    }

    #[test]
    fn inflation_flags_require_cpi() {
        let mut params = AccumulationParams::dca(100.0, 3, 3);
        params.real_values = true;
        assert_eq!(
            validate_accumulation(&params, &flat_market(8)),
            Err(ConfigError::MissingCpi)
        );

        let market = flat_market(8).with_cpi(vec![100.0; 8]).expect("valid cpi");
        assert!(validate_accumulation(&params, &market).is_ok());

        let mut params = DecumulationParams::new(1_000.0, 10.0, 3);
        params.index_withdrawals = true;
        assert_eq!(
            validate_decumulation(&params, &flat_market(8)),
            Err(ConfigError::MissingCpi)
        );
    }

    #[test]
    fn indexed_contributions_need_periodic_funding() {
        let mut params = AccumulationParams::lump_sum(1_000.0, 3);
        params.index_contributions = true;
        let market = flat_market(8).with_cpi(vec![100.0; 8]).expect("valid cpi");
        assert_eq!(
            validate_accumulation(&params, &market),
            Err(ConfigError::IndexedCapital)
        );
    }

    #[test]
    fn zero_lengths_are_rejected() {
        let mut params = AccumulationParams::dca(100.0, 0, 3);
        assert_eq!(
            validate_accumulation(&params, &flat_market(8)),
            Err(ConfigError::ZeroDcaLength)
        );
        params.dca_length = 1;
        params.horizon = 0;
        assert_eq!(
            validate_accumulation(&params, &flat_market(8)),
            Err(ConfigError::ZeroHorizon)
        );

        let mut params = DecumulationParams::new(100.0, 10.0, 3);
        params.withdrawal_interval = 0;
        assert!(matches!(
            validate_decumulation(&params, &flat_market(8)),
            Err(ConfigError::ZeroInterval { .. })
        ));
    }
}
