use super::error::ConfigError;

/// Aligned per-period inputs shared read-only by every window.
///
/// `returns[t]` is the fractional return realised during the period ending at
/// `t`; index 0 has no prior period and is never read. `rates` are annualised
/// percentages and `cpi` is a price level, both indexed like `returns`.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSeries {
    returns: Vec<f64>,
    rates: Option<Vec<f64>>,
    cpi: Option<Vec<f64>>,
}

impl MarketSeries {
    pub fn new(returns: Vec<f64>) -> Result<Self, ConfigError> {
        for (index, &value) in returns.iter().enumerate().skip(1) {
            if !value.is_finite() || value < -1.0 {
                return Err(ConfigError::InvalidValue {
                    name: "returns",
                    index,
                    value,
                });
            }
        }
        Ok(Self {
            returns,
            rates: None,
            cpi: None,
        })
    }

    pub fn from_prices(prices: &[f64]) -> Result<Self, ConfigError> {
        Self::new(returns_from_prices(prices)?)
    }

    /// Annualised cash rates in percent. A rate of -100 or below would wipe
    /// out idle cash and is rejected.
    pub fn with_rates(mut self, rates: Vec<f64>) -> Result<Self, ConfigError> {
        self.check_length("rates", rates.len())?;
        if let Some((index, &value)) = rates
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v <= -100.0)
        {
            return Err(ConfigError::InvalidValue {
                name: "rates",
                index,
                value,
            });
        }
        self.rates = Some(rates);
        Ok(self)
    }

    pub fn with_cpi(mut self, cpi: Vec<f64>) -> Result<Self, ConfigError> {
        self.check_length("cpi", cpi.len())?;
        if let Some((index, &value)) = cpi
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v <= 0.0)
        {
            return Err(ConfigError::InvalidValue {
                name: "cpi",
                index,
                value,
            });
        }
        self.cpi = Some(cpi);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    pub fn returns(&self) -> &[f64] {
        &self.returns
    }

    pub fn rates(&self) -> Option<&[f64]> {
        self.rates.as_deref()
    }

    pub fn cpi(&self) -> Option<&[f64]> {
        self.cpi.as_deref()
    }

    /// Annualised cash rate for index `t`, zero when no rate series is set.
    pub(crate) fn rate_at(&self, t: usize) -> f64 {
        self.rates.as_ref().map_or(0.0, |rates| rates[t])
    }

    /// Price level at `t` relative to `base`; 1 when no CPI series is set.
    pub(crate) fn price_ratio(&self, base: usize, t: usize) -> f64 {
        self.cpi.as_ref().map_or(1.0, |cpi| cpi[t] / cpi[base])
    }

    fn check_length(&self, name: &'static str, actual: usize) -> Result<(), ConfigError> {
        if actual != self.returns.len() {
            return Err(ConfigError::LengthMismatch {
                name,
                expected: self.returns.len(),
                actual,
            });
        }
        Ok(())
    }
}

/// Periodic fractional returns of a price index. The first entry is zero.
pub fn returns_from_prices(prices: &[f64]) -> Result<Vec<f64>, ConfigError> {
    if let Some((index, &value)) = prices
        .iter()
        .enumerate()
        .find(|(_, p)| !p.is_finite() || **p <= 0.0)
    {
        return Err(ConfigError::InvalidValue {
            name: "prices",
            index,
            value,
        });
    }

    let mut returns = Vec::with_capacity(prices.len());
    if !prices.is_empty() {
        returns.push(0.0);
    }
    returns.extend(prices.windows(2).map(|pair| pair[1] / pair[0] - 1.0));
    Ok(returns)
}

/// Fills gaps with the last known value; gaps before the first observation
/// take `leading`.
pub fn forward_fill(values: &[Option<f64>], leading: f64) -> Vec<f64> {
    let mut last = leading;
    values
        .iter()
        .map(|value| {
            if let Some(v) = value {
                last = *v;
            }
            last
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn returns_from_prices_starts_at_zero() {
        let returns = returns_from_prices(&[100.0, 110.0, 99.0]).expect("valid prices");
        assert_eq!(returns.len(), 3);
        assert_eq!(returns[0], 0.0);
        assert_approx(returns[1], 0.10);
        assert_approx(returns[2], -0.10);
    }

    #[test]
    fn returns_from_prices_handles_empty_input() {
        assert!(returns_from_prices(&[]).expect("empty is fine").is_empty());
    }

    #[test]
    fn returns_from_prices_rejects_non_positive_prices() {
        let err = returns_from_prices(&[100.0, 0.0]).expect_err("zero price");
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                name: "prices",
                index: 1,
                value: 0.0
            }
        );
    }

    #[test]
    fn forward_fill_carries_last_value_and_uses_leading_default() {
        let filled = forward_fill(&[None, Some(2.0), None, None, Some(3.5), None], 0.0);
        assert_eq!(filled, vec![0.0, 2.0, 2.0, 2.0, 3.5, 3.5]);
    }

    #[test]
    fn market_series_rejects_misaligned_auxiliary_series() {
        let market = MarketSeries::new(vec![0.0, 0.01, 0.02]).expect("valid returns");
        let err = market
            .clone()
            .with_rates(vec![1.0, 1.0])
            .expect_err("short rates");
        assert!(matches!(
            err,
            ConfigError::LengthMismatch {
                name: "rates",
                expected: 3,
                actual: 2
            }
        ));

        let err = market.with_cpi(vec![100.0, -1.0, 101.0]).expect_err("bad cpi");
        assert!(matches!(err, ConfigError::InvalidValue { name: "cpi", index: 1, .. }));
    }

    #[test]
    fn market_series_rejects_rates_that_wipe_out_cash() {
        let market = MarketSeries::new(vec![0.0, 0.01, 0.02]).expect("valid returns");
        let err = market
            .clone()
            .with_rates(vec![1.0, -100.0, 2.0])
            .expect_err("rate of -100%");
        assert!(matches!(err, ConfigError::InvalidValue { name: "rates", index: 1, .. }));

        let market = market.with_rates(vec![-0.5, 0.0, 5.0]).expect("negative rates are fine");
        assert_eq!(market.rates(), Some(&[-0.5, 0.0, 5.0][..]));
    }

    #[test]
    fn market_series_ignores_undefined_first_return() {
        let market = MarketSeries::new(vec![f64::NAN, 0.01]).expect("index 0 is never read");
        assert_eq!(market.len(), 2);

        let err = MarketSeries::new(vec![0.0, f64::INFINITY]).expect_err("non-finite return");
        assert!(matches!(err, ConfigError::InvalidValue { name: "returns", index: 1, .. }));
    }

    #[test]
    fn missing_auxiliary_series_default_to_neutral_values() {
        let market = MarketSeries::new(vec![0.0, 0.01]).expect("valid returns");
        assert_eq!(market.rate_at(1), 0.0);
        assert_eq!(market.price_ratio(0, 1), 1.0);

        let market = market.with_cpi(vec![100.0, 102.0]).expect("valid cpi");
        assert_approx(market.price_ratio(0, 1), 1.02);
    }
}
