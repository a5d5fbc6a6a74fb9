use thiserror::Error;

/// Problems with strategy parameters or input series.
///
/// Always raised before any window is simulated; a batch either runs in full
/// or not at all.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("horizon must be > 0")]
    ZeroHorizon,

    #[error("DCA length must be > 0; use dca_length = 1 for a lump sum")]
    ZeroDcaLength,

    #[error("{name} interval must be > 0")]
    ZeroInterval { name: &'static str },

    #[error("DCA interval ({interval}) must be less than or equal to DCA length ({length})")]
    IntervalExceedsLength { interval: usize, length: usize },

    #[error("investment horizon ({horizon}) must be greater than or equal to DCA length ({length})")]
    HorizonShorterThanSchedule { horizon: usize, length: usize },

    #[error("withdrawal interval ({interval}) must be less than or equal to horizon ({horizon})")]
    IntervalExceedsHorizon { interval: usize, horizon: usize },

    #[error("fixed fee ({fee}) must be less than the smallest amount it applies to ({amount})")]
    FixedFeeTooLarge { fee: f64, amount: f64 },

    #[error("{name} must be in {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: f64,
    },

    #[error("contribution indexing requires periodic funding")]
    IndexedCapital,

    #[error("a CPI series is required when inflation adjustment is enabled")]
    MissingCpi,

    #[error("{name} series has {actual} periods, expected {expected}")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{name} series has an invalid value {value} at index {index}")]
    InvalidValue {
        name: &'static str,
        index: usize,
        value: f64,
    },
}
