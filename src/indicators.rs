//! Technical indicators over a price series
//!
//! Every function takes `rates` ordered **oldest first** and returns values
//! aligned index-for-index with the input. `None` means "not enough data"
//! and must never be read as zero.
//!
//! Available indicators:
//! - Simple moving average (via the `ta` crate)
//! - Rolling sample standard deviation and Bollinger Bands
//! - Normalized RSI in `[-1, 1]`
//! - Volatility (standard deviation of the whole series)

use statrs::statistics::Statistics;
use ta::indicators::SimpleMovingAverage;
use ta::Next;

/// Simple moving average over `period` samples
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let avg = indicator.next(value);
            (i + 1 >= period).then_some(avg)
        })
        .collect()
}

/// Rolling sample standard deviation (n - 1 denominator).
///
/// Undefined for windows shorter than two samples.
pub fn rolling_std(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period < 2 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                None
            } else {
                Some(values[i + 1 - period..=i].iter().std_dev())
            }
        })
        .collect()
}

/// Bollinger Bands output, aligned with the input series
#[derive(Debug, Clone, PartialEq)]
pub struct Bands {
    pub mean: Vec<Option<f64>>,
    pub std: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

impl Bands {
    /// Values at the last index, if defined
    pub fn last(&self) -> Option<(f64, f64, f64)> {
        let mean = (*self.mean.last()?)?;
        let upper = (*self.upper.last()?)?;
        let lower = (*self.lower.last()?)?;
        Some((mean, upper, lower))
    }
}

/// Rolling mean +/- `k` rolling standard deviations.
///
/// All four series are `None` at an index unless `window` samples end there
/// and the standard deviation is defined.
pub fn bollinger_bands(rates: &[f64], window: usize, k: f64) -> Bands {
    let std = rolling_std(rates, window);
    let mean: Vec<Option<f64>> = sma(rates, window)
        .into_iter()
        .zip(std.iter().copied())
        .map(|(m, s)| s.and(m))
        .collect();

    let upper = mean
        .iter()
        .zip(&std)
        .map(|(m, s)| Some((*m)? + k * (*s)?))
        .collect();
    let lower = mean
        .iter()
        .zip(&std)
        .map(|(m, s)| Some((*m)? - k * (*s)?))
        .collect();

    Bands {
        mean,
        std,
        upper,
        lower,
    }
}

/// Normalized Relative Strength Index.
///
/// Gains and losses are simple averages of the last `period` price deltas.
/// The classic 0-100 RSI is mapped onto `(rsi - 50) * 0.02`. A window with
/// no losses is clamped to `+1.0`.
pub fn rsi(rates: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; rates.len()];
    if period == 0 || rates.len() <= period {
        return result;
    }

    let deltas: Vec<f64> = rates.windows(2).map(|w| w[1] - w[0]).collect();

    // deltas[j] is the change into rates[j + 1]
    for i in period..rates.len() {
        let window = &deltas[i - period..i];
        let gain = window.iter().filter(|d| **d > 0.0).sum::<f64>() / period as f64;
        let loss = -window.iter().filter(|d| **d < 0.0).sum::<f64>() / period as f64;

        let normalized = if loss == 0.0 {
            1.0
        } else {
            let rs = gain / loss;
            let raw = 100.0 - 100.0 / (1.0 + rs);
            (raw - 50.0) * 0.02
        };
        result[i] = Some(normalized.clamp(-1.0, 1.0));
    }

    result
}

/// Sample standard deviation of the entire series
pub fn volatility(rates: &[f64]) -> Option<f64> {
    if rates.len() < 2 {
        return None;
    }
    Some(rates.iter().std_dev())
}

/// Parameters shared by the indicator snapshot and the strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorParams {
    pub window: usize,
    pub std_dev_multiplier: f64,
    pub rsi_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            window: 20,
            std_dev_multiplier: 2.0,
            rsi_period: 14,
        }
    }
}

/// Latest value of every indicator for one evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    pub rolling_mean: f64,
    pub upper_band: f64,
    pub lower_band: f64,
    /// `None` while fewer than `rsi_period + 1` samples exist
    pub normalized_rsi: Option<f64>,
    pub volatility: f64,
}

impl IndicatorSnapshot {
    /// Compute the snapshot at the last index of `rates` (oldest first).
    ///
    /// Returns `None` when the bands are not yet defined.
    pub fn latest(rates: &[f64], params: &IndicatorParams) -> Option<Self> {
        let (rolling_mean, upper_band, lower_band) =
            bollinger_bands(rates, params.window, params.std_dev_multiplier).last()?;
        let normalized_rsi = rsi(rates, params.rsi_period).last().copied().flatten();

        Some(Self {
            rolling_mean,
            upper_band,
            lower_band,
            normalized_rsi,
            volatility: volatility(rates)?,
        })
    }
}
