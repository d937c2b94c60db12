// src/features/indicators.rs
//
// Trailing-window indicators over a single series.
// Every output has the input's length; positions without a fully populated
// window of finite inputs are NaN.

/// Returns the window ending at `i` if it is complete and all finite.
fn window(values: &[f64], i: usize, period: usize) -> Option<&[f64]> {
    if period == 0 || i + 1 < period {
        return None;
    }
    let slice = &values[(i + 1 - period)..=i];
    if slice.iter().all(|v| v.is_finite()) {
        Some(slice)
    } else {
        None
    }
}

fn paired_window<'a>(
    a: &'a [f64],
    b: &'a [f64],
    i: usize,
    period: usize,
) -> Option<(&'a [f64], &'a [f64])> {
    Some((window(a, i, period)?, window(b, i, period)?))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn covariance(a: &[f64], b: &[f64], ddof: usize) -> f64 {
    let n = a.len();
    if n <= ddof {
        return f64::NAN;
    }
    let (ma, mb) = (mean(a), mean(b));
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - ma) * (y - mb))
        .sum::<f64>()
        / (n - ddof) as f64
}

/// Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| window(values, i, period).map(mean).unwrap_or(f64::NAN))
        .collect()
}

/// Rolling standard deviation with the given delta degrees of freedom.
pub fn rolling_std(values: &[f64], period: usize, ddof: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            window(values, i, period)
                .map(|w| covariance(w, w, ddof).sqrt())
                .unwrap_or(f64::NAN)
        })
        .collect()
}

/// Bollinger Bands (upper, middle, lower) using the population deviation.
pub fn bollinger_bands(values: &[f64], period: usize, width: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let middle = sma(values, period);
    let std = rolling_std(values, period, 0);
    let upper = middle.iter().zip(&std).map(|(m, s)| m + width * s).collect();
    let lower = middle.iter().zip(&std).map(|(m, s)| m - width * s).collect();
    (upper, middle, lower)
}

/// Relative Strength Index (Wilder smoothing), in [0, 100].
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period + 1 {
        return result;
    }

    let mut gains = Vec::with_capacity(values.len() - 1);
    let mut losses = Vec::with_capacity(values.len() - 1);
    for i in 1..values.len() {
        let change = values[i] - values[i - 1];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut avg_gain = mean(&gains[..period]);
    let mut avg_loss = mean(&losses[..period]);

    for i in period..=gains.len() {
        result[i] = if avg_loss == 0.0 {
            if avg_gain == 0.0 { 50.0 } else { 100.0 }
        } else {
            100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
        };

        if i < gains.len() {
            avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        }
    }

    result
}

/// Momentum: difference between the value and the value `period` steps back.
pub fn momentum(values: &[f64], period: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i >= period {
                values[i] - values[i - period]
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Least-squares slope of the trailing window against its index.
pub fn linreg_slope(values: &[f64], period: usize) -> Vec<f64> {
    let n = period as f64;
    let sum_x = n * (n - 1.0) / 2.0;
    let sum_xx = (n - 1.0) * n * (2.0 * n - 1.0) / 6.0;
    let denom = n * sum_xx - sum_x * sum_x;

    (0..values.len())
        .map(|i| match window(values, i, period) {
            Some(w) if denom != 0.0 => {
                let sum_y: f64 = w.iter().sum();
                let sum_xy: f64 = w.iter().enumerate().map(|(x, y)| x as f64 * y).sum();
                (n * sum_xy - sum_x * sum_y) / denom
            }
            _ => f64::NAN,
        })
        .collect()
}

/// One-step simple returns. The first element is NaN.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    trailing_return(values, 1)
}

/// Simple return over the trailing `period` steps.
pub fn trailing_return(values: &[f64], period: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i < period || period == 0 {
                return f64::NAN;
            }
            let base = values[i - period];
            if base.is_finite() && base != 0.0 && values[i].is_finite() {
                values[i] / base - 1.0
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Rolling sample covariance.
pub fn rolling_cov(a: &[f64], b: &[f64], period: usize) -> Vec<f64> {
    (0..a.len().min(b.len()))
        .map(|i| {
            paired_window(a, b, i, period)
                .map(|(wa, wb)| covariance(wa, wb, 1))
                .unwrap_or(f64::NAN)
        })
        .collect()
}

/// Rolling sample variance.
pub fn rolling_var(values: &[f64], period: usize) -> Vec<f64> {
    rolling_cov(values, values, period)
}

/// Rolling Pearson correlation. Constant windows yield NaN.
pub fn rolling_corr(a: &[f64], b: &[f64], period: usize) -> Vec<f64> {
    (0..a.len().min(b.len()))
        .map(|i| match paired_window(a, b, i, period) {
            Some((wa, wb)) => {
                let sa = covariance(wa, wa, 1).sqrt();
                let sb = covariance(wb, wb, 1).sqrt();
                if sa > 0.0 && sb > 0.0 {
                    covariance(wa, wb, 1) / (sa * sb)
                } else {
                    f64::NAN
                }
            }
            None => f64::NAN,
        })
        .collect()
}

/// Trailing z-score of each value against its own window (sample sd).
pub fn rolling_zscore(values: &[f64], period: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| match window(values, i, period) {
            Some(w) => {
                let sd = covariance(w, w, 1).sqrt();
                if sd > 0.0 {
                    (values[i] - mean(w)) / sd
                } else {
                    f64::NAN
                }
            }
            None => f64::NAN,
        })
        .collect()
}

/// Element-wise ratio of two series.
pub fn ratio(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter()
        .zip(b)
        .map(|(x, y)| if *y != 0.0 { x / y } else { f64::NAN })
        .collect()
}

/// Natural log that maps non-positive or non-finite inputs to NaN.
pub fn safe_ln(x: f64) -> f64 {
    if x.is_finite() && x > 0.0 {
        x.ln()
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);

        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert!((result[2] - 2.0).abs() < 1e-10);
        assert!((result[4] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_window_requires_finite_history() {
        let values = vec![1.0, f64::NAN, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);
        assert!(result[2].is_nan());
        assert!(result[3].is_nan());
        assert!((result[4] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_rsi_monotonic_up() {
        let values: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let result = rsi(&values, 14);
        assert!(result[13].is_nan());
        assert!((result[14] - 100.0).abs() < 1e-10);
        assert!((result[19] - 100.0).abs() < 1e-10);
    }

    #[test]
    fn test_linreg_slope_of_line() {
        let values: Vec<f64> = (0..10).map(|i| 3.0 + 2.0 * i as f64).collect();
        let result = linreg_slope(&values, 4);
        assert!(result[2].is_nan());
        for v in &result[3..] {
            assert!((v - 2.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_trailing_return_and_momentum() {
        let values = vec![100.0, 110.0, 121.0];
        let r = trailing_return(&values, 2);
        assert!((r[2] - 0.21).abs() < 1e-12);
        let m = momentum(&values, 1);
        assert!(m[0].is_nan());
        assert!((m[2] - 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_corr_and_beta() {
        let a = vec![0.01, 0.02, -0.01, 0.03, 0.00];
        let b: Vec<f64> = a.iter().map(|x| 2.0 * x).collect();
        let corr = rolling_corr(&a, &b, 5);
        assert!((corr[4] - 1.0).abs() < 1e-10);
        let beta = ratio(&rolling_cov(&b, &a, 5), &rolling_var(&a, 5));
        assert!((beta[4] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_bollinger_constant_series() {
        let values = vec![10.0; 5];
        let (upper, middle, lower) = bollinger_bands(&values, 3, 2.0);
        assert!((upper[4] - 10.0).abs() < 1e-12);
        assert!((middle[4] - 10.0).abs() < 1e-12);
        assert!((lower[4] - 10.0).abs() < 1e-12);
    }
}
