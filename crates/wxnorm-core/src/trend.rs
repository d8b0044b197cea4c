//! Trend classification math

use crate::types::Trend;
use crate::vocab::Quantity;

/// Minimum number of history samples for a regression decision
pub const MIN_TREND_SAMPLES: usize = 3;

/// Relative band around the day reference used when no regression is possible
pub const FALLBACK_HYSTERESIS: f64 = 0.02;

/// Lookback window and sensitivity for one family of quantities
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendProfile {
    pub window_secs: i64,
    pub sensitivity: f64,
}

impl TrendProfile {
    pub fn for_quantity(quantity: Quantity) -> Self {
        let (window_secs, sensitivity) = match quantity {
            Quantity::Cloudiness | Quantity::Humidity => (3600, 0.01),
            Quantity::SoilTemperature | Quantity::MoistureContent | Quantity::MoistureTension => {
                (7200, 0.001)
            }
            Quantity::Pressure | Quantity::PressureSl => (7200, 0.005),
            Quantity::WindStrength | Quantity::GustStrength => (1800, 0.05),
            _ => (1800, 0.005),
        };
        Self {
            window_secs,
            sensitivity,
        }
    }
}

/// Ordinary least squares slope of `values` against their index
pub fn ols_slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n_f;

    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - mean_x;
            (num + dx * (y - mean_y), den + dx * dx)
        });

    Some(num / den)
}

/// Classify a slope relative to `|value * sensitivity|`
pub fn classify_slope(slope: f64, value: f64, sensitivity: f64) -> Trend {
    let threshold = (value * sensitivity).abs();
    if slope > threshold {
        Trend::Up
    } else if slope < -threshold {
        Trend::Down
    } else {
        Trend::Stable
    }
}

/// Regression decision over ascending samples; `None` with too few samples
pub fn regression_trend(samples: &[f64], value: f64, profile: TrendProfile) -> Option<Trend> {
    if samples.len() < MIN_TREND_SAMPLES {
        return None;
    }
    let slope = ols_slope(samples)?;
    Some(classify_slope(slope, value, profile.sensitivity))
}

/// Compare a value with the first value of the local day. Without a
/// reference (first write of the day) the trend is stable.
pub fn fallback_trend(reference: Option<f64>, value: f64) -> Trend {
    let Some(reference) = reference else {
        return Trend::Stable;
    };
    let band = reference.abs() * FALLBACK_HYSTERESIS;
    if value > reference + band {
        Trend::Up
    } else if value < reference - band {
        Trend::Down
    } else {
        Trend::Stable
    }
}
