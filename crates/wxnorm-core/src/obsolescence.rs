//! Staleness filtering of read results

use crate::types::{Measurement, Timestamp};
use crate::vocab::{MeasureType, ModuleType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Aggregated modules refresh slowly; never drop them sooner than this
pub const AGGREGATED_MIN_THRESHOLD: i64 = 2 * 3600;

/// How old a row may get before readers stop seeing it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObsolescenceLevel {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "24h")]
    TwentyFourHours,
    /// 20 minutes
    #[serde(rename = "tight")]
    Tight,
}

impl ObsolescenceLevel {
    pub const ALL: [ObsolescenceLevel; 8] = [
        ObsolescenceLevel::None,
        ObsolescenceLevel::ThirtyMinutes,
        ObsolescenceLevel::OneHour,
        ObsolescenceLevel::TwoHours,
        ObsolescenceLevel::FourHours,
        ObsolescenceLevel::TwelveHours,
        ObsolescenceLevel::TwentyFourHours,
        ObsolescenceLevel::Tight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ObsolescenceLevel::None => "none",
            ObsolescenceLevel::ThirtyMinutes => "30m",
            ObsolescenceLevel::OneHour => "1h",
            ObsolescenceLevel::TwoHours => "2h",
            ObsolescenceLevel::FourHours => "4h",
            ObsolescenceLevel::TwelveHours => "12h",
            ObsolescenceLevel::TwentyFourHours => "24h",
            ObsolescenceLevel::Tight => "tight",
        }
    }

    /// Maximum age in seconds; `None` disables filtering
    pub fn threshold_secs(self) -> Option<i64> {
        match self {
            ObsolescenceLevel::None => None,
            ObsolescenceLevel::ThirtyMinutes => Some(30 * 60),
            ObsolescenceLevel::OneHour => Some(3600),
            ObsolescenceLevel::TwoHours => Some(2 * 3600),
            ObsolescenceLevel::FourHours => Some(4 * 3600),
            ObsolescenceLevel::TwelveHours => Some(12 * 3600),
            ObsolescenceLevel::TwentyFourHours => Some(24 * 3600),
            ObsolescenceLevel::Tight => Some(20 * 60),
        }
    }

    /// Threshold for a given module class
    pub fn threshold_for(self, module_type: ModuleType) -> Option<i64> {
        let base = self.threshold_secs()?;
        if module_type == ModuleType::Aggregated {
            Some(base.max(AGGREGATED_MIN_THRESHOLD))
        } else {
            Some(base)
        }
    }
}

impl fmt::Display for ObsolescenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObsolescenceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObsolescenceLevel::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| format!("Unknown obsolescence level: {}", s))
    }
}

/// Rows that describe setup, place or daily summaries are never stale
pub fn is_exempt(measure_type: MeasureType) -> bool {
    measure_type.aspect.is_summary()
        || measure_type.quantity.is_location()
        || measure_type.quantity.is_setup_timestamp()
}

pub fn is_obsolete(row: &Measurement, level: ObsolescenceLevel, now: Timestamp) -> bool {
    if is_exempt(row.measure_type) {
        return false;
    }
    match level.threshold_for(row.module_type) {
        Some(threshold) => now - row.timestamp > threshold,
        None => false,
    }
}

/// Drop stale rows from a result set
pub fn filter_obsolete(
    rows: Vec<Measurement>,
    level: ObsolescenceLevel,
    now: Timestamp,
) -> Vec<Measurement> {
    if level == ObsolescenceLevel::None {
        return rows;
    }
    rows.into_iter()
        .filter(|row| !is_obsolete(row, level, now))
        .collect()
}
