//! Physical plausibility bounds
//!
//! A measure is checked against the range of a *boundary key*, resolved from
//! the measure's quantity and the class of the module that reported it.
//! Ranges carry defaults and may be overridden per key from configuration.

use crate::vocab::{MeasureType, ModuleType, Quantity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Named plausibility range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryKey {
    TempInt,
    TempExt,
    HumInt,
    HumExt,
    /// Station (absolute) pressure
    Pressure,
    /// Pressure reduced to sea level
    PressureSl,
    Co2,
    Noise,
    Rain,
    WindStrength,
    Angle,
    Irradiance,
    Illuminance,
    Uv,
    Visibility,
    Cloudiness,
    SoilTemp,
    Moisture,
    Tension,
    Strikes,
    Distance,
    AbsHum,
    Index,
    Battery,
    Signal,
    O3,
    Co,
}

impl BoundaryKey {
    pub const ALL: [BoundaryKey; 27] = [
        BoundaryKey::TempInt,
        BoundaryKey::TempExt,
        BoundaryKey::HumInt,
        BoundaryKey::HumExt,
        BoundaryKey::Pressure,
        BoundaryKey::PressureSl,
        BoundaryKey::Co2,
        BoundaryKey::Noise,
        BoundaryKey::Rain,
        BoundaryKey::WindStrength,
        BoundaryKey::Angle,
        BoundaryKey::Irradiance,
        BoundaryKey::Illuminance,
        BoundaryKey::Uv,
        BoundaryKey::Visibility,
        BoundaryKey::Cloudiness,
        BoundaryKey::SoilTemp,
        BoundaryKey::Moisture,
        BoundaryKey::Tension,
        BoundaryKey::Strikes,
        BoundaryKey::Distance,
        BoundaryKey::AbsHum,
        BoundaryKey::Index,
        BoundaryKey::Battery,
        BoundaryKey::Signal,
        BoundaryKey::O3,
        BoundaryKey::Co,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BoundaryKey::TempInt => "tempint",
            BoundaryKey::TempExt => "tempext",
            BoundaryKey::HumInt => "humint",
            BoundaryKey::HumExt => "humext",
            BoundaryKey::Pressure => "pressure",
            BoundaryKey::PressureSl => "pressuresl",
            BoundaryKey::Co2 => "co2",
            BoundaryKey::Noise => "noise",
            BoundaryKey::Rain => "rain",
            BoundaryKey::WindStrength => "windstrength",
            BoundaryKey::Angle => "angle",
            BoundaryKey::Irradiance => "irradiance",
            BoundaryKey::Illuminance => "illuminance",
            BoundaryKey::Uv => "uv",
            BoundaryKey::Visibility => "visibility",
            BoundaryKey::Cloudiness => "cloudiness",
            BoundaryKey::SoilTemp => "soiltemp",
            BoundaryKey::Moisture => "moisture",
            BoundaryKey::Tension => "tension",
            BoundaryKey::Strikes => "strikes",
            BoundaryKey::Distance => "distance",
            BoundaryKey::AbsHum => "abshum",
            BoundaryKey::Index => "index",
            BoundaryKey::Battery => "battery",
            BoundaryKey::Signal => "signal",
            BoundaryKey::O3 => "o3",
            BoundaryKey::Co => "co",
        }
    }

    /// Built-in range, in the canonical units adapters deliver
    pub fn default_range(self) -> Boundary {
        let (min, max) = match self {
            BoundaryKey::TempInt => (-40.0, 60.0),
            BoundaryKey::TempExt => (-80.0, 70.0),
            BoundaryKey::HumInt | BoundaryKey::HumExt => (0.0, 100.0),
            // high-altitude stations read well below sea-level values
            BoundaryKey::Pressure => (300.0, 1100.0),
            BoundaryKey::PressureSl => (870.0, 1090.0),
            BoundaryKey::Co2 => (0.0, 10_000.0),
            BoundaryKey::Noise => (0.0, 150.0),
            BoundaryKey::Rain => (0.0, 1_000.0),
            BoundaryKey::WindStrength => (0.0, 500.0),
            BoundaryKey::Angle => (0.0, 360.0),
            BoundaryKey::Irradiance => (0.0, 2_000.0),
            BoundaryKey::Illuminance => (0.0, 200_000.0),
            BoundaryKey::Uv => (0.0, 20.0),
            BoundaryKey::Visibility => (0.0, 100_000.0),
            BoundaryKey::Cloudiness => (0.0, 100.0),
            BoundaryKey::SoilTemp => (-50.0, 80.0),
            BoundaryKey::Moisture => (0.0, 100.0),
            BoundaryKey::Tension => (0.0, 1_000.0),
            BoundaryKey::Strikes => (0.0, 100_000.0),
            BoundaryKey::Distance => (0.0, 100.0),
            BoundaryKey::AbsHum => (0.0, 0.1),
            BoundaryKey::Index => (0.0, 100.0),
            BoundaryKey::Battery | BoundaryKey::Signal => (0.0, 100.0),
            BoundaryKey::O3 | BoundaryKey::Co => (0.0, 1_000.0),
        };
        Boundary { min, max }
    }

    /// Fixed `(measure, module class) -> key` mapping; `None` means unchecked
    pub fn resolve(measure_type: MeasureType, module_type: ModuleType) -> Option<BoundaryKey> {
        use Quantity::*;

        let indoor = module_type.is_indoor_class();
        let key = match measure_type.quantity {
            Temperature if indoor => BoundaryKey::TempInt,
            Temperature | DewPoint => BoundaryKey::TempExt,
            Humidity if indoor => BoundaryKey::HumInt,
            Humidity => BoundaryKey::HumExt,
            Pressure => BoundaryKey::Pressure,
            PressureSl => BoundaryKey::PressureSl,
            Quantity::Co2 => BoundaryKey::Co2,
            Quantity::Noise => BoundaryKey::Noise,
            Quantity::Rain | RainHourAggregated | RainDayAggregated => BoundaryKey::Rain,
            Quantity::WindStrength | GustStrength => BoundaryKey::WindStrength,
            WindAngle | GustAngle | WindDirection | GustDirection | StrikeBearing => {
                BoundaryKey::Angle
            }
            Quantity::Irradiance => BoundaryKey::Irradiance,
            Quantity::Illuminance => BoundaryKey::Illuminance,
            UvIndex => BoundaryKey::Uv,
            Quantity::Visibility => BoundaryKey::Visibility,
            Quantity::Cloudiness => BoundaryKey::Cloudiness,
            SoilTemperature => BoundaryKey::SoilTemp,
            MoistureContent => BoundaryKey::Moisture,
            MoistureTension => BoundaryKey::Tension,
            StrikeCount => BoundaryKey::Strikes,
            StrikeDistance => BoundaryKey::Distance,
            AbsoluteHumidity => BoundaryKey::AbsHum,
            HealthIdx | TempIdx | HumIdx | Co2Idx | NoiseIdx => BoundaryKey::Index,
            Quantity::Battery => BoundaryKey::Battery,
            Quantity::Signal => BoundaryKey::Signal,
            Quantity::O3 => BoundaryKey::O3,
            Quantity::Co => BoundaryKey::Co,
            Sunrise | Sunset | Moonrise | Moonset | Firmware | FirstSetup | LastSetup
            | LastUpgrade | LastRefresh | LastSeen | LocCity | LocCountry | LocTimezone
            | LocAltitude | LocLatitude | LocLongitude => return None,
        };
        Some(key)
    }
}

impl fmt::Display for BoundaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoundaryKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BoundaryKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("Unknown boundary key: {}", s))
    }
}

/// Inclusive plausibility range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    pub min: f64,
    pub max: f64,
}

impl Boundary {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Boundary key -> range table, seeded with defaults
#[derive(Debug, Clone)]
pub struct BoundaryRules {
    ranges: HashMap<BoundaryKey, Boundary>,
}

impl Default for BoundaryRules {
    fn default() -> Self {
        Self {
            ranges: BoundaryKey::ALL
                .into_iter()
                .map(|k| (k, k.default_range()))
                .collect(),
        }
    }
}

impl BoundaryRules {
    /// Replace either side of a key's range; the other side keeps its value
    pub fn with_override(mut self, key: BoundaryKey, min: Option<f64>, max: Option<f64>) -> Self {
        let current = self.get(key);
        self.ranges.insert(
            key,
            Boundary {
                min: min.unwrap_or(current.min),
                max: max.unwrap_or(current.max),
            },
        );
        self
    }

    pub fn get(&self, key: BoundaryKey) -> Boundary {
        self.ranges
            .get(&key)
            .copied()
            .unwrap_or_else(|| key.default_range())
    }

    /// Resolve the key and range that apply to a measure on a module
    pub fn lookup(
        &self,
        measure_type: MeasureType,
        module_type: ModuleType,
    ) -> Option<(BoundaryKey, Boundary)> {
        BoundaryKey::resolve(measure_type, module_type).map(|key| (key, self.get(key)))
    }
}
