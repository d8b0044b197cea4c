//! Closed vocabularies for station kinds, module types and measure types
//!
//! Module and measure names are stored as plain strings, but everything that
//! flows through the engine uses these enums. Conversions go through
//! `as_str`/`FromStr` so the string tables live in exactly one place.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vocabulary lookup error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VocabError {
    #[error("Unknown module type: {0}")]
    UnknownModuleType(String),

    #[error("Unknown module family: {0}")]
    UnknownModuleFamily(String),

    #[error("Unknown measure type: {0}")]
    UnknownMeasureType(String),

    #[error("Unknown station type: {0}")]
    UnknownStationType(String),
}

/// Kind of source a station reports through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationType {
    Netatmo,
    NetatmoHomecoach,
    OpenWeatherMap,
    WeatherUnderground,
    Ambient,
    WeatherFlow,
    Pioupiou,
    BloomSky,
    WeatherLink,
    Clientraw,
    Realtime,
    Stickertags,
    Ecowitt,
    Manual,
}

impl StationType {
    pub const ALL: [StationType; 14] = [
        StationType::Netatmo,
        StationType::NetatmoHomecoach,
        StationType::OpenWeatherMap,
        StationType::WeatherUnderground,
        StationType::Ambient,
        StationType::WeatherFlow,
        StationType::Pioupiou,
        StationType::BloomSky,
        StationType::WeatherLink,
        StationType::Clientraw,
        StationType::Realtime,
        StationType::Stickertags,
        StationType::Ecowitt,
        StationType::Manual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StationType::Netatmo => "netatmo",
            StationType::NetatmoHomecoach => "netatmo_homecoach",
            StationType::OpenWeatherMap => "open_weather_map",
            StationType::WeatherUnderground => "weather_underground",
            StationType::Ambient => "ambient",
            StationType::WeatherFlow => "weather_flow",
            StationType::Pioupiou => "pioupiou",
            StationType::BloomSky => "bloom_sky",
            StationType::WeatherLink => "weather_link",
            StationType::Clientraw => "clientraw",
            StationType::Realtime => "realtime",
            StationType::Stickertags => "stickertags",
            StationType::Ecowitt => "ecowitt",
            StationType::Manual => "manual",
        }
    }
}

impl fmt::Display for StationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StationType {
    type Err = VocabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StationType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| VocabError::UnknownStationType(s.to_string()))
    }
}

/// Logical sensor group within a station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    /// Base station (indoor class)
    Main,
    Outdoor,
    Wind,
    Rain,
    /// Extended indoor module
    Indoor,
    Thunderstorm,
    Solar,
    Soil,
    Extra,
    /// Public-network aggregate; refreshed far less often than physical modules
    Aggregated,
    Computed,
    Ephemeris,
    Pollution,
    Forecast,
    Picture,
    Video,
}

impl ModuleType {
    pub const ALL: [ModuleType; 16] = [
        ModuleType::Main,
        ModuleType::Outdoor,
        ModuleType::Wind,
        ModuleType::Rain,
        ModuleType::Indoor,
        ModuleType::Thunderstorm,
        ModuleType::Solar,
        ModuleType::Soil,
        ModuleType::Extra,
        ModuleType::Aggregated,
        ModuleType::Computed,
        ModuleType::Ephemeris,
        ModuleType::Pollution,
        ModuleType::Forecast,
        ModuleType::Picture,
        ModuleType::Video,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleType::Main => "main",
            ModuleType::Outdoor => "outdoor",
            ModuleType::Wind => "wind",
            ModuleType::Rain => "rain",
            ModuleType::Indoor => "indoor",
            ModuleType::Thunderstorm => "thunderstorm",
            ModuleType::Solar => "solar",
            ModuleType::Soil => "soil",
            ModuleType::Extra => "extra",
            ModuleType::Aggregated => "aggregated",
            ModuleType::Computed => "computed",
            ModuleType::Ephemeris => "ephemeris",
            ModuleType::Pollution => "pollution",
            ModuleType::Forecast => "forecast",
            ModuleType::Picture => "picture",
            ModuleType::Video => "video",
        }
    }

    /// Modules synthesized by the engine rather than reported by hardware.
    /// Their values are never bound-checked.
    pub fn is_virtual(self) -> bool {
        matches!(
            self,
            ModuleType::Computed
                | ModuleType::Ephemeris
                | ModuleType::Pollution
                | ModuleType::Forecast
                | ModuleType::Picture
                | ModuleType::Video
        )
    }

    pub fn is_indoor_class(self) -> bool {
        matches!(self, ModuleType::Main | ModuleType::Indoor)
    }

    /// Whether a reading of `quantity` belongs to this module's vocabulary
    pub fn accepts(self, quantity: Quantity) -> bool {
        use Quantity::*;

        if quantity.is_device_meta() || quantity.is_location() {
            return true;
        }

        match self {
            ModuleType::Main => matches!(
                quantity,
                Temperature
                    | Humidity
                    | Pressure
                    | PressureSl
                    | Co2
                    | Noise
                    | AbsoluteHumidity
                    | HealthIdx
                    | TempIdx
                    | HumIdx
                    | Co2Idx
                    | NoiseIdx
            ),
            ModuleType::Indoor => matches!(
                quantity,
                Temperature
                    | Humidity
                    | Co2
                    | Noise
                    | AbsoluteHumidity
                    | HealthIdx
                    | TempIdx
                    | HumIdx
                    | Co2Idx
                    | NoiseIdx
            ),
            ModuleType::Outdoor | ModuleType::Extra => {
                matches!(quantity, Temperature | Humidity | AbsoluteHumidity | DewPoint)
            }
            ModuleType::Wind => matches!(
                quantity,
                WindAngle | WindStrength | GustAngle | GustStrength | WindDirection | GustDirection
            ),
            ModuleType::Rain => matches!(quantity, Rain | RainHourAggregated | RainDayAggregated),
            ModuleType::Thunderstorm => {
                matches!(quantity, StrikeCount | StrikeDistance | StrikeBearing)
            }
            ModuleType::Solar => matches!(quantity, Irradiance | Illuminance | UvIndex),
            ModuleType::Soil => {
                matches!(quantity, SoilTemperature | MoistureContent | MoistureTension)
            }
            ModuleType::Aggregated => matches!(
                quantity,
                Temperature
                    | Humidity
                    | Pressure
                    | Rain
                    | RainHourAggregated
                    | RainDayAggregated
                    | WindAngle
                    | WindStrength
                    | GustAngle
                    | GustStrength
                    | WindDirection
                    | GustDirection
            ),
            ModuleType::Computed => matches!(
                quantity,
                Temperature | Humidity | Pressure | DewPoint | AbsoluteHumidity
            ),
            ModuleType::Ephemeris => matches!(quantity, Sunrise | Sunset | Moonrise | Moonset),
            ModuleType::Pollution => matches!(quantity, O3 | Co),
            ModuleType::Forecast => matches!(
                quantity,
                Temperature
                    | Humidity
                    | Pressure
                    | Cloudiness
                    | Visibility
                    | UvIndex
                    | WindAngle
                    | WindStrength
                    | WindDirection
            ),
            ModuleType::Picture | ModuleType::Video => false,
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleType {
    type Err = VocabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| VocabError::UnknownModuleType(s.to_string()))
    }
}

/// Grouping of module types used to filter station listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleFamily {
    Indoor,
    Outdoor,
    Wind,
    Rain,
    Thunderstorm,
    Solar,
    Soil,
    Extra,
    Aggregated,
    Computed,
    Ephemeris,
    Pollution,
    Forecast,
    Camera,
}

impl ModuleFamily {
    pub const ALL: [ModuleFamily; 14] = [
        ModuleFamily::Indoor,
        ModuleFamily::Outdoor,
        ModuleFamily::Wind,
        ModuleFamily::Rain,
        ModuleFamily::Thunderstorm,
        ModuleFamily::Solar,
        ModuleFamily::Soil,
        ModuleFamily::Extra,
        ModuleFamily::Aggregated,
        ModuleFamily::Computed,
        ModuleFamily::Ephemeris,
        ModuleFamily::Pollution,
        ModuleFamily::Forecast,
        ModuleFamily::Camera,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleFamily::Indoor => "indoor",
            ModuleFamily::Outdoor => "outdoor",
            ModuleFamily::Wind => "wind",
            ModuleFamily::Rain => "rain",
            ModuleFamily::Thunderstorm => "thunderstorm",
            ModuleFamily::Solar => "solar",
            ModuleFamily::Soil => "soil",
            ModuleFamily::Extra => "extra",
            ModuleFamily::Aggregated => "aggregated",
            ModuleFamily::Computed => "computed",
            ModuleFamily::Ephemeris => "ephemeris",
            ModuleFamily::Pollution => "pollution",
            ModuleFamily::Forecast => "forecast",
            ModuleFamily::Camera => "camera",
        }
    }

    pub fn module_types(self) -> &'static [ModuleType] {
        match self {
            ModuleFamily::Indoor => &[ModuleType::Indoor],
            ModuleFamily::Outdoor => &[ModuleType::Outdoor],
            ModuleFamily::Wind => &[ModuleType::Wind],
            ModuleFamily::Rain => &[ModuleType::Rain],
            ModuleFamily::Thunderstorm => &[ModuleType::Thunderstorm],
            ModuleFamily::Solar => &[ModuleType::Solar],
            ModuleFamily::Soil => &[ModuleType::Soil],
            ModuleFamily::Extra => &[ModuleType::Extra],
            ModuleFamily::Aggregated => &[ModuleType::Aggregated],
            ModuleFamily::Computed => &[ModuleType::Computed],
            ModuleFamily::Ephemeris => &[ModuleType::Ephemeris],
            ModuleFamily::Pollution => &[ModuleType::Pollution],
            ModuleFamily::Forecast => &[ModuleType::Forecast],
            ModuleFamily::Camera => &[ModuleType::Picture, ModuleType::Video],
        }
    }
}

impl fmt::Display for ModuleFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleFamily {
    type Err = VocabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ModuleFamily::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| VocabError::UnknownModuleFamily(s.to_string()))
    }
}

/// Base physical or derived quantity, without any summary suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Quantity {
    Temperature,
    Humidity,
    Pressure,
    PressureSl,
    Co2,
    Noise,
    Rain,
    RainHourAggregated,
    RainDayAggregated,
    WindAngle,
    WindStrength,
    GustAngle,
    GustStrength,
    WindDirection,
    GustDirection,
    AbsoluteHumidity,
    DewPoint,
    Cloudiness,
    Visibility,
    UvIndex,
    Irradiance,
    Illuminance,
    SoilTemperature,
    MoistureContent,
    MoistureTension,
    StrikeCount,
    StrikeDistance,
    StrikeBearing,
    O3,
    Co,
    HealthIdx,
    TempIdx,
    HumIdx,
    Co2Idx,
    NoiseIdx,
    Sunrise,
    Sunset,
    Moonrise,
    Moonset,
    Signal,
    Battery,
    Firmware,
    FirstSetup,
    LastSetup,
    LastUpgrade,
    LastRefresh,
    LastSeen,
    LocCity,
    LocCountry,
    LocTimezone,
    LocAltitude,
    LocLatitude,
    LocLongitude,
}

impl Quantity {
    pub const ALL: [Quantity; 53] = [
        Quantity::Temperature,
        Quantity::Humidity,
        Quantity::Pressure,
        Quantity::PressureSl,
        Quantity::Co2,
        Quantity::Noise,
        Quantity::Rain,
        Quantity::RainHourAggregated,
        Quantity::RainDayAggregated,
        Quantity::WindAngle,
        Quantity::WindStrength,
        Quantity::GustAngle,
        Quantity::GustStrength,
        Quantity::WindDirection,
        Quantity::GustDirection,
        Quantity::AbsoluteHumidity,
        Quantity::DewPoint,
        Quantity::Cloudiness,
        Quantity::Visibility,
        Quantity::UvIndex,
        Quantity::Irradiance,
        Quantity::Illuminance,
        Quantity::SoilTemperature,
        Quantity::MoistureContent,
        Quantity::MoistureTension,
        Quantity::StrikeCount,
        Quantity::StrikeDistance,
        Quantity::StrikeBearing,
        Quantity::O3,
        Quantity::Co,
        Quantity::HealthIdx,
        Quantity::TempIdx,
        Quantity::HumIdx,
        Quantity::Co2Idx,
        Quantity::NoiseIdx,
        Quantity::Sunrise,
        Quantity::Sunset,
        Quantity::Moonrise,
        Quantity::Moonset,
        Quantity::Signal,
        Quantity::Battery,
        Quantity::Firmware,
        Quantity::FirstSetup,
        Quantity::LastSetup,
        Quantity::LastUpgrade,
        Quantity::LastRefresh,
        Quantity::LastSeen,
        Quantity::LocCity,
        Quantity::LocCountry,
        Quantity::LocTimezone,
        Quantity::LocAltitude,
        Quantity::LocLatitude,
        Quantity::LocLongitude,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Quantity::Temperature => "temperature",
            Quantity::Humidity => "humidity",
            Quantity::Pressure => "pressure",
            Quantity::PressureSl => "pressure_sl",
            Quantity::Co2 => "co2",
            Quantity::Noise => "noise",
            Quantity::Rain => "rain",
            Quantity::RainHourAggregated => "rain_hour_aggregated",
            Quantity::RainDayAggregated => "rain_day_aggregated",
            Quantity::WindAngle => "windangle",
            Quantity::WindStrength => "windstrength",
            Quantity::GustAngle => "gustangle",
            Quantity::GustStrength => "guststrength",
            Quantity::WindDirection => "winddirection",
            Quantity::GustDirection => "gustdirection",
            Quantity::AbsoluteHumidity => "absolute_humidity",
            Quantity::DewPoint => "dew_point",
            Quantity::Cloudiness => "cloudiness",
            Quantity::Visibility => "visibility",
            Quantity::UvIndex => "uv_index",
            Quantity::Irradiance => "irradiance",
            Quantity::Illuminance => "illuminance",
            Quantity::SoilTemperature => "soil_temperature",
            Quantity::MoistureContent => "moisture_content",
            Quantity::MoistureTension => "moisture_tension",
            Quantity::StrikeCount => "strike_count",
            Quantity::StrikeDistance => "strike_distance",
            Quantity::StrikeBearing => "strike_bearing",
            Quantity::O3 => "o3",
            Quantity::Co => "co",
            Quantity::HealthIdx => "health_idx",
            Quantity::TempIdx => "temp_idx",
            Quantity::HumIdx => "hum_idx",
            Quantity::Co2Idx => "co2_idx",
            Quantity::NoiseIdx => "noise_idx",
            Quantity::Sunrise => "sunrise",
            Quantity::Sunset => "sunset",
            Quantity::Moonrise => "moonrise",
            Quantity::Moonset => "moonset",
            Quantity::Signal => "signal",
            Quantity::Battery => "battery",
            Quantity::Firmware => "firmware",
            Quantity::FirstSetup => "first_setup",
            Quantity::LastSetup => "last_setup",
            Quantity::LastUpgrade => "last_upgrade",
            Quantity::LastRefresh => "last_refresh",
            Quantity::LastSeen => "last_seen",
            Quantity::LocCity => "loc_city",
            Quantity::LocCountry => "loc_country",
            Quantity::LocTimezone => "loc_timezone",
            Quantity::LocAltitude => "loc_altitude",
            Quantity::LocLatitude => "loc_latitude",
            Quantity::LocLongitude => "loc_longitude",
        }
    }

    /// Device health and lifecycle fields, accepted on every module
    pub fn is_device_meta(self) -> bool {
        matches!(
            self,
            Quantity::Signal
                | Quantity::Battery
                | Quantity::Firmware
                | Quantity::FirstSetup
                | Quantity::LastSetup
                | Quantity::LastUpgrade
                | Quantity::LastRefresh
                | Quantity::LastSeen
        )
    }

    pub fn is_location(self) -> bool {
        matches!(
            self,
            Quantity::LocCity
                | Quantity::LocCountry
                | Quantity::LocTimezone
                | Quantity::LocAltitude
                | Quantity::LocLatitude
                | Quantity::LocLongitude
        )
    }

    pub fn is_setup_timestamp(self) -> bool {
        matches!(
            self,
            Quantity::FirstSetup | Quantity::LastSetup | Quantity::LastUpgrade
        )
    }

    /// Companion aspects cascaded after a raw write, as `[min, max, trend]`
    pub fn companions(self) -> Option<[Aspect; 3]> {
        match self {
            Quantity::Temperature | Quantity::Pressure | Quantity::Humidity => {
                Some([Aspect::Min, Aspect::Max, Aspect::Trend])
            }
            Quantity::WindStrength | Quantity::GustStrength => {
                Some([Aspect::DayMin, Aspect::DayMax, Aspect::DayTrend])
            }
            _ => None,
        }
    }

    /// Quantities appended to the daily history table
    pub fn is_historized(self) -> bool {
        matches!(
            self,
            Quantity::Temperature
                | Quantity::Humidity
                | Quantity::Pressure
                | Quantity::PressureSl
                | Quantity::Co2
                | Quantity::Noise
                | Quantity::Rain
                | Quantity::RainHourAggregated
                | Quantity::WindAngle
                | Quantity::WindStrength
                | Quantity::GustAngle
                | Quantity::GustStrength
                | Quantity::AbsoluteHumidity
                | Quantity::DewPoint
                | Quantity::Cloudiness
                | Quantity::Visibility
                | Quantity::UvIndex
                | Quantity::Irradiance
                | Quantity::Illuminance
                | Quantity::SoilTemperature
                | Quantity::MoistureContent
                | Quantity::MoistureTension
                | Quantity::StrikeCount
                | Quantity::O3
                | Quantity::Co
                | Quantity::HealthIdx
        )
    }

    /// The `*direction` quantity paired with an angle quantity
    pub fn direction_of(self) -> Option<Quantity> {
        match self {
            Quantity::WindAngle => Some(Quantity::WindDirection),
            Quantity::GustAngle => Some(Quantity::GustDirection),
            _ => None,
        }
    }

    pub fn sub_indices(self) -> &'static [Quantity] {
        match self {
            Quantity::HealthIdx => &[
                Quantity::TempIdx,
                Quantity::HumIdx,
                Quantity::Co2Idx,
                Quantity::NoiseIdx,
            ],
            _ => &[],
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quantity {
    type Err = VocabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quantity::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| VocabError::UnknownMeasureType(s.to_string()))
    }
}

/// Which view of a quantity a stored row holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Aspect {
    Value,
    Min,
    Max,
    Trend,
    DayMin,
    DayMax,
    DayTrend,
    /// First value of the local day, used by the trend fallback
    Reference,
}

impl Aspect {
    // Longest suffixes first so `_day_min` is not read as `_min`.
    const SUFFIXED: [Aspect; 7] = [
        Aspect::DayMin,
        Aspect::DayMax,
        Aspect::DayTrend,
        Aspect::Min,
        Aspect::Max,
        Aspect::Trend,
        Aspect::Reference,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            Aspect::Value => "",
            Aspect::Min => "_min",
            Aspect::Max => "_max",
            Aspect::Trend => "_trend",
            Aspect::DayMin => "_day_min",
            Aspect::DayMax => "_day_max",
            Aspect::DayTrend => "_day_trend",
            Aspect::Reference => "_ref",
        }
    }

    /// Min/max/trend summaries of a raw quantity
    pub fn is_summary(self) -> bool {
        !matches!(self, Aspect::Value | Aspect::Reference)
    }
}

/// A fully qualified measure type: quantity plus aspect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MeasureType {
    pub quantity: Quantity,
    pub aspect: Aspect,
}

impl MeasureType {
    pub fn new(quantity: Quantity, aspect: Aspect) -> Self {
        Self { quantity, aspect }
    }

    pub fn raw(quantity: Quantity) -> Self {
        Self::new(quantity, Aspect::Value)
    }

    pub fn is_raw(&self) -> bool {
        self.aspect == Aspect::Value
    }

    /// Rows a caller asking for `quantity` expects back: the raw value, its
    /// daily companions, the paired direction for angles and the sub-indices
    /// of composite indices.
    pub fn sub_attributes(quantity: Quantity) -> Vec<MeasureType> {
        let mut out = vec![MeasureType::raw(quantity)];
        if let Some(aspects) = quantity.companions() {
            out.extend(aspects.into_iter().map(|a| MeasureType::new(quantity, a)));
        }
        if let Some(direction) = quantity.direction_of() {
            out.push(MeasureType::raw(direction));
        }
        out.extend(quantity.sub_indices().iter().map(|q| MeasureType::raw(*q)));
        out
    }
}

impl From<Quantity> for MeasureType {
    fn from(quantity: Quantity) -> Self {
        MeasureType::raw(quantity)
    }
}

impl fmt::Display for MeasureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.quantity.as_str(), self.aspect.suffix())
    }
}

impl FromStr for MeasureType {
    type Err = VocabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(quantity) = s.parse::<Quantity>() {
            return Ok(MeasureType::raw(quantity));
        }
        for aspect in Aspect::SUFFIXED {
            if let Some(base) = s.strip_suffix(aspect.suffix()) {
                if let Ok(quantity) = base.parse::<Quantity>() {
                    return Ok(MeasureType::new(quantity, aspect));
                }
            }
        }
        Err(VocabError::UnknownMeasureType(s.to_string()))
    }
}

impl TryFrom<String> for MeasureType {
    type Error = VocabError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MeasureType> for String {
    fn from(value: MeasureType) -> Self {
        value.to_string()
    }
}
