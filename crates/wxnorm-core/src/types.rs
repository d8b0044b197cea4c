//! Core data types for observation batches and canonical writes

use crate::vocab::{MeasureType, ModuleType, StationType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Timestamp type (Unix epoch seconds)
pub type Timestamp = i64;

/// A reading value as delivered by a source adapter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ObservationValue {
    Integer(i64),
    Float(f64),
    String(String),
    Null,
}

impl ObservationValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ObservationValue::Float(v) => Some(*v),
            ObservationValue::Integer(v) => Some(*v as f64),
            ObservationValue::String(s) => s.trim().parse().ok(),
            ObservationValue::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ObservationValue::Null)
    }
}

/// Station location metadata attached to a batch
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Place {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
}

/// Device health and lifecycle metadata attached to a batch
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeviceMeta {
    #[serde(default)]
    pub signal: Option<f64>,
    #[serde(default)]
    pub battery: Option<f64>,
    #[serde(default)]
    pub firmware: Option<String>,
    #[serde(default)]
    pub first_setup: Option<Timestamp>,
    #[serde(default)]
    pub last_setup: Option<Timestamp>,
    #[serde(default)]
    pub last_upgrade: Option<Timestamp>,
}

/// One module's worth of readings, already translated to canonical names by
/// a source adapter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservationBatch {
    pub station_id: String,

    #[serde(default)]
    pub station_name: String,

    pub station_type: StationType,

    pub module_id: String,

    #[serde(default)]
    pub module_name: String,

    pub module_type: ModuleType,

    /// Time the source reported for the whole batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<Timestamp>,

    /// Reading name -> value
    #[serde(default)]
    pub readings: BTreeMap<String, ObservationValue>,

    /// Reading name -> epoch, for readings timed separately from the batch
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reading_timestamps: BTreeMap<String, Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<Place>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_meta: Option<DeviceMeta>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<Timestamp>,
}

/// Short-term movement of a measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub fn as_str(self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Stable => "stable",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Trend::Up),
            "down" => Ok(Trend::Down),
            "stable" => Ok(Trend::Stable),
            _ => Err(()),
        }
    }
}

/// Typed measurement value; persisted as its string rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasureValue {
    Numeric(f64),
    Trend(Trend),
    Text(String),
}

impl MeasureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MeasureValue::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert an adapter value; numeric strings become numbers, null is absent
    pub fn from_observation(value: &ObservationValue) -> Option<Self> {
        match value {
            ObservationValue::Integer(v) => Some(MeasureValue::Numeric(*v as f64)),
            ObservationValue::Float(v) => Some(MeasureValue::Numeric(*v)),
            ObservationValue::String(s) => Some(MeasureValue::parse_stored(s)),
            ObservationValue::Null => None,
        }
    }

    /// Rebuild a value from the string column of the current table
    pub fn parse_stored(s: &str) -> Self {
        if let Ok(v) = s.trim().parse::<f64>() {
            if v.is_finite() {
                return MeasureValue::Numeric(v);
            }
        }
        match s.parse::<Trend>() {
            Ok(trend) => MeasureValue::Trend(trend),
            Err(()) => MeasureValue::Text(s.to_string()),
        }
    }
}

impl fmt::Display for MeasureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasureValue::Numeric(v) => write!(f, "{}", v),
            MeasureValue::Trend(t) => f.write_str(t.as_str()),
            MeasureValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for MeasureValue {
    fn from(value: f64) -> Self {
        MeasureValue::Numeric(value)
    }
}

impl From<Trend> for MeasureValue {
    fn from(value: Trend) -> Self {
        MeasureValue::Trend(value)
    }
}

/// Canonical unit of ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementWrite {
    pub device_id: String,
    pub device_name: String,
    pub module_id: String,
    pub module_name: String,
    pub module_type: ModuleType,
    pub measure_type: MeasureType,
    pub timestamp: Timestamp,
    /// `None` only when the source sent a null; such writes never validate
    pub value: Option<MeasureValue>,
}

impl MeasurementWrite {
    pub fn numeric(&self) -> Option<f64> {
        self.value.as_ref().and_then(MeasureValue::as_f64)
    }

    /// Same identity and timestamp, different measure type and value
    pub fn derive(&self, measure_type: MeasureType, value: MeasureValue) -> Self {
        Self {
            device_id: self.device_id.clone(),
            device_name: self.device_name.clone(),
            module_id: self.module_id.clone(),
            module_name: self.module_name.clone(),
            module_type: self.module_type,
            measure_type,
            timestamp: self.timestamp,
            value: Some(value),
        }
    }
}

/// A stored current-value row, as returned to readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub device_id: String,
    pub device_name: String,
    pub module_id: String,
    pub module_name: String,
    pub module_type: ModuleType,
    pub measure_type: MeasureType,
    pub timestamp: Timestamp,
    pub value: MeasureValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::Quantity;

    #[test]
    fn test_observation_value_conversions() {
        let float_val = ObservationValue::Float(25.5);
        assert_eq!(float_val.as_f64(), Some(25.5));

        let int_val = ObservationValue::Integer(42);
        assert_eq!(int_val.as_f64(), Some(42.0));

        let str_val = ObservationValue::String(" 12.5".into());
        assert_eq!(str_val.as_f64(), Some(12.5));

        let null_val = ObservationValue::Null;
        assert!(null_val.is_null());
        assert_eq!(MeasureValue::from_observation(&null_val), None);
    }

    #[test]
    fn test_measure_value_stored_form() {
        assert_eq!(MeasureValue::Numeric(190.0).to_string(), "190");
        assert_eq!(MeasureValue::Numeric(-3.25).to_string(), "-3.25");
        assert_eq!(MeasureValue::Trend(Trend::Up).to_string(), "up");

        assert_eq!(MeasureValue::parse_stored("1013.2"), MeasureValue::Numeric(1013.2));
        assert_eq!(MeasureValue::parse_stored("down"), MeasureValue::Trend(Trend::Down));
        assert_eq!(
            MeasureValue::parse_stored("Paris"),
            MeasureValue::Text("Paris".into())
        );
        assert_eq!(
            MeasureValue::parse_stored("NaN"),
            MeasureValue::Text("NaN".into())
        );
    }

    #[test]
    fn test_batch_serde() {
        let json = r#"{
            "station_id": "70:ee:50:00:00:01",
            "station_name": "Home",
            "station_type": "netatmo",
            "module_id": "02:00:00:00:00:01",
            "module_type": "outdoor",
            "observed_at": 1700000000,
            "readings": {"temperature": 12.5, "humidity": 80}
        }"#;
        let batch: ObservationBatch = serde_json::from_str(json).unwrap();

        assert_eq!(batch.station_type, StationType::Netatmo);
        assert_eq!(batch.module_type, ModuleType::Outdoor);
        assert_eq!(batch.readings.len(), 2);
        assert_eq!(
            batch.readings.get("humidity"),
            Some(&ObservationValue::Integer(80))
        );
        assert!(batch.place.is_none());
    }

    #[test]
    fn test_write_derive_keeps_identity() {
        let write = MeasurementWrite {
            device_id: "d".into(),
            device_name: "Home".into(),
            module_id: "m".into(),
            module_name: "Garden".into(),
            module_type: ModuleType::Outdoor,
            measure_type: MeasureType::raw(Quantity::Temperature),
            timestamp: 10,
            value: Some(MeasureValue::Numeric(1.0)),
        };
        let min = write.derive(
            MeasureType::new(Quantity::Temperature, crate::vocab::Aspect::Min),
            MeasureValue::Numeric(1.0),
        );
        assert_eq!(min.device_id, "d");
        assert_eq!(min.timestamp, 10);
        assert_eq!(min.measure_type.to_string(), "temperature_min");
    }
}
