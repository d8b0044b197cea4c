//! Observation batch -> canonical write list
//!
//! The canonicalizer never touches storage. It returns the ordered writes a
//! batch expands to, including the values derived from it.

use crate::health::HealthIndex;
use crate::psychro;
use crate::types::{MeasureValue, MeasurementWrite, ObservationBatch, Timestamp};
use crate::vocab::{MeasureType, ModuleType, Quantity};
use std::collections::HashMap;
use tracing::debug;

/// Batch-level failure: nothing from the batch may be committed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanonicalError {
    #[error("Batch has no station_id")]
    MissingStationId,

    #[error("Batch has no module_id")]
    MissingModuleId,

    #[error("Reading '{reading}' has invalid timestamp {timestamp}")]
    InvalidTimestamp { reading: String, timestamp: Timestamp },
}

/// Inputs the canonicalizer needs besides the batch itself
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanonicalContext {
    pub now: Timestamp,
    /// Station pressure (hPa) from another module, used when the batch's own
    /// module has no barometer
    pub pressure_ref: Option<f64>,
}

impl CanonicalContext {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now,
            pressure_ref: None,
        }
    }

    pub fn with_pressure_ref(mut self, pressure: Option<f64>) -> Self {
        self.pressure_ref = pressure;
        self
    }
}

/// Normalize an angle into `[0, 360)`
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

/// Opposite bearing of an angle
pub fn complement_direction(angle: f64) -> f64 {
    normalize_angle(angle + 180.0)
}

struct WriteList<'a> {
    batch: &'a ObservationBatch,
    writes: Vec<MeasurementWrite>,
}

impl<'a> WriteList<'a> {
    fn new(batch: &'a ObservationBatch) -> Self {
        Self {
            batch,
            writes: Vec::with_capacity(batch.readings.len() + 12),
        }
    }

    fn push(&mut self, quantity: Quantity, timestamp: Timestamp, value: Option<MeasureValue>) {
        self.writes.push(MeasurementWrite {
            device_id: self.batch.station_id.clone(),
            device_name: self.batch.station_name.clone(),
            module_id: self.batch.module_id.clone(),
            module_name: self.batch.module_name.clone(),
            module_type: self.batch.module_type,
            measure_type: MeasureType::raw(quantity),
            timestamp,
            value,
        });
    }

    fn push_num(&mut self, quantity: Quantity, timestamp: Timestamp, value: f64) {
        self.push(quantity, timestamp, Some(MeasureValue::Numeric(value)));
    }

    fn push_text(&mut self, quantity: Quantity, timestamp: Timestamp, value: impl Into<String>) {
        self.push(quantity, timestamp, Some(MeasureValue::Text(value.into())));
    }
}

/// Reject a batch whose identity or timestamps make it unusable, before
/// anything is read or written for it
pub fn validate_batch(batch: &ObservationBatch) -> Result<(), CanonicalError> {
    if batch.station_id.trim().is_empty() {
        return Err(CanonicalError::MissingStationId);
    }
    if batch.module_id.trim().is_empty() {
        return Err(CanonicalError::MissingModuleId);
    }
    if let Some((name, ts)) = batch.reading_timestamps.iter().find(|(_, ts)| **ts <= 0) {
        return Err(CanonicalError::InvalidTimestamp {
            reading: name.clone(),
            timestamp: *ts,
        });
    }
    Ok(())
}

/// Expand a batch into canonical writes
pub fn canonicalize(
    batch: &ObservationBatch,
    ctx: &CanonicalContext,
) -> Result<Vec<MeasurementWrite>, CanonicalError> {
    validate_batch(batch)?;

    let observed = batch.observed_at.unwrap_or(ctx.now);
    let mut out = WriteList::new(batch);
    let mut numeric: HashMap<Quantity, f64> = HashMap::new();

    for (name, raw) in &batch.readings {
        let quantity = match name.parse::<Quantity>() {
            Ok(q) => q,
            Err(_) => {
                debug!(station_id = %batch.station_id, reading = %name, "Ignoring unknown reading");
                continue;
            }
        };
        // directions are always derived from their angle
        if matches!(quantity, Quantity::WindDirection | Quantity::GustDirection) {
            continue;
        }
        if !batch.module_type.accepts(quantity) {
            debug!(
                station_id = %batch.station_id,
                module_type = %batch.module_type,
                reading = %name,
                "Reading not in module vocabulary"
            );
            continue;
        }

        let timestamp = batch
            .reading_timestamps
            .get(name)
            .copied()
            .unwrap_or(observed);
        let value = MeasureValue::from_observation(raw);

        match (quantity.direction_of(), value) {
            (Some(direction), Some(MeasureValue::Numeric(angle))) => {
                let angle = normalize_angle(angle);
                out.push_num(quantity, timestamp, angle);
                out.push_num(direction, timestamp, complement_direction(angle));
            }
            (_, value) => {
                if let Some(v) = value.as_ref().and_then(MeasureValue::as_f64) {
                    numeric.insert(quantity, v);
                }
                out.push(quantity, timestamp, value);
            }
        }
    }

    derive_psychrometrics(batch.module_type, &numeric, ctx, observed, &mut out);

    if matches!(batch.module_type, ModuleType::Main | ModuleType::Indoor) {
        let idx = HealthIndex::compute(
            numeric.get(&Quantity::Temperature).copied(),
            numeric.get(&Quantity::Humidity).copied(),
            numeric.get(&Quantity::Co2).copied(),
            numeric.get(&Quantity::Noise).copied(),
        );
        let subs = [
            (Quantity::TempIdx, idx.temperature),
            (Quantity::HumIdx, idx.humidity),
            (Quantity::Co2Idx, idx.co2),
            (Quantity::NoiseIdx, idx.noise),
        ];
        for (quantity, score) in subs {
            if let Some(score) = score {
                out.push_num(quantity, observed, score);
            }
        }
        if let Some(composite) = idx.composite() {
            out.push_num(Quantity::HealthIdx, observed, composite);
        }
    }

    if let Some(meta) = &batch.device_meta {
        if let Some(signal) = meta.signal {
            out.push_num(Quantity::Signal, observed, signal);
        }
        if let Some(battery) = meta.battery {
            out.push_num(Quantity::Battery, observed, battery);
        }
        if let Some(firmware) = &meta.firmware {
            out.push_text(Quantity::Firmware, observed, firmware.clone());
        }
        let lifecycle = [
            (Quantity::FirstSetup, meta.first_setup),
            (Quantity::LastSetup, meta.last_setup),
            (Quantity::LastUpgrade, meta.last_upgrade),
        ];
        for (quantity, ts) in lifecycle {
            if let Some(ts) = ts {
                out.push_num(quantity, observed, ts as f64);
            }
        }
    }

    if let Some(place) = &batch.place {
        let city = place.city.clone().unwrap_or_default();
        let country = place.country.clone().unwrap_or_default();
        let timezone = place
            .timezone
            .clone()
            .filter(|tz| !tz.trim().is_empty())
            .unwrap_or_else(|| "UTC".to_string());
        out.push_text(Quantity::LocCity, ctx.now, city);
        out.push_text(Quantity::LocCountry, ctx.now, country);
        out.push_text(Quantity::LocTimezone, ctx.now, timezone);
        out.push_num(Quantity::LocAltitude, ctx.now, place.altitude.unwrap_or(0.0));
        out.push_num(Quantity::LocLatitude, ctx.now, place.latitude.unwrap_or(0.0));
        out.push_num(Quantity::LocLongitude, ctx.now, place.longitude.unwrap_or(0.0));
    }

    out.push_num(Quantity::LastRefresh, ctx.now, ctx.now as f64);
    if let Some(seen) = batch.last_seen {
        out.push_num(Quantity::LastSeen, ctx.now, seen as f64);
    }

    Ok(out.writes)
}

fn derive_psychrometrics(
    module_type: ModuleType,
    numeric: &HashMap<Quantity, f64>,
    ctx: &CanonicalContext,
    observed: Timestamp,
    out: &mut WriteList<'_>,
) {
    let temperature = numeric.get(&Quantity::Temperature).copied();
    let humidity = numeric.get(&Quantity::Humidity).copied();
    let pressure = numeric
        .get(&Quantity::Pressure)
        .copied()
        .or(ctx.pressure_ref);

    if module_type.accepts(Quantity::AbsoluteHumidity) {
        if let (Some(t), Some(p), Some(h)) = (temperature, pressure, humidity) {
            if let Some(q) = psychro::absolute_humidity(t, psychro::hpa_to_pa(p), h) {
                out.push_num(Quantity::AbsoluteHumidity, observed, q);
            }
        }
    }

    if module_type.accepts(Quantity::DewPoint) {
        if let (Some(t), Some(h)) = (temperature, humidity) {
            if let Some(dp) = psychro::dew_point(t, h) {
                out.push_num(Quantity::DewPoint, observed, dp);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeviceMeta, ObservationValue, Place};
    use crate::vocab::StationType;
    use std::collections::BTreeMap;

    const NOW: Timestamp = 1_700_000_600;

    fn batch(module_type: ModuleType, readings: &[(&str, ObservationValue)]) -> ObservationBatch {
        ObservationBatch {
            station_id: "70:ee:50:00:00:01".into(),
            station_name: "Home".into(),
            station_type: StationType::Netatmo,
            module_id: "02:00:00:00:00:01".into(),
            module_name: "Module".into(),
            module_type,
            observed_at: Some(1_700_000_000),
            readings: readings
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            reading_timestamps: BTreeMap::new(),
            place: None,
            device_meta: None,
            last_seen: None,
        }
    }

    fn find<'a>(writes: &'a [MeasurementWrite], name: &str) -> Option<&'a MeasurementWrite> {
        writes.iter().find(|w| w.measure_type.to_string() == name)
    }

    #[test]
    fn test_wind_angle_complement() {
        let b = batch(ModuleType::Wind, &[("windangle", ObservationValue::Integer(10))]);
        let writes = canonicalize(&b, &CanonicalContext::new(NOW)).unwrap();
        assert_eq!(find(&writes, "windangle").unwrap().numeric(), Some(10.0));
        assert_eq!(find(&writes, "winddirection").unwrap().numeric(), Some(190.0));
    }

    #[test]
    fn test_angles_are_normalized() {
        assert_eq!(normalize_angle(370.0), 10.0);
        assert_eq!(normalize_angle(-90.0), 270.0);
        assert_eq!(normalize_angle(360.0), 0.0);
        assert_eq!(complement_direction(270.0), 90.0);

        let b = batch(ModuleType::Wind, &[("gustangle", ObservationValue::Float(-45.0))]);
        let writes = canonicalize(&b, &CanonicalContext::new(NOW)).unwrap();
        assert_eq!(find(&writes, "gustangle").unwrap().numeric(), Some(315.0));
        assert_eq!(find(&writes, "gustdirection").unwrap().numeric(), Some(135.0));
    }

    #[test]
    fn test_vocabulary_and_unknown_readings_skipped() {
        let b = batch(
            ModuleType::Rain,
            &[
                ("rain", ObservationValue::Float(0.2)),
                ("temperature", ObservationValue::Float(12.0)),
                ("mystery", ObservationValue::Float(1.0)),
            ],
        );
        let writes = canonicalize(&b, &CanonicalContext::new(NOW)).unwrap();
        assert!(find(&writes, "rain").is_some());
        assert!(find(&writes, "temperature").is_none());
        assert!(find(&writes, "mystery").is_none());
    }

    #[test]
    fn test_timestamps() {
        let mut b = batch(
            ModuleType::Outdoor,
            &[
                ("temperature", ObservationValue::Float(12.0)),
                ("humidity", ObservationValue::Integer(70)),
            ],
        );
        b.reading_timestamps.insert("humidity".into(), 1_699_999_000);
        let writes = canonicalize(&b, &CanonicalContext::new(NOW)).unwrap();

        assert_eq!(find(&writes, "temperature").unwrap().timestamp, 1_700_000_000);
        assert_eq!(find(&writes, "humidity").unwrap().timestamp, 1_699_999_000);
        let refresh = find(&writes, "last_refresh").unwrap();
        assert_eq!(refresh.timestamp, NOW);
        assert_eq!(refresh.numeric(), Some(NOW as f64));

        b.observed_at = None;
        let writes = canonicalize(&b, &CanonicalContext::new(NOW)).unwrap();
        assert_eq!(find(&writes, "temperature").unwrap().timestamp, NOW);
    }

    #[test]
    fn test_absolute_humidity_needs_pressure() {
        let b = batch(
            ModuleType::Outdoor,
            &[
                ("temperature", ObservationValue::Float(20.0)),
                ("humidity", ObservationValue::Integer(50)),
            ],
        );
        let without = canonicalize(&b, &CanonicalContext::new(NOW)).unwrap();
        assert!(find(&without, "absolute_humidity").is_none());
        assert!(find(&without, "dew_point").is_some());

        let ctx = CanonicalContext::new(NOW).with_pressure_ref(Some(1013.25));
        let with = canonicalize(&b, &ctx).unwrap();
        let q = find(&with, "absolute_humidity").unwrap().numeric().unwrap();
        assert!((q - 0.0072).abs() < 0.0002);
    }

    #[test]
    fn test_forecast_module_derives_nothing_outside_vocabulary() {
        let b = batch(
            ModuleType::Forecast,
            &[
                ("temperature", ObservationValue::Float(18.0)),
                ("humidity", ObservationValue::Integer(60)),
                ("pressure", ObservationValue::Float(1015.0)),
            ],
        );
        let ctx = CanonicalContext::new(NOW).with_pressure_ref(Some(1013.25));
        let writes = canonicalize(&b, &ctx).unwrap();
        assert!(find(&writes, "absolute_humidity").is_none());
        for w in &writes {
            let q = w.measure_type.quantity;
            assert!(ModuleType::Forecast.accepts(q), "{q} written for a forecast module");
        }
    }

    #[test]
    fn test_main_module_health_index() {
        let b = batch(
            ModuleType::Main,
            &[
                ("temperature", ObservationValue::Float(21.0)),
                ("humidity", ObservationValue::Integer(50)),
                ("pressure", ObservationValue::Float(1013.0)),
                ("co2", ObservationValue::Integer(1300)),
                ("noise", ObservationValue::Integer(38)),
            ],
        );
        let writes = canonicalize(&b, &CanonicalContext::new(NOW)).unwrap();
        assert_eq!(find(&writes, "co2_idx").unwrap().numeric(), Some(50.0));
        assert_eq!(find(&writes, "noise_idx").unwrap().numeric(), Some(100.0));
        assert_eq!(find(&writes, "health_idx").unwrap().numeric(), Some(50.0));
        assert!(find(&writes, "absolute_humidity").is_some());
        // dew point is not part of the main module vocabulary
        assert!(find(&writes, "dew_point").is_none());
    }

    #[test]
    fn test_place_and_device_meta() {
        let mut b = batch(ModuleType::Main, &[]);
        b.place = Some(Place {
            city: Some("Lyon".into()),
            latitude: Some(45.76),
            ..Place::default()
        });
        b.device_meta = Some(DeviceMeta {
            firmware: Some("181".into()),
            first_setup: Some(1_500_000_000),
            ..DeviceMeta::default()
        });
        b.last_seen = Some(1_700_000_300);

        let writes = canonicalize(&b, &CanonicalContext::new(NOW)).unwrap();
        assert_eq!(
            find(&writes, "loc_city").unwrap().value,
            Some(MeasureValue::Text("Lyon".into()))
        );
        assert_eq!(
            find(&writes, "loc_timezone").unwrap().value,
            Some(MeasureValue::Text("UTC".into()))
        );
        assert_eq!(find(&writes, "loc_altitude").unwrap().numeric(), Some(0.0));
        assert_eq!(find(&writes, "loc_latitude").unwrap().numeric(), Some(45.76));
        assert_eq!(
            find(&writes, "firmware").unwrap().value,
            Some(MeasureValue::Text("181".into()))
        );
        assert_eq!(
            find(&writes, "first_setup").unwrap().numeric(),
            Some(1_500_000_000.0)
        );
        assert_eq!(
            find(&writes, "last_seen").unwrap().numeric(),
            Some(1_700_000_300.0)
        );
        assert!(find(&writes, "signal").is_none());
    }

    #[test]
    fn test_null_reading_kept_for_rejection() {
        let b = batch(ModuleType::Outdoor, &[("temperature", ObservationValue::Null)]);
        let writes = canonicalize(&b, &CanonicalContext::new(NOW)).unwrap();
        assert_eq!(find(&writes, "temperature").unwrap().value, None);
    }

    #[test]
    fn test_malformed_batches() {
        let mut b = batch(ModuleType::Outdoor, &[]);
        b.station_id = "".into();
        assert_eq!(
            canonicalize(&b, &CanonicalContext::new(NOW)),
            Err(CanonicalError::MissingStationId)
        );

        let mut b = batch(ModuleType::Outdoor, &[]);
        b.module_id = "  ".into();
        assert_eq!(
            canonicalize(&b, &CanonicalContext::new(NOW)),
            Err(CanonicalError::MissingModuleId)
        );

        let mut b = batch(ModuleType::Outdoor, &[("temperature", ObservationValue::Float(1.0))]);
        b.reading_timestamps.insert("temperature".into(), 0);
        assert!(matches!(
            canonicalize(&b, &CanonicalContext::new(NOW)),
            Err(CanonicalError::InvalidTimestamp { .. })
        ));
    }
}
