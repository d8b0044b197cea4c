//! Batch ingestion: canonicalize, sync the station row, apply every write

use crate::current::CurrentValueStore;
use crate::{IngestResult, WriteContext, FACILITY};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use wxnorm_core::timegrid::parse_timezone;
use wxnorm_core::{
    canonicalize, validate_batch, BoundaryRules, CanonicalContext, MeasureType, MeasureValue,
    ObservationBatch, Quantity, Timestamp,
};
use wxnorm_db::{Cache, CacheKey, CacheNamespace, CurrentFilter, MeasurementStore, StationRow};
use wxnorm_obs::Event;

const SERVICE: &str = "ingestor";

/// Ingestion settings resolved from configuration
#[derive(Debug, Clone, Default)]
pub struct IngestSettings {
    pub rules: BoundaryRules,
    pub collect_history: bool,
    /// Station id -> IANA timezone, taking precedence over reported places
    pub timezones: BTreeMap<String, String>,
}

/// Outcome of one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub station_id: String,
    pub module_id: String,
    pub accepted: usize,
    pub rejected: usize,
    /// Whether the station row was created or its identity changed
    pub station_changed: bool,
}

pub struct Ingestor {
    store: Arc<dyn MeasurementStore>,
    cache: Arc<dyn Cache>,
    current: CurrentValueStore,
    settings: IngestSettings,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn MeasurementStore>,
        cache: Arc<dyn Cache>,
        settings: IngestSettings,
    ) -> Self {
        let current = CurrentValueStore::new(Arc::clone(&store));
        Self {
            store,
            cache,
            current,
            settings,
        }
    }

    pub fn current(&self) -> &CurrentValueStore {
        &self.current
    }

    /// Ingest one batch at time `now`. A malformed batch fails before any
    /// write; rejected writes are counted, not fatal.
    #[instrument(skip(self, batch), fields(station_id = %batch.station_id, module_id = %batch.module_id))]
    pub async fn ingest(&self, batch: &ObservationBatch, now: Timestamp) -> IngestResult<BatchReport> {
        validate_batch(batch)?;
        let pressure_ref = self.station_pressure(batch).await?;
        let ctx = CanonicalContext::new(now).with_pressure_ref(pressure_ref);
        let writes = canonicalize(batch, &ctx)?;

        let (timezone, station_changed) = self.sync_station(batch, now).await?;
        let write_ctx = WriteContext {
            timezone,
            collect_history: self.settings.collect_history,
            rules: &self.settings.rules,
            now,
        };

        let mut report = BatchReport {
            station_id: batch.station_id.clone(),
            module_id: batch.module_id.clone(),
            accepted: 0,
            rejected: 0,
            station_changed,
        };
        for write in &writes {
            if self.current.apply(write, &write_ctx).await? {
                report.accepted += 1;
            } else {
                report.rejected += 1;
            }
        }

        self.store
            .touch_station(&batch.station_id, now, batch.last_seen)
            .await?;

        debug!(
            accepted = report.accepted,
            rejected = report.rejected,
            "Batch ingested"
        );
        Ok(report)
    }

    /// Station pressure for the psychrometric derivation when the batch's own
    /// module has no barometer
    async fn station_pressure(&self, batch: &ObservationBatch) -> IngestResult<Option<f64>> {
        if batch.readings.contains_key(Quantity::Pressure.as_str()) {
            return Ok(None);
        }
        let filter = CurrentFilter::device(batch.station_id.clone())
            .measure_types([MeasureType::raw(Quantity::Pressure).to_string()]);
        let rows = self.store.fetch_current(&filter).await?;
        Ok(rows
            .iter()
            .find_map(|row| MeasureValue::parse_stored(&row.measure_value).as_f64()))
    }

    fn resolve_timezone(&self, batch: &ObservationBatch, stored: Option<&StationRow>) -> Tz {
        let configured = self
            .settings
            .timezones
            .get(&batch.station_id)
            .map(String::as_str);
        let reported = batch.place.as_ref().and_then(|p| p.timezone.as_deref());
        let known = stored.map(|s| s.loc_timezone.as_str());

        [configured, reported, known]
            .into_iter()
            .flatten()
            .find_map(parse_timezone)
            .unwrap_or(chrono_tz::UTC)
    }

    /// Create or update the station row when its identity changed, and drop
    /// the cached station views that depend on it
    async fn sync_station(
        &self,
        batch: &ObservationBatch,
        now: Timestamp,
    ) -> IngestResult<(Tz, bool)> {
        let stored = self.store.get_station(&batch.station_id).await?;
        let timezone = self.resolve_timezone(batch, stored.as_ref());

        let module_known = self
            .store
            .get_current(
                &batch.station_id,
                &batch.module_id,
                Quantity::LastRefresh.as_str(),
            )
            .await?
            .is_some();
        let candidate = station_row(batch, stored.as_ref(), module_known, now);

        let changed = stored
            .as_ref()
            .map_or(true, |existing| !existing.same_identity(&candidate));
        if changed {
            let guid = self.store.upsert_station(&candidate).await?;
            self.cache.invalidate(&CacheKey::station(&batch.station_id)).await;
            self.cache.invalidate_namespace(CacheNamespace::Stations).await;
            self.cache
                .invalidate_namespace(CacheNamespace::StationFamily)
                .await;

            let message = if stored.is_some() {
                "Station updated"
            } else {
                "Station created"
            };
            Event::new(FACILITY, SERVICE, 0, message)
                .device(batch.station_id.clone())
                .notice();
            info!(guid, timezone = %timezone, "{}", message);
        }
        Ok((timezone, changed))
    }
}

fn station_row(
    batch: &ObservationBatch,
    stored: Option<&StationRow>,
    module_known: bool,
    now: Timestamp,
) -> StationRow {
    let place = batch.place.clone().unwrap_or_default();
    let keep = |reported: Option<String>, previous: Option<&String>, default: &str| {
        reported
            .or_else(|| previous.cloned())
            .unwrap_or_else(|| default.to_string())
    };
    let keep_num = |reported: Option<f64>, previous: Option<f64>| {
        reported.or(previous).unwrap_or(0.0)
    };

    let station_name = if batch.station_name.is_empty() {
        stored.map(|s| s.station_name.clone()).unwrap_or_default()
    } else {
        batch.station_name.clone()
    };
    let module_count = stored.map_or(0, |s| s.module_count) + i32::from(!module_known);

    StationRow {
        guid: stored.map_or(0, |s| s.guid),
        station_id: batch.station_id.clone(),
        station_name,
        station_type: batch.station_type.to_string(),
        loc_city: keep(place.city, stored.map(|s| &s.loc_city), ""),
        loc_country: keep(place.country, stored.map(|s| &s.loc_country), ""),
        loc_timezone: keep(
            place.timezone.filter(|tz| !tz.trim().is_empty()),
            stored.map(|s| &s.loc_timezone),
            "UTC",
        ),
        loc_altitude: keep_num(place.altitude, stored.map(|s| s.loc_altitude)),
        loc_latitude: keep_num(place.latitude, stored.map(|s| s.loc_latitude)),
        loc_longitude: keep_num(place.longitude, stored.map(|s| s.loc_longitude)),
        module_count,
        last_refresh: now,
        last_seen: batch.last_seen.or_else(|| stored.and_then(|s| s.last_seen)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IngestError;
    use wxnorm_core::{BoundaryKey, ModuleType, ObservationValue, Place, StationType};
    use wxnorm_db::{MemoryCache, MemoryStore};

    const NOW: Timestamp = 1_718_000_000;

    fn batch(module_id: &str, module_type: ModuleType, readings: &[(&str, f64)]) -> ObservationBatch {
        ObservationBatch {
            station_id: "70:ee:50:00:00:01".into(),
            station_name: "Home".into(),
            station_type: StationType::Netatmo,
            module_id: module_id.into(),
            module_name: "Module".into(),
            module_type,
            observed_at: Some(NOW - 60),
            readings: readings
                .iter()
                .map(|(k, v)| (k.to_string(), ObservationValue::Float(*v)))
                .collect(),
            reading_timestamps: BTreeMap::new(),
            place: Some(Place {
                city: Some("Paris".into()),
                timezone: Some("Europe/Paris".into()),
                ..Place::default()
            }),
            device_meta: None,
            last_seen: None,
        }
    }

    fn ingestor(settings: IngestSettings) -> (Arc<MemoryStore>, Arc<MemoryCache>, Ingestor) {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let ingestor = Ingestor::new(store.clone(), cache.clone(), settings);
        (store, cache, ingestor)
    }

    #[tokio::test]
    async fn test_first_batch_creates_station() {
        let (store, _, ingestor) = ingestor(IngestSettings::default());
        let report = ingestor
            .ingest(&batch("main", ModuleType::Main, &[("pressure", 1013.0)]), NOW)
            .await
            .unwrap();

        assert!(report.station_changed);
        assert_eq!(report.rejected, 0);
        let station = store.get_station("70:ee:50:00:00:01").await.unwrap().unwrap();
        assert_eq!(station.module_count, 1);
        assert_eq!(station.loc_timezone, "Europe/Paris");
        assert_eq!(station.last_refresh, NOW);
    }

    #[tokio::test]
    async fn test_station_cache_invalidated_only_on_identity_change() {
        let (store, cache, ingestor) = ingestor(IngestSettings::default());
        let main = batch("main", ModuleType::Main, &[("pressure", 1013.0)]);
        ingestor.ingest(&main, NOW).await.unwrap();

        cache.set(&CacheKey::stations(), "cached".into()).await;
        cache.set(&CacheKey::station("70:ee:50:00:00:01"), "cached".into()).await;

        // same identity: cache untouched
        let report = ingestor.ingest(&main, NOW + 300).await.unwrap();
        assert!(!report.station_changed);
        assert_eq!(cache.len().await, 2);

        // a new module changes the module count
        let outdoor = batch("outdoor", ModuleType::Outdoor, &[("temperature", 12.0)]);
        let report = ingestor.ingest(&outdoor, NOW + 600).await.unwrap();
        assert!(report.station_changed);
        assert!(cache.is_empty().await);

        let station = store.get_station("70:ee:50:00:00:01").await.unwrap().unwrap();
        assert_eq!(station.module_count, 2);
    }

    #[tokio::test]
    async fn test_outdoor_uses_station_pressure() {
        let (store, _, ingestor) = ingestor(IngestSettings::default());
        ingestor
            .ingest(&batch("main", ModuleType::Main, &[("pressure", 1013.25)]), NOW)
            .await
            .unwrap();
        ingestor
            .ingest(
                &batch(
                    "outdoor",
                    ModuleType::Outdoor,
                    &[("temperature", 20.0), ("humidity", 50.0)],
                ),
                NOW + 60,
            )
            .await
            .unwrap();

        let row = store
            .get_current("70:ee:50:00:00:01", "outdoor", "absolute_humidity")
            .await
            .unwrap();
        assert!(row.is_some());
    }

    #[tokio::test]
    async fn test_rejections_counted() {
        let settings = IngestSettings {
            rules: BoundaryRules::default().with_override(BoundaryKey::HumExt, None, Some(100.0)),
            ..IngestSettings::default()
        };
        let (store, _, ingestor) = ingestor(settings);
        let report = ingestor
            .ingest(
                &batch("outdoor", ModuleType::Outdoor, &[("humidity", 150.0)]),
                NOW,
            )
            .await
            .unwrap();

        assert_eq!(report.rejected, 1);
        assert!(store
            .get_current("70:ee:50:00:00:01", "outdoor", "humidity")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_malformed_batch_writes_nothing() {
        let (store, _, ingestor) = ingestor(IngestSettings::default());
        let mut bad = batch("", ModuleType::Outdoor, &[("temperature", 12.0)]);
        bad.module_id = String::new();

        let err = ingestor.ingest(&bad, NOW).await.unwrap_err();
        assert!(matches!(err, IngestError::MalformedBatch(_)));
        assert!(store.list_stations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_batch_reported_while_storage_down() {
        let (store, _, ingestor) = ingestor(IngestSettings::default());
        store.set_unavailable(true);
        let mut bad = batch("outdoor", ModuleType::Outdoor, &[("temperature", 12.0)]);
        bad.module_id = " ".into();

        let err = ingestor.ingest(&bad, NOW).await.unwrap_err();
        assert!(matches!(err, IngestError::MalformedBatch(_)));
    }

    #[tokio::test]
    async fn test_configured_timezone_wins() {
        let mut timezones = BTreeMap::new();
        timezones.insert("70:ee:50:00:00:01".to_string(), "America/New_York".to_string());
        let (store, _, ingestor) = ingestor(IngestSettings {
            timezones,
            ..IngestSettings::default()
        });
        let b = batch("main", ModuleType::Main, &[("pressure", 1013.0)]);
        let stored = store.get_station("70:ee:50:00:00:01").await.unwrap();
        assert_eq!(
            ingestor.resolve_timezone(&b, stored.as_ref()),
            chrono_tz::America::New_York
        );
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces() {
        let (store, _, ingestor) = ingestor(IngestSettings::default());
        store.set_unavailable(true);
        let err = ingestor
            .ingest(&batch("main", ModuleType::Main, &[("pressure", 1013.0)]), NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Storage(_)));
    }
}
