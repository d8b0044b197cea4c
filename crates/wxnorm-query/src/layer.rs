//! Query layer over the current-value, yearly and station tables

use crate::views::{measurement_from_row, Station, YearlyExtremum};
use crate::{QueryError, QueryResult};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use wxnorm_core::obsolescence::filter_obsolete;
use wxnorm_core::{
    Aspect, MeasureType, Measurement, ModuleFamily, ObsolescenceLevel, Quantity, Timestamp,
};
use wxnorm_db::{Cache, CacheKey, CurrentFilter, MeasurementStore};

/// How a measurement read is evaluated
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadOptions {
    /// Reference time for staleness
    pub now: Timestamp,
    /// Drop rows older than the configured obsolescence level
    pub fresh_only: bool,
}

impl ReadOptions {
    pub fn all(now: Timestamp) -> Self {
        Self {
            now,
            fresh_only: false,
        }
    }

    pub fn fresh(now: Timestamp) -> Self {
        Self {
            now,
            fresh_only: true,
        }
    }
}

pub struct QueryLayer {
    store: Arc<dyn MeasurementStore>,
    cache: Arc<dyn Cache>,
    level: ObsolescenceLevel,
}

impl QueryLayer {
    pub fn new(
        store: Arc<dyn MeasurementStore>,
        cache: Arc<dyn Cache>,
        level: ObsolescenceLevel,
    ) -> Self {
        Self {
            store,
            cache,
            level,
        }
    }

    pub fn obsolescence_level(&self) -> ObsolescenceLevel {
        self.level
    }

    /// Serve `key` from the cache, or load and return it. Loaded values are
    /// stored only when `keep` accepts them.
    async fn cached<T, F, Fut>(&self, key: CacheKey, keep: fn(&T) -> bool, load: F) -> QueryResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        if let Some(raw) = self.cache.get(&key).await {
            match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    debug!(key = %key, "Cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Dropping undecodable cache entry");
                    self.cache.invalidate(&key).await;
                }
            }
        }

        let value = load().await?;
        if !keep(&value) {
            return Ok(value);
        }
        match serde_json::to_string(&value) {
            Ok(raw) => self.cache.set(&key, raw).await,
            Err(e) => warn!(key = %key, error = %e, "Value not cacheable"),
        }
        Ok(value)
    }

    /// Every known station
    #[instrument(skip(self))]
    pub async fn stations(&self) -> QueryResult<Vec<Station>> {
        self.cached(CacheKey::stations(), |_| true, move || async move {
            self.store
                .list_stations()
                .await?
                .into_iter()
                .map(Station::try_from)
                .collect()
        })
        .await
    }

    /// Stations owning at least one module of the family
    #[instrument(skip(self))]
    pub async fn stations_by_family(&self, family: ModuleFamily) -> QueryResult<Vec<Station>> {
        self.cached(CacheKey::station_family(family.as_str()), |_| true, move || async move {
            let module_types: Vec<String> = family
                .module_types()
                .iter()
                .map(|t| t.to_string())
                .collect();
            self.store
                .stations_with_module_types(&module_types)
                .await?
                .into_iter()
                .map(Station::try_from)
                .collect()
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn station(&self, station_id: &str) -> QueryResult<Option<Station>> {
        // unknown stations are not cached so a first batch shows up at once
        self.cached(CacheKey::station(station_id), Option::is_some, move || async move {
            self.store
                .get_station(station_id)
                .await?
                .map(Station::try_from)
                .transpose()
        })
        .await
    }

    /// Every current row of a station
    #[instrument(skip(self))]
    pub async fn station_measurements(
        &self,
        device_id: &str,
        options: ReadOptions,
    ) -> QueryResult<Vec<Measurement>> {
        self.read(CurrentFilter::device(device_id), options).await
    }

    #[instrument(skip(self))]
    pub async fn module_measurements(
        &self,
        device_id: &str,
        module_id: &str,
        options: ReadOptions,
    ) -> QueryResult<Vec<Measurement>> {
        self.read(CurrentFilter::device(device_id).module(module_id), options)
            .await
    }

    /// A quantity with its companions, paired direction and sub-indices
    #[instrument(skip(self))]
    pub async fn measure_family(
        &self,
        device_id: &str,
        module_id: Option<&str>,
        quantity: Quantity,
        options: ReadOptions,
    ) -> QueryResult<Vec<Measurement>> {
        let mut filter = CurrentFilter::device(device_id).measure_types(
            MeasureType::sub_attributes(quantity)
                .into_iter()
                .map(|t| t.to_string()),
        );
        if let Some(module_id) = module_id {
            filter = filter.module(module_id);
        }
        self.read(filter, options).await
    }

    /// Rows of every station updated at or after `since`
    #[instrument(skip(self))]
    pub async fn measurements_since(
        &self,
        since: Timestamp,
        options: ReadOptions,
    ) -> QueryResult<Vec<Measurement>> {
        self.read(CurrentFilter::default().since(since), options)
            .await
    }

    /// Daily aggregates of one quantity between two local dates, inclusive
    #[instrument(skip(self))]
    pub async fn yearly_extrema(
        &self,
        device_id: &str,
        module_id: &str,
        quantity: Quantity,
        from: NaiveDate,
        to: NaiveDate,
    ) -> QueryResult<Vec<YearlyExtremum>> {
        let rows = self
            .store
            .fetch_yearly(
                device_id,
                module_id,
                quantity.as_str(),
                &from.format("%Y-%m-%d").to_string(),
                &to.format("%Y-%m-%d").to_string(),
            )
            .await?;
        rows.into_iter().map(YearlyExtremum::try_from).collect()
    }

    async fn read(&self, filter: CurrentFilter, options: ReadOptions) -> QueryResult<Vec<Measurement>> {
        let rows = self.store.fetch_current(&filter).await?;
        let mut measurements = rows
            .into_iter()
            .map(measurement_from_row)
            .collect::<QueryResult<Vec<_>>>()?;

        // day references are bookkeeping for trend fallback
        measurements.retain(|m| m.measure_type.aspect != Aspect::Reference);

        if options.fresh_only {
            measurements = filter_obsolete(measurements, self.level, options.now);
        }
        debug!(rows = measurements.len(), "Read measurements");
        Ok(measurements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wxnorm_core::{MeasureValue, ModuleType};
    use wxnorm_db::{CurrentRow, MemoryCache, MemoryStore, StationRow, YearlyRow};

    const NOW: Timestamp = 1_700_000_000;

    fn current(module_id: &str, module_type: &str, measure_type: &str, age: i64, value: &str) -> CurrentRow {
        CurrentRow {
            device_id: "dev".into(),
            module_id: module_id.into(),
            module_type: module_type.into(),
            measure_type: measure_type.into(),
            device_name: "Home".into(),
            module_name: "Module".into(),
            measure_timestamp: NOW - age,
            measure_value: value.into(),
        }
    }

    fn station(id: &str) -> StationRow {
        StationRow {
            guid: 0,
            station_id: id.into(),
            station_name: id.to_uppercase(),
            station_type: "netatmo".into(),
            loc_city: "Lyon".into(),
            loc_country: "FR".into(),
            loc_timezone: "Europe/Paris".into(),
            loc_altitude: 170.0,
            loc_latitude: 45.76,
            loc_longitude: 4.83,
            module_count: 1,
            last_refresh: NOW,
            last_seen: None,
        }
    }

    fn layer(level: ObsolescenceLevel) -> (Arc<MemoryStore>, Arc<MemoryCache>, QueryLayer) {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let layer = QueryLayer::new(store.clone(), cache.clone(), level);
        (store, cache, layer)
    }

    #[tokio::test]
    async fn test_stations_are_cached() {
        let (store, cache, layer) = layer(ObsolescenceLevel::None);
        store.upsert_station(&station("a")).await.unwrap();

        let first = layer.stations().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].location.city, "Lyon");

        // served from cache until invalidated
        store.upsert_station(&station("b")).await.unwrap();
        assert_eq!(layer.stations().await.unwrap().len(), 1);

        cache.invalidate(&CacheKey::stations()).await;
        assert_eq!(layer.stations().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stations_by_family() {
        let (store, _, layer) = layer(ObsolescenceLevel::None);
        store.upsert_station(&station("a")).await.unwrap();
        store.upsert_station(&station("b")).await.unwrap();
        let mut wind = current("w", "wind", "windstrength", 0, "12");
        wind.device_id = "b".into();
        store.upsert_current(&wind).await.unwrap();

        let found = layer.stations_by_family(ModuleFamily::Wind).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].station_id, "b");
    }

    #[tokio::test]
    async fn test_station_lookup() {
        let (store, cache, layer) = layer(ObsolescenceLevel::None);
        assert!(layer.station("a").await.unwrap().is_none());
        store.upsert_station(&station("a")).await.unwrap();
        let found = layer.station("a").await.unwrap().unwrap();
        assert_eq!(found.station_name, "A");
        assert!(cache.get(&CacheKey::station("a")).await.is_some());
    }

    #[tokio::test]
    async fn test_station_ids_differing_in_case_stay_apart() {
        let (store, _, layer) = layer(ObsolescenceLevel::None);
        let mut upper = station("AB");
        upper.station_name = "Upper".into();
        let mut lower = station("ab");
        lower.station_name = "Lower".into();
        store.upsert_station(&upper).await.unwrap();
        store.upsert_station(&lower).await.unwrap();

        assert_eq!(layer.station("AB").await.unwrap().unwrap().station_name, "Upper");
        assert_eq!(layer.station("ab").await.unwrap().unwrap().station_name, "Lower");
    }

    #[tokio::test]
    async fn test_fresh_reads_apply_obsolescence() {
        let (store, _, layer) = layer(ObsolescenceLevel::Tight);
        for row in [
            current("out", "outdoor", "temperature", 25 * 60, "12"),
            current("out", "outdoor", "temperature_min", 25 * 60, "8"),
            current("out", "outdoor", "humidity", 60, "70"),
            current("main", "main", "loc_latitude", 30 * 86_400, "45.76"),
        ] {
            store.upsert_current(&row).await.unwrap();
        }

        let fresh = layer
            .station_measurements("dev", ReadOptions::fresh(NOW))
            .await
            .unwrap();
        let names: Vec<String> = fresh.iter().map(|m| m.measure_type.to_string()).collect();
        assert_eq!(names, vec!["loc_latitude", "humidity", "temperature_min"]);

        let all = layer
            .station_measurements("dev", ReadOptions::all(NOW))
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_measure_family_and_hidden_reference() {
        let (store, _, layer) = layer(ObsolescenceLevel::None);
        for row in [
            current("w", "wind", "windangle", 0, "10"),
            current("w", "wind", "winddirection", 0, "190"),
            current("w", "wind", "windstrength", 0, "12"),
            current("out", "outdoor", "pressure", 0, "1013"),
            current("out", "outdoor", "pressure_trend", 0, "up"),
            current("out", "outdoor", "pressure_ref", 0, "1000"),
        ] {
            store.upsert_current(&row).await.unwrap();
        }

        let angle = layer
            .measure_family("dev", Some("w"), Quantity::WindAngle, ReadOptions::all(NOW))
            .await
            .unwrap();
        assert_eq!(angle.len(), 2);
        assert!(angle
            .iter()
            .any(|m| m.value == MeasureValue::Numeric(190.0)));

        let module = layer
            .module_measurements("dev", "out", ReadOptions::all(NOW))
            .await
            .unwrap();
        assert_eq!(module.len(), 2);
        assert!(module.iter().all(|m| m.module_type == ModuleType::Outdoor));
    }

    #[tokio::test]
    async fn test_measurements_since() {
        let (store, _, layer) = layer(ObsolescenceLevel::None);
        store
            .upsert_current(&current("out", "outdoor", "temperature", 600, "12"))
            .await
            .unwrap();
        store
            .upsert_current(&current("out", "outdoor", "humidity", 60, "70"))
            .await
            .unwrap();
        let recent = layer
            .measurements_since(NOW - 300, ReadOptions::all(NOW))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn test_inconsistent_row_fails_the_read() {
        let (store, _, layer) = layer(ObsolescenceLevel::None);
        store
            .upsert_current(&current("out", "outdoor", "temperature", 0, "12"))
            .await
            .unwrap();
        store
            .upsert_current(&current("out", "outdoor", "bogus_measure", 0, "1"))
            .await
            .unwrap();

        let err = layer
            .station_measurements("dev", ReadOptions::all(NOW))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InconsistentData(_)));
        insta::assert_snapshot!(
            QueryError::InconsistentData("x".into()).to_string(),
            @"inconsistent data: x"
        );
    }

    #[tokio::test]
    async fn test_storage_failure_is_query_error() {
        let (store, _, layer) = layer(ObsolescenceLevel::None);
        store.set_unavailable(true);
        assert!(matches!(
            layer.station_measurements("dev", ReadOptions::all(NOW)).await,
            Err(QueryError::Storage(_))
        ));
        assert!(layer.stations().await.is_err());
    }

    #[tokio::test]
    async fn test_yearly_extrema() {
        let (store, _, layer) = layer(ObsolescenceLevel::None);
        for (date, set, value) in [
            ("2024-06-09", "min", 12.0),
            ("2024-06-10", "max", 31.5),
            ("2024-07-01", "max", 35.0),
        ] {
            store
                .put_yearly(YearlyRow {
                    date: date.into(),
                    device_id: "dev".into(),
                    module_id: "out".into(),
                    module_type: "outdoor".into(),
                    measure_type: "temperature".into(),
                    measure_set: set.into(),
                    measure_value: value,
                })
                .await
                .unwrap();
        }

        let june = layer
            .yearly_extrema(
                "dev",
                "out",
                Quantity::Temperature,
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(june.len(), 2);
        assert_eq!(june[1].value, 31.5);
    }
}
