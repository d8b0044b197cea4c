//! In-process storage backend

use crate::schema::{CurrentRow, HistoryRow, StationRow, YearlyRow};
use crate::store::{extremum_replaces, reference_stale, CurrentFilter, Extremum, MeasurementStore};
use crate::{DbError, DbResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

type CurrentKey = (String, String, String);
type HistoryKey = (String, String, String, i64);
type YearlyKey = (String, String, String, String, String);

#[derive(Default)]
struct Tables {
    current: BTreeMap<CurrentKey, CurrentRow>,
    history: BTreeMap<HistoryKey, HistoryRow>,
    yearly: BTreeMap<YearlyKey, YearlyRow>,
    stations: BTreeMap<String, StationRow>,
    next_guid: i64,
}

/// `MeasurementStore` kept in memory behind a single async mutex, which makes
/// every operation atomic
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

fn current_key(row: &CurrentRow) -> CurrentKey {
    (
        row.device_id.clone(),
        row.module_id.clone(),
        row.measure_type.clone(),
    )
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `DbError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> DbResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(DbError::Unavailable("memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }

    /// Load a yearly row, standing in for the external rollup job
    pub async fn put_yearly(&self, row: YearlyRow) -> DbResult<()> {
        self.check()?;
        let key = (
            row.device_id.clone(),
            row.module_id.clone(),
            row.measure_type.clone(),
            row.date.clone(),
            row.measure_set.clone(),
        );
        self.tables.lock().await.yearly.insert(key, row);
        Ok(())
    }

    pub async fn history_len(&self) -> usize {
        self.tables.lock().await.history.len()
    }
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    async fn upsert_current(&self, row: &CurrentRow) -> DbResult<()> {
        self.check()?;
        self.tables
            .lock()
            .await
            .current
            .insert(current_key(row), row.clone());
        Ok(())
    }

    async fn get_current(
        &self,
        device_id: &str,
        module_id: &str,
        measure_type: &str,
    ) -> DbResult<Option<CurrentRow>> {
        self.check()?;
        let key = (
            device_id.to_string(),
            module_id.to_string(),
            measure_type.to_string(),
        );
        Ok(self.tables.lock().await.current.get(&key).cloned())
    }

    async fn merge_extremum(
        &self,
        row: &CurrentRow,
        kind: Extremum,
        day_start: i64,
    ) -> DbResult<bool> {
        self.check()?;
        let Ok(value) = row.measure_value.parse::<f64>() else {
            return Ok(false);
        };

        let mut tables = self.tables.lock().await;
        let key = current_key(row);
        let replace = extremum_replaces(kind, tables.current.get(&key), value, day_start);
        if replace {
            tables.current.insert(key, row.clone());
        }
        Ok(replace)
    }

    async fn seed_reference(&self, row: &CurrentRow, day_start: i64) -> DbResult<CurrentRow> {
        self.check()?;
        let mut tables = self.tables.lock().await;
        let key = current_key(row);
        if let Some(existing) = tables.current.get(&key) {
            if !reference_stale(Some(existing), day_start) {
                return Ok(existing.clone());
            }
        }
        tables.current.insert(key, row.clone());
        Ok(row.clone())
    }

    async fn fetch_current(&self, filter: &CurrentFilter) -> DbResult<Vec<CurrentRow>> {
        self.check()?;
        Ok(self
            .tables
            .lock()
            .await
            .current
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    async fn insert_history(&self, row: &HistoryRow) -> DbResult<bool> {
        self.check()?;
        let key = (
            row.device_id.clone(),
            row.module_id.clone(),
            row.measure_type.clone(),
            row.timestamp,
        );
        let mut tables = self.tables.lock().await;
        if tables.history.contains_key(&key) {
            return Ok(false);
        }
        tables.history.insert(key, row.clone());
        Ok(true)
    }

    async fn fetch_history(
        &self,
        device_id: &str,
        module_id: &str,
        measure_type: &str,
        since: i64,
    ) -> DbResult<Vec<HistoryRow>> {
        self.check()?;
        let from = (
            device_id.to_string(),
            module_id.to_string(),
            measure_type.to_string(),
            since,
        );
        let to = (
            device_id.to_string(),
            module_id.to_string(),
            measure_type.to_string(),
            i64::MAX,
        );
        Ok(self
            .tables
            .lock()
            .await
            .history
            .range(from..=to)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn purge_history_before(&self, timestamp: i64) -> DbResult<u64> {
        self.check()?;
        let mut tables = self.tables.lock().await;
        let before = tables.history.len();
        tables.history.retain(|_, row| row.timestamp >= timestamp);
        Ok((before - tables.history.len()) as u64)
    }

    async fn upsert_station(&self, station: &StationRow) -> DbResult<i64> {
        self.check()?;
        let mut tables = self.tables.lock().await;
        let guid = match tables.stations.get(&station.station_id) {
            Some(existing) => existing.guid,
            None => {
                tables.next_guid += 1;
                tables.next_guid
            }
        };
        let mut row = station.clone();
        row.guid = guid;
        tables.stations.insert(row.station_id.clone(), row);
        Ok(guid)
    }

    async fn touch_station(
        &self,
        station_id: &str,
        last_refresh: i64,
        last_seen: Option<i64>,
    ) -> DbResult<()> {
        self.check()?;
        if let Some(row) = self.tables.lock().await.stations.get_mut(station_id) {
            row.last_refresh = last_refresh;
            if last_seen.is_some() {
                row.last_seen = last_seen;
            }
        }
        Ok(())
    }

    async fn get_station(&self, station_id: &str) -> DbResult<Option<StationRow>> {
        self.check()?;
        Ok(self.tables.lock().await.stations.get(station_id).cloned())
    }

    async fn list_stations(&self) -> DbResult<Vec<StationRow>> {
        self.check()?;
        let mut rows: Vec<_> = self.tables.lock().await.stations.values().cloned().collect();
        rows.sort_by(|a, b| {
            (&a.station_name, &a.station_id).cmp(&(&b.station_name, &b.station_id))
        });
        Ok(rows)
    }

    async fn stations_with_module_types(
        &self,
        module_types: &[String],
    ) -> DbResult<Vec<StationRow>> {
        let stations = self.list_stations().await?;
        let tables = self.tables.lock().await;
        Ok(stations
            .into_iter()
            .filter(|station| {
                tables.current.values().any(|row| {
                    row.device_id == station.station_id && module_types.contains(&row.module_type)
                })
            })
            .collect())
    }

    async fn delete_station(&self, station_id: &str) -> DbResult<bool> {
        self.check()?;
        let mut tables = self.tables.lock().await;
        tables.current.retain(|(device, _, _), _| device != station_id);
        tables.history.retain(|(device, _, _, _), _| device != station_id);
        tables.yearly.retain(|(device, _, _, _, _), _| device != station_id);
        Ok(tables.stations.remove(station_id).is_some())
    }

    async fn fetch_yearly(
        &self,
        device_id: &str,
        module_id: &str,
        measure_type: &str,
        from: &str,
        to: &str,
    ) -> DbResult<Vec<YearlyRow>> {
        self.check()?;
        Ok(self
            .tables
            .lock()
            .await
            .yearly
            .values()
            .filter(|row| {
                row.device_id == device_id
                    && row.module_id == module_id
                    && row.measure_type == measure_type
                    && row.date.as_str() >= from
                    && row.date.as_str() <= to
            })
            .cloned()
            .collect())
    }

    async fn ping(&self) -> DbResult<()> {
        self.check()
    }
}
