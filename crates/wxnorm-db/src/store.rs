//! Storage collaborator contract

use crate::schema::{CurrentRow, HistoryRow, StationRow, YearlyRow};
use crate::DbResult;
use async_trait::async_trait;

/// Which side of the daily range a conditional upsert maintains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Min,
    Max,
}

/// Selection over the current-value table. Empty `measure_types` means all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrentFilter {
    pub device_id: Option<String>,
    pub module_id: Option<String>,
    pub measure_types: Vec<String>,
    /// Only rows with `measure_timestamp >= since`
    pub since: Option<i64>,
}

impl CurrentFilter {
    pub fn device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Self::default()
        }
    }

    pub fn module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }

    pub fn measure_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.measure_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn since(mut self, ts: i64) -> Self {
        self.since = Some(ts);
        self
    }

    pub fn matches(&self, row: &CurrentRow) -> bool {
        self.device_id.as_ref().map_or(true, |d| *d == row.device_id)
            && self.module_id.as_ref().map_or(true, |m| *m == row.module_id)
            && (self.measure_types.is_empty()
                || self.measure_types.iter().any(|t| *t == row.measure_type))
            && self.since.map_or(true, |s| row.measure_timestamp >= s)
    }
}

/// Decide whether a min/max row must be replaced. A stored row from before
/// `day_start` is always replaced; so is an unparseable stored value.
pub fn extremum_replaces(
    kind: Extremum,
    stored: Option<&CurrentRow>,
    value: f64,
    day_start: i64,
) -> bool {
    let Some(stored) = stored else {
        return true;
    };
    if stored.measure_timestamp < day_start {
        return true;
    }
    match stored.measure_value.trim().parse::<f64>() {
        Ok(current) => match kind {
            Extremum::Min => value < current,
            Extremum::Max => value > current,
        },
        Err(_) => true,
    }
}

/// Decide whether the day reference row must be (re)seeded
pub fn reference_stale(stored: Option<&CurrentRow>, day_start: i64) -> bool {
    stored.map_or(true, |row| row.measure_timestamp < day_start)
}

/// Persistence of current values, history samples and station rows.
///
/// `merge_extremum` and `seed_reference` must be atomic per key: concurrent
/// callers never lose a lower minimum or a higher maximum.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Replace-on-conflict upsert of one current row
    async fn upsert_current(&self, row: &CurrentRow) -> DbResult<()>;

    async fn get_current(
        &self,
        device_id: &str,
        module_id: &str,
        measure_type: &str,
    ) -> DbResult<Option<CurrentRow>>;

    /// Conditional upsert of a daily min/max row; returns whether it was written
    async fn merge_extremum(&self, row: &CurrentRow, kind: Extremum, day_start: i64)
        -> DbResult<bool>;

    /// Store `row` as the day reference unless one exists for the current
    /// local day; returns the effective reference row
    async fn seed_reference(&self, row: &CurrentRow, day_start: i64) -> DbResult<CurrentRow>;

    async fn fetch_current(&self, filter: &CurrentFilter) -> DbResult<Vec<CurrentRow>>;

    /// Insert-ignore of one history sample; returns whether a row was added
    async fn insert_history(&self, row: &HistoryRow) -> DbResult<bool>;

    /// Samples of one series with `timestamp >= since`, ascending
    async fn fetch_history(
        &self,
        device_id: &str,
        module_id: &str,
        measure_type: &str,
        since: i64,
    ) -> DbResult<Vec<HistoryRow>>;

    async fn purge_history_before(&self, timestamp: i64) -> DbResult<u64>;

    /// Insert or update by `station_id`; returns the station guid
    async fn upsert_station(&self, station: &StationRow) -> DbResult<i64>;

    /// Refresh the liveness columns without touching identity fields
    async fn touch_station(
        &self,
        station_id: &str,
        last_refresh: i64,
        last_seen: Option<i64>,
    ) -> DbResult<()>;

    async fn get_station(&self, station_id: &str) -> DbResult<Option<StationRow>>;

    async fn list_stations(&self) -> DbResult<Vec<StationRow>>;

    /// Stations owning at least one module of the given types
    async fn stations_with_module_types(&self, module_types: &[String])
        -> DbResult<Vec<StationRow>>;

    /// Remove a station and every row it owns; returns whether it existed
    async fn delete_station(&self, station_id: &str) -> DbResult<bool>;

    /// Yearly rows of one series with `from <= date <= to`, ascending
    async fn fetch_yearly(
        &self,
        device_id: &str,
        module_id: &str,
        measure_type: &str,
        from: &str,
        to: &str,
    ) -> DbResult<Vec<YearlyRow>>;

    async fn ping(&self) -> DbResult<()>;
}
