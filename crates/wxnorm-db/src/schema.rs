//! Table rows and DDL for the measurement schema
//!
//! Module and measure types are stored as their vocabulary strings. Readers
//! parse them back and treat anything unparseable as inconsistent data.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// `measurements_current` row, keyed by (device_id, module_id, measure_type)
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CurrentRow {
    pub device_id: String,
    pub module_id: String,
    pub module_type: String,
    pub measure_type: String,
    pub device_name: String,
    pub module_name: String,
    /// Unix epoch seconds
    pub measure_timestamp: i64,
    pub measure_value: String,
}

/// `measurements_daily` row, keyed by (timestamp, device_id, module_id, measure_type)
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct HistoryRow {
    /// Start of the local 5-minute bucket, as a Unix epoch
    pub timestamp: i64,
    pub device_id: String,
    pub module_id: String,
    pub module_type: String,
    pub measure_type: String,
    pub measure_value: f64,
}

/// `measurements_yearly` row written by the external daily rollup
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct YearlyRow {
    /// Local calendar day, `YYYY-MM-DD`
    pub date: String,
    pub device_id: String,
    pub module_id: String,
    pub module_type: String,
    pub measure_type: String,
    /// Aggregation tag: `min`, `max`, `avg` or `sum`
    pub measure_set: String,
    pub measure_value: f64,
}

/// `stations` row
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct StationRow {
    /// Surrogate key assigned on first sighting; ignored on upsert
    pub guid: i64,
    pub station_id: String,
    pub station_name: String,
    pub station_type: String,
    pub loc_city: String,
    pub loc_country: String,
    pub loc_timezone: String,
    pub loc_altitude: f64,
    pub loc_latitude: f64,
    pub loc_longitude: f64,
    pub module_count: i32,
    pub last_refresh: i64,
    pub last_seen: Option<i64>,
}

impl StationRow {
    /// Compare the fields whose change must invalidate cached station views
    pub fn same_identity(&self, other: &StationRow) -> bool {
        self.station_id == other.station_id
            && self.station_name == other.station_name
            && self.station_type == other.station_type
            && self.loc_city == other.loc_city
            && self.loc_country == other.loc_country
            && self.loc_timezone == other.loc_timezone
            && self.loc_altitude == other.loc_altitude
            && self.loc_latitude == other.loc_latitude
            && self.loc_longitude == other.loc_longitude
            && self.module_count == other.module_count
    }
}

pub mod tables {
    pub const CURRENT: &str = "measurements_current";
    pub const DAILY: &str = "measurements_daily";
    pub const YEARLY: &str = "measurements_yearly";
    pub const STATIONS: &str = "stations";
}

pub const CREATE_TABLES: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS stations (
        guid BIGINT NOT NULL AUTO_INCREMENT,
        station_id VARCHAR(64) NOT NULL,
        station_name VARCHAR(128) NOT NULL DEFAULT '',
        station_type VARCHAR(32) NOT NULL,
        loc_city VARCHAR(128) NOT NULL DEFAULT '',
        loc_country VARCHAR(8) NOT NULL DEFAULT '',
        loc_timezone VARCHAR(64) NOT NULL DEFAULT 'UTC',
        loc_altitude DOUBLE NOT NULL DEFAULT 0,
        loc_latitude DOUBLE NOT NULL DEFAULT 0,
        loc_longitude DOUBLE NOT NULL DEFAULT 0,
        module_count INT NOT NULL DEFAULT 0,
        last_refresh BIGINT NOT NULL DEFAULT 0,
        last_seen BIGINT NULL,
        PRIMARY KEY (guid),
        UNIQUE KEY uk_station_id (station_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS measurements_current (
        device_id VARCHAR(64) NOT NULL,
        module_id VARCHAR(64) NOT NULL,
        module_type VARCHAR(32) NOT NULL,
        measure_type VARCHAR(64) NOT NULL,
        device_name VARCHAR(128) NOT NULL DEFAULT '',
        module_name VARCHAR(128) NOT NULL DEFAULT '',
        measure_timestamp BIGINT NOT NULL,
        measure_value VARCHAR(255) NOT NULL,
        PRIMARY KEY (device_id, module_id, measure_type),
        KEY idx_measure_timestamp (measure_timestamp)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS measurements_daily (
        timestamp BIGINT NOT NULL,
        device_id VARCHAR(64) NOT NULL,
        module_id VARCHAR(64) NOT NULL,
        module_type VARCHAR(32) NOT NULL,
        measure_type VARCHAR(64) NOT NULL,
        measure_value DOUBLE NOT NULL,
        PRIMARY KEY (timestamp, device_id, module_id, measure_type),
        KEY idx_series (device_id, module_id, measure_type, timestamp)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS measurements_yearly (
        date CHAR(10) NOT NULL,
        device_id VARCHAR(64) NOT NULL,
        module_id VARCHAR(64) NOT NULL,
        module_type VARCHAR(32) NOT NULL,
        measure_type VARCHAR(64) NOT NULL,
        measure_set VARCHAR(8) NOT NULL,
        measure_value DOUBLE NOT NULL,
        PRIMARY KEY (date, device_id, module_id, measure_type, measure_set)
    )
    "#,
];
