//! Typed views over stored rows

use crate::{QueryError, QueryResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use wxnorm_core::{MeasureType, MeasureValue, Measurement, ModuleType, StationType, Timestamp};
use wxnorm_db::{CurrentRow, StationRow, YearlyRow};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub country: String,
    pub timezone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub guid: i64,
    pub station_id: String,
    pub station_name: String,
    pub station_type: StationType,
    pub location: Location,
    pub module_count: i32,
    pub last_refresh: Timestamp,
    pub last_seen: Option<Timestamp>,
}

impl TryFrom<StationRow> for Station {
    type Error = QueryError;

    fn try_from(row: StationRow) -> QueryResult<Self> {
        let station_type = row.station_type.parse::<StationType>().map_err(|e| {
            QueryError::InconsistentData(format!("station {}: {}", row.station_id, e))
        })?;
        Ok(Station {
            guid: row.guid,
            station_id: row.station_id,
            station_name: row.station_name,
            station_type,
            location: Location {
                city: row.loc_city,
                country: row.loc_country,
                timezone: row.loc_timezone,
                latitude: row.loc_latitude,
                longitude: row.loc_longitude,
                altitude: row.loc_altitude,
            },
            module_count: row.module_count,
            last_refresh: row.last_refresh,
            last_seen: row.last_seen,
        })
    }
}

/// Parse a current-value row back into a typed measurement
pub fn measurement_from_row(row: CurrentRow) -> QueryResult<Measurement> {
    let module_type = row.module_type.parse::<ModuleType>().map_err(|e| {
        QueryError::InconsistentData(format!(
            "{}/{}: {}",
            row.device_id, row.module_id, e
        ))
    })?;
    let measure_type = row.measure_type.parse::<MeasureType>().map_err(|e| {
        QueryError::InconsistentData(format!(
            "{}/{}: {}",
            row.device_id, row.module_id, e
        ))
    })?;

    Ok(Measurement {
        value: MeasureValue::parse_stored(&row.measure_value),
        device_id: row.device_id,
        device_name: row.device_name,
        module_id: row.module_id,
        module_name: row.module_name,
        module_type,
        measure_type,
        timestamp: row.measure_timestamp,
    })
}

/// Daily aggregation tag of a yearly row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureSet {
    Min,
    Max,
    Avg,
    Sum,
}

impl std::str::FromStr for MeasureSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "min" => Ok(MeasureSet::Min),
            "max" => Ok(MeasureSet::Max),
            "avg" => Ok(MeasureSet::Avg),
            "sum" => Ok(MeasureSet::Sum),
            other => Err(format!("Unknown measure set: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyExtremum {
    pub date: NaiveDate,
    pub measure_type: MeasureType,
    pub measure_set: MeasureSet,
    pub value: f64,
}

impl TryFrom<YearlyRow> for YearlyExtremum {
    type Error = QueryError;

    fn try_from(row: YearlyRow) -> QueryResult<Self> {
        let inconsistent = |what: String| {
            QueryError::InconsistentData(format!("{}/{} {}: {}", row.device_id, row.module_id, row.date, what))
        };
        let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d")
            .map_err(|e| inconsistent(e.to_string()))?;
        let measure_type = row
            .measure_type
            .parse::<MeasureType>()
            .map_err(|e| inconsistent(e.to_string()))?;
        let measure_set = row.measure_set.parse::<MeasureSet>().map_err(inconsistent)?;

        Ok(YearlyExtremum {
            date,
            measure_type,
            measure_set,
            value: row.measure_value,
        })
    }
}
