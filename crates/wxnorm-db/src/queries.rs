//! MySQL implementation of the storage contract

use crate::schema::{tables, CurrentRow, HistoryRow, StationRow, YearlyRow};
use crate::store::{CurrentFilter, Extremum, MeasurementStore};
use crate::{DbClient, DbResult};
use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlConnection};
use sqlx::QueryBuilder;
use tracing::{debug, instrument};

const UPSERT_CURRENT: &str = r#"
    INSERT INTO measurements_current (
        device_id, module_id, module_type, measure_type,
        device_name, module_name, measure_timestamp, measure_value
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    ON DUPLICATE KEY UPDATE
        module_type = VALUES(module_type),
        device_name = VALUES(device_name),
        module_name = VALUES(module_name),
        measure_timestamp = VALUES(measure_timestamp),
        measure_value = VALUES(measure_value)
"#;

const SELECT_CURRENT: &str = r#"
    SELECT device_id, module_id, module_type, measure_type,
           device_name, module_name, measure_timestamp, measure_value
    FROM measurements_current
"#;

const SELECT_STATION: &str = r#"
    SELECT guid, station_id, station_name, station_type,
           loc_city, loc_country, loc_timezone,
           loc_altitude, loc_latitude, loc_longitude,
           module_count, last_refresh, last_seen
    FROM stations
"#;

async fn upsert_current_with(conn: &mut MySqlConnection, row: &CurrentRow) -> DbResult<()> {
    sqlx::query(UPSERT_CURRENT)
        .bind(&row.device_id)
        .bind(&row.module_id)
        .bind(&row.module_type)
        .bind(&row.measure_type)
        .bind(&row.device_name)
        .bind(&row.module_name)
        .bind(row.measure_timestamp)
        .bind(&row.measure_value)
        .execute(conn)
        .await?;
    Ok(())
}

/// Day min/max upsert as a single statement so concurrent writers of one
/// key only ever contend on that row. `measure_value` is assigned before
/// `measure_timestamp`: MySQL applies the assignments left to right, so the
/// value condition still sees the stored timestamp. A tie keeps the stored
/// value and takes the newer timestamp.
fn merge_extremum_sql(kind: Extremum) -> String {
    let better = match kind {
        Extremum::Min => "<",
        Extremum::Max => ">",
    };
    format!(
        r#"
    INSERT INTO measurements_current (
        device_id, module_id, module_type, measure_type,
        device_name, module_name, measure_timestamp, measure_value
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    ON DUPLICATE KEY UPDATE
        module_type = VALUES(module_type),
        device_name = VALUES(device_name),
        module_name = VALUES(module_name),
        measure_value = IF(
            CASE
                WHEN measure_timestamp < ? THEN 1
                WHEN TRIM(measure_value) NOT REGEXP '{NUMERIC_PATTERN}' THEN 1
                WHEN ? {better} CAST(TRIM(measure_value) AS DOUBLE) THEN 1
                ELSE 0
            END,
            VALUES(measure_value),
            measure_value
        ),
        measure_timestamp = IF(
            measure_timestamp < ? OR measure_value = VALUES(measure_value),
            VALUES(measure_timestamp),
            measure_timestamp
        )
"#
    )
}

const NUMERIC_PATTERN: &str = r"^[-+]{0,1}[0-9]+(\\.[0-9]*){0,1}([eE][-+]{0,1}[0-9]+){0,1}$";

const SEED_REFERENCE: &str = r#"
    INSERT INTO measurements_current (
        device_id, module_id, module_type, measure_type,
        device_name, module_name, measure_timestamp, measure_value
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    ON DUPLICATE KEY UPDATE
        module_type = IF(measure_timestamp < ?, VALUES(module_type), module_type),
        device_name = IF(measure_timestamp < ?, VALUES(device_name), device_name),
        module_name = IF(measure_timestamp < ?, VALUES(module_name), module_name),
        measure_value = IF(measure_timestamp < ?, VALUES(measure_value), measure_value),
        measure_timestamp = IF(measure_timestamp < ?, VALUES(measure_timestamp), measure_timestamp)
"#;

#[async_trait]
impl MeasurementStore for DbClient {
    #[instrument(skip(self, row), fields(device_id = %row.device_id, measure_type = %row.measure_type))]
    async fn upsert_current(&self, row: &CurrentRow) -> DbResult<()> {
        let mut conn = self.pool().acquire().await?;
        upsert_current_with(&mut conn, row).await?;
        debug!("Upserted current value {}", row.measure_value);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_current(
        &self,
        device_id: &str,
        module_id: &str,
        measure_type: &str,
    ) -> DbResult<Option<CurrentRow>> {
        let sql = format!(
            "{} WHERE device_id = ? AND module_id = ? AND measure_type = ?",
            SELECT_CURRENT
        );
        let row = sqlx::query_as::<_, CurrentRow>(&sql)
            .bind(device_id)
            .bind(module_id)
            .bind(measure_type)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    #[instrument(skip(self, row), fields(device_id = %row.device_id, measure_type = %row.measure_type))]
    async fn merge_extremum(
        &self,
        row: &CurrentRow,
        kind: Extremum,
        day_start: i64,
    ) -> DbResult<bool> {
        let Ok(value) = row.measure_value.parse::<f64>() else {
            return Ok(false);
        };

        sqlx::query(&merge_extremum_sql(kind))
            .bind(&row.device_id)
            .bind(&row.module_id)
            .bind(&row.module_type)
            .bind(&row.measure_type)
            .bind(&row.device_name)
            .bind(&row.module_name)
            .bind(row.measure_timestamp)
            .bind(&row.measure_value)
            .bind(day_start)
            .bind(value)
            .bind(day_start)
            .execute(self.pool())
            .await?;

        let stored = self
            .get_current(&row.device_id, &row.module_id, &row.measure_type)
            .await?;
        let replace = stored.is_some_and(|s| {
            s.measure_timestamp == row.measure_timestamp && s.measure_value == row.measure_value
        });
        debug!(?kind, replace, "Merged extremum");
        Ok(replace)
    }

    #[instrument(skip(self, row), fields(device_id = %row.device_id, measure_type = %row.measure_type))]
    async fn seed_reference(&self, row: &CurrentRow, day_start: i64) -> DbResult<CurrentRow> {
        sqlx::query(SEED_REFERENCE)
            .bind(&row.device_id)
            .bind(&row.module_id)
            .bind(&row.module_type)
            .bind(&row.measure_type)
            .bind(&row.device_name)
            .bind(&row.module_name)
            .bind(row.measure_timestamp)
            .bind(&row.measure_value)
            .bind(day_start)
            .bind(day_start)
            .bind(day_start)
            .bind(day_start)
            .bind(day_start)
            .execute(self.pool())
            .await?;

        let effective = self
            .get_current(&row.device_id, &row.module_id, &row.measure_type)
            .await?
            .unwrap_or_else(|| row.clone());
        if effective == *row {
            debug!("Seeded day reference {}", row.measure_value);
        }
        Ok(effective)
    }

    #[instrument(skip(self))]
    async fn fetch_current(&self, filter: &CurrentFilter) -> DbResult<Vec<CurrentRow>> {
        let mut qb = QueryBuilder::<MySql>::new(SELECT_CURRENT);
        qb.push(" WHERE 1 = 1");
        if let Some(device_id) = &filter.device_id {
            qb.push(" AND device_id = ").push_bind(device_id);
        }
        if let Some(module_id) = &filter.module_id {
            qb.push(" AND module_id = ").push_bind(module_id);
        }
        if !filter.measure_types.is_empty() {
            qb.push(" AND measure_type IN (");
            let mut list = qb.separated(", ");
            for measure_type in &filter.measure_types {
                list.push_bind(measure_type);
            }
            qb.push(")");
        }
        if let Some(since) = filter.since {
            qb.push(" AND measure_timestamp >= ").push_bind(since);
        }
        qb.push(" ORDER BY device_id, module_id, measure_type");

        let rows = qb
            .build_query_as::<CurrentRow>()
            .fetch_all(self.pool())
            .await?;
        debug!("Retrieved {} current rows", rows.len());
        Ok(rows)
    }

    #[instrument(skip(self, row), fields(device_id = %row.device_id, measure_type = %row.measure_type))]
    async fn insert_history(&self, row: &HistoryRow) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT IGNORE INTO measurements_daily (
                timestamp, device_id, module_id, module_type, measure_type, measure_value
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.timestamp)
        .bind(&row.device_id)
        .bind(&row.module_id)
        .bind(&row.module_type)
        .bind(&row.measure_type)
        .bind(row.measure_value)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn fetch_history(
        &self,
        device_id: &str,
        module_id: &str,
        measure_type: &str,
        since: i64,
    ) -> DbResult<Vec<HistoryRow>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT timestamp, device_id, module_id, module_type, measure_type, measure_value
            FROM measurements_daily
            WHERE device_id = ? AND module_id = ? AND measure_type = ? AND timestamp >= ?
            ORDER BY timestamp ASC
            "#,
        )
        .bind(device_id)
        .bind(module_id)
        .bind(measure_type)
        .bind(since)
        .fetch_all(self.pool())
        .await?;

        debug!("Retrieved {} history samples since {}", rows.len(), since);
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn purge_history_before(&self, timestamp: i64) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM measurements_daily WHERE timestamp < ?")
            .bind(timestamp)
            .execute(self.pool())
            .await?;

        let deleted = result.rows_affected();
        debug!("Deleted {} history samples before {}", deleted, timestamp);
        Ok(deleted)
    }

    #[instrument(skip(self, station), fields(station_id = %station.station_id))]
    async fn upsert_station(&self, station: &StationRow) -> DbResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO stations (
                station_id, station_name, station_type,
                loc_city, loc_country, loc_timezone,
                loc_altitude, loc_latitude, loc_longitude,
                module_count, last_refresh, last_seen
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                guid = LAST_INSERT_ID(guid),
                station_name = VALUES(station_name),
                station_type = VALUES(station_type),
                loc_city = VALUES(loc_city),
                loc_country = VALUES(loc_country),
                loc_timezone = VALUES(loc_timezone),
                loc_altitude = VALUES(loc_altitude),
                loc_latitude = VALUES(loc_latitude),
                loc_longitude = VALUES(loc_longitude),
                module_count = VALUES(module_count),
                last_refresh = VALUES(last_refresh),
                last_seen = VALUES(last_seen)
            "#,
        )
        .bind(&station.station_id)
        .bind(&station.station_name)
        .bind(&station.station_type)
        .bind(&station.loc_city)
        .bind(&station.loc_country)
        .bind(&station.loc_timezone)
        .bind(station.loc_altitude)
        .bind(station.loc_latitude)
        .bind(station.loc_longitude)
        .bind(station.module_count)
        .bind(station.last_refresh)
        .bind(station.last_seen)
        .execute(self.pool())
        .await?;

        // LAST_INSERT_ID(guid) makes the update path report the existing key
        let guid = result.last_insert_id() as i64;
        debug!(guid, "Upserted station");
        Ok(guid)
    }

    #[instrument(skip(self))]
    async fn touch_station(
        &self,
        station_id: &str,
        last_refresh: i64,
        last_seen: Option<i64>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE stations
            SET last_refresh = ?, last_seen = COALESCE(?, last_seen)
            WHERE station_id = ?
            "#,
        )
        .bind(last_refresh)
        .bind(last_seen)
        .bind(station_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_station(&self, station_id: &str) -> DbResult<Option<StationRow>> {
        let sql = format!("{} WHERE station_id = ?", SELECT_STATION);
        let row = sqlx::query_as::<_, StationRow>(&sql)
            .bind(station_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn list_stations(&self) -> DbResult<Vec<StationRow>> {
        let sql = format!("{} ORDER BY station_name, station_id", SELECT_STATION);
        let rows = sqlx::query_as::<_, StationRow>(&sql)
            .fetch_all(self.pool())
            .await?;
        debug!("Retrieved {} stations", rows.len());
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn stations_with_module_types(
        &self,
        module_types: &[String],
    ) -> DbResult<Vec<StationRow>> {
        if module_types.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<MySql>::new(SELECT_STATION);
        qb.push(
            " WHERE station_id IN (SELECT DISTINCT device_id FROM measurements_current WHERE module_type IN (",
        );
        let mut list = qb.separated(", ");
        for module_type in module_types {
            list.push_bind(module_type);
        }
        qb.push(")) ORDER BY station_name, station_id");

        let rows = qb
            .build_query_as::<StationRow>()
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn delete_station(&self, station_id: &str) -> DbResult<bool> {
        let mut tx = self.pool().begin().await?;
        for table in [tables::CURRENT, tables::DAILY, tables::YEARLY] {
            let sql = format!("DELETE FROM {} WHERE device_id = ?", table);
            let result = sqlx::query(&sql).bind(station_id).execute(&mut *tx).await?;
            debug!("Deleted {} rows from {}", result.rows_affected(), table);
        }
        let sql = format!("DELETE FROM {} WHERE station_id = ?", tables::STATIONS);
        let result = sqlx::query(&sql)
            .bind(station_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn fetch_yearly(
        &self,
        device_id: &str,
        module_id: &str,
        measure_type: &str,
        from: &str,
        to: &str,
    ) -> DbResult<Vec<YearlyRow>> {
        let rows = sqlx::query_as::<_, YearlyRow>(
            r#"
            SELECT date, device_id, module_id, module_type, measure_type, measure_set, measure_value
            FROM measurements_yearly
            WHERE device_id = ? AND module_id = ? AND measure_type = ?
              AND date >= ? AND date <= ?
            ORDER BY date ASC, measure_set ASC
            "#,
        )
        .bind(device_id)
        .bind(module_id)
        .bind(measure_type)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(self.pool()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholders(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn test_merge_extremum_is_one_statement() {
        let min = merge_extremum_sql(Extremum::Min);
        let max = merge_extremum_sql(Extremum::Max);
        assert!(!min.contains("FOR UPDATE"));
        assert!(min.contains("WHEN ? < CAST(TRIM(measure_value) AS DOUBLE)"));
        assert!(max.contains("WHEN ? > CAST(TRIM(measure_value) AS DOUBLE)"));
        // one per column, then day_start, value and day_start again
        assert_eq!(placeholders(&min), 11);
    }

    #[test]
    fn test_value_assigned_before_timestamp() {
        for sql in [merge_extremum_sql(Extremum::Min), SEED_REFERENCE.to_string()] {
            let value = sql.find("measure_value = IF(").unwrap();
            let timestamp = sql.find("measure_timestamp = IF(").unwrap();
            assert!(value < timestamp);
        }
        assert_eq!(placeholders(SEED_REFERENCE), 13);
    }
}
