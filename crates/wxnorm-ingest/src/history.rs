//! Bucketed history samples

use crate::IngestResult;
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::debug;
use wxnorm_core::timegrid::bucket_of;
use wxnorm_core::{MeasureType, MeasurementWrite, Timestamp};
use wxnorm_db::{HistoryRow, MeasurementStore};

#[derive(Clone)]
pub struct HistoryStore {
    store: Arc<dyn MeasurementStore>,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn MeasurementStore>) -> Self {
        Self { store }
    }

    /// Numeric value of a write the history table keeps; `None` for summary
    /// aspects, quantities outside the allow-list and non-numeric values
    pub fn sample_value(write: &MeasurementWrite) -> Option<f64> {
        if !write.measure_type.is_raw() || !write.measure_type.quantity.is_historized() {
            return None;
        }
        write.numeric()
    }

    /// Insert the write into its local 5-minute bucket. Returns whether a
    /// new row was stored; repeats within a bucket are ignored.
    pub async fn append(&self, write: &MeasurementWrite, timezone: Tz) -> IngestResult<bool> {
        let Some(value) = Self::sample_value(write) else {
            return Ok(false);
        };

        let row = HistoryRow {
            timestamp: bucket_of(write.timestamp, timezone),
            device_id: write.device_id.clone(),
            module_id: write.module_id.clone(),
            module_type: write.module_type.to_string(),
            measure_type: write.measure_type.to_string(),
            measure_value: value,
        };
        let inserted = self.store.insert_history(&row).await?;
        if !inserted {
            debug!(
                device_id = %row.device_id,
                measure_type = %row.measure_type,
                bucket = row.timestamp,
                "History bucket already filled"
            );
        }
        Ok(inserted)
    }

    /// Values of one series from `since` on, oldest first
    pub async fn samples(
        &self,
        device_id: &str,
        module_id: &str,
        measure_type: MeasureType,
        since: Timestamp,
    ) -> IngestResult<Vec<f64>> {
        let rows = self
            .store
            .fetch_history(device_id, module_id, &measure_type.to_string(), since)
            .await?;
        Ok(rows.into_iter().map(|row| row.measure_value).collect())
    }

    /// Retention: drop every sample older than `timestamp`
    pub async fn purge_before(&self, timestamp: Timestamp) -> IngestResult<u64> {
        Ok(self.store.purge_history_before(timestamp).await?)
    }
}
