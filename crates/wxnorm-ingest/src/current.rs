//! Current-value table maintenance
//!
//! Every accepted write replaces its `(device, module, measure_type)` row.
//! Raw writes of trend-tracked quantities then cascade into daily min, max
//! and trend companions scoped to the station's local day.

use crate::history::HistoryStore;
use crate::trend::TrendEstimator;
use crate::{IngestResult, WriteContext, FACILITY};
use std::sync::Arc;
use tracing::debug;
use wxnorm_core::timegrid::local_midnight;
use wxnorm_core::trend::fallback_trend;
use wxnorm_core::{validate, Aspect, MeasureType, MeasureValue, MeasurementWrite, Timestamp};
use wxnorm_db::{CurrentRow, Extremum, MeasurementStore};
use wxnorm_obs::Event;

const SERVICE: &str = "current";

/// Row for an accepted write; `None` when the write has no value
pub fn current_row(write: &MeasurementWrite) -> Option<CurrentRow> {
    let value = write.value.as_ref()?;
    Some(CurrentRow {
        device_id: write.device_id.clone(),
        module_id: write.module_id.clone(),
        module_type: write.module_type.to_string(),
        measure_type: write.measure_type.to_string(),
        device_name: write.device_name.clone(),
        module_name: write.module_name.clone(),
        measure_timestamp: write.timestamp,
        measure_value: value.to_string(),
    })
}

#[derive(Clone)]
pub struct CurrentValueStore {
    store: Arc<dyn MeasurementStore>,
    history: HistoryStore,
    trends: TrendEstimator,
}

impl CurrentValueStore {
    pub fn new(store: Arc<dyn MeasurementStore>) -> Self {
        let history = HistoryStore::new(Arc::clone(&store));
        let trends = TrendEstimator::new(history.clone());
        Self {
            store,
            history,
            trends,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Validate, store and cascade one write. `Ok(false)` means the write was
    /// rejected and nothing was stored for it.
    pub async fn apply(&self, write: &MeasurementWrite, ctx: &WriteContext<'_>) -> IngestResult<bool> {
        let Some(row) = self.admit(write, ctx) else {
            return Ok(false);
        };

        self.store.upsert_current(&row).await?;
        if ctx.collect_history {
            self.history.append(write, ctx.timezone).await?;
        }

        if write.measure_type.is_raw() {
            if let (Some(aspects), Some(value)) =
                (write.measure_type.quantity.companions(), write.numeric())
            {
                self.cascade(write, value, aspects, ctx).await?;
            }
        }
        Ok(true)
    }

    /// Validator gate; rejected writes are reported and dropped
    fn admit(&self, write: &MeasurementWrite, ctx: &WriteContext<'_>) -> Option<CurrentRow> {
        if let Err(rejection) = validate(write, ctx.rules) {
            Event::new(FACILITY, SERVICE, rejection.code(), rejection.to_string())
                .device(write.device_id.clone())
                .module(write.module_id.clone())
                .warning();
            return None;
        }
        current_row(write)
    }

    async fn cascade(
        &self,
        write: &MeasurementWrite,
        value: f64,
        [min, max, trend]: [Aspect; 3],
        ctx: &WriteContext<'_>,
    ) -> IngestResult<()> {
        let quantity = write.measure_type.quantity;
        let day_start = local_midnight(write.timestamp.max(ctx.now), ctx.timezone);
        if write.timestamp < day_start {
            // a late sample from an earlier local day must not touch today's companions
            debug!(
                device_id = %write.device_id,
                quantity = %quantity,
                timestamp = write.timestamp,
                "Skipped companions of a previous day"
            );
            return Ok(());
        }

        for (aspect, kind) in [(min, Extremum::Min), (max, Extremum::Max)] {
            let companion = write.derive(MeasureType::new(quantity, aspect), value.into());
            if let Some(row) = self.admit(&companion, ctx) {
                self.store.merge_extremum(&row, kind, day_start).await?;
            }
        }

        let reference = self.day_reference(write, value, day_start).await?;
        let regression = if ctx.collect_history {
            self.trends
                .estimate(write, value, ctx.timezone, ctx.now)
                .await?
        } else {
            None
        };
        let direction = regression.unwrap_or_else(|| fallback_trend(reference, value));

        let companion = write.derive(
            MeasureType::new(quantity, trend),
            MeasureValue::Trend(direction),
        );
        if let Some(row) = self.admit(&companion, ctx) {
            self.store.upsert_current(&row).await?;
        }

        debug!(
            device_id = %write.device_id,
            quantity = %quantity,
            trend = %direction,
            from_history = regression.is_some(),
            "Cascaded daily companions"
        );
        Ok(())
    }

    /// First value of the local day, seeded by the first write of that day
    async fn day_reference(
        &self,
        write: &MeasurementWrite,
        value: f64,
        day_start: Timestamp,
    ) -> IngestResult<Option<f64>> {
        let seed = write.derive(
            MeasureType::new(write.measure_type.quantity, Aspect::Reference),
            value.into(),
        );
        let Some(row) = current_row(&seed) else {
            return Ok(None);
        };
        let effective = self.store.seed_reference(&row, day_start).await?;
        Ok(effective.measure_value.trim().parse::<f64>().ok())
    }
}
