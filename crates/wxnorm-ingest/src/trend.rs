//! History-backed trend estimation

use crate::history::HistoryStore;
use crate::IngestResult;
use chrono_tz::Tz;
use tracing::debug;
use wxnorm_core::timegrid::bucket_of;
use wxnorm_core::trend::{regression_trend, TrendProfile};
use wxnorm_core::{MeasureType, MeasurementWrite, Timestamp, Trend};

#[derive(Clone)]
pub struct TrendEstimator {
    history: HistoryStore,
}

impl TrendEstimator {
    pub fn new(history: HistoryStore) -> Self {
        Self { history }
    }

    /// Regression over the quantity's lookback window, ending at the local
    /// grid point of `now`. `None` when the window holds too few samples.
    pub async fn estimate(
        &self,
        write: &MeasurementWrite,
        value: f64,
        timezone: Tz,
        now: Timestamp,
    ) -> IngestResult<Option<Trend>> {
        let quantity = write.measure_type.quantity;
        let profile = TrendProfile::for_quantity(quantity);
        let since = bucket_of(now, timezone) - profile.window_secs;

        let samples = self
            .history
            .samples(
                &write.device_id,
                &write.module_id,
                MeasureType::raw(quantity),
                since,
            )
            .await?;
        let trend = regression_trend(&samples, value, profile);

        debug!(
            device_id = %write.device_id,
            quantity = %quantity,
            samples = samples.len(),
            ?trend,
            "Estimated trend"
        );
        Ok(trend)
    }
}
