//! Write validation against identity requirements and boundary rules

use crate::boundary::{BoundaryKey, BoundaryRules};
use crate::types::{MeasureValue, MeasurementWrite};

/// Why a single write was dropped
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("Missing identity field: {0}")]
    MissingIdentity(&'static str),

    #[error("Missing measure value")]
    MissingValue,

    #[error("Value {value} outside [{min}, {max}] for boundary '{key}'")]
    OutOfBounds {
        key: BoundaryKey,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl Rejection {
    /// Event code reported in structured logs
    pub fn code(&self) -> u32 {
        match self {
            Rejection::MissingIdentity(_) => 101,
            Rejection::MissingValue => 102,
            Rejection::OutOfBounds { .. } => 103,
        }
    }
}

/// Accept or reject one canonical write
pub fn validate(write: &MeasurementWrite, rules: &BoundaryRules) -> Result<(), Rejection> {
    if write.device_id.trim().is_empty() {
        return Err(Rejection::MissingIdentity("device_id"));
    }
    if write.module_id.trim().is_empty() {
        return Err(Rejection::MissingIdentity("module_id"));
    }

    let Some(value) = write.value.as_ref() else {
        return Err(Rejection::MissingValue);
    };

    if write.module_type.is_virtual() {
        return Ok(());
    }

    let (MeasureValue::Numeric(v), Some((key, range))) =
        (value, rules.lookup(write.measure_type, write.module_type))
    else {
        return Ok(());
    };

    if range.contains(*v) {
        Ok(())
    } else {
        Err(Rejection::OutOfBounds {
            key,
            value: *v,
            min: range.min,
            max: range.max,
        })
    }
}
