//! Timestamp modifiers of sources and sinks

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use metricflow_core::{CoreResult, MetricFrame};

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Timestamp bucketing applied by a source to new frames and by a sink to its copy
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct IoModifiers {
    /// Round timestamps down to a multiple of this many seconds, `0` disables
    #[serde(default = "default_modulus")]
    pub time_modulus: f64,
    /// Seconds subtracted after rounding
    #[serde(default)]
    pub time_offset: f64,
}

fn default_modulus() -> f64 {
    1.0
}

impl Default for IoModifiers {
    fn default() -> Self {
        Self {
            time_modulus: default_modulus(),
            time_offset: 0.0,
        }
    }
}

impl IoModifiers {
    /// Read the `modifiers` section of a validated module entry
    pub fn from_config(config: &Value) -> serde_json::Result<Self> {
        match config.get("modifiers") {
            Some(modifiers) if !modifiers.is_null() => Self::deserialize(modifiers),
            _ => Ok(Self::default()),
        }
    }

    /// Apply `ts -= ts % modulus; ts -= offset`
    ///
    /// An offset moving the timestamp out of range leaves it unchanged.
    pub fn apply(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let mut micros = timestamp.timestamp_micros();

        let modulus = (self.time_modulus * MICROS_PER_SECOND) as i64;
        if modulus > 0 {
            micros -= micros.rem_euclid(modulus);
        }

        let offset = (self.time_offset * MICROS_PER_SECOND) as i64;
        let Some(micros) = micros.checked_sub(offset) else {
            tracing::warn!(target: "task", offset = self.time_offset, "Time offset out of range, ignored");
            return timestamp;
        };

        Utc.timestamp_micros(micros).single().unwrap_or(timestamp)
    }

    /// Apply to every metric of a mutable frame
    pub fn apply_to_frame(&self, frame: &mut MetricFrame) -> CoreResult<()> {
        for metric in frame.iter_mut()? {
            let adjusted = self.apply(metric.timestamp());
            metric.set_timestamp(adjusted);
        }
        Ok(())
    }
}
