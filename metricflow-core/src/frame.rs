//! Ordered metric collection for one task run

use std::ops::Index;

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};

use crate::error::{CoreError, CoreResult};
use crate::metric::{Metric, MetricOptions};

/// Ordered collection of metrics produced by one task run
///
/// A frame is mutable until [`MetricFrame::freeze`] is called. Every mutating method of a
/// frozen frame returns [`CoreError::FrameFrozen`]. [`MetricFrame::copy`] always returns
/// an unfrozen, independent clone.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFrame {
    name: String,
    created_at: DateTime<Utc>,
    metrics: Vec<Metric>,
    options: MetricOptions,
    frozen: bool,
}

impl MetricFrame {
    /// Create an empty frame stamped with the current time
    pub fn new(name: impl Into<String>, options: MetricOptions) -> Self {
        Self::with_timestamp(name, Utc::now(), options)
    }

    pub fn with_timestamp(
        name: impl Into<String>,
        created_at: DateTime<Utc>,
        options: MetricOptions,
    ) -> Self {
        Self {
            name: name.into(),
            created_at,
            metrics: Vec::new(),
            options,
            frozen: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn options(&self) -> &MetricOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Make the frame immutable. Freezing is one-way.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Independent mutable clone of this frame
    pub fn copy(&self) -> Self {
        Self {
            frozen: false,
            ..self.clone()
        }
    }

    fn ensure_mutable(&self) -> CoreResult<()> {
        if self.frozen {
            return Err(CoreError::FrameFrozen {
                frame: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Build a metric carrying this frame's options and creation time
    pub fn new_metric(
        &self,
        attributes: Map<String, Value>,
        value: Option<Number>,
        field: Option<String>,
    ) -> CoreResult<Metric> {
        Metric::new(attributes, value, field, self.created_at, self.options.clone())
    }

    pub fn push(&mut self, metric: Metric) -> CoreResult<()> {
        self.ensure_mutable()?;
        self.metrics.push(metric);
        Ok(())
    }

    /// Replace the whole content of the frame
    pub fn replace_all(&mut self, metrics: Vec<Metric>) -> CoreResult<()> {
        self.ensure_mutable()?;
        self.metrics = metrics;
        Ok(())
    }

    /// Keep only the metrics matching `keep`
    pub fn retain<F>(&mut self, keep: F) -> CoreResult<()>
    where
        F: FnMut(&Metric) -> bool,
    {
        self.ensure_mutable()?;
        self.metrics.retain(keep);
        Ok(())
    }

    /// Remove and return the metric at `index`
    pub fn remove(&mut self, index: usize) -> CoreResult<Metric> {
        self.ensure_mutable()?;
        if index >= self.metrics.len() {
            return Err(CoreError::IndexOutOfBounds {
                index,
                len: self.metrics.len(),
            });
        }
        Ok(self.metrics.remove(index))
    }

    pub fn get(&self, index: usize) -> Option<&Metric> {
        self.metrics.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> CoreResult<Option<&mut Metric>> {
        self.ensure_mutable()?;
        Ok(self.metrics.get_mut(index))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Metric> {
        self.metrics.iter()
    }

    pub fn iter_mut(&mut self) -> CoreResult<std::slice::IterMut<'_, Metric>> {
        self.ensure_mutable()?;
        Ok(self.metrics.iter_mut())
    }

    /// Take the metrics out of the frame, leaving it empty
    pub fn drain(&mut self) -> CoreResult<Vec<Metric>> {
        self.ensure_mutable()?;
        Ok(std::mem::take(&mut self.metrics))
    }
}

impl Index<usize> for MetricFrame {
    type Output = Metric;

    fn index(&self, index: usize) -> &Self::Output {
        &self.metrics[index]
    }
}

impl<'a> IntoIterator for &'a MetricFrame {
    type Item = &'a Metric;
    type IntoIter = std::slice::Iter<'a, Metric>;

    fn into_iter(self) -> Self::IntoIter {
        self.metrics.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame_with(values: &[i64]) -> MetricFrame {
        let mut frame = MetricFrame::new("task", MetricOptions::default());
        for value in values {
            let metric = frame
                .new_metric(Map::new(), Some(Number::from(*value)), Some("v".into()))
                .unwrap();
            frame.push(metric).unwrap();
        }
        frame
    }

    #[test]
    fn test_push_fails_after_freeze() {
        let mut frame = frame_with(&[1]);
        assert_eq!(frame.len(), 1);

        frame.freeze();
        let metric = frame.new_metric(Map::new(), Some(Number::from(2)), None).unwrap();
        assert!(matches!(
            frame.push(metric),
            Err(CoreError::FrameFrozen { .. })
        ));
        assert!(frame.replace_all(Vec::new()).is_err());
        assert!(frame.retain(|_| true).is_err());
        assert!(frame.iter_mut().is_err());
        assert_eq!(frame.len(), 1);
    }

    #[test]
    fn test_copy_after_freeze_is_independent() {
        let mut frame = frame_with(&[1, 2]);
        frame.freeze();

        let mut copy = frame.copy();
        assert!(!copy.is_frozen());
        for metric in copy.iter_mut().unwrap() {
            metric.set("tag", json!("copy")).unwrap();
        }
        copy.remove(0).unwrap();

        assert_eq!(frame.len(), 2);
        assert!(frame[0].get("tag").is_none());
        assert_eq!(copy.len(), 1);
        assert_eq!(copy[0].get("tag"), Some(json!("copy")));
    }

    #[test]
    fn test_replace_and_retain() {
        let mut frame = frame_with(&[1, 2, 3]);
        frame.retain(|m| m.value_f64() != Some(2.0)).unwrap();
        assert_eq!(frame.len(), 2);

        let kept = frame.drain().unwrap();
        assert!(frame.is_empty());
        frame.replace_all(kept.into_iter().rev().collect()).unwrap();
        assert_eq!(frame[0].value_f64(), Some(3.0));
    }

    #[test]
    fn test_remove_out_of_bounds() {
        let mut frame = frame_with(&[]);
        assert_eq!(
            frame.remove(0).unwrap_err(),
            CoreError::IndexOutOfBounds { index: 0, len: 0 }
        );
    }
}
