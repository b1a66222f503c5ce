//! Bounded per-station metric storage.
//!
//! Each metric name maps to a FIFO of points. Once a series holds
//! `max_points` entries, recording a new point evicts the oldest one.

use drops_protocol::MetricPoint;
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

/// Default number of points retained per metric.
pub const DEFAULT_MAX_POINTS: usize = 100;

/// Metric store errors.
#[derive(Debug, Error)]
pub enum MetricError {
    /// No point was ever recorded under this name.
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),
}

/// Time series for one station.
#[derive(Debug)]
pub struct MetricStore {
    series: BTreeMap<String, VecDeque<MetricPoint>>,
    max_points: usize,
}

impl MetricStore {
    /// Create an empty store retaining at most `max_points` per metric.
    #[must_use]
    pub fn new(max_points: usize) -> Self {
        Self {
            series: BTreeMap::new(),
            max_points,
        }
    }

    /// Append a point, evicting the oldest if the series is over capacity.
    pub fn record(&mut self, name: &str, value: f64, timestamp: u64) {
        let points = self.series.entry(name.to_string()).or_default();
        points.push_back(MetricPoint::new(timestamp, value));
        while points.len() > self.max_points {
            points.pop_front();
        }
    }

    /// Names of metrics with at least one point, in ascending order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.series
            .iter()
            .filter(|(_, points)| !points.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Points for one metric, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::UnknownMetric`] if nothing was recorded.
    pub fn series(&self, name: &str) -> Result<Vec<MetricPoint>, MetricError> {
        match self.series.get(name) {
            Some(points) if !points.is_empty() => Ok(points.iter().copied().collect()),
            _ => Err(MetricError::UnknownMetric(name.to_string())),
        }
    }

    /// Number of points held for `name`.
    #[must_use]
    pub fn len(&self, name: &str) -> usize {
        self.series.get(name).map_or(0, VecDeque::len)
    }

    /// Returns `true` if no point has been recorded at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.values().all(VecDeque::is_empty)
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS)
    }
}
