//! Measurement collection and summary statistics.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::backends::Backend;
use crate::query::QueryKind;

/// One timed query execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub kind: QueryKind,
    pub backend: Backend,
    pub duration: Duration,
    /// Uncapped number of matching records.
    pub total_count: u64,
}

/// Summary of one (query kind, backend) series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: Duration,
    pub median: Duration,
    pub min: Duration,
    pub max: Duration,
    /// Average uncapped match count per execution.
    pub mean_matches: f64,
}

/// Append-only store of measurements keyed by query kind and backend.
#[derive(Debug, Default)]
pub struct Aggregator {
    series: BTreeMap<(QueryKind, Backend), Vec<Measurement>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, measurement: Measurement) {
        self.series
            .entry((measurement.kind, measurement.backend))
            .or_default()
            .push(measurement);
    }

    /// Measurements for one series, in recording order.
    pub fn measurements(&self, kind: QueryKind, backend: Backend) -> &[Measurement] {
        self.series
            .get(&(kind, backend))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Query kinds with at least one measurement, in report order.
    pub fn kinds(&self) -> Vec<QueryKind> {
        let mut kinds: Vec<QueryKind> = self.series.keys().map(|(kind, _)| *kind).collect();
        kinds.dedup();
        kinds
    }

    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summarize one series; `None` when nothing was recorded.
    pub fn summary(&self, kind: QueryKind, backend: Backend) -> Option<Summary> {
        let measurements = self.measurements(kind, backend);
        let durations: Vec<Duration> = measurements.iter().map(|m| m.duration).collect();

        let total_matches: u64 = measurements.iter().map(|m| m.total_count).sum();
        Some(Summary {
            count: durations.len(),
            mean: mean(&durations)?,
            median: median(&durations)?,
            min: min(&durations)?,
            max: max(&durations)?,
            mean_matches: total_matches as f64 / durations.len() as f64,
        })
    }
}

pub fn mean(values: &[Duration]) -> Option<Duration> {
    if values.is_empty() {
        return None;
    }
    let total: Duration = values.iter().sum();
    Some(total / values.len() as u32)
}

/// Middle value; the average of the two middle values for even lengths.
pub fn median(values: &[Duration]) -> Option<Duration> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2)
    } else {
        Some(sorted[mid])
    }
}

pub fn min(values: &[Duration]) -> Option<Duration> {
    values.iter().min().copied()
}

pub fn max(values: &[Duration]) -> Option<Duration> {
    values.iter().max().copied()
}
