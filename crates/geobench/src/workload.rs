//! Randomized query workload.
//!
//! [`ParameterSampler`] draws query parameters from a seeded RNG and
//! [`WorkloadDriver`] sends every generated [`QuerySpec`] to the relational
//! store and then to the document store, timing each call.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use chrono::Duration;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::backends::{Backend, StoreAdapter};
use crate::error::{Error, Result};
use crate::fixtures::{entity_id, DatasetConfig};
use crate::model::{BoundingBox, TimeRange};
use crate::query::{QueryKind, QuerySpec};
use crate::stats::{Aggregator, Measurement};
use crate::timer::measure;

/// Default iterations per query kind.
pub const DEFAULT_ITERATIONS: usize = 10;

/// Window length in days for single-entity queries.
pub const ENTITY_WINDOW_DAYS: RangeInclusive<i64> = 1..=30;

/// Window length in days for entity-set queries.
pub const ENTITY_SET_WINDOW_DAYS: RangeInclusive<i64> = 7..=60;

/// Number of ids in an entity-set query, drawn with replacement.
pub const ENTITY_SET_SIZE: RangeInclusive<usize> = 5..=20;

/// Bounding-box half-width in degrees when none is configured.
pub const HALF_WIDTH_JITTER: RangeInclusive<f64> = 0.01..=0.05;

/// Workload shape.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Iterations per query kind.
    pub iterations: usize,
    /// Fixed bounding-box half-width; jittered per iteration when unset.
    pub bbox_half_width: Option<f64>,
    /// Query kinds to run, in order.
    pub kinds: Vec<QueryKind>,
}

impl WorkloadConfig {
    pub fn new(iterations: usize) -> Self {
        Self {
            iterations,
            ..Self::default()
        }
    }

    pub fn with_bbox_half_width(mut self, half_width: f64) -> Self {
        self.bbox_half_width = Some(half_width);
        self
    }

    /// Run only `kinds`. Repeats are dropped; first occurrence wins.
    pub fn with_kinds(mut self, kinds: Vec<QueryKind>) -> Self {
        self.kinds.clear();
        for kind in kinds {
            if !self.kinds.contains(&kind) {
                self.kinds.push(kind);
            }
        }
        self
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            bbox_half_width: None,
            kinds: QueryKind::ALL.to_vec(),
        }
    }
}

/// Draws query parameters for a known dataset.
pub struct ParameterSampler {
    dataset: DatasetConfig,
    bbox_half_width: Option<f64>,
    rng: StdRng,
}

impl ParameterSampler {
    pub fn new(dataset: DatasetConfig, bbox_half_width: Option<f64>, seed: u64) -> Self {
        Self {
            dataset,
            bbox_half_width,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Fresh parameters for one query of `kind`.
    pub fn next(&mut self, kind: QueryKind) -> Result<QuerySpec> {
        match kind {
            QueryKind::ByEntityTimeRange => {
                let entity_id = self.random_entity()?;
                let range = self.random_range(ENTITY_WINDOW_DAYS)?;
                Ok(QuerySpec::EntityTimeRange { entity_id, range })
            }
            QueryKind::ByBoundingBox => {
                let half_width = match self.bbox_half_width {
                    Some(half_width) => half_width,
                    None => self.rng.gen_range(HALF_WIDTH_JITTER),
                };
                Ok(QuerySpec::BoundingBox(BoundingBox::around(
                    self.dataset.center,
                    half_width,
                )?))
            }
            QueryKind::ByEntitySetTimeRange => {
                let size = self.rng.gen_range(ENTITY_SET_SIZE);
                let entity_ids = (0..size)
                    .map(|_| self.random_entity())
                    .collect::<Result<Vec<_>>>()?;
                let range = self.random_range(ENTITY_SET_WINDOW_DAYS)?;
                Ok(QuerySpec::EntitySetTimeRange { entity_ids, range })
            }
        }
    }

    fn random_entity(&mut self) -> Result<String> {
        if self.dataset.entity_count == 0 {
            return Err(Error::InvalidQuery(
                "dataset has no entities to query".to_string(),
            ));
        }
        Ok(entity_id(self.rng.gen_range(1..=self.dataset.entity_count)))
    }

    /// Start on a whole day inside the dataset window, length drawn from `days`.
    fn random_range(&mut self, days: RangeInclusive<i64>) -> Result<TimeRange> {
        let window = self.dataset.window;
        let window_days = window.whole_days().max(1);

        let start = window.start + Duration::days(self.rng.gen_range(0..window_days));
        let end = start + Duration::days(self.rng.gen_range(days));
        TimeRange::new(start, end)
    }
}

/// Measurements and count comparisons from one workload run.
#[derive(Debug, Default)]
pub struct WorkloadOutcome {
    pub aggregator: Aggregator,
    /// Iterations per kind whose total counts differed between the stores.
    pub mismatches: BTreeMap<QueryKind, usize>,
}

impl WorkloadOutcome {
    pub fn mismatches(&self, kind: QueryKind) -> usize {
        self.mismatches.get(&kind).copied().unwrap_or(0)
    }
}

/// Runs the workload against one relational and one document store.
pub struct WorkloadDriver<'a> {
    relational: &'a mut dyn StoreAdapter,
    document: &'a mut dyn StoreAdapter,
    config: WorkloadConfig,
}

impl<'a> WorkloadDriver<'a> {
    pub fn new(
        relational: &'a mut dyn StoreAdapter,
        document: &'a mut dyn StoreAdapter,
        config: WorkloadConfig,
    ) -> Self {
        Self {
            relational,
            document,
            config,
        }
    }

    /// Run every configured kind. The first failing query aborts the run.
    pub fn run(&mut self, sampler: &mut ParameterSampler) -> Result<WorkloadOutcome> {
        let mut outcome = WorkloadOutcome::default();

        for kind in self.config.kinds.clone() {
            info!(kind = %kind, iterations = self.config.iterations, "running {}", kind.title());

            for iteration in 0..self.config.iterations {
                let spec = sampler.next(kind)?;

                let relational = timed(&mut *self.relational, Backend::Relational, &spec)?;
                let document = timed(&mut *self.document, Backend::Document, &spec)?;

                debug!(
                    kind = %kind,
                    iteration,
                    relational_us = relational.duration.as_micros() as u64,
                    document_us = document.duration.as_micros() as u64,
                    "iteration complete"
                );

                if iteration == 0 {
                    info!(
                        kind = %kind,
                        relational = relational.total_count,
                        document = document.total_count,
                        "first iteration match counts"
                    );
                }
                if relational.total_count != document.total_count {
                    warn!(
                        kind = %kind,
                        iteration,
                        relational = relational.total_count,
                        document = document.total_count,
                        "match counts differ between stores"
                    );
                    *outcome.mismatches.entry(kind).or_default() += 1;
                }

                outcome.aggregator.record(relational);
                outcome.aggregator.record(document);
            }
        }

        Ok(outcome)
    }
}

fn timed(adapter: &mut dyn StoreAdapter, backend: Backend, spec: &QuerySpec) -> Result<Measurement> {
    let (duration, result) = measure(|| adapter.execute(spec));
    let result = result?;

    Ok(Measurement {
        kind: spec.kind(),
        backend,
        duration,
        total_count: result.total_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{default_window, Scale};
    use crate::model::{Entity, Sample};
    use crate::query::QueryResult;

    /// Adapter that records every spec it is asked to execute.
    struct RecordingAdapter {
        name: &'static str,
        total_count: u64,
        fail_after: Option<usize>,
        executed: Vec<QuerySpec>,
    }

    impl RecordingAdapter {
        fn new(name: &'static str, total_count: u64) -> Self {
            Self {
                name,
                total_count,
                fail_after: None,
                executed: Vec::new(),
            }
        }

        fn answer(&mut self, spec: QuerySpec) -> Result<QueryResult> {
            if self.fail_after == Some(self.executed.len()) {
                return Err(Error::Query {
                    store: self.name,
                    message: "injected failure".to_string(),
                });
            }
            self.executed.push(spec);
            Ok(QueryResult::new(Vec::new(), self.total_count))
        }
    }

    impl StoreAdapter for RecordingAdapter {
        fn name(&self) -> &'static str {
            self.name
        }

        fn ping(&mut self) -> Result<()> {
            Ok(())
        }

        fn reset_schema(&mut self) -> Result<()> {
            Ok(())
        }

        fn insert_entities(&mut self, entities: &[Entity]) -> Result<usize> {
            Ok(entities.len())
        }

        fn insert_samples(&mut self, _entity_id: &str, samples: &[Sample]) -> Result<usize> {
            Ok(samples.len())
        }

        fn sample_count(&mut self) -> Result<u64> {
            Ok(0)
        }

        fn query_by_entity_time_range(
            &mut self,
            entity_id: &str,
            range: &TimeRange,
        ) -> Result<QueryResult> {
            self.answer(QuerySpec::EntityTimeRange {
                entity_id: entity_id.to_string(),
                range: *range,
            })
        }

        fn query_by_bounding_box(&mut self, bbox: &BoundingBox) -> Result<QueryResult> {
            self.answer(QuerySpec::BoundingBox(*bbox))
        }

        fn query_by_entity_set_time_range(
            &mut self,
            entity_ids: &[String],
            range: &TimeRange,
        ) -> Result<QueryResult> {
            self.answer(QuerySpec::EntitySetTimeRange {
                entity_ids: entity_ids.to_vec(),
                range: *range,
            })
        }
    }

    fn sampler(seed: u64) -> ParameterSampler {
        ParameterSampler::new(DatasetConfig::with_scale(Scale::Small), None, seed)
    }

    #[test]
    fn test_sampler_is_deterministic() {
        let mut a = sampler(11);
        let mut b = sampler(11);
        for kind in QueryKind::ALL {
            for _ in 0..5 {
                assert_eq!(a.next(kind).unwrap(), b.next(kind).unwrap());
            }
        }
    }

    #[test]
    fn test_sampler_parameter_ranges() {
        let mut sampler = sampler(3);
        let window = default_window();

        for _ in 0..200 {
            match sampler.next(QueryKind::ByEntityTimeRange).unwrap() {
                QuerySpec::EntityTimeRange { entity_id, range } => {
                    let index: usize = entity_id.trim_start_matches("IND").parse().unwrap();
                    assert!((1..=10).contains(&index));
                    assert!(window.contains(range.start));
                    assert!(ENTITY_WINDOW_DAYS.contains(&range.whole_days()));
                }
                other => panic!("unexpected spec {:?}", other),
            }

            match sampler.next(QueryKind::ByEntitySetTimeRange).unwrap() {
                QuerySpec::EntitySetTimeRange { entity_ids, range } => {
                    assert!(ENTITY_SET_SIZE.contains(&entity_ids.len()));
                    assert!(ENTITY_SET_WINDOW_DAYS.contains(&range.whole_days()));
                }
                other => panic!("unexpected spec {:?}", other),
            }

            match sampler.next(QueryKind::ByBoundingBox).unwrap() {
                QuerySpec::BoundingBox(bbox) => {
                    let half_width = (bbox.max_lat - bbox.min_lat) / 2.0;
                    assert!(half_width >= 0.01 - 1e-9 && half_width <= 0.05 + 1e-9);
                    assert!(bbox.contains(35.6762, 139.6503));
                }
                other => panic!("unexpected spec {:?}", other),
            }
        }
    }

    #[test]
    fn test_fixed_half_width() {
        let mut sampler =
            ParameterSampler::new(DatasetConfig::with_scale(Scale::Tiny), Some(0.5), 1);
        let QuerySpec::BoundingBox(bbox) = sampler.next(QueryKind::ByBoundingBox).unwrap() else {
            panic!("expected a bounding box");
        };
        assert!((bbox.max_lon - bbox.min_lon - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let dataset = DatasetConfig::with_scale(Scale::Tiny).with_entity_count(0);
        let mut sampler = ParameterSampler::new(dataset, None, 1);
        assert!(matches!(
            sampler.next(QueryKind::ByEntityTimeRange),
            Err(Error::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_driver_sends_same_spec_to_both_stores() {
        let mut relational = RecordingAdapter::new("relational", 7);
        let mut document = RecordingAdapter::new("document", 7);

        let outcome = WorkloadDriver::new(&mut relational, &mut document, WorkloadConfig::new(4))
            .run(&mut sampler(9))
            .unwrap();

        assert_eq!(relational.executed.len(), 12);
        assert_eq!(relational.executed, document.executed);
        assert_eq!(outcome.aggregator.len(), 24);
        for kind in QueryKind::ALL {
            assert_eq!(outcome.mismatches(kind), 0);
            assert_eq!(
                outcome.aggregator.measurements(kind, Backend::Document).len(),
                4
            );
        }
    }

    #[test]
    fn test_repeated_kinds_run_once() {
        let config = WorkloadConfig::new(2).with_kinds(vec![
            QueryKind::ByBoundingBox,
            QueryKind::ByEntityTimeRange,
            QueryKind::ByBoundingBox,
        ]);
        assert_eq!(
            config.kinds,
            vec![QueryKind::ByBoundingBox, QueryKind::ByEntityTimeRange]
        );

        let mut relational = RecordingAdapter::new("relational", 7);
        let mut document = RecordingAdapter::new("document", 7);
        let outcome = WorkloadDriver::new(&mut relational, &mut document, config)
            .run(&mut sampler(9))
            .unwrap();

        assert_eq!(relational.executed.len(), 4);
        assert_eq!(
            outcome
                .aggregator
                .measurements(QueryKind::ByBoundingBox, Backend::Relational)
                .len(),
            2
        );
    }

    #[test]
    fn test_driver_counts_mismatches() {
        let mut relational = RecordingAdapter::new("relational", 7);
        let mut document = RecordingAdapter::new("document", 8);
        let config = WorkloadConfig::new(3).with_kinds(vec![QueryKind::ByBoundingBox]);

        let outcome = WorkloadDriver::new(&mut relational, &mut document, config)
            .run(&mut sampler(2))
            .unwrap();

        assert_eq!(outcome.mismatches(QueryKind::ByBoundingBox), 3);
        assert_eq!(outcome.mismatches(QueryKind::ByEntityTimeRange), 0);
    }

    #[test]
    fn test_driver_aborts_on_error() {
        let mut relational = RecordingAdapter::new("relational", 1);
        let mut document = RecordingAdapter::new("document", 1);
        document.fail_after = Some(2);

        let result = WorkloadDriver::new(&mut relational, &mut document, WorkloadConfig::new(5))
            .run(&mut sampler(4));

        assert!(matches!(result, Err(Error::Query { store: "document", .. })));
        assert_eq!(relational.executed.len(), 3);
    }
}
