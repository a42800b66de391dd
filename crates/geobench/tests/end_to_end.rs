//! End-to-end scenarios against two embedded SQLite stores.
//!
//! One store lives in memory, the other in a file, so the workload driver and
//! the seeder see two independent adapters exactly as they would in a real run.

use geobench::fixtures::{default_window, entity_id};
use geobench::{
    generate, seed_stores, Backend, BenchmarkReport, BoundingBox, DatasetConfig, GeoPoint,
    ParameterSampler, QueryKind, QuerySpec, Scale, SeedOptions, Seeder, SqliteAdapter,
    StoreAdapter, WorkloadConfig, WorkloadDriver, RESULT_CAP,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

const SEED: u64 = 2023;

struct TestContext {
    relational: SqliteAdapter,
    document: SqliteAdapter,
    dataset: DatasetConfig,
    _dir: tempfile::TempDir,
}

impl TestContext {
    fn new(dataset: DatasetConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut relational = SqliteAdapter::in_memory().unwrap();
        let mut document = SqliteAdapter::open(dir.path().join("document.db")).unwrap();

        let outcome = seed_stores(
            &mut relational,
            &mut document,
            &Seeder::new(),
            SeedOptions::default(),
            || generate(&dataset, &mut StdRng::seed_from_u64(SEED)),
        )
        .unwrap();
        assert!(outcome.reports().all(|r| r.is_complete()));

        Self {
            relational,
            document,
            dataset,
            _dir: dir,
        }
    }

    fn tiny() -> Self {
        Self::new(DatasetConfig::with_scale(Scale::Tiny))
    }

    fn stores(&mut self) -> [&mut dyn StoreAdapter; 2] {
        [&mut self.relational, &mut self.document]
    }
}

#[test]
fn test_entity_over_full_window_returns_all_samples() {
    let mut ctx = TestContext::tiny();
    let spec = QuerySpec::EntityTimeRange {
        entity_id: entity_id(1),
        range: default_window(),
    };

    for store in ctx.stores() {
        let result = store.execute(&spec).unwrap();
        assert_eq!(result.records.len(), 5, "{}", store.name());
        assert_eq!(result.total_count, 5);
        assert!(result.records.iter().all(|r| r.entity_id == "IND0001"));
    }
}

#[test]
fn test_entity_set_ignores_absent_ids() {
    let mut ctx = TestContext::tiny();
    let spec = QuerySpec::EntitySetTimeRange {
        entity_ids: vec![entity_id(1), "IND9999".to_string()],
        range: default_window(),
    };

    for store in ctx.stores() {
        let result = store.execute(&spec).unwrap();
        assert_eq!(result.total_count, 5);
        assert!(result.records.iter().all(|r| r.entity_id == "IND0001"));
    }
}

#[test]
fn test_repeated_query_is_stable() {
    let mut ctx = TestContext::tiny();
    let bbox = BoundingBox::around(GeoPoint::new(35.6762, 139.6503), 0.05).unwrap();
    let spec = QuerySpec::BoundingBox(bbox);

    let first = ctx.relational.execute(&spec).unwrap();
    let second = ctx.relational.execute(&spec).unwrap();
    assert_eq!(first.total_count, second.total_count);
    assert!(first.records.iter().all(|r| bbox.contains(r.latitude, r.longitude)));

    let document = ctx.document.execute(&spec).unwrap();
    assert_eq!(document.total_count, first.total_count);
}

#[test]
fn test_bounding_box_around_whole_dataset() {
    let mut ctx = TestContext::tiny();
    // Spread is 0.1 degrees, so a 0.2 half-width covers every sample.
    let spec = QuerySpec::BoundingBox(
        BoundingBox::around(ctx.dataset.center, ctx.dataset.spread * 2.0).unwrap(),
    );

    for store in ctx.stores() {
        assert_eq!(store.execute(&spec).unwrap().total_count, 15);
    }
}

#[test]
fn test_results_are_capped_but_counted() {
    let dataset = DatasetConfig::with_scale(Scale::Tiny)
        .with_entity_count(1)
        .with_samples_per_entity(RESULT_CAP + 50);
    let mut ctx = TestContext::new(dataset);

    let spec = QuerySpec::EntityTimeRange {
        entity_id: entity_id(1),
        range: default_window(),
    };
    let result = ctx.relational.execute(&spec).unwrap();

    assert_eq!(result.records.len(), RESULT_CAP);
    assert_eq!(result.total_count, (RESULT_CAP + 50) as u64);
    assert!(result.is_truncated());
}

#[test]
fn test_workload_and_report() {
    let mut ctx = TestContext::new(DatasetConfig::with_scale(Scale::Small));
    let mut sampler = ParameterSampler::new(ctx.dataset.clone(), None, SEED);

    let outcome = WorkloadDriver::new(
        &mut ctx.relational,
        &mut ctx.document,
        WorkloadConfig::new(3),
    )
    .run(&mut sampler)
    .unwrap();

    for kind in QueryKind::ALL {
        // Both stores hold identical data.
        assert_eq!(outcome.mismatches(kind), 0);
        for backend in Backend::ALL {
            assert_eq!(outcome.aggregator.measurements(kind, backend).len(), 3);
        }
    }

    let report = BenchmarkReport::from_outcome(&outcome, 3, SEED);
    assert_eq!(report.kinds.len(), 3);
    let table = report.to_table();
    for kind in QueryKind::ALL {
        assert!(table.contains(kind.title()));
    }
    assert!(report.to_json().unwrap().contains("\"seed\": 2023"));
}
