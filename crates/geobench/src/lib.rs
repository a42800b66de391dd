//! Geo-temporal query benchmark
//!
//! Compares a relational store (PostgreSQL) with a document/search store
//! (Elasticsearch) on the same synthetic fleet of location samples.
//!
//! # Components
//!
//! - **Fixtures**: deterministic dataset generation from a seeded RNG
//! - **Backends**: the [`StoreAdapter`] contract and its PostgreSQL,
//!   Elasticsearch and embedded SQLite implementations
//! - **Seed**: batched loading with per-batch failure accounting
//! - **Readiness**: bounded polling until every store answers
//! - **Workload**: randomized query parameters, timed against both stores
//! - **Stats / Report**: summary statistics and table or JSON output

pub mod backends;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod model;
pub mod query;
pub mod readiness;
pub mod report;
pub mod seed;
pub mod stats;
pub mod timer;
pub mod workload;

pub use backends::{
    Backend, ElasticsearchAdapter, PostgresAdapter, SqliteAdapter, StoreAdapter,
};
pub use config::{DocumentConfig, RelationalConfig};
pub use error::{Error, Result};
pub use fixtures::{generate, DatasetConfig, Scale};
pub use model::{BoundingBox, Entity, GeoPoint, Sample, SampleRecord, TimeRange};
pub use query::{QueryKind, QueryResult, QuerySpec, RESULT_CAP};
pub use readiness::{wait_for_services, RetryPolicy};
pub use report::{BenchmarkReport, Comparison};
pub use seed::{seed_stores, SeedOptions, SeedOutcome, SeedReport, Seeder};
pub use stats::{Aggregator, Measurement, Summary};
pub use workload::{ParameterSampler, WorkloadConfig, WorkloadDriver, WorkloadOutcome};
