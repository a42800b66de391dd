//! Store adapters for the comparison benchmark.
//!
//! Every store implements [`StoreAdapter`], so the workload driver can send the
//! same logical query to a relational and a document store and compare timings.

pub mod elasticsearch;
pub mod postgres;
pub mod sqlite;

use std::fmt;

use serde::Serialize;

use crate::error::Result;
use crate::model::{BoundingBox, Entity, Sample, TimeRange};
use crate::query::{QueryResult, QuerySpec};

pub use elasticsearch::ElasticsearchAdapter;
pub use postgres::PostgresAdapter;
pub use sqlite::SqliteAdapter;

/// Name of the entity-map table / index.
pub const ENTITY_MAP: &str = "entity_map";

/// Name of the samples table / index.
pub const SAMPLES: &str = "samples";

/// Role a store plays in a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Relational,
    Document,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Relational, Backend::Document];

    pub fn label(&self) -> &'static str {
        match self {
            Backend::Relational => "Relational",
            Backend::Document => "Document",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Uniform insert/query contract over one store.
///
/// Methods take `&mut self`: an adapter owns one session (pool or client) and
/// is never used from two places at once.
pub trait StoreAdapter: Send {
    /// Short store name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Cheap round trip to check that the store answers.
    fn ping(&mut self) -> Result<()>;

    /// Drop and recreate the entity-map and samples collections.
    fn reset_schema(&mut self) -> Result<()>;

    /// Write one batch of entity-map rows. Returns the number written.
    fn insert_entities(&mut self, entities: &[Entity]) -> Result<usize>;

    /// Write one batch of samples for `entity_id`. Returns the number written.
    fn insert_samples(&mut self, entity_id: &str, samples: &[Sample]) -> Result<usize>;

    /// Make written data visible to queries.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Number of stored samples; zero when the collection does not exist.
    fn sample_count(&mut self) -> Result<u64>;

    fn query_by_entity_time_range(&mut self, entity_id: &str, range: &TimeRange)
        -> Result<QueryResult>;

    fn query_by_bounding_box(&mut self, bbox: &BoundingBox) -> Result<QueryResult>;

    fn query_by_entity_set_time_range(
        &mut self,
        entity_ids: &[String],
        range: &TimeRange,
    ) -> Result<QueryResult>;

    /// Dispatch a [`QuerySpec`] to the matching query operation.
    fn execute(&mut self, spec: &QuerySpec) -> Result<QueryResult> {
        match spec {
            QuerySpec::EntityTimeRange { entity_id, range } => {
                self.query_by_entity_time_range(entity_id, range)
            }
            QuerySpec::BoundingBox(bbox) => self.query_by_bounding_box(bbox),
            QuerySpec::EntitySetTimeRange { entity_ids, range } => {
                self.query_by_entity_set_time_range(entity_ids, range)
            }
        }
    }
}
