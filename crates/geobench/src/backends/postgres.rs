//! PostgreSQL adapter.
//!
//! Holds one bounded `sqlx` pool for its lifetime and drives it from a private
//! single-threaded Tokio runtime, so callers see a synchronous API.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use crate::config::RelationalConfig;
use crate::error::{Error, Result};
use crate::model::{BoundingBox, Entity, Sample, SampleRecord, TimeRange};
use crate::query::{QueryResult, RESULT_CAP};

use super::StoreAdapter;

const STORE: &str = "postgres";

/// Postgres "undefined_table" SQLSTATE.
const UNDEFINED_TABLE: &str = "42P01";

/// Postgres "cannot_connect_now" SQLSTATE, sent while the server starts up.
const CANNOT_CONNECT_NOW: &str = "57P03";

const SCHEMA: &str = r#"
DROP TABLE IF EXISTS samples;
DROP TABLE IF EXISTS entity_map;

CREATE TABLE entity_map (
    id BIGSERIAL PRIMARY KEY,
    external_id VARCHAR(50) NOT NULL UNIQUE,
    entity_id VARCHAR(50) NOT NULL UNIQUE
);

CREATE TABLE samples (
    id BIGSERIAL PRIMARY KEY,
    entity_id VARCHAR(50) NOT NULL REFERENCES entity_map(entity_id),
    timestamp TIMESTAMPTZ NOT NULL,
    longitude DOUBLE PRECISION NOT NULL,
    latitude DOUBLE PRECISION NOT NULL
);

CREATE INDEX idx_external_id ON entity_map(external_id);
CREATE INDEX idx_entity_id ON entity_map(entity_id);
CREATE INDEX idx_samples_entity_timestamp ON samples(entity_id, timestamp);
CREATE INDEX idx_samples_timestamp ON samples(timestamp);
CREATE INDEX idx_samples_location ON samples(longitude, latitude);
"#;

/// PostgreSQL store adapter.
pub struct PostgresAdapter {
    pool: PgPool,
    rt: Runtime,
}

impl PostgresAdapter {
    /// Create the adapter without contacting the server.
    ///
    /// Connections are opened on first use, so this succeeds even while the
    /// server is still starting; use [`StoreAdapter::ping`] to wait for it.
    pub fn new(config: &RelationalConfig) -> Result<Self> {
        let rt = Builder::new_current_thread().enable_all().build()?;

        let pool = {
            let _guard = rt.enter();
            PgPoolOptions::new()
                .max_connections(config.pool_size)
                .acquire_timeout(config.acquire_timeout)
                .connect_lazy_with(config.connect_options())
        };

        debug!(
            server = %config.display_target(),
            pool_size = config.pool_size,
            "postgres pool created"
        );
        Ok(Self { pool, rt })
    }
}

impl StoreAdapter for PostgresAdapter {
    fn name(&self) -> &'static str {
        STORE
    }

    fn ping(&mut self) -> Result<()> {
        self.rt.block_on(async {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            Ok(())
        })
    }

    fn reset_schema(&mut self) -> Result<()> {
        self.rt.block_on(async {
            sqlx::raw_sql(SCHEMA)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            Ok(())
        })
    }

    fn insert_entities(&mut self, entities: &[Entity]) -> Result<usize> {
        if entities.is_empty() {
            return Ok(0);
        }

        let external_ids: Vec<String> = entities.iter().map(|e| e.external_id.clone()).collect();
        let entity_ids: Vec<String> = entities.iter().map(|e| e.entity_id.clone()).collect();

        self.rt.block_on(async {
            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

            let inserted = sqlx::query(
                "INSERT INTO entity_map (external_id, entity_id) \
                 SELECT * FROM UNNEST($1::VARCHAR[], $2::VARCHAR[])",
            )
            .bind(&external_ids)
            .bind(&entity_ids)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(done) => {
                    tx.commit().await.map_err(map_sqlx_error)?;
                    Ok(done.rows_affected() as usize)
                }
                Err(err) => {
                    let _ = tx.rollback().await;
                    Err(partial_write(err, entities.len()))
                }
            }
        })
    }

    fn insert_samples(&mut self, entity_id: &str, samples: &[Sample]) -> Result<usize> {
        if samples.is_empty() {
            return Ok(0);
        }

        let entity_ids: Vec<&str> = vec![entity_id; samples.len()];
        let timestamps: Vec<DateTime<Utc>> = samples.iter().map(|s| s.timestamp).collect();
        let longitudes: Vec<f64> = samples.iter().map(|s| s.longitude).collect();
        let latitudes: Vec<f64> = samples.iter().map(|s| s.latitude).collect();

        self.rt.block_on(async {
            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

            let inserted = sqlx::query(
                "INSERT INTO samples (entity_id, timestamp, longitude, latitude) \
                 SELECT * FROM UNNEST($1::VARCHAR[], $2::TIMESTAMPTZ[], $3::FLOAT8[], $4::FLOAT8[])",
            )
            .bind(&entity_ids)
            .bind(&timestamps)
            .bind(&longitudes)
            .bind(&latitudes)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(done) => {
                    tx.commit().await.map_err(map_sqlx_error)?;
                    Ok(done.rows_affected() as usize)
                }
                Err(err) => {
                    let _ = tx.rollback().await;
                    Err(partial_write(err, samples.len()))
                }
            }
        })
    }

    fn sample_count(&mut self) -> Result<u64> {
        self.rt.block_on(async {
            match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM samples")
                .fetch_one(&self.pool)
                .await
            {
                Ok(count) => Ok(count.max(0) as u64),
                Err(sqlx::Error::Database(db))
                    if db.code().as_deref() == Some(UNDEFINED_TABLE) =>
                {
                    Ok(0)
                }
                Err(err) => Err(map_sqlx_error(err)),
            }
        })
    }

    fn query_by_entity_time_range(
        &mut self,
        entity_id: &str,
        range: &TimeRange,
    ) -> Result<QueryResult> {
        let query = sqlx::query(
            "SELECT entity_id, timestamp, latitude, longitude, COUNT(*) OVER () AS total \
             FROM samples \
             WHERE entity_id = $1 AND timestamp >= $2 AND timestamp <= $3 \
             LIMIT $4",
        )
        .bind(entity_id)
        .bind(range.start)
        .bind(range.end)
        .bind(RESULT_CAP as i64);

        self.rt.block_on(fetch_samples(query, &self.pool))
    }

    fn query_by_bounding_box(&mut self, bbox: &BoundingBox) -> Result<QueryResult> {
        let query = sqlx::query(
            "SELECT entity_id, timestamp, latitude, longitude, COUNT(*) OVER () AS total \
             FROM samples \
             WHERE latitude >= $1 AND latitude <= $2 AND longitude >= $3 AND longitude <= $4 \
             LIMIT $5",
        )
        .bind(bbox.min_lat)
        .bind(bbox.max_lat)
        .bind(bbox.min_lon)
        .bind(bbox.max_lon)
        .bind(RESULT_CAP as i64);

        self.rt.block_on(fetch_samples(query, &self.pool))
    }

    fn query_by_entity_set_time_range(
        &mut self,
        entity_ids: &[String],
        range: &TimeRange,
    ) -> Result<QueryResult> {
        let query = sqlx::query(
            "SELECT entity_id, timestamp, latitude, longitude, COUNT(*) OVER () AS total \
             FROM samples \
             WHERE entity_id = ANY($1) AND timestamp >= $2 AND timestamp <= $3 \
             LIMIT $4",
        )
        .bind(entity_ids)
        .bind(range.start)
        .bind(range.end)
        .bind(RESULT_CAP as i64);

        self.rt.block_on(fetch_samples(query, &self.pool))
    }
}

impl Drop for PostgresAdapter {
    fn drop(&mut self) {
        self.rt.block_on(self.pool.close());
    }
}

async fn fetch_samples(
    query: Query<'_, Postgres, PgArguments>,
    pool: &PgPool,
) -> Result<QueryResult> {
    let rows = query.fetch_all(pool).await.map_err(map_sqlx_error)?;
    rows_to_result(&rows)
}

fn rows_to_result(rows: &[PgRow]) -> Result<QueryResult> {
    let mut total = 0i64;
    let mut records = Vec::with_capacity(rows.len());

    for row in rows {
        total = row.try_get("total").map_err(map_sqlx_error)?;
        records.push(SampleRecord {
            entity_id: row.try_get("entity_id").map_err(map_sqlx_error)?,
            timestamp: row.try_get("timestamp").map_err(map_sqlx_error)?,
            latitude: row.try_get("latitude").map_err(map_sqlx_error)?,
            longitude: row.try_get("longitude").map_err(map_sqlx_error)?,
        });
    }

    Ok(QueryResult::new(records, total.max(0) as u64))
}

fn partial_write(err: sqlx::Error, failed: usize) -> Error {
    match map_sqlx_error(err) {
        Error::Query { message, .. } => Error::PartialWrite {
            store: STORE,
            written: 0,
            failed,
            reason: message,
        },
        other => other,
    }
}

/// Map a driver error onto the benchmark taxonomy.
fn map_sqlx_error(err: sqlx::Error) -> Error {
    let unreachable = match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db.code().as_deref().is_some_and(is_unavailable_sqlstate),
        _ => false,
    };

    if unreachable {
        Error::Connection {
            store: STORE,
            message: err.to_string(),
        }
    } else {
        Error::Query {
            store: STORE,
            message: err.to_string(),
        }
    }
}

/// SQLSTATE codes a server sends while it cannot take work yet:
/// `57P03` (starting up or shutting down) and the `08` connection class.
fn is_unavailable_sqlstate(code: &str) -> bool {
    code == CANNOT_CONNECT_NOW || code.starts_with("08")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_classified() {
        assert!(map_sqlx_error(sqlx::Error::PoolTimedOut).is_connection());
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            Error::Query { store: "postgres", .. }
        ));
    }

    #[test]
    fn test_startup_sqlstates_are_connection_errors() {
        assert!(is_unavailable_sqlstate("57P03"));
        assert!(is_unavailable_sqlstate("08006"));
        assert!(is_unavailable_sqlstate("08001"));
        assert!(!is_unavailable_sqlstate("42P01"));
        assert!(!is_unavailable_sqlstate("23505"));
    }

    #[test]
    fn test_partial_write_keeps_connection_errors() {
        assert!(partial_write(sqlx::Error::PoolTimedOut, 10).is_connection());
        assert!(matches!(
            partial_write(sqlx::Error::RowNotFound, 10),
            Error::PartialWrite { failed: 10, .. }
        ));
    }

    #[test]
    fn test_schema_creates_required_indexes() {
        for index in [
            "idx_samples_entity_timestamp",
            "idx_samples_timestamp",
            "idx_samples_location",
        ] {
            assert!(SCHEMA.contains(index));
        }
    }
}
