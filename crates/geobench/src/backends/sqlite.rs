//! Embedded SQLite adapter.
//!
//! Mirrors the PostgreSQL schema and queries so the relational side of the
//! benchmark can be exercised without a server. Timestamps are stored as
//! microseconds since the Unix epoch.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{BoundingBox, Entity, Sample, SampleRecord, TimeRange};
use crate::query::{QueryResult, RESULT_CAP};

use super::StoreAdapter;

const STORE: &str = "sqlite";

const SCHEMA: &str = r#"
DROP TABLE IF EXISTS samples;
DROP TABLE IF EXISTS entity_map;

CREATE TABLE entity_map (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id TEXT NOT NULL UNIQUE,
    entity_id TEXT NOT NULL UNIQUE
);

CREATE TABLE samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id TEXT NOT NULL REFERENCES entity_map(entity_id),
    timestamp INTEGER NOT NULL,
    longitude REAL NOT NULL,
    latitude REAL NOT NULL
);

CREATE INDEX idx_external_id ON entity_map(external_id);
CREATE INDEX idx_entity_id ON entity_map(entity_id);
CREATE INDEX idx_samples_entity_timestamp ON samples(entity_id, timestamp);
CREATE INDEX idx_samples_timestamp ON samples(timestamp);
CREATE INDEX idx_samples_location ON samples(longitude, latitude);
"#;

const SELECT_SAMPLES: &str =
    "SELECT entity_id, timestamp, latitude, longitude, COUNT(*) OVER () AS total FROM samples";

/// SQLite store adapter.
pub struct SqliteAdapter {
    conn: Connection,
}

impl SqliteAdapter {
    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_error)?;
        Self::with_connection(conn)
    }

    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(map_sqlite_error)?;
        debug!(path = %path.as_ref().display(), "sqlite database opened");
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(map_sqlite_error)?;
        Ok(Self { conn })
    }

    fn fetch_samples(&self, sql: &str, args: Vec<Value>) -> Result<QueryResult> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(map_sqlite_error)?;
        let mut rows = stmt
            .query(params_from_iter(args))
            .map_err(map_sqlite_error)?;

        let mut total = 0i64;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqlite_error)? {
            total = row.get("total").map_err(map_sqlite_error)?;
            records.push(row_to_record(row)?);
        }

        Ok(QueryResult::new(records, total.max(0) as u64))
    }
}

impl StoreAdapter for SqliteAdapter {
    fn name(&self) -> &'static str {
        STORE
    }

    fn ping(&mut self) -> Result<()> {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(map_sqlite_error)?;
        Ok(())
    }

    fn reset_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(SCHEMA).map_err(map_sqlite_error)
    }

    fn insert_entities(&mut self, entities: &[Entity]) -> Result<usize> {
        let tx = self.conn.transaction().map_err(map_sqlite_error)?;
        let written = {
            let mut stmt = tx
                .prepare_cached("INSERT INTO entity_map (external_id, entity_id) VALUES (?1, ?2)")
                .map_err(map_sqlite_error)?;

            let mut written = 0;
            for entity in entities {
                if let Err(err) = stmt.execute(params![entity.external_id, entity.entity_id]) {
                    return Err(partial_write(err, entities.len()));
                }
                written += 1;
            }
            written
        };
        tx.commit().map_err(map_sqlite_error)?;
        Ok(written)
    }

    fn insert_samples(&mut self, entity_id: &str, samples: &[Sample]) -> Result<usize> {
        let tx = self.conn.transaction().map_err(map_sqlite_error)?;
        let written = {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO samples (entity_id, timestamp, longitude, latitude) \
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(map_sqlite_error)?;

            let mut written = 0;
            for sample in samples {
                let inserted = stmt.execute(params![
                    entity_id,
                    sample.timestamp.timestamp_micros(),
                    sample.longitude,
                    sample.latitude
                ]);
                if let Err(err) = inserted {
                    return Err(partial_write(err, samples.len()));
                }
                written += 1;
            }
            written
        };
        tx.commit().map_err(map_sqlite_error)?;
        Ok(written)
    }

    fn sample_count(&mut self) -> Result<u64> {
        let exists: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'samples'",
                [],
                |row| row.get(0),
            )
            .map_err(map_sqlite_error)?;
        if exists == 0 {
            return Ok(0);
        }

        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM samples", [], |row| row.get(0))
            .map_err(map_sqlite_error)?;
        Ok(count.max(0) as u64)
    }

    fn query_by_entity_time_range(
        &mut self,
        entity_id: &str,
        range: &TimeRange,
    ) -> Result<QueryResult> {
        let sql = format!(
            "{} WHERE entity_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3 LIMIT ?4",
            SELECT_SAMPLES
        );
        let args = vec![
            Value::Text(entity_id.to_string()),
            Value::Integer(range.start.timestamp_micros()),
            Value::Integer(range.end.timestamp_micros()),
            Value::Integer(RESULT_CAP as i64),
        ];
        self.fetch_samples(&sql, args)
    }

    fn query_by_bounding_box(&mut self, bbox: &BoundingBox) -> Result<QueryResult> {
        let sql = format!(
            "{} WHERE latitude >= ?1 AND latitude <= ?2 AND longitude >= ?3 AND longitude <= ?4 \
             LIMIT ?5",
            SELECT_SAMPLES
        );
        let args = vec![
            Value::Real(bbox.min_lat),
            Value::Real(bbox.max_lat),
            Value::Real(bbox.min_lon),
            Value::Real(bbox.max_lon),
            Value::Integer(RESULT_CAP as i64),
        ];
        self.fetch_samples(&sql, args)
    }

    fn query_by_entity_set_time_range(
        &mut self,
        entity_ids: &[String],
        range: &TimeRange,
    ) -> Result<QueryResult> {
        // `IN ()` is a syntax error in SQLite; an empty set matches nothing.
        if entity_ids.is_empty() {
            return Ok(QueryResult::empty());
        }

        let placeholders = (0..entity_ids.len())
            .map(|i| format!("?{}", i + 4))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "{} WHERE timestamp >= ?1 AND timestamp <= ?2 AND entity_id IN ({}) LIMIT ?3",
            SELECT_SAMPLES, placeholders
        );

        let mut args = vec![
            Value::Integer(range.start.timestamp_micros()),
            Value::Integer(range.end.timestamp_micros()),
            Value::Integer(RESULT_CAP as i64),
        ];
        args.extend(entity_ids.iter().map(|id| Value::Text(id.clone())));
        self.fetch_samples(&sql, args)
    }
}

fn row_to_record(row: &Row<'_>) -> Result<SampleRecord> {
    let micros: i64 = row.get("timestamp").map_err(map_sqlite_error)?;
    let timestamp = DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| Error::Query {
        store: STORE,
        message: format!("timestamp out of range: {}", micros),
    })?;

    Ok(SampleRecord {
        entity_id: row.get("entity_id").map_err(map_sqlite_error)?,
        timestamp,
        latitude: row.get("latitude").map_err(map_sqlite_error)?,
        longitude: row.get("longitude").map_err(map_sqlite_error)?,
    })
}

fn partial_write(err: rusqlite::Error, failed: usize) -> Error {
    Error::PartialWrite {
        store: STORE,
        written: 0,
        failed,
        reason: err.to_string(),
    }
}

fn map_sqlite_error(err: rusqlite::Error) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::CannotOpen =>
        {
            Error::Connection {
                store: STORE,
                message: err.to_string(),
            }
        }
        _ => Error::Query {
            store: STORE,
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{generate, DatasetConfig, Scale};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seeded() -> (SqliteAdapter, Vec<Entity>) {
        let config = DatasetConfig::with_scale(Scale::Tiny);
        let entities = generate(&config, &mut StdRng::seed_from_u64(5));

        let mut adapter = SqliteAdapter::in_memory().unwrap();
        adapter.reset_schema().unwrap();
        adapter.insert_entities(&entities).unwrap();
        for entity in &entities {
            adapter
                .insert_samples(&entity.entity_id, &entity.samples)
                .unwrap();
        }
        (adapter, entities)
    }

    #[test]
    fn test_reset_schema_is_idempotent() {
        let mut adapter = SqliteAdapter::in_memory().unwrap();
        assert_eq!(adapter.sample_count().unwrap(), 0);

        adapter.reset_schema().unwrap();
        adapter.reset_schema().unwrap();
        assert_eq!(adapter.sample_count().unwrap(), 0);

        let (mut seeded, _) = seeded();
        assert_eq!(seeded.sample_count().unwrap(), 15);
        seeded.reset_schema().unwrap();
        assert_eq!(seeded.sample_count().unwrap(), 0);
    }

    #[test]
    fn test_samples_for_unknown_entity_rejected() {
        let (mut adapter, entities) = seeded();

        let err = adapter
            .insert_samples("IND9999", &entities[0].samples)
            .unwrap_err();
        assert!(matches!(err, Error::PartialWrite { failed: 5, .. }));
        assert_eq!(adapter.sample_count().unwrap(), 15);
    }

    #[test]
    fn test_duplicate_entities_rejected() {
        let (mut adapter, entities) = seeded();
        let err = adapter.insert_entities(&entities[..1]).unwrap_err();
        assert!(matches!(err, Error::PartialWrite { failed: 1, .. }));
    }

    #[test]
    fn test_timestamps_round_trip() {
        let (mut adapter, entities) = seeded();
        let entity = &entities[1];
        let first = entity.samples[0].timestamp;
        let range = TimeRange::new(first, first).unwrap();

        let result = adapter
            .query_by_entity_time_range(&entity.entity_id, &range)
            .unwrap();
        assert!(result.total_count >= 1);
        assert!(result
            .records
            .iter()
            .all(|r| r.timestamp == first));
    }

    #[test]
    fn test_empty_entity_set() {
        let (mut adapter, _) = seeded();
        let range = crate::fixtures::default_window();
        let result = adapter.query_by_entity_set_time_range(&[], &range).unwrap();
        assert_eq!(result, QueryResult::empty());
    }
}
