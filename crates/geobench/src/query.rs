//! Backend-agnostic query descriptions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{BoundingBox, SampleRecord, TimeRange};

/// Maximum number of records a store returns for one query.
///
/// Only the payload is capped; [`QueryResult::total_count`] always carries the
/// full number of matches.
pub const RESULT_CAP: usize = 10_000;

/// The three benchmarked query shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// One entity's samples inside a time window.
    ByEntityTimeRange,
    /// All samples inside a latitude/longitude box.
    ByBoundingBox,
    /// Several entities' samples inside a time window.
    ByEntitySetTimeRange,
}

impl QueryKind {
    /// Every kind, in report order.
    pub const ALL: [QueryKind; 3] = [
        QueryKind::ByEntityTimeRange,
        QueryKind::ByBoundingBox,
        QueryKind::ByEntitySetTimeRange,
    ];

    /// Human-readable title used in reports.
    pub fn title(&self) -> &'static str {
        match self {
            QueryKind::ByEntityTimeRange => "Entity location by time range",
            QueryKind::ByBoundingBox => "Location by geographical area",
            QueryKind::ByEntitySetTimeRange => "Multiple entities by time range",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::ByEntityTimeRange => write!(f, "by_entity_time_range"),
            QueryKind::ByBoundingBox => write!(f, "by_bounding_box"),
            QueryKind::ByEntitySetTimeRange => write!(f, "by_entity_set_time_range"),
        }
    }
}

/// One logical read query, independent of any backend's query language.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QuerySpec {
    EntityTimeRange {
        entity_id: String,
        range: TimeRange,
    },
    BoundingBox(BoundingBox),
    EntitySetTimeRange {
        entity_ids: Vec<String>,
        range: TimeRange,
    },
}

impl QuerySpec {
    pub fn kind(&self) -> QueryKind {
        match self {
            QuerySpec::EntityTimeRange { .. } => QueryKind::ByEntityTimeRange,
            QuerySpec::BoundingBox(_) => QueryKind::ByBoundingBox,
            QuerySpec::EntitySetTimeRange { .. } => QueryKind::ByEntitySetTimeRange,
        }
    }
}

/// Records returned by a query plus the uncapped match count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub records: Vec<SampleRecord>,
    pub total_count: u64,
}

impl QueryResult {
    pub fn new(records: Vec<SampleRecord>, total_count: u64) -> Self {
        Self {
            records,
            total_count,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the payload was cut short by [`RESULT_CAP`].
    pub fn is_truncated(&self) -> bool {
        (self.records.len() as u64) < self.total_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GeoPoint;

    #[test]
    fn test_kind_of_query() {
        let bbox = BoundingBox::around(GeoPoint::new(0.0, 0.0), 1.0).unwrap();
        assert_eq!(QuerySpec::BoundingBox(bbox).kind(), QueryKind::ByBoundingBox);
        assert_eq!(QueryKind::ALL.len(), 3);
        assert_eq!(QueryKind::ByEntitySetTimeRange.to_string(), "by_entity_set_time_range");
    }

    #[test]
    fn test_truncation() {
        assert!(!QueryResult::empty().is_truncated());
        assert!(QueryResult::new(Vec::new(), 12).is_truncated());
    }
}
