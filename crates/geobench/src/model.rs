//! Dataset and query parameter types shared by every backend.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Closed time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range, rejecting `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidQuery(format!(
                "time range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Length of the range.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Number of whole days covered by the range.
    pub fn whole_days(&self) -> i64 {
        self.duration().num_days()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Inclusive latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Create a box, validating coordinate ranges and ordering.
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Result<Self> {
        let valid_lat = |v: f64| (-90.0..=90.0).contains(&v);
        let valid_lon = |v: f64| (-180.0..=180.0).contains(&v);

        if !(valid_lat(min_lat) && valid_lat(max_lat)) {
            return Err(Error::InvalidQuery(format!(
                "latitude bounds [{}, {}] outside [-90, 90]",
                min_lat, max_lat
            )));
        }
        if !(valid_lon(min_lon) && valid_lon(max_lon)) {
            return Err(Error::InvalidQuery(format!(
                "longitude bounds [{}, {}] outside [-180, 180]",
                min_lon, max_lon
            )));
        }
        if min_lat > max_lat || min_lon > max_lon {
            return Err(Error::InvalidQuery(
                "bounding box minimum exceeds maximum".to_string(),
            ));
        }

        Ok(Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        })
    }

    /// Square box of `half_width` degrees around `center`, clipped to valid coordinates.
    pub fn around(center: GeoPoint, half_width: f64) -> Result<Self> {
        if !half_width.is_finite() || half_width < 0.0 {
            return Err(Error::InvalidQuery(format!(
                "bounding box half-width must be a non-negative number, got {}",
                half_width
            )));
        }
        Self::new(
            (center.lat - half_width).max(-90.0),
            (center.lat + half_width).min(90.0),
            (center.lon - half_width).max(-180.0),
            (center.lon + half_width).min(180.0),
        )
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.min_lat <= lat && lat <= self.max_lat && self.min_lon <= lon && lon <= self.max_lon
    }
}

/// One timestamped observation owned by an [`Entity`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}

/// A tracked subject and its time-ordered samples.
#[derive(Debug, Clone)]
pub struct Entity {
    pub entity_id: String,
    pub external_id: String,
    pub samples: Vec<Sample>,
}

/// A sample as read back from a store, carrying its owner's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub entity_id: String,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_range_rejects_inverted_bounds() {
        let start = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2023, 2, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            TimeRange::new(start, end),
            Err(Error::InvalidQuery(_))
        ));
        assert_eq!(TimeRange::new(end, start).unwrap().whole_days(), 28);
    }

    #[test]
    fn test_bounding_box_validation() {
        assert!(BoundingBox::new(-91.0, 0.0, 0.0, 1.0).is_err());
        assert!(BoundingBox::new(0.0, 1.0, 0.0, 181.0).is_err());
        assert!(BoundingBox::new(1.0, 0.0, 0.0, 1.0).is_err());

        let bbox = BoundingBox::around(GeoPoint::new(35.0, 139.0), 0.5).unwrap();
        assert!(bbox.contains(35.4, 138.6));
        assert!(!bbox.contains(35.6, 139.0));
    }

    #[test]
    fn test_bounding_box_clipped_at_pole() {
        let bbox = BoundingBox::around(GeoPoint::new(89.9, 0.0), 0.5).unwrap();
        assert_eq!(bbox.max_lat, 90.0);
        assert!(BoundingBox::around(GeoPoint::new(0.0, 0.0), -1.0).is_err());
    }
}
