//! Synthetic dataset generation.
//!
//! Generation is a pure function of a [`DatasetConfig`] and the random source
//! passed in, so a fixed seed always yields the same fleet.

use chrono::{Duration, TimeZone, Utc};
use rand::Rng;

use crate::model::{Entity, GeoPoint, Sample, TimeRange};

/// Default number of tracked entities.
pub const DEFAULT_ENTITY_COUNT: usize = 100;

/// Default samples per entity.
pub const DEFAULT_SAMPLES_PER_ENTITY: usize = 10_000;

/// Default dataset center (Tokyo).
pub const DEFAULT_CENTER: GeoPoint = GeoPoint {
    lat: 35.6762,
    lon: 139.6503,
};

/// Default coordinate spread around the center, in degrees.
pub const DEFAULT_SPREAD: f64 = 0.1;

/// Scale presets for dataset generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scale {
    /// 3 entities, 5 samples each. Used by tests.
    Tiny,
    /// 10 entities, 100 samples each.
    Small,
    /// 100 entities, 1,000 samples each.
    Medium,
    /// 100 entities, 10,000 samples each (one million samples).
    Full,
}

impl Scale {
    /// Number of entities for this scale.
    pub fn entity_count(&self) -> usize {
        match self {
            Scale::Tiny => 3,
            Scale::Small => 10,
            Scale::Medium => 100,
            Scale::Full => DEFAULT_ENTITY_COUNT,
        }
    }

    /// Samples generated per entity.
    pub fn samples_per_entity(&self) -> usize {
        match self {
            Scale::Tiny => 5,
            Scale::Small => 100,
            Scale::Medium => 1_000,
            Scale::Full => DEFAULT_SAMPLES_PER_ENTITY,
        }
    }
}

impl Default for Scale {
    fn default() -> Self {
        Scale::Full
    }
}

/// Shape of the generated dataset.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub entity_count: usize,
    pub samples_per_entity: usize,
    /// Window the sample timestamps are drawn from.
    pub window: TimeRange,
    pub center: GeoPoint,
    /// Maximum distance from the center on each axis, in degrees.
    pub spread: f64,
}

impl DatasetConfig {
    /// Dataset with the counts of the given scale and default geometry.
    pub fn with_scale(scale: Scale) -> Self {
        Self {
            entity_count: scale.entity_count(),
            samples_per_entity: scale.samples_per_entity(),
            ..Self::default()
        }
    }

    pub fn with_entity_count(mut self, count: usize) -> Self {
        self.entity_count = count;
        self
    }

    pub fn with_samples_per_entity(mut self, count: usize) -> Self {
        self.samples_per_entity = count;
        self
    }

    pub fn with_window(mut self, window: TimeRange) -> Self {
        self.window = window;
        self
    }

    pub fn with_center(mut self, center: GeoPoint) -> Self {
        self.center = center;
        self
    }

    pub fn with_spread(mut self, spread: f64) -> Self {
        self.spread = spread.abs();
        self
    }

    /// Ids of every entity this config generates, in order.
    pub fn entity_ids(&self) -> Vec<String> {
        (1..=self.entity_count).map(entity_id).collect()
    }

    /// Total number of samples this config generates.
    pub fn total_samples(&self) -> usize {
        self.entity_count * self.samples_per_entity
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            entity_count: DEFAULT_ENTITY_COUNT,
            samples_per_entity: DEFAULT_SAMPLES_PER_ENTITY,
            window: default_window(),
            center: DEFAULT_CENTER,
            spread: DEFAULT_SPREAD,
        }
    }
}

/// Calendar year 2023.
pub fn default_window() -> TimeRange {
    TimeRange {
        start: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

/// Entity id for a 1-based index.
pub fn entity_id(index: usize) -> String {
    format!("IND{:04}", index)
}

/// External id for a 1-based index.
pub fn external_id(index: usize) -> String {
    format!("EMP{:04}", index)
}

/// Generate the fleet described by `config`.
///
/// Timestamps are whole seconds drawn uniformly from the window (both ends
/// inclusive); coordinates are drawn uniformly within `center ± spread` and
/// clamped to valid latitude/longitude. Each entity's samples are sorted by
/// timestamp.
pub fn generate<R: Rng + ?Sized>(config: &DatasetConfig, rng: &mut R) -> Vec<Entity> {
    let window_secs = config.window.duration().num_seconds().max(0);

    (1..=config.entity_count)
        .map(|index| {
            let mut samples: Vec<Sample> = (0..config.samples_per_entity)
                .map(|_| {
                    let offset = rng.gen_range(0..=window_secs);
                    let lat_jitter = jitter(rng, config.spread);
                    let lon_jitter = jitter(rng, config.spread);
                    Sample {
                        timestamp: config.window.start + Duration::seconds(offset),
                        latitude: (config.center.lat + lat_jitter).clamp(-90.0, 90.0),
                        longitude: (config.center.lon + lon_jitter).clamp(-180.0, 180.0),
                    }
                })
                .collect();

            samples.sort_by_key(|s| s.timestamp);

            Entity {
                entity_id: entity_id(index),
                external_id: external_id(index),
                samples,
            }
        })
        .collect()
}

fn jitter<R: Rng + ?Sized>(rng: &mut R, spread: f64) -> f64 {
    if spread > 0.0 {
        rng.gen_range(-spread..=spread)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_counts_and_ids() {
        let config = DatasetConfig::with_scale(Scale::Tiny);
        let entities = generate(&config, &mut StdRng::seed_from_u64(7));

        assert_eq!(entities.len(), 3);
        assert_eq!(entities[0].entity_id, "IND0001");
        assert_eq!(entities[0].external_id, "EMP0001");
        assert_eq!(entities[2].entity_id, "IND0003");
        assert!(entities.iter().all(|e| e.samples.len() == 5));
        assert_eq!(config.entity_ids(), vec!["IND0001", "IND0002", "IND0003"]);
    }

    #[test]
    fn test_generate_is_deterministic() {
        let config = DatasetConfig::with_scale(Scale::Small);
        let a = generate(&config, &mut StdRng::seed_from_u64(42));
        let b = generate(&config, &mut StdRng::seed_from_u64(42));
        let c = generate(&config, &mut StdRng::seed_from_u64(43));

        assert_eq!(a[0].samples, b[0].samples);
        assert_eq!(a[9].samples, b[9].samples);
        assert_ne!(a[0].samples, c[0].samples);
    }

    #[test]
    fn test_samples_sorted_by_timestamp() {
        let config = DatasetConfig::with_scale(Scale::Small);
        let entities = generate(&config, &mut StdRng::seed_from_u64(1));

        for entity in &entities {
            for pair in entity.samples.windows(2) {
                assert!(pair[0].timestamp <= pair[1].timestamp);
            }
        }
    }

    #[test]
    fn test_samples_within_bounds() {
        let config = DatasetConfig::with_scale(Scale::Small).with_spread(0.25);
        let entities = generate(&config, &mut StdRng::seed_from_u64(99));

        for sample in entities.iter().flat_map(|e| &e.samples) {
            assert!((sample.latitude - config.center.lat).abs() <= config.spread + 1e-9);
            assert!((sample.longitude - config.center.lon).abs() <= config.spread + 1e-9);
            assert!(config.window.contains(sample.timestamp));
        }
    }

    #[test]
    fn test_coordinates_clamped_near_antimeridian() {
        let config = DatasetConfig::with_scale(Scale::Tiny)
            .with_center(GeoPoint::new(89.95, 179.95))
            .with_spread(0.5);
        let entities = generate(&config, &mut StdRng::seed_from_u64(3));

        for sample in entities.iter().flat_map(|e| &e.samples) {
            assert!(sample.latitude <= 90.0);
            assert!(sample.longitude <= 180.0);
        }
    }

    #[test]
    fn test_scale_counts() {
        assert_eq!(Scale::Tiny.entity_count(), 3);
        assert_eq!(Scale::Small.samples_per_entity(), 100);
        assert_eq!(DatasetConfig::with_scale(Scale::Full).total_samples(), 1_000_000);
    }
}
