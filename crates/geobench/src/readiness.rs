//! Waiting for the stores to come up.

use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::backends::StoreAdapter;
use crate::error::{Error, Result};

/// Default number of polling attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Default pause between attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

/// Bounded, fixed-interval polling.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF)
    }
}

/// Ping every adapter until all of them answer in the same round.
///
/// Only connection errors are retried; anything else is returned at once.
pub fn wait_for_services(
    adapters: &mut [&mut dyn StoreAdapter],
    policy: RetryPolicy,
) -> Result<()> {
    let mut last_error = String::new();

    for attempt in 1..=policy.max_attempts {
        match ping_all(adapters) {
            Ok(()) => {
                info!(attempt, "services are ready");
                return Ok(());
            }
            Err(err) if err.is_connection() => {
                warn!(
                    error = %err,
                    "waiting for services ({}/{})",
                    attempt, policy.max_attempts
                );
                last_error = err.to_string();
            }
            Err(err) => return Err(err),
        }

        if attempt < policy.max_attempts {
            thread::sleep(policy.backoff);
        }
    }

    Err(Error::NotReady {
        attempts: policy.max_attempts,
        last_error,
    })
}

fn ping_all(adapters: &mut [&mut dyn StoreAdapter]) -> Result<()> {
    for adapter in adapters.iter_mut() {
        adapter.ping()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SqliteAdapter;
    use crate::model::{BoundingBox, Entity, Sample, TimeRange};
    use crate::query::QueryResult;

    /// Refuses connections for the first `down_for` pings.
    struct FlakyStore {
        down_for: u32,
        pings: u32,
    }

    impl StoreAdapter for FlakyStore {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn ping(&mut self) -> Result<()> {
            self.pings += 1;
            if self.pings <= self.down_for {
                return Err(Error::Connection {
                    store: "flaky",
                    message: "connection refused".to_string(),
                });
            }
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

        fn query_by_entity_time_range(&mut self, _: &str, _: &TimeRange) -> Result<QueryResult> {
            Ok(QueryResult::empty())
        }

        fn query_by_bounding_box(&mut self, _: &BoundingBox) -> Result<QueryResult> {
            Ok(QueryResult::empty())
        }

        fn query_by_entity_set_time_range(
            &mut self,
            _: &[String],
            _: &TimeRange,
        ) -> Result<QueryResult> {
            Ok(QueryResult::empty())
        }
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_ready_after_retries() {
        let mut sqlite = SqliteAdapter::in_memory().unwrap();
        let mut flaky = FlakyStore {
            down_for: 2,
            pings: 0,
        };

        let mut adapters: [&mut dyn StoreAdapter; 2] = [&mut sqlite, &mut flaky];
        wait_for_services(&mut adapters, fast(5)).unwrap();
        assert_eq!(flaky.pings, 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut flaky = FlakyStore {
            down_for: u32::MAX,
            pings: 0,
        };

        let mut adapters: [&mut dyn StoreAdapter; 1] = [&mut flaky];
        let err = wait_for_services(&mut adapters, fast(3)).unwrap_err();
        assert!(matches!(err, Error::NotReady { attempts: 3, .. }));
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(flaky.pings, 3);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 30);
        assert_eq!(policy.backoff, Duration::from_secs(2));
    }
}
