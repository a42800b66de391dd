//! Loading a generated dataset into the stores.
//!
//! Seeding is not measured, so the two stores may be loaded in parallel. A
//! batch the store rejects is logged and counted; seeding then moves on.

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::backends::StoreAdapter;
use crate::error::{Error, Result};
use crate::model::Entity;
use crate::timer::{format_duration, Timer};

/// Default number of records per write batch.
pub const DEFAULT_BATCH_SIZE: usize = 5_000;

/// Summary of one store's seeding run.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedReport {
    pub store: &'static str,
    pub entities_written: usize,
    pub samples_written: usize,
    /// Records in rejected batches.
    pub failed_records: usize,
    pub failed_batches: usize,
    pub elapsed: Duration,
}

impl SeedReport {
    fn new(store: &'static str) -> Self {
        Self {
            store,
            entities_written: 0,
            samples_written: 0,
            failed_records: 0,
            failed_batches: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed_batches == 0
    }
}

impl fmt::Display for SeedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: wrote {} entities and {} samples in {}",
            self.store,
            self.entities_written,
            self.samples_written,
            format_duration(self.elapsed)
        )?;
        if !self.is_complete() {
            write!(
                f,
                " ({} batch(es) failed, {} record(s) not written)",
                self.failed_batches, self.failed_records
            )?;
        }
        Ok(())
    }
}

/// Writes entities and samples to one store in fixed-size batches.
#[derive(Debug, Clone)]
pub struct Seeder {
    batch_size: usize,
}

impl Seeder {
    pub fn new() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Reset the store's schema and load `entities` into it.
    ///
    /// Rejected batches are counted in the report. Any other error, such as a
    /// lost connection, stops seeding and is returned.
    pub fn seed(&self, adapter: &mut dyn StoreAdapter, entities: &[Entity]) -> Result<SeedReport> {
        let timer = Timer::start();
        let mut report = SeedReport::new(adapter.name());

        info!(store = adapter.name(), entities = entities.len(), "seeding store");
        adapter.reset_schema()?;

        for batch in entities.chunks(self.batch_size) {
            match adapter.insert_entities(batch) {
                Ok(written) => report.entities_written += written,
                Err(err) => {
                    let written = record_failure(&mut report, err)?;
                    report.entities_written += written;
                }
            }
        }

        for entity in entities {
            for batch in entity.samples.chunks(self.batch_size) {
                match adapter.insert_samples(&entity.entity_id, batch) {
                    Ok(written) => report.samples_written += written,
                    Err(err) => {
                        let written = record_failure(&mut report, err)?;
                        report.samples_written += written;
                    }
                }
            }
            debug!(store = adapter.name(), entity = %entity.entity_id, "samples written");
        }

        adapter.flush()?;
        report.elapsed = timer.elapsed();
        info!(
            store = report.store,
            entities = report.entities_written,
            samples = report.samples_written,
            failed_batches = report.failed_batches,
            "seeding finished"
        );
        Ok(report)
    }
}

impl Default for Seeder {
    fn default() -> Self {
        Self::new()
    }
}

/// Count a rejected batch, returning how many of its records still landed.
fn record_failure(report: &mut SeedReport, err: Error) -> Result<usize> {
    match err {
        Error::PartialWrite {
            store,
            written,
            failed,
            reason,
        } => {
            error!(store, written, failed, %reason, "batch rejected");
            report.failed_batches += 1;
            report.failed_records += failed;
            Ok(written)
        }
        other => Err(other),
    }
}

/// How [`seed_stores`] treats the two stores.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedOptions {
    /// Reseed stores that already hold samples.
    pub force: bool,
    /// Load both stores at the same time, one thread each.
    pub parallel: bool,
}

impl SeedOptions {
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Per-store reports; `None` means the store already held data and was skipped.
#[derive(Debug, Clone, Default)]
pub struct SeedOutcome {
    pub relational: Option<SeedReport>,
    pub document: Option<SeedReport>,
}

impl SeedOutcome {
    pub fn reports(&self) -> impl Iterator<Item = &SeedReport> {
        self.relational.iter().chain(self.document.iter())
    }
}

/// Seed both stores, generating the dataset only if one of them needs it.
pub fn seed_stores<F>(
    relational: &mut dyn StoreAdapter,
    document: &mut dyn StoreAdapter,
    seeder: &Seeder,
    options: SeedOptions,
    dataset: F,
) -> Result<SeedOutcome>
where
    F: FnOnce() -> Vec<Entity>,
{
    let seed_relational = needs_seeding(relational, options.force)?;
    let seed_document = needs_seeding(document, options.force)?;
    if !seed_relational && !seed_document {
        return Ok(SeedOutcome::default());
    }

    let timer = Timer::start();
    let entities = dataset();
    info!(
        entities = entities.len(),
        elapsed = %format_duration(timer.elapsed()),
        "dataset generated"
    );

    let run = |adapter: &mut dyn StoreAdapter, wanted: bool| -> Result<Option<SeedReport>> {
        if wanted {
            seeder.seed(adapter, &entities).map(Some)
        } else {
            Ok(None)
        }
    };

    let (relational, document) = if options.parallel {
        thread::scope(|scope| {
            let handle = scope.spawn(|| run(relational, seed_relational));
            let document = run(document, seed_document);
            let relational = handle
                .join()
                .unwrap_or_else(|payload| std::panic::resume_unwind(payload));
            (relational, document)
        })
    } else {
        (run(relational, seed_relational), run(document, seed_document))
    };

    Ok(SeedOutcome {
        relational: relational?,
        document: document?,
    })
}

/// Whether `adapter` should be seeded: it is empty, or `force` is set.
pub fn needs_seeding(adapter: &mut dyn StoreAdapter, force: bool) -> Result<bool> {
    let count = adapter.sample_count()?;
    if count == 0 {
        info!(store = adapter.name(), "no samples found");
        return Ok(true);
    }
    if force {
        info!(store = adapter.name(), samples = count, "reseeding populated store");
        return Ok(true);
    }
    info!(store = adapter.name(), samples = count, "store already seeded, skipping");
    Ok(false)
}
