//! Benchmark report rendering.
//!
//! Builds per-kind summaries from a [`WorkloadOutcome`] and renders them as
//! comfy-table text or JSON. Nothing here touches a store.

use std::fmt;
use std::time::Duration;

use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Table};
use serde_json::{json, Value};

use crate::backends::Backend;
use crate::error::Result;
use crate::query::QueryKind;
use crate::stats::Summary;
use crate::timer::format_duration;
use crate::workload::WorkloadOutcome;

/// Which store won a query kind, and by how much.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparison {
    /// `backend` had the lower mean; `ratio` is slower mean over faster mean.
    Faster { backend: Backend, ratio: f64 },
    /// Equal means. Relational is reported as the reference.
    Tie,
    /// A side has no measurements, or the faster mean is zero.
    Undetermined,
}

impl Comparison {
    pub fn between(relational: Option<&Summary>, document: Option<&Summary>) -> Self {
        let (Some(relational), Some(document)) = (relational, document) else {
            return Comparison::Undetermined;
        };

        let (faster, fast, slow) = match relational.mean.cmp(&document.mean) {
            std::cmp::Ordering::Equal => return Comparison::Tie,
            std::cmp::Ordering::Less => (Backend::Relational, relational.mean, document.mean),
            std::cmp::Ordering::Greater => (Backend::Document, document.mean, relational.mean),
        };

        if fast.is_zero() {
            return Comparison::Undetermined;
        }
        Comparison::Faster {
            backend: faster,
            ratio: slow.as_secs_f64() / fast.as_secs_f64(),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Faster { backend, ratio } => write!(f, "{} is {:.2}x faster", backend, ratio),
            Comparison::Tie => write!(f, "{} (reference)", Backend::Relational),
            Comparison::Undetermined => write!(f, "not enough data to compare"),
        }
    }
}

/// Results for one query kind.
#[derive(Debug, Clone)]
pub struct KindReport {
    pub kind: QueryKind,
    pub relational: Option<Summary>,
    pub document: Option<Summary>,
    /// Iterations whose total counts differed between the stores.
    pub mismatches: usize,
    pub comparison: Comparison,
}

impl KindReport {
    pub fn summary(&self, backend: Backend) -> Option<&Summary> {
        match backend {
            Backend::Relational => self.relational.as_ref(),
            Backend::Document => self.document.as_ref(),
        }
    }
}

/// Full benchmark report.
#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub iterations: usize,
    pub seed: u64,
    pub kinds: Vec<KindReport>,
}

impl BenchmarkReport {
    pub fn from_outcome(outcome: &WorkloadOutcome, iterations: usize, seed: u64) -> Self {
        let kinds = outcome
            .aggregator
            .kinds()
            .into_iter()
            .map(|kind| {
                let relational = outcome.aggregator.summary(kind, Backend::Relational);
                let document = outcome.aggregator.summary(kind, Backend::Document);
                KindReport {
                    kind,
                    comparison: Comparison::between(relational.as_ref(), document.as_ref()),
                    relational,
                    document,
                    mismatches: outcome.mismatches(kind),
                }
            })
            .collect();

        Self {
            iterations,
            seed,
            kinds,
        }
    }

    /// Human-readable report, one table per query kind.
    pub fn to_table(&self) -> String {
        let mut out = format!(
            "BENCHMARK RESULTS\n{} iteration(s) per query kind, seed {}\n",
            self.iterations, self.seed
        );

        for report in &self.kinds {
            out.push('\n');
            out.push_str(report.kind.title());
            out.push('\n');

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["Store", "Mean", "Median", "Min", "Max", "Avg matches"]);

            for backend in Backend::ALL {
                let mut row = vec![Cell::new(backend.label())];
                match report.summary(backend) {
                    Some(summary) => {
                        for d in [summary.mean, summary.median, summary.min, summary.max] {
                            row.push(Cell::new(format_duration(d)).set_alignment(CellAlignment::Right));
                        }
                        row.push(
                            Cell::new(format!("{:.1}", summary.mean_matches))
                                .set_alignment(CellAlignment::Right),
                        );
                    }
                    None => row.extend((0..5).map(|_| Cell::new("-"))),
                }
                table.add_row(row);
            }

            out.push_str(&table.to_string());
            out.push('\n');
            out.push_str(&report.comparison.to_string());
            out.push('\n');
            if report.mismatches > 0 {
                out.push_str(&format!(
                    "warning: match counts differed in {} of {} iteration(s)\n",
                    report.mismatches, self.iterations
                ));
            }
        }

        out
    }

    pub fn to_json(&self) -> Result<String> {
        let kinds: Vec<Value> = self
            .kinds
            .iter()
            .map(|report| {
                let comparison = match report.comparison {
                    Comparison::Faster { backend, ratio } => json!({
                        "faster": backend,
                        "ratio": ratio,
                        "summary": report.comparison.to_string(),
                    }),
                    Comparison::Tie => json!({
                        "faster": Value::Null,
                        "reference": Backend::Relational,
                        "summary": report.comparison.to_string(),
                    }),
                    Comparison::Undetermined => Value::Null,
                };
                json!({
                    "kind": report.kind,
                    "title": report.kind.title(),
                    "relational": report.relational.as_ref().map(summary_json),
                    "document": report.document.as_ref().map(summary_json),
                    "count_mismatches": report.mismatches,
                    "comparison": comparison,
                })
            })
            .collect();

        Ok(serde_json::to_string_pretty(&json!({
            "iterations": self.iterations,
            "seed": self.seed,
            "results": kinds,
        }))?)
    }
}

fn summary_json(summary: &Summary) -> Value {
    json!({
        "count": summary.count,
        "mean_ms": millis(summary.mean),
        "median_ms": millis(summary.median),
        "min_ms": millis(summary.min),
        "max_ms": millis(summary.max),
        "mean_matches": summary.mean_matches,
    })
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}
