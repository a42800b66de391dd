//! Output formatters for benchmark and seeding results.

use clap::ValueEnum;
use geobench::{BenchmarkReport, Result, SeedOutcome};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format a benchmark report.
    fn format_report(&self, report: &BenchmarkReport) -> Result<String>;

    /// Format the outcome of a seeding run.
    fn format_seed(&self, outcome: &SeedOutcome) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_report(&self, report: &BenchmarkReport) -> Result<String> {
        Ok(report.to_table())
    }

    fn format_seed(&self, outcome: &SeedOutcome) -> String {
        let lines: Vec<String> = outcome.reports().map(|r| r.to_string()).collect();
        if lines.is_empty() {
            "Both stores already hold data; nothing seeded (use --force to reseed)".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_report(&self, report: &BenchmarkReport) -> Result<String> {
        report.to_json()
    }

    fn format_seed(&self, outcome: &SeedOutcome) -> String {
        let reports: Vec<serde_json::Value> = outcome
            .reports()
            .map(|r| {
                serde_json::json!({
                    "store": r.store,
                    "entities": r.entities_written,
                    "samples": r.samples_written,
                    "failed_batches": r.failed_batches,
                    "failed_records": r.failed_records,
                    "elapsed_ms": r.elapsed.as_millis() as u64,
                })
            })
            .collect();
        serde_json::to_string_pretty(&reports).unwrap_or_else(|_| "[]".to_string())
    }
}
