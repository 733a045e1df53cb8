//! Per-table and per-run reports.

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use serde::Serialize;

use super::verify::{CountCheck, SchemaCheck};
use crate::normalize::CoercionStats;

/// How the processing of one table ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    /// An output file was written (verification may still have flagged it).
    Written,
    /// Nothing was written; not an error.
    Skipped {
        /// Why the table was skipped.
        reason: String,
    },
    /// A fatal error stopped the table.
    Failed {
        /// Display text of the error.
        error: String,
    },
}

/// Result of processing one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReport {
    /// Table key.
    pub table: String,
    /// Documentation name from the manifest, once resolved.
    pub full_name: Option<String>,
    /// Final output path, when a file was written.
    pub output: Option<PathBuf>,
    /// Outcome.
    pub outcome: TableOutcome,
    /// CSV fragments read.
    pub fragments: usize,
    /// Chunks written (one row group each).
    pub chunks: usize,
    /// Rows per chunk chosen for each fragment, in processing order.
    pub chunk_rows: Vec<usize>,
    /// Rows written.
    pub rows_written: u64,
    /// Row count declared in the manifest.
    pub expected_rows: Option<u64>,
    /// Row count verification.
    pub count_check: Option<CountCheck>,
    /// Column set verification.
    pub schema_check: Option<SchemaCheck>,
    /// Values coerced to null during normalisation.
    pub coerced_nulls: CoercionStats,
    /// Wall time in milliseconds.
    pub elapsed_ms: u128,
}

impl TableReport {
    pub(crate) fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            full_name: None,
            output: None,
            outcome: TableOutcome::Skipped {
                reason: "not processed".to_string(),
            },
            fragments: 0,
            chunks: 0,
            chunk_rows: Vec::new(),
            rows_written: 0,
            expected_rows: None,
            count_check: None,
            schema_check: None,
            coerced_nulls: CoercionStats::default(),
            elapsed_ms: 0,
        }
    }

    pub(crate) fn finish(mut self, outcome: TableOutcome, started: Instant) -> Self {
        self.outcome = outcome;
        self.elapsed_ms = started.elapsed().as_millis();
        self
    }

    /// Whether the table ended in a fatal error.
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, TableOutcome::Failed { .. })
    }

    /// Whether the written file passed both checks.
    pub fn is_verified(&self) -> bool {
        self.outcome == TableOutcome::Written
            && self.count_check.is_some_and(|c| c.matches())
            && self.schema_check.as_ref().is_some_and(SchemaCheck::is_clean)
    }
}

/// Result of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    /// One entry per table, in processing order.
    pub tables: Vec<TableReport>,
    /// Wall time in milliseconds.
    pub elapsed_ms: u128,
}

impl RunReport {
    pub(crate) fn push(&mut self, report: TableReport) {
        self.tables.push(report);
    }

    pub(crate) fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed_ms = elapsed.as_millis();
    }

    /// Keys of the tables that were processed without a fatal error, in
    /// processing order.
    pub fn processed_keys(&self) -> Vec<String> {
        self.tables
            .iter()
            .filter(|t| !t.is_failed())
            .map(|t| t.table.clone())
            .collect()
    }

    /// Reports of the tables that failed.
    pub fn failed(&self) -> impl Iterator<Item = &TableReport> {
        self.tables.iter().filter(|t| t.is_failed())
    }

    /// Report of one table, if it was part of the run.
    pub fn table(&self, key: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == key)
    }

    /// Values coerced to null over the whole run.
    pub fn total_coerced_nulls(&self) -> u64 {
        self.tables.iter().map(|t| t.coerced_nulls.total()).sum()
    }
}
