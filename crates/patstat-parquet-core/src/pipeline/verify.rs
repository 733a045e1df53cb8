//! Post-write checks against the manifest and the CSV header.
//!
//! Neither check deletes or rewrites the output; mismatches are logged and
//! recorded in the table report.

use std::{collections::BTreeSet, fs::File, path::Path};

use log::{error, info, warn};
use parquet::file::reader::{FileReader, SerializedFileReader};
use serde::Serialize;
use snafu::prelude::*;

use super::error::{IoSnafu, ParquetSnafu, PipelineResult};

/// Expected versus actual row count of an output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountCheck {
    /// Count declared in the manifest.
    pub expected: u64,
    /// Count stored in the output file footer.
    pub actual: u64,
}

impl CountCheck {
    /// Whether both counts agree.
    pub fn matches(&self) -> bool {
        self.expected == self.actual
    }
}

/// Column set difference between the last CSV header and the output file.
///
/// Names are compared lower-cased and without regard to order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaCheck {
    /// Columns of the CSV that the output does not carry.
    pub missing_from_output: Vec<String>,
    /// Columns of the output that the CSV did not carry (written as nulls).
    pub missing_from_csv: Vec<String>,
}

impl SchemaCheck {
    /// Whether both column sets are equal.
    pub fn is_clean(&self) -> bool {
        self.missing_from_output.is_empty() && self.missing_from_csv.is_empty()
    }
}

/// Structural summary of a written file, read from its footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    /// Total rows across all row groups.
    pub num_rows: u64,
    /// Leaf column names.
    pub columns: Vec<String>,
}

/// Read the footer of the Parquet file at `path`.
pub fn inspect_output(path: &Path) -> PipelineResult<WrittenFile> {
    let display = path.display().to_string();
    let file = File::open(path).context(IoSnafu {
        path: display.clone(),
    })?;
    let reader = SerializedFileReader::new(file).context(ParquetSnafu { path: display })?;
    let metadata = reader.metadata();

    let columns = metadata
        .file_metadata()
        .schema_descr()
        .columns()
        .iter()
        .map(|c| c.path().string())
        .collect();

    Ok(WrittenFile {
        num_rows: u64::try_from(metadata.file_metadata().num_rows()).unwrap_or(0),
        columns,
    })
}

/// Compare the written row count with the manifest.
pub fn verify_row_count(table: &str, written: &WrittenFile, expected: u64) -> CountCheck {
    let check = CountCheck {
        expected,
        actual: written.num_rows,
    };
    if check.matches() {
        info!("Number of records of table {table} is correct ({expected})");
    } else {
        error!(
            "Row count mismatch for table {table}: expected {expected} records, but found {} records",
            check.actual
        );
    }
    check
}

/// Compare the written column names with the CSV header.
pub fn verify_columns(table: &str, written: &WrittenFile, csv_header: &[String]) -> SchemaCheck {
    let output: BTreeSet<String> = written.columns.iter().map(|c| c.to_lowercase()).collect();
    let csv: BTreeSet<String> = csv_header.iter().map(|c| c.trim().to_lowercase()).collect();

    let check = SchemaCheck {
        missing_from_output: csv.difference(&output).cloned().collect(),
        missing_from_csv: output.difference(&csv).cloned().collect(),
    };

    if check.is_clean() {
        info!("Schema of table {table} is correct");
    } else {
        if !check.missing_from_output.is_empty() {
            warn!(
                "Schema mismatch for table {table}: missing column(s) {}. \
                 Check the documentation, the column(s) may be deprecated",
                check.missing_from_output.join(", ")
            );
        }
        if !check.missing_from_csv.is_empty() {
            warn!(
                "Table {table} declares column(s) absent from the CSV, written as nulls: {}",
                check.missing_from_csv.join(", ")
            );
        }
    }
    check
}
