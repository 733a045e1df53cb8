use std::io;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use snafu::prelude::*;

use super::report::RunReport;
use crate::{
    archive::ArchiveError, config::ConfigError, manifest::ManifestError,
    schema_script::SchemaScriptError, type_map::TypeMapError,
};

/// Result alias for the conversion pipeline.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised by the table pipeline and its driver.
///
/// Run-level variants (`InvalidOptions`, `UnknownTables`, `CreateDestDir`,
/// `Manifest`, `Aborted`) stop the whole run. The others are scoped to one
/// table; the driver records them in the report and, unless configured
/// otherwise, moves on to the next table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PipelineError {
    /// The run options failed validation.
    #[snafu(display("Invalid options: {source}"))]
    InvalidOptions {
        /// Validation error.
        source: ConfigError,
    },

    /// A table failed while `continue_on_error` was off.
    ///
    /// `report` covers every table processed up to and including the failed
    /// one; files of the tables before it are already in place.
    #[snafu(display("Run aborted at table {table}: {source}"))]
    Aborted {
        /// Key of the failed table.
        table: String,
        /// Report of the run so far.
        report: RunReport,
        /// Error of the failed table.
        #[snafu(source(from(PipelineError, Box::new)))]
        source: Box<PipelineError>,
    },

    /// Requested table keys are not present in the source directory.
    #[snafu(display(
        "Invalid table name(s): {}; available tables: {}",
        unknown.join(", "),
        available.join(", ")
    ))]
    UnknownTables {
        /// Requested keys that were not discovered.
        unknown: Vec<String>,
        /// Keys discovered in the source directory.
        available: Vec<String>,
    },

    /// The destination directory could not be created.
    #[snafu(display("Cannot create destination directory {path}: {source}"))]
    CreateDestDir {
        /// Destination directory.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The row-count manifest could not be loaded or lacks the table.
    #[snafu(display("{source}"))]
    Manifest {
        /// Underlying manifest error.
        source: ManifestError,
    },

    /// The table's DDL script could not be located or read.
    #[snafu(display("Schema extraction failed for {table}: {source}"))]
    Schema {
        /// Table key.
        table: String,
        /// Underlying error.
        source: SchemaScriptError,
    },

    /// The typed schema could not be built.
    #[snafu(display("Type mapping failed for {table}: {source}"))]
    TypeMap {
        /// Table key.
        table: String,
        /// Underlying error.
        source: TypeMapError,
    },

    /// A data archive or nested fragment could not be read.
    #[snafu(display("Cannot read fragment of {table}: {source}"))]
    Archive {
        /// Table key.
        table: String,
        /// Underlying error.
        source: ArchiveError,
    },

    /// A CSV fragment could not be parsed or normalised.
    #[snafu(display("Cannot process CSV {fragment}: {source}"))]
    Csv {
        /// `<archive>!<member>` label of the fragment.
        fragment: String,
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// Writing or reading back a Parquet file failed.
    #[snafu(display("Parquet error on {path}: {source}"))]
    Parquet {
        /// Output path.
        path: String,
        /// Underlying Parquet error.
        source: ParquetError,
    },

    /// A filesystem operation on the output failed.
    #[snafu(display("I/O error on {path}: {source}"))]
    Io {
        /// Path involved.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
    },
}

impl PipelineError {
    /// Report of the tables processed before the run was aborted.
    pub fn partial_report(&self) -> Option<&RunReport> {
        match self {
            PipelineError::Aborted { report, .. } => Some(report),
            _ => None,
        }
    }
}
