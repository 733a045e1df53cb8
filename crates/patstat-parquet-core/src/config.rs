//! Run configuration for a conversion.
//!
//! `SourceLayout` pins every naming convention of a PATSTAT release so the
//! rest of the crate never hard-codes file name fragments. `ConvertOptions`
//! carries the tunables of one run and is validated once, before any I/O.

use chrono::format::{Item, StrftimeItems};
use parquet::basic::{Compression, ZstdLevel};
use serde::Serialize;
use snafu::prelude::*;

use crate::type_map::hooks::HookRegistry;

/// Result alias for option validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Rejected run options.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// The RAM budget is not a positive, finite number.
    #[snafu(display("RAM budget must be a positive number of GiB, got {value}"))]
    InvalidRamBudget {
        /// The rejected budget.
        value: f64,
    },

    /// The sample size is zero.
    #[snafu(display("Sample size must be at least one row"))]
    ZeroSampleRows,

    /// The chunk row cap is zero.
    #[snafu(display("Chunk row cap must be at least one row"))]
    ZeroChunkRows,

    /// The date format is empty or contains an unknown specifier.
    #[snafu(display("Invalid date format '{format}'"))]
    InvalidDateFormat {
        /// The rejected format.
        format: String,
    },
}

/// Naming conventions of the input directory and its archives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayout {
    /// File name prefix of the primary data archives.
    pub data_archive_prefix: String,
    /// File name prefix of the documentation archive.
    pub docs_archive_prefix: String,
    /// Folder inside the documentation archive holding the DDL scripts.
    pub scripts_folder: String,
    /// Extension of DDL script members.
    pub script_extension: String,
    /// Marker contained in the name of the row-count manifest member.
    pub manifest_marker: String,
    /// Accepted extensions of the row-count manifest member.
    pub manifest_extensions: Vec<String>,
    /// Prefix every table key starts with.
    pub key_marker: String,
    /// Delimiter ending a table key inside a member name.
    pub key_delimiter: char,
    /// Extension of archive files.
    pub archive_extension: String,
    /// Extension given to the output files.
    pub output_extension: String,
}

impl Default for SourceLayout {
    fn default() -> Self {
        Self {
            data_archive_prefix: "data_PATSTAT".to_string(),
            docs_archive_prefix: "index_documentation_scripts".to_string(),
            scripts_folder: "CreateTableScripts".to_string(),
            script_extension: ".sql".to_string(),
            manifest_marker: "RowCount".to_string(),
            manifest_extensions: vec![".txt".to_string(), ".rpt".to_string()],
            key_marker: "tls".to_string(),
            key_delimiter: '_',
            archive_extension: ".zip".to_string(),
            output_extension: "parquet".to_string(),
        }
    }
}

impl SourceLayout {
    /// Extract the table key from a member name, if it carries one.
    ///
    /// The key runs from the first occurrence of the key marker up to the
    /// key delimiter (or the file extension when no delimiter follows), so
    /// `tls201_part01.zip` and `tls201_part02.zip` both yield `tls201`.
    pub fn table_key_of(&self, member_name: &str) -> Option<String> {
        let file_name = member_name.rsplit('/').next().unwrap_or(member_name);
        let start = file_name.find(&self.key_marker)?;
        let rest = &file_name[start..];
        let end = rest
            .find(|c: char| c == self.key_delimiter || c == '.')
            .unwrap_or(rest.len());
        let key = &rest[..end];
        (key.len() > self.key_marker.len()).then(|| key.to_string())
    }

    /// File name of the output file for a table.
    pub fn output_file_name(&self, full_table_name: &str) -> String {
        format!("{full_table_name}.{}", self.output_extension)
    }
}

/// Compression codec applied to the Parquet output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputCompression {
    /// No compression.
    Uncompressed,
    /// Snappy block compression.
    #[default]
    Snappy,
    /// Zstandard at its default level.
    Zstd,
}

impl From<OutputCompression> for Compression {
    fn from(value: OutputCompression) -> Self {
        match value {
            OutputCompression::Uncompressed => Compression::UNCOMPRESSED,
            OutputCompression::Snappy => Compression::SNAPPY,
            OutputCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
        }
    }
}

/// Default upper bound on rows per chunk.
pub const DEFAULT_MAX_CHUNK_ROWS: usize = 4 * 1024 * 1024;

/// Tunables of one conversion run.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Memory ceiling, in GiB, for one in-flight chunk.
    pub ram_budget_gb: f64,
    /// Number of rows sampled per fragment to estimate the row footprint.
    pub sample_rows: usize,
    /// Upper bound on rows per chunk, whatever the RAM budget allows.
    ///
    /// The CSV decoder preallocates per-row buffers for a whole chunk, so an
    /// unbounded chunk size would allocate far beyond the budget.
    pub max_chunk_rows: usize,
    /// Log discovered archives and the resolved table list.
    pub verbose: bool,
    /// Record a failed table and move on instead of aborting the run.
    pub continue_on_error: bool,
    /// Parquet compression codec.
    pub compression: OutputCompression,
    /// `chrono` format used to parse date columns.
    pub date_format: String,
    /// Naming conventions of the source directory.
    pub layout: SourceLayout,
    /// Per-table schema adjustments applied after type mapping.
    pub hooks: HookRegistry,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            ram_budget_gb: 8.0,
            sample_rows: crate::chunking::DEFAULT_SAMPLE_ROWS,
            max_chunk_rows: DEFAULT_MAX_CHUNK_ROWS,
            verbose: false,
            continue_on_error: true,
            compression: OutputCompression::default(),
            date_format: "%Y-%m-%d".to_string(),
            layout: SourceLayout::default(),
            hooks: HookRegistry::patstat_defaults(),
        }
    }
}

impl ConvertOptions {
    /// Check the tunables before any I/O happens.
    pub fn validate(&self) -> ConfigResult<()> {
        ensure!(
            self.ram_budget_gb.is_finite() && self.ram_budget_gb > 0.0,
            InvalidRamBudgetSnafu {
                value: self.ram_budget_gb
            }
        );
        ensure!(self.sample_rows > 0, ZeroSampleRowsSnafu);
        ensure!(self.max_chunk_rows > 0, ZeroChunkRowsSnafu);
        ensure!(
            is_valid_date_format(&self.date_format),
            InvalidDateFormatSnafu {
                format: &self.date_format
            }
        );
        Ok(())
    }
}

/// A date format is usable when it is non-empty and every specifier is
/// known to `chrono`.
fn is_valid_date_format(format: &str) -> bool {
    !format.trim().is_empty()
        && StrftimeItems::new(format).all(|item| !matches!(item, Item::Error))
}
