//! Row-count manifest shipped in the documentation archive.
//!
//! The manifest is a text member (`*RowCount*.txt` or `.rpt`) with one line
//! per table, `"<full_table_name> Count: <n>"`. It supplies both the output
//! file name of each table and the row count the output is verified against.

use std::{num::ParseIntError, path::Path};

use log::debug;
use serde::Serialize;
use snafu::prelude::*;

use crate::{
    archive::{self, ArchiveError},
    config::SourceLayout,
    schema_script::{self, SchemaScriptError},
};

const COUNT_TOKEN: &str = " Count: ";

/// Result alias for manifest handling.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Errors raised while reading the row-count manifest.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ManifestError {
    /// The documentation archive could not be located.
    #[snafu(display("Cannot locate documentation archive: {source}"))]
    DocsArchive {
        /// Underlying lookup error.
        source: SchemaScriptError,
    },

    /// No row-count member exists in the documentation archive.
    #[snafu(display("No row-count manifest ('{marker}') found in {archive}"))]
    NotFound {
        /// Documentation archive that was searched.
        archive: String,
        /// Marker the member name must contain.
        marker: String,
    },

    /// The manifest member could not be read.
    #[snafu(display("Cannot read row-count manifest: {source}"))]
    Read {
        /// Underlying archive error.
        source: ArchiveError,
    },

    /// A manifest line carries a count that is not a non-negative integer.
    #[snafu(display("Invalid row count on manifest line {line_no}: '{line}'"))]
    InvalidCount {
        /// One-based line number.
        line_no: usize,
        /// The offending line.
        line: String,
        /// Underlying parse error.
        source: ParseIntError,
    },

    /// The manifest has no entry for a requested table.
    #[snafu(display("Table {table} is not listed in the row-count manifest"))]
    MissingTable {
        /// Requested table key.
        table: String,
    },
}

/// Identity and expected size of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    /// Table key (`tls201`).
    pub short_name: String,
    /// Documentation name (`tls201_appln`), used as the output file stem.
    pub full_name: String,
    /// Row count the output must have.
    pub expected_row_count: u64,
}

/// Parsed manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RowCountManifest {
    tables: Vec<TableDescriptor>,
}

impl RowCountManifest {
    /// Parse manifest text.
    ///
    /// Blank lines and lines without the ` Count: ` token (headers, footers)
    /// are skipped. Surrounding quotes and a leading byte-order mark are
    /// tolerated.
    pub fn parse(text: &str) -> ManifestResult<Self> {
        let mut tables = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim_start_matches('\u{feff}').trim().trim_matches('"').trim();
            let Some((full_name, count)) = line.split_once(COUNT_TOKEN) else {
                if !line.is_empty() {
                    debug!("Skipping manifest line {}: '{line}'", idx + 1);
                }
                continue;
            };

            let full_name = full_name.trim().to_string();
            let expected_row_count = count.trim().parse::<u64>().context(InvalidCountSnafu {
                line_no: idx + 1,
                line,
            })?;
            let short_name = full_name
                .split('_')
                .next()
                .unwrap_or(full_name.as_str())
                .to_string();

            tables.push(TableDescriptor {
                short_name,
                full_name,
                expected_row_count,
            });
        }

        Ok(Self { tables })
    }

    /// Locate and parse the manifest in the documentation archive under `root`.
    pub fn load(root: &Path, layout: &SourceLayout) -> ManifestResult<Self> {
        let docs = schema_script::find_docs_archive(root, layout).context(DocsArchiveSnafu)?;
        let members = archive::try_list_members(&docs).context(ReadSnafu)?;

        let member = members
            .iter()
            .find(|m| {
                m.contains(&layout.manifest_marker)
                    && layout.manifest_extensions.iter().any(|ext| m.ends_with(ext))
            })
            .context(NotFoundSnafu {
                archive: docs.display().to_string(),
                marker: layout.manifest_marker.clone(),
            })?;

        let text = archive::read_member_to_string(&docs, member).context(ReadSnafu)?;
        Self::parse(&text)
    }

    /// Descriptor of `table_key`; the first matching line wins.
    pub fn descriptor(&self, table_key: &str) -> ManifestResult<&TableDescriptor> {
        self.tables
            .iter()
            .find(|t| t.short_name == table_key)
            .context(MissingTableSnafu { table: table_key })
    }

    /// All descriptors in manifest order.
    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_count_lines() -> ManifestResult<()> {
        let text = "\u{feff}tls201_appln Count: 1000\r\n\"tls202_appln_title Count: 42\"\n\n";
        let manifest = RowCountManifest::parse(text)?;

        assert_eq!(manifest.tables().len(), 2);
        let appln = manifest.descriptor("tls201")?;
        assert_eq!(appln.full_name, "tls201_appln");
        assert_eq!(appln.expected_row_count, 1000);
        assert_eq!(manifest.descriptor("tls202")?.expected_row_count, 42);
        Ok(())
    }

    #[test]
    fn skips_lines_without_count_token() -> ManifestResult<()> {
        let text = "Row counts for PATSTAT Global\n----\ntls206_person Count: 7\n(1 row affected)";
        let manifest = RowCountManifest::parse(text)?;
        assert_eq!(manifest.tables().len(), 1);
        assert_eq!(manifest.descriptor("tls206")?.full_name, "tls206_person");
        Ok(())
    }

    #[test]
    fn short_name_without_delimiter_is_full_name() -> ManifestResult<()> {
        let manifest = RowCountManifest::parse("Applications Count: 1000")?;
        let d = manifest.descriptor("Applications")?;
        assert_eq!(d.full_name, "Applications");
        assert_eq!(d.expected_row_count, 1000);
        Ok(())
    }

    #[test]
    fn bad_count_is_an_error() {
        let err = RowCountManifest::parse("tls201_appln Count: lots").unwrap_err();
        assert!(matches!(err, ManifestError::InvalidCount { line_no: 1, .. }));
    }

    #[test]
    fn missing_table_is_reported() -> ManifestResult<()> {
        let manifest = RowCountManifest::parse("tls201_appln Count: 1")?;
        assert!(matches!(
            manifest.descriptor("tls999"),
            Err(ManifestError::MissingTable { .. })
        ));
        Ok(())
    }
}
