//! Schema extraction from the `CREATE TABLE` scripts shipped in the
//! documentation archive.
//!
//! [`parser`] holds the DDL grammar and is free of I/O; [`locate`] finds the
//! documentation archive and the script for a table.

pub mod locate;
pub mod parser;

use std::io;

use snafu::prelude::*;

use crate::archive::ArchiveError;

pub use locate::{find_docs_archive, find_script_member, load_column_definitions, read_table_script};
pub use parser::{ColumnDefinition, ColumnDefinitions, ColumnLength, parse_create_table_script};

/// Result alias for schema extraction.
pub type SchemaScriptResult<T> = Result<T, SchemaScriptError>;

/// Errors raised while locating or reading a table's DDL script.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaScriptError {
    /// No documentation archive exists in the source directory.
    #[snafu(display("No archive starting with '{prefix}' found in {dir}"))]
    DocsArchiveNotFound {
        /// Source directory that was searched.
        dir: String,
        /// Required file name prefix.
        prefix: String,
    },

    /// The source directory could not be listed.
    #[snafu(display("Cannot list source directory {dir}: {source}"))]
    ListDir {
        /// Source directory.
        dir: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The documentation archive holds no script naming the table.
    #[snafu(display("No SQL script found containing '{table}' in {archive}"))]
    ScriptNotFound {
        /// Requested table key.
        table: String,
        /// Documentation archive that was searched.
        archive: String,
    },

    /// The documentation archive could not be read.
    #[snafu(display("Cannot read documentation archive: {source}"))]
    DocsArchive {
        /// Underlying archive error.
        source: ArchiveError,
    },
}
