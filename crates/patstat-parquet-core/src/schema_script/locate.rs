//! Locating the documentation archive and a table's DDL script.

use std::path::{Path, PathBuf};

use log::debug;
use snafu::prelude::*;

use super::{
    ColumnDefinitions, DocsArchiveNotFoundSnafu, DocsArchiveSnafu, ListDirSnafu,
    SchemaScriptResult, ScriptNotFoundSnafu, parse_create_table_script,
};
use crate::{archive, config::SourceLayout};

/// Find the documentation archive under `root`.
///
/// When several archives carry the prefix, the first one in file name order
/// is used.
pub fn find_docs_archive(root: &Path, layout: &SourceLayout) -> SchemaScriptResult<PathBuf> {
    let entries = std::fs::read_dir(root).context(ListDirSnafu {
        dir: root.display().to_string(),
    })?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.file_name().and_then(|n| n.to_str()).is_some_and(|n| {
                n.starts_with(&layout.docs_archive_prefix)
                    && n.ends_with(&layout.archive_extension)
            })
        })
        .collect();
    candidates.sort();

    candidates.into_iter().next().context(DocsArchiveNotFoundSnafu {
        dir: root.display().to_string(),
        prefix: layout.docs_archive_prefix.clone(),
    })
}

/// Pick the script member for `table_key` among the archive `members`.
///
/// A member qualifies when it sits under the scripts folder, ends with the
/// script extension, and its file name contains the key (ignoring case).
pub fn find_script_member<'a>(
    members: &'a [String],
    table_key: &str,
    layout: &SourceLayout,
) -> Option<&'a str> {
    let key = table_key.to_lowercase();
    members
        .iter()
        .filter(|m| m.contains(&layout.scripts_folder) && m.ends_with(&layout.script_extension))
        .find(|m| {
            m.rsplit('/')
                .next()
                .is_some_and(|file| file.to_lowercase().contains(&key))
        })
        .map(String::as_str)
}

/// Read the DDL script for `table_key` from the documentation archive.
pub fn read_table_script(
    root: &Path,
    table_key: &str,
    layout: &SourceLayout,
) -> SchemaScriptResult<String> {
    let docs = find_docs_archive(root, layout)?;
    let members = archive::try_list_members(&docs).context(DocsArchiveSnafu)?;

    let member = find_script_member(&members, table_key, layout).context(ScriptNotFoundSnafu {
        table: table_key,
        archive: docs.display().to_string(),
    })?;
    debug!("Using schema script {member} for {table_key}");

    archive::read_member_to_string(&docs, member).context(DocsArchiveSnafu)
}

/// Locate, read and parse the DDL script for `table_key`.
pub fn load_column_definitions(
    root: &Path,
    table_key: &str,
    layout: &SourceLayout,
) -> SchemaScriptResult<ColumnDefinitions> {
    let script = read_table_script(root, table_key, layout)?;
    Ok(parse_create_table_script(&script))
}
