//! Archive index: finding data archives, listing their members and
//! grouping members by table key.
//!
//! Listing is deliberately forgiving. A single missing or corrupt archive
//! is logged and treated as empty so the rest of a release can still be
//! converted; only the nested fragment reader (see [`nested`]) propagates
//! archive errors, because by then the caller has committed to a table.

pub mod nested;

use std::{
    collections::BTreeSet,
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

use log::{error, warn};
use snafu::prelude::*;
use zip::{ZipArchive, result::ZipError};

use crate::config::SourceLayout;

/// Result alias for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors raised while opening or reading ZIP archives.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ArchiveError {
    /// The archive file could not be opened.
    #[snafu(display("Cannot open archive {path}: {source}"))]
    OpenArchive {
        /// Path of the archive.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The file is not a readable ZIP archive.
    #[snafu(display("Invalid ZIP archive {path}: {source}"))]
    InvalidZip {
        /// Path (or label, for nested archives) of the archive.
        path: String,
        /// Underlying ZIP error.
        source: ZipError,
    },

    /// A member could not be located inside an archive.
    #[snafu(display("Cannot locate member {member} in {path}: {source}"))]
    Member {
        /// Path (or label) of the containing archive.
        path: String,
        /// Name of the member.
        member: String,
        /// Underlying ZIP error.
        source: ZipError,
    },

    /// A member could not be decompressed.
    #[snafu(display("Cannot read member {member} of {path}: {source}"))]
    ReadMember {
        /// Path (or label) of the containing archive.
        path: String,
        /// Name of the member.
        member: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// A nested fragment archive holds no CSV file.
    #[snafu(display("Nested archive {member} in {path} contains no CSV file"))]
    MissingCsv {
        /// Path of the outer archive.
        path: String,
        /// Name of the nested archive member.
        member: String,
    },
}

/// One member of a top-level data archive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArchiveMember {
    /// Path of the archive holding the member.
    pub archive: PathBuf,
    /// Member name inside the archive.
    pub name: String,
}

/// List the archives directly under `root` whose file name starts with
/// `prefix` and ends with `extension`, sorted by path.
///
/// A missing or unreadable directory yields an empty list and a log record.
pub fn list_archives(root: &Path, prefix: &str, extension: &str) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot list directory {}: {e}", root.display());
            return Vec::new();
        }
    };

    let mut archives: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {e}", root.display());
                None
            }
        })
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix) && n.ends_with(extension))
        })
        .collect();
    archives.sort();
    archives
}

fn open_archive(path: &Path) -> ArchiveResult<ZipArchive<File>> {
    let file = File::open(path).context(OpenArchiveSnafu {
        path: path.display().to_string(),
    })?;
    ZipArchive::new(file).context(InvalidZipSnafu {
        path: path.display().to_string(),
    })
}

/// List member names of an archive, propagating any failure.
pub fn try_list_members(archive: &Path) -> ArchiveResult<Vec<String>> {
    let zip = open_archive(archive)?;
    Ok(zip.file_names().map(str::to_string).collect())
}

/// List member names of an archive.
///
/// Missing or corrupt archives are reported through the log and produce an
/// empty listing; this never fails.
pub fn list_members(archive: &Path) -> Vec<String> {
    match try_list_members(archive) {
        Ok(names) => names,
        Err(e) => {
            error!("{e}");
            Vec::new()
        }
    }
}

/// Collect the members of every archive, in archive order.
pub fn collect_members(archives: &[PathBuf]) -> Vec<ArchiveMember> {
    archives
        .iter()
        .flat_map(|archive| {
            list_members(archive)
                .into_iter()
                .map(move |name| ArchiveMember {
                    archive: archive.clone(),
                    name,
                })
        })
        .collect()
}

/// Outer archives holding at least one member whose name contains
/// `table_key`, deduplicated and sorted.
///
/// Multi-part tables spread their fragments over several members (and
/// sometimes several archives); this collapses them into the distinct
/// archive paths that need to be opened.
pub fn filter_members_by_table(table_key: &str, members: &[ArchiveMember]) -> Vec<PathBuf> {
    members
        .iter()
        .filter(|m| m.name.contains(table_key))
        .map(|m| m.archive.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Every table key carried by the member names, sorted and deduplicated.
pub fn discover_table_keys(members: &[ArchiveMember], layout: &SourceLayout) -> Vec<String> {
    members
        .iter()
        .filter_map(|m| layout.table_key_of(&m.name))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Keys that occur inside another, longer key.
///
/// Fragment matching is substring based, so a key such as `tls1` would also
/// pick up the fragments of `tls10`. Returns `(shorter, longer)` pairs.
pub fn prefix_collisions(keys: &[String]) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for short in keys {
        for long in keys {
            if long.len() > short.len() && long.contains(short.as_str()) {
                out.push((short.clone(), long.clone()));
            }
        }
    }
    out
}

/// Read a member of a top-level archive fully into memory.
pub fn read_member(archive: &Path, member: &str) -> ArchiveResult<Vec<u8>> {
    let mut zip = open_archive(archive)?;
    let path = archive.display().to_string();
    let mut entry = zip.by_name(member).context(MemberSnafu {
        path: path.clone(),
        member,
    })?;
    let mut buf = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
    entry
        .read_to_end(&mut buf)
        .context(ReadMemberSnafu { path, member })?;
    Ok(buf)
}

/// Read a UTF-8 text member of a top-level archive.
pub fn read_member_to_string(archive: &Path, member: &str) -> ArchiveResult<String> {
    let bytes = read_member(archive, member)?;
    String::from_utf8(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        .context(ReadMemberSnafu {
            path: archive.display().to_string(),
            member,
        })
}
