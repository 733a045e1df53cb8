//! Two-level fragment access.
//!
//! Table data is nested: a data archive holds one ZIP per table part, and
//! each of those holds exactly one CSV file. The inner ZIP is buffered in
//! memory in its compressed form, and the CSV is decompressed as a stream,
//! so the resident cost of a fragment is its compressed size.

use std::{
    fs::File,
    io::{Cursor, Read},
    path::{Path, PathBuf},
};

use snafu::prelude::*;
use zip::ZipArchive;

use super::{
    ArchiveResult, InvalidZipSnafu, MemberSnafu, MissingCsvSnafu, OpenArchiveSnafu,
    ReadMemberSnafu,
};

/// An opened top-level data archive.
pub struct OuterArchive {
    path: PathBuf,
    zip: ZipArchive<File>,
}

impl std::fmt::Debug for OuterArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OuterArchive")
            .field("path", &self.path)
            .field("members", &self.zip.len())
            .finish()
    }
}

impl OuterArchive {
    /// Open the archive at `path`.
    pub fn open(path: &Path) -> ArchiveResult<Self> {
        let file = File::open(path).context(OpenArchiveSnafu {
            path: path.display().to_string(),
        })?;
        let zip = ZipArchive::new(file).context(InvalidZipSnafu {
            path: path.display().to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            zip,
        })
    }

    /// Path of the archive on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Nested archive members whose name contains `table_key`, sorted.
    pub fn fragment_members(&self, table_key: &str, archive_extension: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .zip
            .file_names()
            .filter(|name| name.contains(table_key) && name.ends_with(archive_extension))
            .map(str::to_string)
            .collect();
        names.sort();
        names
    }

    /// Buffer the nested archive `member` and locate its CSV file.
    pub fn open_fragment(&mut self, member: &str) -> ArchiveResult<CsvFragment> {
        let path = self.path.display().to_string();
        let mut entry = self.zip.by_name(member).context(MemberSnafu {
            path: path.clone(),
            member,
        })?;
        let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry.read_to_end(&mut bytes).context(ReadMemberSnafu {
            path: path.clone(),
            member,
        })?;
        drop(entry);

        CsvFragment::from_bytes(format!("{path}!{member}"), member, bytes)
    }
}

/// A CSV file inside an in-memory nested archive.
///
/// [`CsvFragment::open`] can be called repeatedly; every call starts a fresh
/// decompression stream at the first byte of the CSV. This is how callers
/// rewind after sampling.
pub struct CsvFragment {
    label: String,
    zip: ZipArchive<Cursor<Vec<u8>>>,
    csv_name: String,
}

impl std::fmt::Debug for CsvFragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvFragment")
            .field("label", &self.label)
            .field("csv_name", &self.csv_name)
            .finish()
    }
}

impl CsvFragment {
    /// Wrap the bytes of a nested archive.
    ///
    /// The CSV entry named after the member (`x.zip` → `x.csv`) is preferred;
    /// otherwise the first entry with a `.csv` extension is used.
    pub fn from_bytes(label: String, member: &str, bytes: Vec<u8>) -> ArchiveResult<Self> {
        let zip = ZipArchive::new(Cursor::new(bytes)).context(InvalidZipSnafu {
            path: label.clone(),
        })?;

        let stem = member.rsplit('/').next().unwrap_or(member);
        let expected = match stem.rsplit_once('.') {
            Some((base, _)) => format!("{base}.csv"),
            None => format!("{stem}.csv"),
        };

        let csv_name = zip
            .file_names()
            .find(|name| name.rsplit('/').next() == Some(expected.as_str()))
            .or_else(|| {
                zip.file_names()
                    .find(|name| name.to_ascii_lowercase().ends_with(".csv"))
            })
            .map(str::to_string);

        let Some(csv_name) = csv_name else {
            let (path, member) = match label.split_once('!') {
                Some((path, member)) => (path.to_string(), member.to_string()),
                None => (label.clone(), member.to_string()),
            };
            return MissingCsvSnafu { path, member }.fail();
        };

        Ok(Self {
            label,
            zip,
            csv_name,
        })
    }

    /// `<outer archive>!<nested member>` label used in logs and errors.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Name of the CSV entry inside the nested archive.
    pub fn csv_name(&self) -> &str {
        &self.csv_name
    }

    /// Start a new read of the CSV from its first byte.
    pub fn open(&mut self) -> ArchiveResult<impl Read + '_> {
        self.zip.by_name(&self.csv_name).context(MemberSnafu {
            path: self.label.clone(),
            member: self.csv_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveError;
    use std::io::{Seek, Write};
    use tempfile::TempDir;
    use zip::{ZipWriter, write::SimpleFileOptions};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn zip_bytes(members: &[(&str, &[u8])]) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in members {
            zip.start_file(*name, SimpleFileOptions::default())?;
            zip.write_all(body)?;
        }
        Ok(zip.finish()?.into_inner())
    }

    fn write_outer<W: Write + Seek>(
        out: W,
        members: &[(&str, Vec<u8>)],
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut zip = ZipWriter::new(out);
        for (name, body) in members {
            zip.start_file(*name, SimpleFileOptions::default())?;
            zip.write_all(body)?;
        }
        zip.finish()?;
        Ok(())
    }

    #[test]
    fn reads_nested_csv_and_rewinds() -> TestResult {
        let tmp = TempDir::new()?;
        let outer_path = tmp.path().join("data_PATSTAT_01.zip");
        let inner = zip_bytes(&[("tls201_part01.csv", b"a,b\n1,2\n")])?;
        write_outer(
            File::create(&outer_path)?,
            &[
                ("tls201_part02.zip", inner.clone()),
                ("tls201_part01.zip", inner),
                ("tls202_part01.zip", zip_bytes(&[("x.csv", b"c\n")])?),
            ],
        )?;

        let mut outer = OuterArchive::open(&outer_path)?;
        assert_eq!(
            outer.fragment_members("tls201", ".zip"),
            vec!["tls201_part01.zip", "tls201_part02.zip"]
        );

        let mut fragment = outer.open_fragment("tls201_part01.zip")?;
        assert_eq!(fragment.csv_name(), "tls201_part01.csv");

        let mut first = String::new();
        fragment.open()?.read_to_string(&mut first)?;
        let mut second = String::new();
        fragment.open()?.read_to_string(&mut second)?;
        assert_eq!(first, "a,b\n1,2\n");
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn falls_back_to_any_csv_entry() -> TestResult {
        let bytes = zip_bytes(&[("README", b"-"), ("other_name.CSV", b"h\n")])?;
        let fragment = CsvFragment::from_bytes("outer!tls209.zip".into(), "tls209.zip", bytes)?;
        assert_eq!(fragment.csv_name(), "other_name.CSV");
        Ok(())
    }

    #[test]
    fn nested_archive_without_csv_is_an_error() -> TestResult {
        let bytes = zip_bytes(&[("README", b"-")])?;
        let err = CsvFragment::from_bytes("outer.zip!tls209.zip".into(), "tls209.zip", bytes)
            .unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MissingCsv { ref path, ref member }
                if path == "outer.zip" && member == "tls209.zip"
        ));
        Ok(())
    }
}
