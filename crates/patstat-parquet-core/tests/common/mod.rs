#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    fs::File,
    io::{Cursor, Write},
    path::{Path, PathBuf},
};

use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use zip::{ZipWriter, write::SimpleFileOptions};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub const DOCS_ARCHIVE: &str = "index_documentation_scripts_PATSTAT_Global_2024_Autumn.zip";

/// One table of a synthetic release.
#[derive(Debug, Clone)]
pub struct FixtureTable {
    pub key: String,
    pub full_name: String,
    /// DDL script; `None` leaves the table without a script.
    pub script: Option<String>,
    /// `(data archive number, CSV text)` per part, in part order.
    pub parts: Vec<(u8, String)>,
    /// Count written to the manifest.
    pub declared_rows: u64,
}

impl FixtureTable {
    pub fn new(key: &str, full_name: &str, columns: &[(&str, &str)]) -> Self {
        Self {
            key: key.to_string(),
            full_name: full_name.to_string(),
            script: Some(create_table_script(full_name, columns)),
            parts: Vec::new(),
            declared_rows: 0,
        }
    }

    /// Add a part stored in data archive `archive_no`; the manifest count
    /// grows by the number of data lines.
    pub fn part(mut self, archive_no: u8, csv: &str) -> Self {
        let rows = csv.lines().skip(1).filter(|l| !l.is_empty()).count() as u64;
        self.declared_rows += rows;
        self.parts.push((archive_no, csv.to_string()));
        self
    }

    pub fn declared_rows(mut self, rows: u64) -> Self {
        self.declared_rows = rows;
        self
    }

    pub fn without_script(mut self) -> Self {
        self.script = None;
        self
    }
}

/// DDL in the dialect of the release scripts.
pub fn create_table_script(full_name: &str, columns: &[(&str, &str)]) -> String {
    let mut out = format!("USE [patstat]\nGO\nCREATE TABLE [dbo].[{full_name}](\n");
    for (name, ty) in columns {
        let default = if ty.contains("char") { "('')" } else { "((0))" };
        out.push_str(&format!("\t[{name}] [{ty}] NOT NULL DEFAULT {default},\n"));
    }
    out.push_str(") ON [PRIMARY]\nGO\n");
    out
}

fn zip_bytes(entries: &[(String, Vec<u8>)]) -> TestResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(name.as_str(), SimpleFileOptions::default())?;
        zip.write_all(data)?;
    }
    Ok(zip.finish()?.into_inner())
}

/// Write a release with `tables` into `root`.
///
/// Data archives are named `data_PATSTAT_Global_2024_Autumn_<nn>.zip`; each
/// part becomes `<key>_part<nn>.zip` wrapping `<key>_part<nn>.csv`.
/// `extra_members` adds plain members to data archive 1.
pub fn write_release(
    root: &Path,
    tables: &[FixtureTable],
    extra_members: &[(&str, &str)],
) -> TestResult {
    let mut data: BTreeMap<u8, Vec<(String, Vec<u8>)>> = BTreeMap::new();
    let mut docs: Vec<(String, Vec<u8>)> = Vec::new();
    let mut manifest = String::from("\u{feff}");

    for table in tables {
        for (idx, (archive_no, csv)) in table.parts.iter().enumerate() {
            let stem = format!("{}_part{:02}", table.key, idx + 1);
            let inner = zip_bytes(&[(format!("{stem}.csv"), csv.as_bytes().to_vec())])?;
            data.entry(*archive_no)
                .or_default()
                .push((format!("{stem}.zip"), inner));
        }
        if let Some(script) = &table.script {
            docs.push((
                format!("CreateTableScripts/CreateTable_{}.sql", table.full_name),
                script.as_bytes().to_vec(),
            ));
        }
        manifest.push_str(&format!(
            "\"{} Count: {}\"\r\n",
            table.full_name, table.declared_rows
        ));
    }

    for (name, text) in extra_members {
        data.entry(1)
            .or_default()
            .push((name.to_string(), text.as_bytes().to_vec()));
    }

    for (archive_no, members) in &data {
        let path = root.join(format!("data_PATSTAT_Global_2024_Autumn_{archive_no:02}.zip"));
        File::create(path)?.write_all(&zip_bytes(members)?)?;
    }

    docs.push(("PATSTAT_Global_RowCount.txt".to_string(), manifest.into_bytes()));
    File::create(root.join(DOCS_ARCHIVE))?.write_all(&zip_bytes(&docs)?)?;
    Ok(())
}

/// Read every batch of a Parquet file.
pub fn read_batches(path: &Path) -> TestResult<Vec<RecordBatch>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?.build()?;
    Ok(reader.collect::<Result<Vec<_>, _>>()?)
}

pub fn output_path(dest: &Path, full_name: &str) -> PathBuf {
    dest.join(format!("{full_name}.parquet"))
}

/// The applications table with `rows` numbered rows split over two parts
/// in two archives.
pub fn applications_table(rows: usize) -> FixtureTable {
    let header = "appln_id,appln_auth,appln_filing_date,appln_nr_epodoc\n";
    let row = |i: usize| format!("{i},EP,2020-01-{:02},EP{i:08}\n", i % 28 + 1);

    let half = rows / 2;
    let first: String = std::iter::once(header.to_string())
        .chain((1..=half).map(row))
        .collect();
    let second: String = std::iter::once(header.to_string())
        .chain((half + 1..=rows).map(row))
        .collect();

    FixtureTable::new(
        "tls201",
        "tls201_appln",
        &[
            ("appln_id", "bigint"),
            ("appln_auth", "char"),
            ("appln_filing_date", "date"),
        ],
    )
    .part(1, &first)
    .part(2, &second)
}
