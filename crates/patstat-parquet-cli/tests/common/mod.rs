use std::{
    fs::File,
    io::{Cursor, Write},
    path::Path,
};

use zip::{ZipWriter, write::SimpleFileOptions};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

fn zip_bytes(entries: &[(&str, Vec<u8>)]) -> TestResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default())?;
        zip.write_all(data)?;
    }
    Ok(zip.finish()?.into_inner())
}

/// A two-table release: `tls201` (3 rows, declared 3) and `tls209`
/// (2 rows, declared 5).
pub fn write_small_release(root: &Path) -> TestResult {
    let appln = zip_bytes(&[(
        "tls201_part01.csv",
        b"appln_id,appln_auth,appln_filing_date,appln_nr_epodoc\n\
          1,EP,2019-05-01,EP1\n\
          2,US,not-a-date,\n\
          3,  ,2020-01-01,EP3\n"
            .to_vec(),
    )])?;
    let ipc = zip_bytes(&[(
        "tls209_part01.csv",
        b"appln_id,ipc_class_symbol\n10,A01B   1/00\n11,H04L   9/00\n".to_vec(),
    )])?;
    let data = zip_bytes(&[("tls201_part01.zip", appln), ("tls209_part01.zip", ipc)])?;
    File::create(root.join("data_PATSTAT_Global_2024_Autumn_01.zip"))?.write_all(&data)?;

    let docs = zip_bytes(&[
        (
            "CreateTableScripts/CreateTable_tls201_appln.sql",
            b"CREATE TABLE [dbo].[tls201_appln](\n\
              \t[appln_id] [int] NOT NULL DEFAULT ((0)),\n\
              \t[appln_auth] [char](2) NOT NULL DEFAULT (''),\n\
              \t[appln_filing_date] [date] NOT NULL DEFAULT ('9999-12-31'),\n\
              ) ON [PRIMARY]\n"
                .to_vec(),
        ),
        (
            "CreateTableScripts/CreateTable_tls209_appln_ipc.sql",
            b"CREATE TABLE [dbo].[tls209_appln_ipc](\n\
              \t[appln_id] [int] NOT NULL DEFAULT ((0)),\n\
              \t[ipc_class_symbol] [varchar](15) NOT NULL DEFAULT (''),\n\
              ) ON [PRIMARY]\n"
                .to_vec(),
        ),
        (
            "PATSTAT_Global_RowCount.rpt",
            b"tls201_appln Count: 3\ntls209_appln_ipc Count: 5\n".to_vec(),
        ),
    ])?;
    File::create(root.join("index_documentation_scripts_PATSTAT_Global.zip"))?
        .write_all(&docs)?;
    Ok(())
}
