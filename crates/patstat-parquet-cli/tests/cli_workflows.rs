#![allow(missing_docs)]

mod common;

use std::io;
use std::process::{Command, Output};

use parquet::file::reader::{FileReader, SerializedFileReader};
use tempfile::TempDir;

use common::{TestResult, write_small_release};

fn cli_bin() -> &'static str {
    env!("CARGO_BIN_EXE_patstat2parquet")
}

fn run_cli(args: &[&str]) -> io::Result<Output> {
    Command::new(cli_bin()).args(args).output()
}

fn assert_cli_success(output: &Output) {
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn parquet_rows(path: &std::path::Path) -> TestResult<i64> {
    let reader = SerializedFileReader::new(std::fs::File::open(path)?)?;
    Ok(reader.metadata().file_metadata().num_rows())
}

#[test]
fn tables_lists_discovered_keys() -> TestResult {
    let src = TempDir::new()?;
    write_small_release(src.path())?;

    let src_arg = src.path().to_string_lossy().to_string();
    let output = run_cli(&["tables", "--source", &src_arg])?;
    assert_cli_success(&output);
    assert_eq!(String::from_utf8(output.stdout)?, "tls201\ntls209\n");
    Ok(())
}

#[test]
fn schema_prints_typed_columns() -> TestResult {
    let src = TempDir::new()?;
    write_small_release(src.path())?;

    let src_arg = src.path().to_string_lossy().to_string();
    let output = run_cli(&["schema", "--source", &src_arg, "--table", "tls201"])?;
    assert_cli_success(&output);
    let stdout = String::from_utf8(output.stdout)?;
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "appln_id\tint64",
            "appln_auth\tstring",
            "appln_filing_date\ttimestamp",
            "appln_nr_epodoc\tstring",
        ]
    );
    Ok(())
}

#[test]
fn convert_selected_table_writes_parquet_and_report() -> TestResult {
    let src = TempDir::new()?;
    let dest = TempDir::new()?;
    write_small_release(src.path())?;

    let src_arg = src.path().to_string_lossy().to_string();
    let dest_arg = dest.path().join("out").to_string_lossy().to_string();
    let report_path = dest.path().join("report.json");
    let report_arg = report_path.to_string_lossy().to_string();

    let output = run_cli(&[
        "convert",
        "--source",
        &src_arg,
        "--dest",
        &dest_arg,
        "--table",
        "tls201",
        "--compression",
        "zstd",
        "--report",
        &report_arg,
    ])?;
    assert_cli_success(&output);

    let written = dest.path().join("out").join("tls201_appln.parquet");
    assert_eq!(parquet_rows(&written)?, 3);
    assert!(!dest.path().join("out").join("tls209_appln_ipc.parquet").exists());

    let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&report_path)?)?;
    let tables = report["tables"].as_array().ok_or("tables is not an array")?;
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0]["table"], "tls201");
    assert_eq!(tables[0]["outcome"]["status"], "written");
    assert_eq!(tables[0]["count_check"]["actual"], 3);
    assert_eq!(tables[0]["coerced_nulls"]["per_column"]["appln_filing_date"], 1);
    Ok(())
}

#[test]
fn count_mismatch_does_not_fail_the_run() -> TestResult {
    let src = TempDir::new()?;
    let dest = TempDir::new()?;
    write_small_release(src.path())?;

    let src_arg = src.path().to_string_lossy().to_string();
    let dest_arg = dest.path().to_string_lossy().to_string();
    let output = run_cli(&["convert", "--source", &src_arg, "--dest", &dest_arg])?;
    assert_cli_success(&output);

    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("tls209\ttls209_appln_ipc\trows=2\twritten, check failed"), "{stdout}");
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("expected 5 records, but found 2"), "{stderr}");
    assert_eq!(parquet_rows(&dest.path().join("tls209_appln_ipc.parquet"))?, 2);
    Ok(())
}

#[test]
fn unknown_table_exits_non_zero() -> TestResult {
    let src = TempDir::new()?;
    let dest = TempDir::new()?;
    write_small_release(src.path())?;

    let src_arg = src.path().to_string_lossy().to_string();
    let dest_path = dest.path().join("never");
    let dest_arg = dest_path.to_string_lossy().to_string();
    let output = run_cli(&[
        "convert", "--source", &src_arg, "--dest", &dest_arg, "--table", "tls999",
    ])?;

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("tls999"), "{stderr}");
    assert!(!dest_path.exists());
    Ok(())
}

#[test]
fn bad_forced_column_is_rejected() -> TestResult {
    let src = TempDir::new()?;
    write_small_release(src.path())?;

    let src_arg = src.path().to_string_lossy().to_string();
    let output = run_cli(&[
        "schema",
        "--source",
        &src_arg,
        "--table",
        "tls209",
        "--force-column",
        "tls209:ipc_position=decimal128",
    ])?;
    assert!(!output.status.success());
    assert!(String::from_utf8(output.stderr)?.contains("--force-column"));
    Ok(())
}

#[test]
fn fail_fast_still_writes_report_of_finished_tables() -> TestResult {
    let src = TempDir::new()?;
    let dest = TempDir::new()?;
    write_small_release(src.path())?;

    let src_arg = src.path().to_string_lossy().to_string();
    let dest_arg = dest.path().join("out").to_string_lossy().to_string();
    let report_path = dest.path().join("report.json");
    let report_arg = report_path.to_string_lossy().to_string();

    // IPC symbols are not integers, so tls209 fails after tls201 is written.
    let output = run_cli(&[
        "convert",
        "--source",
        &src_arg,
        "--dest",
        &dest_arg,
        "--fail-fast",
        "--force-column",
        "tls209:ipc_class_symbol=int64",
        "--report",
        &report_arg,
    ])?;
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("Run aborted at table tls209"), "{stderr}");

    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("tls201\ttls201_appln\trows=3\tok"), "{stdout}");
    assert!(stdout.contains("value(s) coerced to null"), "{stdout}");

    let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&report_path)?)?;
    let tables = report["tables"].as_array().ok_or("tables is not an array")?;
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0]["outcome"]["status"], "written");
    assert_eq!(tables[1]["table"], "tls209");
    assert_eq!(tables[1]["outcome"]["status"], "failed");
    assert_eq!(parquet_rows(&dest.path().join("out").join("tls201_appln.parquet"))?, 3);
    assert!(!dest.path().join("out").join("tls209_appln_ipc.parquet").exists());
    Ok(())
}
