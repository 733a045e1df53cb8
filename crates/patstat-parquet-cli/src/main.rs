//! Command-line front end: convert a PATSTAT release to Parquet.

mod error;

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use patstat_parquet_core::{
    ConvertOptions, OutputCompression, RunReport, TableOutcome, TypedSchema, discover_tables,
    process_tables, schema_script::load_column_definitions, type_map::hooks::ForcedColumn,
};
use snafu::{ResultExt, ensure};

use crate::error::{
    CliResult, ForcedColumnSnafu, PipelineSnafu, SchemaScriptSnafu, SerializeReportSnafu,
    TablesFailedSnafu, TypedSchemaSnafu, WriteReportSnafu,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompressionArg {
    None,
    Snappy,
    Zstd,
}

impl From<CompressionArg> for OutputCompression {
    fn from(v: CompressionArg) -> Self {
        match v {
            CompressionArg::None => OutputCompression::Uncompressed,
            CompressionArg::Snappy => OutputCompression::Snappy,
            CompressionArg::Zstd => OutputCompression::Zstd,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert tables of a release into one Parquet file each
    Convert {
        /// Directory holding the release ZIP archives
        #[arg(long)]
        source: PathBuf,

        /// Output directory (created if absent)
        #[arg(long)]
        dest: PathBuf,

        /// Repeatable table key, e.g. tls201 (default: every table)
        #[arg(long = "table")]
        tables: Vec<String>,

        /// Memory budget per chunk, in GiB
        #[arg(long = "ram-gb", default_value_t = 8.0)]
        ram_gb: f64,

        /// Rows sampled per fragment to size chunks
        #[arg(long, default_value_t = 1000)]
        sample_rows: usize,

        /// Upper bound on rows per chunk
        #[arg(long)]
        max_chunk_rows: Option<usize>,

        #[arg(long, value_enum, default_value_t = CompressionArg::Snappy)]
        compression: CompressionArg,

        /// chrono format of date columns
        #[arg(long, default_value = "%Y-%m-%d")]
        date_format: String,

        /// Stop at the first failed table
        #[arg(long, default_value_t = false)]
        fail_fast: bool,

        /// Repeatable <table>:<column>=<type>, e.g. tls201:appln_nr_epodoc=string
        #[arg(long = "force-column")]
        force_column: Vec<String>,

        /// Write the run report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List the table keys found in a release
    Tables {
        #[arg(long)]
        source: PathBuf,
    },

    /// Print the typed schema derived for a table
    Schema {
        #[arg(long)]
        source: PathBuf,

        #[arg(long)]
        table: String,

        #[arg(long = "force-column")]
        force_column: Vec<String>,
    },
}

#[derive(Debug, Parser)]
#[command(name = "patstat2parquet", version)]
struct Cli {
    /// Debug logging and a listing of archives and tables
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

struct ConvertArgs {
    source: PathBuf,
    dest: PathBuf,
    tables: Vec<String>,
    ram_gb: f64,
    sample_rows: usize,
    max_chunk_rows: Option<usize>,
    compression: CompressionArg,
    date_format: String,
    fail_fast: bool,
    force_column: Vec<String>,
    report: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    builder.format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()));
    // RUST_LOG overrides the level chosen above.
    builder.parse_default_env();
    let _ = builder.try_init();
}

fn options_with_forced_columns(
    mut opts: ConvertOptions,
    specs: &[String],
) -> CliResult<ConvertOptions> {
    for spec in specs {
        let (table, hook) =
            ForcedColumn::parse_spec(spec).context(ForcedColumnSnafu { spec: spec.as_str() })?;
        opts.hooks.register(&table, hook);
    }
    Ok(opts)
}

fn write_report(path: &Path, report: &RunReport) -> CliResult<()> {
    let json = serde_json::to_string_pretty(report).context(SerializeReportSnafu)?;
    std::fs::write(path, json).context(WriteReportSnafu {
        path: path.display().to_string(),
    })
}

fn print_summary(report: &RunReport) {
    for table in &report.tables {
        let status = match &table.outcome {
            TableOutcome::Written if table.is_verified() => "ok".to_string(),
            TableOutcome::Written => "written, check failed".to_string(),
            TableOutcome::Skipped { reason } => format!("skipped ({reason})"),
            TableOutcome::Failed { error } => format!("failed: {error}"),
        };
        println!(
            "{}\t{}\trows={}\t{status}",
            table.table,
            table.full_name.as_deref().unwrap_or("-"),
            table.rows_written
        );
    }
    println!(
        "Processed {} table(s) in {} ms, {} value(s) coerced to null",
        report.processed_keys().len(),
        report.elapsed_ms,
        report.total_coerced_nulls()
    );
}

fn cmd_convert(args: ConvertArgs, verbose: bool) -> CliResult<()> {
    let defaults = ConvertOptions::default();
    let opts = ConvertOptions {
        ram_budget_gb: args.ram_gb,
        sample_rows: args.sample_rows,
        max_chunk_rows: args.max_chunk_rows.unwrap_or(defaults.max_chunk_rows),
        verbose,
        continue_on_error: !args.fail_fast,
        compression: args.compression.into(),
        date_format: args.date_format,
        ..defaults
    };
    let opts = options_with_forced_columns(opts, &args.force_column)?;

    let keys = (!args.tables.is_empty()).then_some(args.tables.as_slice());
    let report = match process_tables(&args.source, &args.dest, keys, &opts) {
        Ok(report) => report,
        Err(error) => {
            // A fail-fast abort still has the tables it got through.
            if let Some(partial) = error.partial_report() {
                if let Some(path) = &args.report {
                    write_report(path, partial)?;
                }
                print_summary(partial);
            }
            return Err(error).context(PipelineSnafu);
        }
    };

    if let Some(path) = &args.report {
        write_report(path, &report)?;
    }
    print_summary(&report);

    let failed: Vec<String> = report.failed().map(|t| t.table.clone()).collect();
    ensure!(failed.is_empty(), TablesFailedSnafu { failed });
    Ok(())
}

fn cmd_tables(source: &Path) {
    for key in discover_tables(source, &ConvertOptions::default().layout) {
        println!("{key}");
    }
}

fn cmd_schema(source: &Path, table: &str, force_column: &[String]) -> CliResult<()> {
    let opts = options_with_forced_columns(ConvertOptions::default(), force_column)?;
    let defs = load_column_definitions(source, table, &opts.layout)
        .context(SchemaScriptSnafu { table })?;
    let schema = TypedSchema::from_definitions(table, &defs, &opts.hooks)
        .context(TypedSchemaSnafu { table })?;

    for column in schema.columns() {
        println!("{}\t{}", column.name, column.storage);
    }
    Ok(())
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.cmd {
        Command::Convert {
            source,
            dest,
            tables,
            ram_gb,
            sample_rows,
            max_chunk_rows,
            compression,
            date_format,
            fail_fast,
            force_column,
            report,
        } => cmd_convert(
            ConvertArgs {
                source,
                dest,
                tables,
                ram_gb,
                sample_rows,
                max_chunk_rows,
                compression,
                date_format,
                fail_fast,
                force_column,
                report,
            },
            cli.verbose,
        ),

        Command::Tables { source } => {
            cmd_tables(&source);
            Ok(())
        }

        Command::Schema {
            source,
            table,
            force_column,
        } => cmd_schema(&source, &table, &force_column),
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
