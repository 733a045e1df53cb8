//! Conversion of one logical table.
//!
//! States, in order: resolve the manifest entry and typed schema, locate the
//! fragments, then for every fragment open → sample → stream chunks, and
//! finally close the writer and verify the output. Chunks are written and
//! dropped one at a time; at most one chunk of a fragment is resident.

use std::{
    io::Read,
    path::{Path, PathBuf},
    time::Instant,
};

use arrow::error::ArrowError;
use arrow_csv::{ReaderBuilder, reader::Format};
use log::{debug, error, info, warn};
use snafu::prelude::*;

use super::{
    error::{
        ArchiveSnafu, CsvSnafu, ManifestSnafu, PipelineError, PipelineResult, SchemaSnafu,
        TypeMapSnafu,
    },
    report::{TableOutcome, TableReport},
    verify,
    writer::TableWriter,
};
use crate::{
    archive::{
        ArchiveMember, filter_members_by_table,
        nested::{CsvFragment, OuterArchive},
    },
    chunking::{chunk_size, estimate_row_memory},
    config::ConvertOptions,
    manifest::RowCountManifest,
    normalize::{ChunkNormalizer, CoercionStats},
    schema_script::load_column_definitions,
    type_map::TypedSchema,
};

/// Read-only inputs shared by every table of a run.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    /// Directory holding the release archives.
    pub source_dir: &'a Path,
    /// Directory receiving the output files.
    pub dest_dir: &'a Path,
    /// Members of every data archive.
    pub members: &'a [ArchiveMember],
    /// Row-count manifest of the release.
    pub manifest: &'a RowCountManifest,
    /// Run options.
    pub options: &'a ConvertOptions,
}

/// Outcome of [`TablePipeline::run`]: the report, and the fatal error when
/// the table failed.
#[derive(Debug)]
pub struct TableRun {
    /// Report of the table; its outcome is `Failed` when `error` is set.
    pub report: TableReport,
    /// The error that stopped the table.
    pub error: Option<PipelineError>,
}

/// Read the header line of a CSV stream.
///
/// A leading byte-order mark is removed from the first name. An empty
/// stream yields an empty header.
pub fn read_csv_header<R: Read>(reader: R) -> Result<Vec<String>, ArrowError> {
    let (schema, _) = Format::default()
        .with_header(true)
        .infer_schema(reader, Some(0))?;
    Ok(schema
        .fields()
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            let name = field.name().as_str();
            let name = if idx == 0 {
                name.trim_start_matches('\u{feff}')
            } else {
                name
            };
            name.to_string()
        })
        .collect())
}

/// Pipeline state of one table.
pub struct TablePipeline<'a> {
    ctx: RunContext<'a>,
    table: String,
    report: TableReport,
    writer: Option<TableWriter>,
    last_header: Vec<String>,
    coerced: CoercionStats,
}

impl std::fmt::Debug for TablePipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TablePipeline")
            .field("table", &self.table)
            .field("fragments", &self.report.fragments)
            .field("chunks", &self.report.chunks)
            .finish()
    }
}

impl<'a> TablePipeline<'a> {
    /// Prepare the pipeline of `table`.
    pub fn new(ctx: RunContext<'a>, table: &str) -> Self {
        Self {
            ctx,
            table: table.to_string(),
            report: TableReport::new(table),
            writer: None,
            last_header: Vec::new(),
            coerced: CoercionStats::default(),
        }
    }

    /// Process the table to completion.
    ///
    /// Never panics on bad input: every fatal condition is returned in
    /// [`TableRun::error`] and mirrored in the report outcome. An unfinished
    /// output file is removed before returning.
    pub fn run(mut self) -> TableRun {
        let started = Instant::now();
        let result = self.execute();

        // Drops the temporary file if the writer was never finished.
        self.writer = None;
        self.report.coerced_nulls = std::mem::take(&mut self.coerced);

        match result {
            Ok(outcome) => TableRun {
                report: self.report.finish(outcome, started),
                error: None,
            },
            Err(error) => {
                error!("Table {} failed: {error}", self.table);
                let outcome = TableOutcome::Failed {
                    error: error.to_string(),
                };
                TableRun {
                    report: self.report.finish(outcome, started),
                    error: Some(error),
                }
            }
        }
    }

    fn execute(&mut self) -> PipelineResult<TableOutcome> {
        let ctx = self.ctx;
        let opts = ctx.options;
        let table = self.table.clone();

        let descriptor = ctx.manifest.descriptor(&table).context(ManifestSnafu)?;
        let output_path: PathBuf = ctx
            .dest_dir
            .join(opts.layout.output_file_name(&descriptor.full_name));
        self.report.full_name = Some(descriptor.full_name.clone());
        self.report.expected_rows = Some(descriptor.expected_row_count);

        let defs = load_column_definitions(ctx.source_dir, &table, &opts.layout)
            .context(SchemaSnafu { table: &table })?;
        let schema = TypedSchema::from_definitions(&table, &defs, &opts.hooks)
            .context(TypeMapSnafu { table: &table })?;
        debug!(
            "Typed schema of {table}: {}",
            schema
                .columns()
                .iter()
                .map(|c| format!("{}:{}", c.name, c.storage))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let archives = filter_members_by_table(&table, ctx.members);
        if archives.is_empty() {
            warn!("No source fragments found for table {table}; skipping");
            return Ok(TableOutcome::Skipped {
                reason: "no source fragments".to_string(),
            });
        }

        for archive_path in &archives {
            let mut outer =
                OuterArchive::open(archive_path).context(ArchiveSnafu { table: &table })?;
            debug!("Opened {} for table {table}", outer.path().display());
            for member in outer.fragment_members(&table, &opts.layout.archive_extension) {
                let mut fragment = outer
                    .open_fragment(&member)
                    .context(ArchiveSnafu { table: &table })?;
                self.process_fragment(&mut fragment, &schema, &output_path)?;
            }
        }

        let Some(writer) = self.writer.take() else {
            warn!(
                "No rows found for table {table} in {} fragment(s); nothing written",
                self.report.fragments
            );
            return Ok(TableOutcome::Skipped {
                reason: "no rows".to_string(),
            });
        };

        let written_path = writer.finish()?;
        info!(
            "Wrote {} rows of {table} to {}",
            self.report.rows_written,
            written_path.display()
        );
        self.report.output = Some(written_path.clone());

        let written = verify::inspect_output(&written_path)?;
        self.report.count_check = Some(verify::verify_row_count(
            &table,
            &written,
            descriptor.expected_row_count,
        ));
        self.report.schema_check = Some(verify::verify_columns(
            &table,
            &written,
            &self.last_header,
        ));

        for (column, count) in self.coerced.per_column() {
            warn!(
                "Table {table}: {count} value(s) of column {column} could not be parsed and were set to null"
            );
        }

        Ok(TableOutcome::Written)
    }

    fn process_fragment(
        &mut self,
        fragment: &mut CsvFragment,
        schema: &TypedSchema,
        output_path: &Path,
    ) -> PipelineResult<()> {
        let opts = self.ctx.options;
        let label = fragment.label().to_string();
        info!("Processing table {label}");

        let header = read_csv_header(
            fragment
                .open()
                .context(ArchiveSnafu { table: &self.table })?,
        )
        .context(CsvSnafu { fragment: &label })?;
        if header.is_empty() {
            warn!("Fragment {label} is empty; skipping");
            return Ok(());
        }
        self.report.fragments += 1;

        let normalizer = ChunkNormalizer::new(schema, &header, &opts.date_format);
        if !normalizer.missing_columns().is_empty() {
            warn!(
                "Fragment {label} lacks column(s) {}; they are written as nulls",
                normalizer.missing_columns().join(", ")
            );
        }
        if !normalizer.unknown_columns().is_empty() {
            debug!(
                "Fragment {label} has column(s) outside the schema: {}",
                normalizer.unknown_columns().join(", ")
            );
        }

        let footprint = estimate_row_memory(
            fragment
                .open()
                .context(ArchiveSnafu { table: &self.table })?,
            normalizer.read_schema(),
            opts.sample_rows,
        )
        .context(CsvSnafu { fragment: &label })?;
        let rows_per_chunk =
            chunk_size(footprint.bytes_per_row, opts.ram_budget_gb).min(opts.max_chunk_rows);
        debug!(
            "Fragment {label}: {:.1} bytes/row over {} sampled rows, {rows_per_chunk} rows per chunk",
            footprint.bytes_per_row, footprint.sampled_rows
        );
        self.report.chunk_rows.push(rows_per_chunk);

        let csv = ReaderBuilder::new(normalizer.read_schema())
            .with_header(true)
            .with_batch_size(rows_per_chunk)
            .build(
                fragment
                    .open()
                    .context(ArchiveSnafu { table: &self.table })?,
            )
            .context(CsvSnafu { fragment: &label })?;

        for chunk in csv {
            let chunk = chunk.context(CsvSnafu { fragment: &label })?;
            let batch = normalizer
                .normalize(&chunk, &mut self.coerced)
                .context(CsvSnafu { fragment: &label })?;
            drop(chunk);

            let writer = match self.writer.take() {
                Some(writer) => writer,
                None => TableWriter::create(
                    output_path,
                    normalizer.output_schema(),
                    opts.compression,
                    opts.max_chunk_rows,
                )?,
            };
            let writer = self.writer.insert(writer);
            writer.write_chunk(&batch)?;
            self.report.rows_written = writer.rows();
            self.report.chunks += 1;
            drop(batch);
        }

        self.last_header = header;
        Ok(())
    }
}
