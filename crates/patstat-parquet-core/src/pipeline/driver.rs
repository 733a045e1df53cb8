//! Run-level orchestration: key resolution, validation and table sequencing.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    time::Instant,
};

use log::{debug, info, warn};
use snafu::prelude::*;

use super::{
    error::{
        AbortedSnafu, CreateDestDirSnafu, InvalidOptionsSnafu, ManifestSnafu, PipelineResult,
        UnknownTablesSnafu,
    },
    report::RunReport,
    table::{RunContext, TablePipeline},
};
use crate::{
    archive::{self, ArchiveMember},
    config::{ConvertOptions, SourceLayout},
    manifest::RowCountManifest,
};

fn data_members(source_dir: &Path, layout: &SourceLayout) -> (Vec<PathBuf>, Vec<ArchiveMember>) {
    let archives = archive::list_archives(
        source_dir,
        &layout.data_archive_prefix,
        &layout.archive_extension,
    );
    let members = archive::collect_members(&archives);
    (archives, members)
}

/// Table keys discoverable in `source_dir`, sorted.
pub fn discover_tables(source_dir: &Path, layout: &SourceLayout) -> Vec<String> {
    let (_, members) = data_members(source_dir, layout);
    archive::discover_table_keys(&members, layout)
}

/// Convert the tables of the release in `source_dir` into Parquet files in
/// `dest_dir`.
///
/// With `table_keys` set, every key must be discoverable in `source_dir`;
/// otherwise the call fails before the destination directory is created.
/// Without it, every discoverable table is converted. Tables are processed
/// in sorted key order.
///
/// Per-table failures are recorded in the returned report. They abort the
/// run only when [`ConvertOptions::continue_on_error`] is off.
pub fn process_tables(
    source_dir: &Path,
    dest_dir: &Path,
    table_keys: Option<&[String]>,
    options: &ConvertOptions,
) -> PipelineResult<RunReport> {
    let started = Instant::now();
    options.validate().context(InvalidOptionsSnafu)?;

    let layout = &options.layout;
    let (archives, members) = data_members(source_dir, layout);
    let available = archive::discover_table_keys(&members, layout);

    let keys: Vec<String> = match table_keys {
        Some(requested) => {
            let unknown: Vec<String> = requested
                .iter()
                .filter(|k| !available.contains(*k))
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            ensure!(
                unknown.is_empty(),
                UnknownTablesSnafu {
                    unknown,
                    available: available.clone(),
                }
            );
            requested
                .iter()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        }
        None => available.clone(),
    };

    let manifest = RowCountManifest::load(source_dir, layout).context(ManifestSnafu)?;
    debug!("Row count manifest lists {} tables", manifest.tables().len());

    std::fs::create_dir_all(dest_dir).context(CreateDestDirSnafu {
        path: dest_dir.display().to_string(),
    })?;

    info!("Starting to process tables...");
    if options.verbose {
        info!("All zipped data files in the source directory:");
        for path in &archives {
            info!("  {}", path.display());
        }
        info!("Tables to process:");
        for key in &keys {
            info!("  {key}");
        }
    }

    for (short, long) in archive::prefix_collisions(&available) {
        if keys.contains(&short) {
            warn!(
                "Table key {short} also matches fragments of {long}; its output may include foreign rows"
            );
        }
    }

    let ctx = RunContext {
        source_dir,
        dest_dir,
        members: &members,
        manifest: &manifest,
        options,
    };

    let mut report = RunReport::default();
    for key in &keys {
        let run = TablePipeline::new(ctx, key).run();
        report.push(run.report);
        if let Some(error) = run.error {
            if !options.continue_on_error {
                report.set_elapsed(started.elapsed());
                return Err(error).context(AbortedSnafu {
                    table: key.as_str(),
                    report,
                });
            }
        }
    }

    report.set_elapsed(started.elapsed());
    info!("Processed tables: {}", report.processed_keys().join(", "));
    Ok(report)
}
