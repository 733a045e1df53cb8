//! Core conversion engine for PATSTAT bulk exports.
//!
//! A PATSTAT release ships as a directory of ZIP archives: data archives
//! holding per-table, per-part ZIP files that each wrap one CSV fragment,
//! plus one documentation archive carrying the `CREATE TABLE` scripts and a
//! row-count manifest. This crate turns every logical table into a single
//! Parquet file:
//!
//! - Locating archives and table fragments (`archive` module).
//! - Extracting column definitions from the DDL scripts (`schema_script`).
//! - Mapping SQL types onto a fixed storage type set and then onto Arrow
//!   types, with per-table schema hooks (`type_map`).
//! - Sizing CSV chunks against a RAM budget (`chunking`).
//! - Normalising chunks (blank text, dates, booleans) before they are
//!   written (`normalize`).
//! - Driving the per-table pipeline, writing Parquet atomically and
//!   verifying the result against the manifest (`pipeline`).
#![deny(missing_docs)]

pub mod archive;
pub mod chunking;
pub mod config;
pub mod manifest;
pub mod normalize;
pub mod pipeline;
pub mod schema_script;
pub mod type_map;

pub use config::{ConfigError, ConvertOptions, OutputCompression, SourceLayout};
pub use pipeline::{
    PipelineError, RunReport, TableOutcome, TableReport, discover_tables, process_tables,
};
pub use type_map::{StorageType, TypedColumn, TypedSchema};
