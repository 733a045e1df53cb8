//! The table conversion pipeline and the driver that runs it over a release.
//!
//! [`process_tables`] is the entry point. For each table it builds a
//! [`table::TablePipeline`], which streams every fragment through the
//! chunk normaliser into a [`writer::TableWriter`] and then checks the
//! written file ([`verify`]).

mod driver;
mod error;
mod report;
pub mod table;
pub mod verify;
pub mod writer;

pub use driver::{discover_tables, process_tables};
pub use error::{PipelineError, PipelineResult};
pub use report::{RunReport, TableOutcome, TableReport};
pub use verify::{CountCheck, SchemaCheck};
