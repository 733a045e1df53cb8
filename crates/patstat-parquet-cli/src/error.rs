use patstat_parquet_core::{
    PipelineError, schema_script::SchemaScriptError, type_map::TypeMapError,
};

use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Invalid --force-column '{spec}': {source}"))]
    ForcedColumn { spec: String, source: TypeMapError },

    #[snafu(display("Conversion failed: {source}"))]
    Pipeline {
        #[snafu(source(from(PipelineError, Box::new)))]
        source: Box<PipelineError>,
    },

    #[snafu(display("Cannot read the schema script of {table}: {source}"))]
    SchemaScript {
        table: String,
        source: SchemaScriptError,
    },

    #[snafu(display("Cannot derive the typed schema of {table}: {source}"))]
    TypedSchema { table: String, source: TypeMapError },

    #[snafu(display("Failed to serialize the run report: {source}"))]
    SerializeReport { source: serde_json::Error },

    #[snafu(display("Failed to write the run report to {path}: {source}"))]
    WriteReport {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("{} table(s) failed: {}", failed.len(), failed.join(", ")))]
    TablesFailed { failed: Vec<String> },
}
