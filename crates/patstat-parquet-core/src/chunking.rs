//! Chunk sizing against a RAM budget.
//!
//! The footprint of a row is estimated by parsing a prefix of the CSV with
//! the same schema the full read will use and measuring the resulting Arrow
//! buffers. Fragments of one table can differ a lot in row width, so the
//! estimate is taken per fragment.

use std::io::Read;

use arrow::{datatypes::SchemaRef, error::ArrowError};
use arrow_csv::ReaderBuilder;

/// Default number of rows sampled per fragment.
pub const DEFAULT_SAMPLE_ROWS: usize = 1000;

const BYTES_PER_GIB: f64 = (1u64 << 30) as f64;

/// Measured row footprint of a CSV sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowFootprint {
    /// Average in-memory bytes per row; zero when the sample was empty.
    pub bytes_per_row: f64,
    /// Rows actually parsed (may be below the requested sample size).
    pub sampled_rows: usize,
}

/// Parse up to `sample_rows` rows of `reader` with `read_schema` and return
/// the average Arrow memory per row.
///
/// `reader` must be positioned at the header line. The caller is expected to
/// reopen its source afterwards; nothing read here is reused.
pub fn estimate_row_memory<R: Read>(
    reader: R,
    read_schema: SchemaRef,
    sample_rows: usize,
) -> Result<RowFootprint, ArrowError> {
    let mut csv = ReaderBuilder::new(read_schema)
        .with_header(true)
        .with_batch_size(sample_rows.max(1))
        .build(reader)?;

    let Some(batch) = csv.next().transpose()? else {
        return Ok(RowFootprint {
            bytes_per_row: 0.0,
            sampled_rows: 0,
        });
    };

    let rows = batch.num_rows();
    let bytes_per_row = if rows == 0 {
        0.0
    } else {
        batch.get_array_memory_size() as f64 / rows as f64
    };

    Ok(RowFootprint {
        bytes_per_row,
        sampled_rows: rows,
    })
}

/// Rows per chunk: `floor(ram_budget_gb * 2^30 / bytes_per_row)`, at least 1.
///
/// A non-positive or non-finite row size (an empty sample) yields
/// `usize::MAX`; callers bound the result with their own row cap.
pub fn chunk_size(bytes_per_row: f64, ram_budget_gb: f64) -> usize {
    if !bytes_per_row.is_finite() || bytes_per_row <= 0.0 {
        return usize::MAX;
    }
    let rows = (ram_budget_gb * BYTES_PER_GIB / bytes_per_row).floor();
    // Float-to-int `as` saturates at both ends.
    (rows as usize).max(1)
}
