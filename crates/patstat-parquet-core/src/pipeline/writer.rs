//! Atomic, chunk-at-a-time Parquet output.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use arrow::{datatypes::SchemaRef, record_batch::RecordBatch};
use parquet::{arrow::ArrowWriter, file::properties::WriterProperties};
use snafu::prelude::*;

use super::error::{IoSnafu, ParquetSnafu, PipelineResult};
use crate::config::OutputCompression;

/// Removes a temporary file on drop unless disarmed.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Call after the file has been renamed into place.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            // Best effort; the caller is already handling the first error.
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Path of the in-progress file for `final_path`.
pub(crate) fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Parquet writer for one table.
///
/// Batches go to `<final>.tmp`; [`TableWriter::finish`] closes the file,
/// syncs it and renames it to the final path. Dropping an unfinished writer
/// removes the temporary file, so a failed table never leaves a partial file
/// under its final name.
pub struct TableWriter {
    tmp_path: PathBuf,
    final_path: PathBuf,
    writer: ArrowWriter<File>,
    guard: TempFileGuard,
    rows: u64,
    row_groups: usize,
}

impl std::fmt::Debug for TableWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableWriter")
            .field("final_path", &self.final_path)
            .field("rows", &self.rows)
            .field("row_groups", &self.row_groups)
            .finish()
    }
}

impl TableWriter {
    /// Create the temporary file for `final_path` with a fixed `schema`.
    ///
    /// `max_row_group_rows` must be at least the largest chunk the caller
    /// will write, otherwise the writer splits that chunk into several row
    /// groups.
    pub fn create(
        final_path: &Path,
        schema: SchemaRef,
        compression: OutputCompression,
        max_row_group_rows: usize,
    ) -> PipelineResult<Self> {
        let tmp_path = temp_path_for(final_path);
        let file = File::create(&tmp_path).context(IoSnafu {
            path: tmp_path.display().to_string(),
        })?;
        let guard = TempFileGuard::new(tmp_path.clone());

        let props = WriterProperties::builder()
            .set_compression(compression.into())
            .set_max_row_group_size(max_row_group_rows.max(1))
            .build();
        let writer = ArrowWriter::try_new(file, schema, Some(props)).context(ParquetSnafu {
            path: tmp_path.display().to_string(),
        })?;

        Ok(Self {
            tmp_path,
            final_path: final_path.to_path_buf(),
            writer,
            guard,
            rows: 0,
            row_groups: 0,
        })
    }

    /// Append one chunk as its own row group.
    pub fn write_chunk(&mut self, batch: &RecordBatch) -> PipelineResult<()> {
        let path = self.tmp_path.display().to_string();
        self.writer
            .write(batch)
            .context(ParquetSnafu { path: path.clone() })?;
        // Flushing here keeps at most one chunk buffered in the writer.
        self.writer.flush().context(ParquetSnafu { path })?;
        self.rows += batch.num_rows() as u64;
        self.row_groups += 1;
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Close the file and move it to its final path.
    pub fn finish(mut self) -> PipelineResult<PathBuf> {
        let path = self.tmp_path.display().to_string();
        let file = self
            .writer
            .into_inner()
            .context(ParquetSnafu { path: path.clone() })?;
        file.sync_all().context(IoSnafu { path })?;
        drop(file);

        std::fs::rename(&self.tmp_path, &self.final_path).context(IoSnafu {
            path: self.final_path.display().to_string(),
        })?;
        self.guard.disarm();
        Ok(self.final_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::{
        array::Int64Array,
        datatypes::{DataType, Field, Schema},
    };
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use std::sync::Arc;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn batch(values: Vec<i64>) -> Result<RecordBatch, arrow::error::ArrowError> {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, true)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))])
    }

    #[test]
    fn one_row_group_per_chunk() -> TestResult {
        let tmp = TempDir::new()?;
        let final_path = tmp.path().join("tls999_test.parquet");

        let first = batch(vec![1, 2, 3])?;
        let mut writer =
            TableWriter::create(&final_path, first.schema(), OutputCompression::Snappy, 16)?;
        writer.write_chunk(&first)?;
        writer.write_chunk(&batch(vec![4, 5])?)?;
        assert_eq!(writer.rows(), 5);
        assert!(!final_path.exists());

        let written = writer.finish()?;
        assert_eq!(written, final_path);
        assert!(!temp_path_for(&final_path).exists());

        let reader = SerializedFileReader::new(File::open(&final_path)?)?;
        assert_eq!(reader.metadata().num_row_groups(), 2);
        assert_eq!(reader.metadata().file_metadata().num_rows(), 5);
        Ok(())
    }

    #[test]
    fn chunk_above_parquet_default_stays_one_row_group() -> TestResult {
        let tmp = TempDir::new()?;
        let final_path = tmp.path().join("tls999_test.parquet");

        // Parquet's own default caps row groups at 1,048,576 rows.
        let rows: i64 = 2_100_000;
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, true)]));
        let big = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from_iter_values(0..rows))],
        )?;
        let mut writer = TableWriter::create(
            &final_path,
            schema,
            OutputCompression::Snappy,
            crate::config::DEFAULT_MAX_CHUNK_ROWS,
        )?;
        writer.write_chunk(&big)?;
        drop(big);
        writer.finish()?;

        let reader = SerializedFileReader::new(File::open(&final_path)?)?;
        assert_eq!(reader.metadata().num_row_groups(), 1);
        assert_eq!(reader.metadata().file_metadata().num_rows(), rows);
        Ok(())
    }

    #[test]
    fn dropped_writer_leaves_nothing_behind() -> TestResult {
        let tmp = TempDir::new()?;
        let final_path = tmp.path().join("tls999_test.parquet");

        let first = batch(vec![1])?;
        let mut writer =
            TableWriter::create(&final_path, first.schema(), OutputCompression::Zstd, 16)?;
        writer.write_chunk(&first)?;
        assert!(temp_path_for(&final_path).exists());
        drop(writer);

        assert!(!temp_path_for(&final_path).exists());
        assert!(!final_path.exists());
        Ok(())
    }
}
