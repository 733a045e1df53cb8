//! Chunk normalisation and projection onto the output schema.
//!
//! A [`ChunkNormalizer`] is built once per fragment from the typed schema and
//! the fragment's CSV header. It owns the schema the CSV is parsed with and
//! turns every parsed chunk into a batch of the output schema:
//!
//! 1. text columns: values that are empty or only whitespace become null;
//! 2. timestamp columns: text parsed with the configured date format,
//!    unparseable values become null;
//! 3. boolean columns: common spellings parsed, anything else becomes null;
//! 4. columns are reordered to the output schema; CSV columns the schema
//!    does not know are dropped, schema columns the CSV lacks are all-null.
//!
//! Values coerced to null in steps 2 and 3 are counted per column so that
//! format drift upstream stays visible.

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::{
    array::{
        Array, ArrayRef, AsArray, BooleanArray, StringArray, TimestampNanosecondArray,
        new_null_array,
    },
    datatypes::{DataType, Field, Schema, SchemaRef},
    error::ArrowError,
    record_batch::RecordBatch,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::type_map::{StorageType, TypedSchema};

/// Per-column counts of values coerced to null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoercionStats {
    per_column: BTreeMap<String, u64>,
}

impl CoercionStats {
    /// Add `count` coerced values for `column`.
    pub fn record(&mut self, column: &str, count: u64) {
        if count > 0 {
            *self.per_column.entry(column.to_string()).or_default() += count;
        }
    }

    /// Fold another set of counts into this one.
    pub fn merge(&mut self, other: &CoercionStats) {
        for (column, count) in &other.per_column {
            self.record(column, *count);
        }
    }

    /// Total coerced values over all columns.
    pub fn total(&self) -> u64 {
        self.per_column.values().sum()
    }

    /// Counts by column name.
    pub fn per_column(&self) -> &BTreeMap<String, u64> {
        &self.per_column
    }
}

/// Replace empty and whitespace-only values with null.
pub fn blank_to_null(values: &StringArray) -> StringArray {
    values
        .iter()
        .map(|v| v.filter(|s| !s.trim().is_empty()))
        .collect()
}

fn parse_timestamp_nanos(value: &str, format: &str) -> Option<i64> {
    let value = value.trim();
    let datetime = NaiveDateTime::parse_from_str(value, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, format)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    // Dates outside the nanosecond range (e.g. 9999-12-31) are not representable.
    datetime.and_utc().timestamp_nanos_opt()
}

/// Parse text into nanosecond timestamps; returns the array and the number
/// of non-null inputs that could not be parsed.
pub fn parse_timestamps(values: &StringArray, format: &str) -> (TimestampNanosecondArray, u64) {
    let mut coerced = 0u64;
    let out: TimestampNanosecondArray = values
        .iter()
        .map(|v| {
            let v = v.filter(|s| !s.trim().is_empty())?;
            let parsed = parse_timestamp_nanos(v, format);
            if parsed.is_none() {
                coerced += 1;
            }
            parsed
        })
        .collect();
    (out, coerced)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "y" | "yes" => Some(true),
        "0" | "false" | "f" | "n" | "no" => Some(false),
        _ => None,
    }
}

/// Parse text into booleans; returns the array and the number of non-null
/// inputs that could not be parsed.
pub fn parse_booleans(values: &StringArray) -> (BooleanArray, u64) {
    let mut coerced = 0u64;
    let out: BooleanArray = values
        .iter()
        .map(|v| {
            let v = v.filter(|s| !s.trim().is_empty())?;
            let parsed = parse_bool(v);
            if parsed.is_none() {
                coerced += 1;
            }
            parsed
        })
        .collect();
    (out, coerced)
}

fn as_text<'a>(column: &'a ArrayRef, name: &str) -> Result<&'a StringArray, ArrowError> {
    column.as_string_opt::<i32>().ok_or_else(|| {
        ArrowError::SchemaError(format!(
            "column {name} was expected to be parsed as Utf8, found {}",
            column.data_type()
        ))
    })
}

/// Reads one fragment's chunks and shapes them into output batches.
#[derive(Debug, Clone)]
pub struct ChunkNormalizer {
    columns: Vec<(String, StorageType)>,
    sources: Vec<Option<usize>>,
    read_schema: SchemaRef,
    output_schema: SchemaRef,
    missing: Vec<String>,
    unknown: Vec<String>,
    date_format: String,
}

impl ChunkNormalizer {
    /// Plan the read of a CSV whose header is `header` into `schema`.
    ///
    /// Header names are matched to schema columns ignoring case and
    /// surrounding whitespace.
    pub fn new(schema: &TypedSchema, header: &[String], date_format: &str) -> Self {
        let keys: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();

        let read_fields: Vec<Field> = header
            .iter()
            .zip(&keys)
            .map(|(name, key)| {
                let ty = schema
                    .get(key)
                    .map_or(DataType::Utf8, |c| c.storage.csv_read_type());
                Field::new(name, ty, true)
            })
            .collect();

        let sources: Vec<Option<usize>> = schema
            .columns()
            .iter()
            .map(|c| keys.iter().position(|k| *k == c.name))
            .collect();

        let missing = schema
            .columns()
            .iter()
            .zip(&sources)
            .filter(|(_, src)| src.is_none())
            .map(|(c, _)| c.name.clone())
            .collect();

        let unknown = header
            .iter()
            .zip(&keys)
            .filter(|(_, key)| schema.get(key).is_none())
            .map(|(name, _)| name.clone())
            .collect();

        Self {
            columns: schema
                .columns()
                .iter()
                .map(|c| (c.name.clone(), c.storage))
                .collect(),
            sources,
            read_schema: Arc::new(Schema::new(read_fields)),
            output_schema: schema.arrow_schema(),
            missing,
            unknown,
            date_format: date_format.to_string(),
        }
    }

    /// Schema the CSV is parsed with, in header order.
    pub fn read_schema(&self) -> SchemaRef {
        Arc::clone(&self.read_schema)
    }

    /// Schema of the normalised batches.
    pub fn output_schema(&self) -> SchemaRef {
        Arc::clone(&self.output_schema)
    }

    /// Schema columns the CSV header does not contain.
    pub fn missing_columns(&self) -> &[String] {
        &self.missing
    }

    /// CSV columns the schema does not contain; they are dropped.
    pub fn unknown_columns(&self) -> &[String] {
        &self.unknown
    }

    /// Normalise one parsed chunk into an output batch.
    pub fn normalize(
        &self,
        chunk: &RecordBatch,
        stats: &mut CoercionStats,
    ) -> Result<RecordBatch, ArrowError> {
        let rows = chunk.num_rows();
        let mut out: Vec<ArrayRef> = Vec::with_capacity(self.columns.len());

        for ((name, storage), source) in self.columns.iter().zip(&self.sources) {
            let Some(idx) = *source else {
                let field = self.output_schema.field_with_name(name)?;
                out.push(new_null_array(field.data_type(), rows));
                continue;
            };
            let column = chunk.column(idx);

            let array: ArrayRef = match storage {
                StorageType::Timestamp => {
                    let (parsed, coerced) =
                        parse_timestamps(as_text(column, name)?, &self.date_format);
                    stats.record(name, coerced);
                    Arc::new(parsed)
                }
                StorageType::Boolean => {
                    let (parsed, coerced) = parse_booleans(as_text(column, name)?);
                    stats.record(name, coerced);
                    Arc::new(parsed)
                }
                s if s.is_textual() => Arc::new(blank_to_null(as_text(column, name)?)),
                _ => Arc::clone(column),
            };
            out.push(array);
        }

        RecordBatch::try_new(self.output_schema(), out)
    }
}
