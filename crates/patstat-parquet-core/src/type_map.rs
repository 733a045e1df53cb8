//! Two-stage type mapping: SQL type name → [`StorageType`] → Arrow
//! [`DataType`].
//!
//! Both stages are pure functions. The first one has an explicit fallback
//! ([`StorageType::Opaque`]) so every column of every script receives a
//! type; the second one is an exhaustive match and therefore total.
//! Per-table adjustments are applied between the two stages through
//! [`hooks::HookRegistry`].

pub mod hooks;

use std::{collections::HashSet, fmt, str::FromStr, sync::Arc};

use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use serde::Serialize;
use snafu::prelude::*;

use crate::schema_script::ColumnDefinitions;
use hooks::HookRegistry;

/// Result alias for type mapping.
pub type TypeMapResult<T> = Result<T, TypeMapError>;

/// Errors raised while building a typed schema.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TypeMapError {
    /// A storage type label has no mapping.
    #[snafu(display("Unsupported storage type '{label}'"))]
    UnsupportedType {
        /// The offending label.
        label: String,
    },

    /// Two columns share a name (ignoring case).
    #[snafu(display("Duplicate column '{column}' in typed schema"))]
    DuplicateColumn {
        /// The duplicated name.
        column: String,
    },

    /// A column has an empty name.
    #[snafu(display("Typed schema contains a column with an empty name"))]
    EmptyColumnName,

    /// No column could be derived for a table.
    #[snafu(display("No columns could be derived for table {table}"))]
    EmptySchema {
        /// Table key.
        table: String,
    },

    /// A forced column specification could not be parsed.
    #[snafu(display(
        "Invalid forced column '{spec}': expected <table>:<column>=<storage type>"
    ))]
    InvalidForcedColumn {
        /// The specification as given.
        spec: String,
    },
}

/// Intermediate storage types used to drive CSV parsing and output typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Unsigned 64-bit integer.
    UInt64,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// UTF-8 text.
    String,
    /// Anything without a better match; stored as UTF-8 text.
    Opaque,
    /// Boolean.
    Boolean,
    /// Date or date-time.
    Timestamp,
}

impl StorageType {
    /// Every storage type, in declaration order.
    pub const ALL: [StorageType; 14] = [
        StorageType::Int8,
        StorageType::Int16,
        StorageType::Int32,
        StorageType::Int64,
        StorageType::UInt8,
        StorageType::UInt16,
        StorageType::UInt32,
        StorageType::UInt64,
        StorageType::Float32,
        StorageType::Float64,
        StorageType::String,
        StorageType::Opaque,
        StorageType::Boolean,
        StorageType::Timestamp,
    ];

    /// Stable lower-case label.
    pub fn label(self) -> &'static str {
        match self {
            StorageType::Int8 => "int8",
            StorageType::Int16 => "int16",
            StorageType::Int32 => "int32",
            StorageType::Int64 => "int64",
            StorageType::UInt8 => "uint8",
            StorageType::UInt16 => "uint16",
            StorageType::UInt32 => "uint32",
            StorageType::UInt64 => "uint64",
            StorageType::Float32 => "float32",
            StorageType::Float64 => "float64",
            StorageType::String => "string",
            StorageType::Opaque => "opaque",
            StorageType::Boolean => "bool",
            StorageType::Timestamp => "timestamp",
        }
    }

    /// Text-like columns subject to blank-to-null normalisation.
    pub fn is_textual(self) -> bool {
        matches!(self, StorageType::String | StorageType::Opaque)
    }

    /// Arrow type used when parsing the CSV.
    ///
    /// Timestamps and booleans are read as text and converted during chunk
    /// normalisation, so irregular values become nulls instead of parse
    /// errors.
    pub fn csv_read_type(self) -> DataType {
        match self {
            StorageType::Timestamp | StorageType::Boolean => DataType::Utf8,
            other => storage_type_to_columnar_type(other),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for StorageType {
    type Err = TypeMapError;

    /// Accepts the labels produced by [`StorageType::label`] plus the
    /// dataframe-style spellings (`Int64`, `datetime64[ns]`, `object`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s.trim().to_ascii_lowercase().as_str() {
            "int8" => StorageType::Int8,
            "int16" => StorageType::Int16,
            "int32" => StorageType::Int32,
            "int64" => StorageType::Int64,
            "uint8" => StorageType::UInt8,
            "uint16" => StorageType::UInt16,
            "uint32" => StorageType::UInt32,
            "uint64" => StorageType::UInt64,
            "float" | "float32" => StorageType::Float32,
            "double" | "float64" => StorageType::Float64,
            "string" | "utf8" => StorageType::String,
            "opaque" | "object" => StorageType::Opaque,
            "bool" | "boolean" => StorageType::Boolean,
            "timestamp" | "datetime64" | "datetime64[ns]" => StorageType::Timestamp,
            _ => return UnsupportedTypeSnafu { label: s }.fail(),
        };
        Ok(ty)
    }
}

/// Map a SQL type name onto a storage type.
///
/// Unknown names fall back to [`StorageType::Opaque`]; this never fails.
pub fn native_to_storage_type(native_type: &str) -> StorageType {
    match native_type.trim().to_ascii_lowercase().as_str() {
        "tinyint" => StorageType::Int8,
        "smallint" | "year" => StorageType::Int16,
        "mediumint" => StorageType::Int32,
        "int" | "integer" | "bigint" => StorageType::Int64,
        "float" | "real" => StorageType::Float32,
        "double" | "decimal" | "numeric" => StorageType::Float64,
        "char" | "nchar" | "varchar" | "nvarchar" | "text" | "ntext" | "tinytext"
        | "mediumtext" | "longtext" | "enum" => StorageType::String,
        "date" | "datetime" | "datetime2" | "smalldatetime" | "timestamp" => {
            StorageType::Timestamp
        }
        "bit" | "bool" | "boolean" => StorageType::Boolean,
        // blob family, time, set, binary, ...
        _ => StorageType::Opaque,
    }
}

/// Map a storage type onto the Arrow type written to Parquet.
pub fn storage_type_to_columnar_type(storage: StorageType) -> DataType {
    match storage {
        StorageType::Int8 => DataType::Int8,
        StorageType::Int16 => DataType::Int16,
        StorageType::Int32 => DataType::Int32,
        StorageType::Int64 => DataType::Int64,
        StorageType::UInt8 => DataType::UInt8,
        StorageType::UInt16 => DataType::UInt16,
        StorageType::UInt32 => DataType::UInt32,
        StorageType::UInt64 => DataType::UInt64,
        StorageType::Float32 => DataType::Float32,
        StorageType::Float64 => DataType::Float64,
        StorageType::String | StorageType::Opaque => DataType::Utf8,
        StorageType::Boolean => DataType::Boolean,
        StorageType::Timestamp => DataType::Timestamp(TimeUnit::Nanosecond, None),
    }
}

/// A named column with its storage type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypedColumn {
    /// Lower-cased column name.
    pub name: String,
    /// Storage type of the column.
    pub storage: StorageType,
}

impl TypedColumn {
    /// Build a column; the name is lower-cased.
    pub fn new(name: impl Into<String>, storage: StorageType) -> Self {
        Self {
            name: name.into().to_lowercase(),
            storage,
        }
    }
}

/// Ordered, validated set of typed columns for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypedSchema {
    columns: Vec<TypedColumn>,
}

impl TypedSchema {
    /// Validate and wrap `columns`: names must be non-empty and unique.
    pub fn new(columns: Vec<TypedColumn>) -> TypeMapResult<Self> {
        let mut seen = HashSet::with_capacity(columns.len());
        for col in &columns {
            ensure!(!col.name.is_empty(), EmptyColumnNameSnafu);
            ensure!(
                seen.insert(col.name.to_lowercase()),
                DuplicateColumnSnafu {
                    column: col.name.clone()
                }
            );
        }
        Ok(Self { columns })
    }

    /// Derive the typed schema of `table_key` from its column definitions,
    /// then apply the table's hooks.
    pub fn from_definitions(
        table_key: &str,
        defs: &ColumnDefinitions,
        hooks: &HookRegistry,
    ) -> TypeMapResult<Self> {
        let mut columns: Vec<TypedColumn> = defs
            .iter()
            .map(|d| TypedColumn::new(&d.name, native_to_storage_type(&d.native_type)))
            .collect();

        hooks.apply(table_key, &mut columns);

        ensure!(!columns.is_empty(), EmptySchemaSnafu { table: table_key });
        Self::new(columns)
    }

    /// Columns in order.
    pub fn columns(&self) -> &[TypedColumn] {
        &self.columns
    }

    /// Look up a column by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&TypedColumn> {
        let name = name.to_lowercase();
        self.columns.iter().find(|c| c.name == name)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Names of the timestamp columns.
    pub fn timestamp_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.storage == StorageType::Timestamp)
            .map(|c| c.name.as_str())
    }

    /// Arrow schema of the output file. Every field is nullable.
    pub fn arrow_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(&c.name, storage_type_to_columnar_type(c.storage), true))
            .collect();
        Arc::new(Schema::new(fields))
    }
}
