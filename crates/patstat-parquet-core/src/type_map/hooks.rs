//! Per-table schema hooks.
//!
//! Some tables need columns the DDL grammar does not capture. Rather than
//! special-casing table keys in the pipeline, each adjustment is a
//! [`SchemaHook`] registered against a table key and applied right after the
//! generic type mapping.

use std::{fmt, sync::Arc};

use super::{InvalidForcedColumnSnafu, StorageType, TypeMapResult, TypedColumn};

/// Table key of the applications table.
pub const APPLICATIONS_TABLE: &str = "tls201";

/// A schema adjustment applied to the mapped columns of one table.
pub trait SchemaHook: fmt::Debug + Send + Sync {
    /// Adjust `columns` in place.
    fn apply(&self, columns: &mut Vec<TypedColumn>);
}

/// Adds (or retypes) a column regardless of what the DDL script declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedColumn {
    /// The column to force.
    pub column: TypedColumn,
}

impl ForcedColumn {
    /// Force `name` to `storage`.
    pub fn new(name: impl Into<String>, storage: StorageType) -> Self {
        Self {
            column: TypedColumn::new(name, storage),
        }
    }

    /// Parse `<table>:<column>=<storage type>` into a table key and hook.
    pub fn parse_spec(spec: &str) -> TypeMapResult<(String, ForcedColumn)> {
        let parsed = spec.split_once(':').and_then(|(table, rest)| {
            let (column, ty) = rest.split_once('=')?;
            let (table, column, ty) = (table.trim(), column.trim(), ty.trim());
            (!table.is_empty() && !column.is_empty() && !ty.is_empty())
                .then_some((table, column, ty))
        });

        let Some((table, column, ty)) = parsed else {
            return InvalidForcedColumnSnafu { spec }.fail();
        };

        let storage: StorageType = ty.parse()?;
        Ok((table.to_string(), ForcedColumn::new(column, storage)))
    }
}

impl SchemaHook for ForcedColumn {
    fn apply(&self, columns: &mut Vec<TypedColumn>) {
        match columns.iter_mut().find(|c| c.name == self.column.name) {
            Some(existing) => existing.storage = self.column.storage,
            None => columns.push(self.column.clone()),
        }
    }
}

/// Hooks keyed by table key.
#[derive(Debug, Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<(String, Arc<dyn SchemaHook>)>,
}

impl HookRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The hooks every PATSTAT release needs: the applications table carries
    /// a nullable `appln_nr_epodoc` text column that the DDL grammar skips.
    pub fn patstat_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            APPLICATIONS_TABLE,
            ForcedColumn::new("appln_nr_epodoc", StorageType::String),
        );
        registry
    }

    /// Register `hook` for `table_key`. Hooks run in registration order.
    pub fn register(&mut self, table_key: impl Into<String>, hook: impl SchemaHook + 'static) {
        self.hooks.push((table_key.into(), Arc::new(hook)));
    }

    /// Apply every hook registered for `table_key`.
    pub fn apply(&self, table_key: &str, columns: &mut Vec<TypedColumn>) {
        for (_, hook) in self.hooks.iter().filter(|(k, _)| k == table_key) {
            hook.apply(columns);
        }
    }
}
