//! Tolerant parser for the column declarations of a `CREATE TABLE` script.
//!
//! Recognised grammar (case-insensitive, whitespace-tolerant):
//!
//! ```text
//! decl    := '[' ident ']' ws '[' type ']' length? ws 'NOT' ws 'NULL' default?
//! length  := '(' ( digits | 'max' ) ( ',' digits )? ')'
//! default := ws 'DEFAULT' ws '('? '\''? value '\''? ')'?
//! ```
//!
//! Only `NOT NULL` declarations are captured; nullable columns are not part
//! of the grammar and are skipped. Column names are lower-cased, and a later
//! declaration of the same name replaces the earlier one in place.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static COLUMN_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\[(\w+)\]\s+\[(\w+)\](?:\(\s*(\d+|max)\s*(?:,\s*(\d+)\s*)?\))?\s+NOT\s+NULL(?:\s+DEFAULT\s+\(?'?([^)'\s]*)'?\)?)?",
    )
    .expect("column declaration pattern is valid")
});

/// Declared length of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnLength {
    /// A literal length or precision.
    Bounded(u32),
    /// The `max` sentinel.
    Unbounded,
}

/// One column declaration extracted from a DDL script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDefinition {
    /// Lower-cased column name.
    pub name: String,
    /// Lower-cased SQL type name, without length.
    pub native_type: String,
    /// Declared length or precision, if any.
    pub length: Option<ColumnLength>,
    /// Declared scale, for `decimal(p, s)` style declarations.
    pub scale: Option<u32>,
    /// Default value with surrounding quotes and parentheses removed.
    pub default: Option<String>,
}

/// Ordered, case-insensitive collection of column definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnDefinitions {
    columns: Vec<ColumnDefinition>,
}

impl ColumnDefinitions {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition, replacing any existing one with the same name
    /// while keeping its original position.
    pub fn insert(&mut self, mut def: ColumnDefinition) {
        def.name = def.name.to_lowercase();
        match self.columns.iter_mut().find(|c| c.name == def.name) {
            Some(existing) => *existing = def,
            None => self.columns.push(def),
        }
    }

    /// Look up a definition by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&ColumnDefinition> {
        let name = name.to_lowercase();
        self.columns.iter().find(|c| c.name == name)
    }

    /// Definitions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter()
    }

    /// Number of distinct columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether no column was recognised.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn clean_default(raw: &str) -> Option<String> {
    let value = raw.trim_matches(|c| c == '\'' || c == '(' || c == ')');
    (!value.is_empty()).then(|| value.to_string())
}

/// Extract every `NOT NULL` column declaration from `script`.
pub fn parse_create_table_script(script: &str) -> ColumnDefinitions {
    let mut defs = ColumnDefinitions::new();

    for caps in COLUMN_DECL.captures_iter(script) {
        let length = caps.get(3).and_then(|m| {
            let raw = m.as_str();
            if raw.eq_ignore_ascii_case("max") {
                Some(ColumnLength::Unbounded)
            } else {
                raw.parse().ok().map(ColumnLength::Bounded)
            }
        });

        defs.insert(ColumnDefinition {
            name: caps[1].to_lowercase(),
            native_type: caps[2].to_lowercase(),
            length,
            scale: caps.get(4).and_then(|m| m.as_str().parse().ok()),
            default: caps.get(5).and_then(|m| clean_default(m.as_str())),
        });
    }

    defs
}

#[cfg(test)]
mod tests {
    use super::*;

    const TLS201: &str = r"
CREATE TABLE [dbo].[tls201_appln](
	[appln_id] [int] NOT NULL DEFAULT ((0)),
	[appln_auth] [char](2) NOT NULL DEFAULT (''),
	[appln_nr] [varchar](15) NOT NULL DEFAULT (''),
	[appln_kind] [char](2) NOT NULL DEFAULT ('  '),
	[appln_filing_date] [date] NOT NULL DEFAULT ('9999-12-31'),
	[appln_nr_epodoc] [varchar](20) NULL,
	[appln_abstract] [nvarchar](max) NOT NULL,
	[earliest_filing_year] [smallint] NOT NULL DEFAULT ((9999)),
	[granted] [char](1) NOT NULL DEFAULT ('N'),
 CONSTRAINT [PK_tls201_appln] PRIMARY KEY CLUSTERED ([appln_id] ASC)
) ON [PRIMARY]
";

    #[test]
    fn parses_not_null_declarations_in_order() {
        let defs = parse_create_table_script(TLS201);
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "appln_id",
                "appln_auth",
                "appln_nr",
                "appln_kind",
                "appln_filing_date",
                "appln_abstract",
                "earliest_filing_year",
                "granted",
            ]
        );
    }

    #[test]
    fn nullable_columns_are_not_captured() {
        let defs = parse_create_table_script(TLS201);
        assert!(defs.get("appln_nr_epodoc").is_none());
    }

    #[test]
    fn captures_types_lengths_and_defaults() {
        let defs = parse_create_table_script(TLS201);

        let id = defs.get("appln_id").unwrap();
        assert_eq!(id.native_type, "int");
        assert_eq!(id.length, None);
        assert_eq!(id.default.as_deref(), Some("0"));

        let nr = defs.get("APPLN_NR").unwrap();
        assert_eq!(nr.native_type, "varchar");
        assert_eq!(nr.length, Some(ColumnLength::Bounded(15)));
        assert_eq!(nr.default, None);

        let abstract_ = defs.get("appln_abstract").unwrap();
        assert_eq!(abstract_.length, Some(ColumnLength::Unbounded));
        assert_eq!(abstract_.default, None);

        let date = defs.get("appln_filing_date").unwrap();
        assert_eq!(date.native_type, "date");
        assert_eq!(date.default.as_deref(), Some("9999-12-31"));

        assert_eq!(defs.get("granted").unwrap().default.as_deref(), Some("N"));
    }

    #[test]
    fn precision_and_scale() {
        let defs = parse_create_table_script("[amount] [decimal](18, 2) NOT NULL");
        let amount = defs.get("amount").unwrap();
        assert_eq!(amount.native_type, "decimal");
        assert_eq!(amount.length, Some(ColumnLength::Bounded(18)));
        assert_eq!(amount.scale, Some(2));
    }

    #[test]
    fn is_case_insensitive_and_last_wins() {
        let script = "
            [Person_ID] [INT] not null,
            [person_name] [nvarchar](MAX) NOT NULL,
            [PERSON_ID] [bigint] NOT NULL
        ";
        let defs = parse_create_table_script(script);

        assert_eq!(defs.len(), 2);
        let first = defs.iter().next().unwrap();
        assert_eq!(first.name, "person_id");
        assert_eq!(first.native_type, "bigint");
        assert_eq!(
            defs.get("person_name").unwrap().length,
            Some(ColumnLength::Unbounded)
        );
    }

    #[test]
    fn empty_script_yields_no_columns() {
        assert!(parse_create_table_script("").is_empty());
        assert!(parse_create_table_script("CREATE TABLE [x] ([a] [int] NULL)").is_empty());
    }
}
