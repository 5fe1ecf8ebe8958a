//! SQL text for bulk INSERT and UPDATE statements.
//!
//! Every value is already a literal when it reaches this module, so the statements carry no
//! parameters. Columns are always listed in lexicographic order, which keeps the text of a
//! statement independent of how the rows were built.

use std::collections::BTreeMap;

use postgres_protocol::escape::escape_identifier;

use crate::database::batch_operations::{
    is_type_comparable, UPDATE_SOURCE_ALIAS, UPDATE_TARGET_ALIAS,
};
use crate::database::clean::LiteralRow;
use crate::database::errors::BulkOperationError;
use crate::database::postgres::type_registry::ColumnTypes;

/// Quotes an identifier, doubling any embedded double quote.
#[inline]
pub fn quote_identifier(name: &str) -> String {
    escape_identifier(name)
}

/// Formats a table name, handling schema.table format.
pub fn format_table_name(table_name: &str) -> String {
    table_name
        .split('.')
        .map(|part| quote_identifier(part.trim_matches('"')))
        .collect::<Vec<_>>()
        .join(".")
}

/// Builds `"a", "b"`, optionally qualifying each column with a relation alias.
pub fn build_column_list(columns: &[String], qualifier: Option<&str>) -> String {
    columns
        .iter()
        .map(|column| match qualifier {
            Some(alias) => format!("{}.{}", quote_identifier(alias), quote_identifier(column)),
            None => quote_identifier(column),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds the parenthesized literal tuples of a `VALUES` list, one line per row.
pub fn build_values_rows(columns: &[String], rows: &[LiteralRow]) -> String {
    rows.iter()
        .map(|row| {
            let values = columns
                .iter()
                .map(|column| row.get(column).map(|literal| literal.as_str()).unwrap_or("null"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", values)
        })
        .collect::<Vec<_>>()
        .join(",\n")
}

pub fn build_returning_clause(returning: &[String], qualifier: Option<&str>) -> String {
    if returning.is_empty() {
        String::new()
    } else {
        format!("\nRETURNING {}", build_column_list(returning, qualifier))
    }
}

/// `"dst"."c" = "src"."c"::type` for every reference column, joined with `AND`.
pub fn build_reference_condition(reference: &[String], types: &BTreeMap<String, String>) -> String {
    reference
        .iter()
        .map(|column| {
            format!(
                "{}.{} = {}",
                quote_identifier(UPDATE_TARGET_ALIAS),
                quote_identifier(column),
                source_cast(column, types)
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Skips rows whose stored values already equal the incoming ones.
pub fn build_change_guard(columns: &[String], types: &BTreeMap<String, String>) -> String {
    let target = quote_identifier(UPDATE_TARGET_ALIAS);
    let source = quote_identifier(UPDATE_SOURCE_ALIAS);

    let conditions = columns
        .iter()
        .map(|column| {
            let quoted = quote_identifier(column);
            format!(
                "{target}.{quoted} <> {cast} OR {target}.{quoted} IS NULL OR {source}.{quoted} IS NULL",
                target = target,
                source = source,
                quoted = quoted,
                cast = source_cast(column, types)
            )
        })
        .collect::<Vec<_>>()
        .join(" OR ");

    format!("\nAND ({})", conditions)
}

fn source_cast(column: &str, types: &BTreeMap<String, String>) -> String {
    let cast = types.get(column).map(|db_type| format!("::{}", db_type)).unwrap_or_default();
    format!("{}.{}{}", quote_identifier(UPDATE_SOURCE_ALIAS), quote_identifier(column), cast)
}

/// Column layout of a bulk INSERT, shared by every chunk of one series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    table: String,
    columns: Vec<String>,
    returning: Vec<String>,
}

impl InsertStatement {
    pub fn new(table_name: &str, columns: impl IntoIterator<Item = String>, returning: Vec<String>) -> Self {
        let mut columns: Vec<String> = columns.into_iter().collect();
        columns.sort();
        columns.dedup();

        Self { table: format_table_name(table_name), columns, returning }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn render(&self, rows: &[LiteralRow]) -> String {
        format!(
            "INSERT INTO {} ({})\nVALUES\n{}{};",
            self.table,
            build_column_list(&self.columns, None),
            build_values_rows(&self.columns, rows),
            build_returning_clause(&self.returning, None)
        )
    }
}

/// Column layout of a bulk UPDATE: the incoming rows become the `src` relation and are joined
/// to the table on the reference columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateStatement {
    table: String,
    columns: Vec<String>,
    reference: Vec<String>,
    columns_to_update: Vec<String>,
    types: BTreeMap<String, String>,
    only_changed: bool,
    returning: Vec<String>,
}

impl UpdateStatement {
    /// Fails when a column has no known database type or nothing is left to update.
    pub fn new(
        table_name: &str,
        columns: impl IntoIterator<Item = String>,
        reference: impl IntoIterator<Item = String>,
        column_types: &ColumnTypes,
        returning: Vec<String>,
    ) -> Result<Self, BulkOperationError> {
        let mut columns: Vec<String> = columns.into_iter().collect();
        columns.sort();
        columns.dedup();

        let mut reference: Vec<String> = reference.into_iter().collect();
        reference.sort();
        reference.dedup();

        let columns_to_update: Vec<String> =
            columns.iter().filter(|column| !reference.contains(column)).cloned().collect();

        if columns_to_update.is_empty() {
            return Err(BulkOperationError::Configuration(format!(
                "no columns left to update in table {} besides the reference fields",
                table_name
            )));
        }

        let mut types = BTreeMap::new();
        for column in &columns {
            let db_type = column_types.get(column).ok_or_else(|| {
                BulkOperationError::Configuration(format!(
                    "column `{}` has no known type in table {}",
                    column, table_name
                ))
            })?;
            types.insert(column.clone(), db_type.to_string());
        }

        let only_changed = columns_to_update
            .iter()
            .all(|column| types.get(column).map_or(false, |db_type| is_type_comparable(db_type)));

        Ok(Self {
            table: format_table_name(table_name),
            columns,
            reference,
            columns_to_update,
            types,
            only_changed,
            returning,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn columns_to_update(&self) -> &[String] {
        &self.columns_to_update
    }

    /// Whether rows equal to their stored values are skipped.
    pub fn only_changed(&self) -> bool {
        self.only_changed
    }

    pub fn render(&self, rows: &[LiteralRow]) -> String {
        let source = quote_identifier(UPDATE_SOURCE_ALIAS);

        let set_clauses = self
            .columns_to_update
            .iter()
            .map(|column| format!("{} = {}", quote_identifier(column), source_cast(column, &self.types)))
            .collect::<Vec<_>>()
            .join(", ");

        let mut query = format!(
            "WITH {} ({}) AS (\nVALUES\n{}\n)\nUPDATE {} AS {}\nSET {}\nFROM {}\nWHERE {}",
            source,
            build_column_list(&self.columns, None),
            build_values_rows(&self.columns, rows),
            self.table,
            quote_identifier(UPDATE_TARGET_ALIAS),
            set_clauses,
            source,
            build_reference_condition(&self.reference, &self.types)
        );

        if self.only_changed {
            query.push_str(&build_change_guard(&self.columns_to_update, &self.types));
        }

        query.push_str(&build_returning_clause(&self.returning, Some(UPDATE_TARGET_ALIAS)));
        query.push(';');
        query
    }
}

/// A statement layout ready to take chunks of literal rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementTemplate {
    Insert(InsertStatement),
    Update(UpdateStatement),
}

impl StatementTemplate {
    pub fn columns(&self) -> &[String] {
        match self {
            StatementTemplate::Insert(statement) => statement.columns(),
            StatementTemplate::Update(statement) => statement.columns(),
        }
    }

    pub fn render(&self, rows: &[LiteralRow]) -> String {
        match self {
            StatementTemplate::Insert(statement) => statement.render(rows),
            StatementTemplate::Update(statement) => statement.render(rows),
        }
    }
}
