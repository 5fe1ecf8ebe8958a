use std::collections::{BTreeMap, BTreeSet};

use crate::database::errors::BulkOperationError;
use crate::database::postgres::sql_literal::{to_literal_with, BooleanLiteral, SqlLiteral};
use crate::database::postgres::type_registry::ColumnTypes;
use crate::database::schema::{AttributeKind, ColumnRef, Row, TableSchema};
use crate::database::sql_value::SqlValue;

/// A row keyed by canonical column key, values untouched.
pub type CleanedRow = BTreeMap<String, SqlValue>;

/// A row keyed by canonical column key, values already rendered as SQL literals.
pub type LiteralRow = BTreeMap<String, SqlLiteral>;

/// Renders keys like `['a', 'b']`.
pub fn format_key_list<'a>(keys: impl IntoIterator<Item = &'a str>) -> String {
    let quoted = keys.into_iter().map(|key| format!("'{}'", key)).collect::<Vec<_>>().join(", ");
    format!("[{}]", quoted)
}

/// Resolves a column reference to the column key it stands for in `schema`.
pub fn resolve_column(
    schema: &TableSchema,
    column: &ColumnRef,
    index: Option<usize>,
) -> Result<String, BulkOperationError> {
    match column {
        ColumnRef::Name(name) => {
            if schema.has_column(name) {
                Ok(name.clone())
            } else {
                Err(BulkOperationError::invalid_column(name, "not in table", index))
            }
        }
        ColumnRef::Handle(handle) => {
            if handle.table() != schema.name() {
                return Err(BulkOperationError::invalid_column(
                    column.to_string(),
                    format!("belongs to table {}, not {}", handle.table(), schema.name()),
                    index,
                ));
            }

            match handle.kind() {
                AttributeKind::Column { key } if schema.has_column(key) => Ok(key.clone()),
                AttributeKind::Column { .. } => {
                    Err(BulkOperationError::invalid_column(column.to_string(), "not in table", index))
                }
                AttributeKind::Relationship | AttributeKind::Computed => {
                    Err(BulkOperationError::invalid_column(
                        column.to_string(),
                        "not a scalar column",
                        index,
                    ))
                }
            }
        }
    }
}

/// Canonical keys of `returning`, sorted and without duplicates.
pub fn clean_returning(
    schema: &TableSchema,
    returning: &[ColumnRef],
) -> Result<Vec<String>, BulkOperationError> {
    let keys = returning
        .iter()
        .map(|column| resolve_column(schema, column, None))
        .collect::<Result<BTreeSet<_>, _>>()?;

    Ok(keys.into_iter().collect())
}

fn clean_row(
    schema: &TableSchema,
    row: &Row,
    index: usize,
) -> Result<CleanedRow, BulkOperationError> {
    if row.is_empty() {
        return Err(BulkOperationError::invalid_value(index, "empty values"));
    }

    let mut cleaned = CleanedRow::new();
    for (column, value) in row.iter() {
        let key = resolve_column(schema, column, Some(index))?;
        if cleaned.insert(key.clone(), value.clone()).is_some() {
            return Err(BulkOperationError::invalid_column(
                key,
                "specified more than once",
                Some(index),
            ));
        }
    }

    Ok(cleaned)
}

/// Validates a values series and re-keys every row by canonical column key.
///
/// The first row fixes the key set of the series; any later row with other keys fails with
/// the excess and missing keys.
pub fn clean_values(
    schema: &TableSchema,
    values_series: &[Row],
) -> Result<Vec<CleanedRow>, BulkOperationError> {
    let mut result = Vec::with_capacity(values_series.len());
    let mut common: Option<BTreeSet<String>> = None;

    for (index, row) in values_series.iter().enumerate() {
        let cleaned = clean_row(schema, row, index)?;
        let current: BTreeSet<String> = cleaned.keys().cloned().collect();
        let common = common.get_or_insert_with(|| current.clone());

        if *common != current {
            let excess = current.difference(common).map(String::as_str);
            let missing = common.difference(&current).map(String::as_str);
            return Err(BulkOperationError::invalid_value(
                index,
                format!(
                    "keys mismatch: excess={}, missing={}",
                    format_key_list(excess),
                    format_key_list(missing)
                ),
            ));
        }

        result.push(cleaned);
    }

    Ok(result)
}

/// Renders one cleaned row as literals, each value hinted by its column's database type.
pub fn cast_row(
    row: &CleanedRow,
    column_types: &ColumnTypes,
    booleans: BooleanLiteral,
    index: usize,
) -> Result<LiteralRow, BulkOperationError> {
    row.iter()
        .map(|(key, value)| {
            to_literal_with(value, column_types.get(key), booleans)
                .map(|literal| (key.clone(), literal))
                .map_err(|e| {
                    BulkOperationError::invalid_value(index, format!("column `{}`: {}", key, e))
                })
        })
        .collect()
}

/// [`clean_values`] followed by [`cast_row`] on every row.
pub fn clean_values_cast(
    schema: &TableSchema,
    values_series: &[Row],
    column_types: &ColumnTypes,
    booleans: BooleanLiteral,
) -> Result<Vec<LiteralRow>, BulkOperationError> {
    clean_values(schema, values_series)?
        .iter()
        .enumerate()
        .map(|(index, row)| cast_row(row, column_types, booleans, index))
        .collect()
}

/// Every reference key must be a column of the series, and at least one column must be left
/// to update.
pub fn validate_reference_keys(
    table_name: &str,
    columns: &BTreeSet<String>,
    reference: &BTreeSet<String>,
) -> Result<(), BulkOperationError> {
    if reference.is_empty() {
        return Err(BulkOperationError::Configuration(format!(
            "no reference field given for table {}",
            table_name
        )));
    }

    if !reference.is_subset(columns) {
        return Err(BulkOperationError::Configuration(format!(
            "reference field {} does not exist in table {}",
            format_key_list(reference.iter().map(String::as_str)),
            table_name
        )));
    }

    if columns.is_subset(reference) {
        return Err(BulkOperationError::Configuration(format!(
            "no columns left to update in table {} besides the reference fields",
            table_name
        )));
    }

    Ok(())
}
