//! Bulk INSERT and UPDATE against a [`BulkConnection`].
//!
//! Nothing is sent to the connection until every row is validated and every chunk is rendered.
//! Chunks then run one after another; when chunk `k` fails, chunks before it have already been
//! executed and are left to the caller's transaction.

use std::collections::BTreeSet;

use tracing::{debug, error};

use super::query_builder::{InsertStatement, StatementTemplate, UpdateStatement};
use super::renderer::{render_statements, split_chunks, RenderBundle, RenderedStatement};
use crate::config::BulkConfig;
use crate::database::batch_operations::{BatchOperationType, DEFAULT_REFERENCE_KEY};
use crate::database::clean::{clean_returning, clean_values, resolve_column, validate_reference_keys};
use crate::database::errors::BulkOperationError;
use crate::database::postgres::connection::{BulkConnection, ReturnedRow};
use crate::database::postgres::sql_literal::BooleanLiteral;
use crate::database::postgres::type_registry::TypeRegistry;
use crate::database::schema::{ColumnRef, Row, TableSchema};

#[derive(Clone)]
pub struct BulkExecutor {
    config: BulkConfig,
    registry: TypeRegistry,
}

impl BulkExecutor {
    pub fn new(config: BulkConfig) -> Result<Self, BulkOperationError> {
        config.validate()?;
        Ok(Self { config, registry: TypeRegistry::global() })
    }

    /// Uses `registry` instead of the process wide one.
    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Inserts every row of `values_series` into the table of `schema`.
    ///
    /// Returns the `returning` columns of the inserted rows, in no particular order. With no
    /// `returning` columns nothing is fetched back and the result is empty.
    pub async fn insert<C: BulkConnection + ?Sized>(
        &self,
        conn: &mut C,
        schema: &TableSchema,
        values_series: &[Row],
        returning: &[ColumnRef],
    ) -> Result<Vec<ReturnedRow>, BulkOperationError> {
        if values_series.is_empty() {
            return Ok(vec![]);
        }

        let cleaned = clean_values(schema, values_series)?;
        let returning = clean_returning(schema, returning)?;
        let columns: Vec<String> = cleaned[0].keys().cloned().collect();

        let column_types = self.registry.get_column_types(conn, schema.name()).await?;

        let fetch = !returning.is_empty();
        let bundle = RenderBundle {
            template: StatementTemplate::Insert(InsertStatement::new(
                schema.name(),
                columns,
                returning,
            )),
            column_types,
            booleans: BooleanLiteral::Keyword,
        };

        let statements = render_statements(
            bundle,
            split_chunks(cleaned, self.config.chunk_size()),
            self.config.render_workers(),
            self.config.render_timeout(),
        )
        .await?;

        execute_statements(conn, schema.name(), BatchOperationType::Insert, statements, fetch).await
    }

    /// Updates the rows matching each row of `values_series` on the `reference_keys` columns.
    ///
    /// `None` matches on `id`. Every other column of the series is written; when all of them
    /// can be compared with `<>`, rows already holding the incoming values are skipped.
    pub async fn update<C: BulkConnection + ?Sized>(
        &self,
        conn: &mut C,
        schema: &TableSchema,
        values_series: &[Row],
        returning: &[ColumnRef],
        reference_keys: Option<&[ColumnRef]>,
    ) -> Result<Vec<ReturnedRow>, BulkOperationError> {
        if values_series.is_empty() {
            return Ok(vec![]);
        }

        let default_reference = [ColumnRef::from(DEFAULT_REFERENCE_KEY)];
        let reference = reference_keys
            .unwrap_or(&default_reference)
            .iter()
            .map(|column| resolve_column(schema, column, None))
            .collect::<Result<BTreeSet<_>, _>>()?;

        let cleaned = clean_values(schema, values_series)?;
        let returning = clean_returning(schema, returning)?;
        let columns: BTreeSet<String> = cleaned[0].keys().cloned().collect();

        validate_reference_keys(schema.name(), &columns, &reference)?;

        let column_types = self.registry.get_column_types(conn, schema.name()).await?;
        let statement =
            UpdateStatement::new(schema.name(), columns, reference, &column_types, returning.clone())?;

        if !statement.only_changed() {
            debug!("Update of {} writes unchanged rows, a column is not comparable", schema.name());
        }

        let bundle = RenderBundle {
            template: StatementTemplate::Update(statement),
            column_types,
            booleans: BooleanLiteral::Integer,
        };

        let statements = render_statements(
            bundle,
            split_chunks(cleaned, self.config.chunk_size()),
            self.config.render_workers(),
            self.config.render_timeout(),
        )
        .await?;

        execute_statements(
            conn,
            schema.name(),
            BatchOperationType::Update,
            statements,
            !returning.is_empty(),
        )
        .await
    }
}

async fn execute_statements<C: BulkConnection + ?Sized>(
    conn: &mut C,
    table_name: &str,
    op_type: BatchOperationType,
    statements: Vec<RenderedStatement>,
    fetch: bool,
) -> Result<Vec<ReturnedRow>, BulkOperationError> {
    let mut result = Vec::new();
    let total = statements.len();

    for statement in statements {
        debug!(
            "Bulk {} on {} - chunk {}/{} ({} rows): {}",
            op_type.as_str(),
            table_name,
            statement.chunk + 1,
            total,
            statement.rows,
            statement.sql
        );

        let rows = conn.query_literal(&statement.sql).await.map_err(|e| {
            error!(
                "Bulk {} on {} failed at chunk {}/{}: {:?}",
                op_type.as_str(),
                table_name,
                statement.chunk + 1,
                total,
                e
            );
            error!("Failed query:\n{}", statement.sql);
            e
        })?;

        if fetch {
            result.extend(rows);
        }
    }

    Ok(result)
}

/// [`BulkExecutor::insert`] with the default configuration and the process wide type registry.
pub async fn insert<C: BulkConnection + ?Sized>(
    conn: &mut C,
    schema: &TableSchema,
    values_series: &[Row],
    returning: &[ColumnRef],
) -> Result<Vec<ReturnedRow>, BulkOperationError> {
    BulkExecutor::new(BulkConfig::default())?.insert(conn, schema, values_series, returning).await
}

/// [`BulkExecutor::update`] with the default configuration and the process wide type registry.
pub async fn update<C: BulkConnection + ?Sized>(
    conn: &mut C,
    schema: &TableSchema,
    values_series: &[Row],
    returning: &[ColumnRef],
    reference_keys: Option<&[ColumnRef]>,
) -> Result<Vec<ReturnedRow>, BulkOperationError> {
    BulkExecutor::new(BulkConfig::default())?
        .update(conn, schema, values_series, returning, reference_keys)
        .await
}
