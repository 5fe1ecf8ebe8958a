use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::{Client, SimpleQueryMessage, Transaction};

use crate::database::postgres::client::{PostgresConnection, PostgresError};

/// A row sent back by a statement, every field in its text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnedRow {
    columns: Arc<[String]>,
    values: Vec<Option<String>>,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ReturnedRowError {
    #[error("column `{0}` is not part of the returned row")]
    MissingColumn(String),

    #[error("could not parse `{value}` in column `{column}`")]
    CouldNotParse { column: String, value: String },
}

impl ReturnedRow {
    pub fn new(columns: Arc<[String]>, values: Vec<Option<String>>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }

    /// Text of `column`; `None` when it is SQL null or not in the row.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.position(column).and_then(|index| self.values.get(index)).and_then(|v| v.as_deref())
    }

    pub fn try_get<T: FromStr>(&self, column: &str) -> Result<Option<T>, ReturnedRowError> {
        let index = self
            .position(column)
            .ok_or_else(|| ReturnedRowError::MissingColumn(column.to_string()))?;

        match self.values.get(index).and_then(|v| v.as_deref()) {
            None => Ok(None),
            Some(text) => text.parse::<T>().map(Some).map_err(|_| ReturnedRowError::CouldNotParse {
                column: column.to_string(),
                value: text.to_string(),
            }),
        }
    }
}

/// Rows out of a simple-query response. Every row of one statement shares the column list.
pub fn collect_returned_rows(messages: Vec<SimpleQueryMessage>) -> Vec<ReturnedRow> {
    let mut columns: Option<Arc<[String]>> = None;
    let mut rows = Vec::new();

    for message in messages {
        if let SimpleQueryMessage::Row(row) = message {
            let columns = columns
                .get_or_insert_with(|| {
                    row.columns().iter().map(|column| column.name().to_string()).collect()
                })
                .clone();

            let values = (0..row.len()).map(|index| row.get(index).map(str::to_string)).collect();

            rows.push(ReturnedRow::new(columns, values));
        }
    }

    rows
}

/// Something that runs literal SQL text one statement at a time.
///
/// Statements are sent with the simple query protocol: they carry no parameters, so the size
/// of a statement is never limited by the parameter count. Taking `&mut self` keeps a
/// connection from receiving statements concurrently. Transactions stay with the caller.
#[async_trait]
pub trait BulkConnection: Send {
    async fn query_literal(&mut self, sql: &str) -> Result<Vec<ReturnedRow>, PostgresError>;
}

#[async_trait]
impl BulkConnection for Client {
    async fn query_literal(&mut self, sql: &str) -> Result<Vec<ReturnedRow>, PostgresError> {
        let messages = self.simple_query(sql).await?;
        Ok(collect_returned_rows(messages))
    }
}

#[async_trait]
impl BulkConnection for Transaction<'_> {
    async fn query_literal(&mut self, sql: &str) -> Result<Vec<ReturnedRow>, PostgresError> {
        let messages = self.simple_query(sql).await?;
        Ok(collect_returned_rows(messages))
    }
}

#[async_trait]
impl BulkConnection for PostgresConnection<'_> {
    async fn query_literal(&mut self, sql: &str) -> Result<Vec<ReturnedRow>, PostgresError> {
        let messages = self.simple_query(sql).await?;
        Ok(collect_returned_rows(messages))
    }
}
