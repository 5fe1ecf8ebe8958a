use std::collections::HashMap;
use std::sync::Arc;

use mini_moka::sync::Cache;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::database::errors::BulkOperationError;
use crate::database::postgres::batch_operations::format_table_name;
use crate::database::postgres::connection::BulkConnection;
use crate::database::postgres::sql_literal::quote_string;

/// Database type name of every column of one table, in physical column order.
///
/// Array types end with `[]` (`text[]`), user defined types report their own name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnTypes {
    order: Vec<String>,
    types: HashMap<String, String>,
}

impl ColumnTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column. A column already present keeps its position and gets the new type.
    pub fn insert(&mut self, column: impl Into<String>, db_type: impl Into<String>) {
        let column = column.into();
        if !self.types.contains_key(&column) {
            self.order.push(column.clone());
        }
        self.types.insert(column, db_type.into());
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.types.get(column).map(String::as_str)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.types.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order.iter().map(|column| (column.as_str(), self.types[column].as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ColumnTypes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut column_types = ColumnTypes::new();
        for (column, db_type) in iter {
            column_types.insert(column, db_type);
        }
        column_types
    }
}

/// Catalog query listing `column_name` and `column_type` for a table.
///
/// `format_type` already reports arrays as `element[]` and user defined types by name.
pub fn column_types_sql(table_name: &str) -> Result<String, BulkOperationError> {
    let regclass = quote_string(&format_table_name(table_name)).map_err(|e| {
        BulkOperationError::Configuration(format!("invalid table name `{}`: {}", table_name, e))
    })?;

    Ok(format!(
        "SELECT a.attname AS column_name, format_type(a.atttypid, NULL) AS column_type
FROM pg_catalog.pg_attribute a
WHERE a.attrelid = {}::regclass AND a.attnum > 0 AND NOT a.attisdropped
ORDER BY a.attnum;",
        regclass
    ))
}

static GLOBAL_REGISTRY: Lazy<TypeRegistry> = Lazy::new(TypeRegistry::new);

/// Memoized column types per table name.
///
/// Entries live until evicted: a table altered at runtime needs [`TypeRegistry::evict`].
/// Filling an entry twice is harmless, the last write wins.
#[derive(Clone)]
pub struct TypeRegistry {
    cache: Cache<String, Arc<ColumnTypes>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self { cache: Cache::builder().build() }
    }

    /// The process wide registry. Clones share the same cache.
    pub fn global() -> TypeRegistry {
        GLOBAL_REGISTRY.clone()
    }

    pub async fn get_column_types<C: BulkConnection + ?Sized>(
        &self,
        conn: &mut C,
        table_name: &str,
    ) -> Result<Arc<ColumnTypes>, BulkOperationError> {
        if let Some(column_types) = self.cached(table_name) {
            return Ok(column_types);
        }

        let sql = column_types_sql(table_name)?;
        let rows = conn.query_literal(&sql).await?;

        let column_types: ColumnTypes = rows
            .iter()
            .filter_map(|row| Some((row.get("column_name")?, row.get("column_type")?)))
            .collect();

        debug!("Resolved {} column types for {}", column_types.len(), table_name);

        let column_types = Arc::new(column_types);
        self.cache.insert(table_name.to_string(), Arc::clone(&column_types));

        Ok(column_types)
    }

    pub fn cached(&self, table_name: &str) -> Option<Arc<ColumnTypes>> {
        self.cache.get(&table_name.to_string())
    }

    /// Seeds the cache, e.g. from a schema already known to the caller.
    pub fn insert(&self, table_name: &str, column_types: ColumnTypes) {
        self.cache.insert(table_name.to_string(), Arc::new(column_types));
    }

    pub fn evict(&self, table_name: &str) {
        self.cache.invalidate(&table_name.to_string());
    }

    pub fn clear(&self) {
        let tables: Vec<String> = self.cache.iter().map(|entry| entry.key().clone()).collect();
        for table_name in tables {
            self.cache.invalidate(&table_name);
        }
    }
}

/// Column types of `table_name` through the process wide registry.
pub async fn get_column_types<C: BulkConnection + ?Sized>(
    conn: &mut C,
    table_name: &str,
) -> Result<Arc<ColumnTypes>, BulkOperationError> {
    TypeRegistry::global().get_column_types(conn, table_name).await
}
