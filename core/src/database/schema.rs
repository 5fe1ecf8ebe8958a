use std::fmt;

use crate::database::errors::BulkOperationError;
use crate::database::postgres::connection::BulkConnection;
use crate::database::postgres::type_registry::{ColumnTypes, TypeRegistry};
use crate::database::sql_value::SqlValue;

/// What a mapped attribute of a table stands for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// A plain column, stored under `key`.
    Column { key: String },
    /// A link to rows of another table.
    Relationship,
    /// A value derived from other columns, not stored.
    Computed,
}

/// A reference to an attribute of a specific table, the typed alternative to a column name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnHandle {
    table: String,
    attribute: String,
    kind: AttributeKind,
}

impl ColumnHandle {
    pub fn new(table: impl Into<String>, attribute: impl Into<String>, kind: AttributeKind) -> Self {
        Self { table: table.into(), attribute: attribute.into(), kind }
    }

    /// Handle to the column `key`, under an attribute of the same name.
    pub fn column(table: impl Into<String>, key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(table, key.clone(), AttributeKind::Column { key })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn kind(&self) -> &AttributeKind {
        &self.kind
    }

    /// Column key behind the handle; `None` for relationships and computed attributes.
    pub fn key(&self) -> Option<&str> {
        match &self.kind {
            AttributeKind::Column { key } => Some(key),
            AttributeKind::Relationship | AttributeKind::Computed => None,
        }
    }
}

/// How callers name a column: by its key, or through a handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnRef {
    Name(String),
    Handle(ColumnHandle),
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Name(name) => f.write_str(name),
            ColumnRef::Handle(handle) => write!(f, "{}.{}", handle.table, handle.attribute),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        ColumnRef::Name(name.to_string())
    }
}

impl From<String> for ColumnRef {
    fn from(name: String) -> Self {
        ColumnRef::Name(name)
    }
}

impl From<ColumnHandle> for ColumnRef {
    fn from(handle: ColumnHandle) -> Self {
        ColumnRef::Handle(handle)
    }
}

impl From<&ColumnHandle> for ColumnRef {
    fn from(handle: &ColumnHandle) -> Self {
        ColumnRef::Handle(handle.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub key: String,
    pub declared_type: Option<String>,
}

/// Columns and mapped attributes of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnDef>,
    attributes: Vec<(String, AttributeKind)>,
}

impl TableSchema {
    pub fn builder(name: impl Into<String>) -> TableSchemaBuilder {
        TableSchemaBuilder {
            schema: TableSchema { name: name.into(), columns: vec![], attributes: vec![] },
        }
    }

    /// Schema whose columns and declared types come from the catalog.
    pub fn from_column_types(name: impl Into<String>, column_types: &ColumnTypes) -> Self {
        let mut builder = TableSchema::builder(name);
        for (key, db_type) in column_types.iter() {
            builder = builder.typed_column(key, db_type);
        }
        builder.build()
    }

    /// Reads the columns of `table_name` from the database.
    pub async fn introspect<C: BulkConnection + ?Sized>(
        conn: &mut C,
        registry: &TypeRegistry,
        table_name: &str,
    ) -> Result<Self, BulkOperationError> {
        let column_types = registry.get_column_types(conn, table_name).await?;
        Ok(TableSchema::from_column_types(table_name, &column_types))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.key.as_str())
    }

    pub fn has_column(&self, key: &str) -> bool {
        self.columns.iter().any(|column| column.key == key)
    }

    pub fn declared_type(&self, key: &str) -> Option<&str> {
        self.columns.iter().find(|column| column.key == key)?.declared_type.as_deref()
    }

    /// Handle to the column `key`, if the table has it.
    pub fn column(&self, key: &str) -> Option<ColumnHandle> {
        self.has_column(key).then(|| ColumnHandle::column(self.name.clone(), key))
    }

    /// Handle to a mapped attribute, falling back to a column of the same name.
    pub fn attribute(&self, name: &str) -> Option<ColumnHandle> {
        self.attributes
            .iter()
            .find(|(attribute, _)| attribute == name)
            .map(|(attribute, kind)| ColumnHandle::new(self.name.clone(), attribute.clone(), kind.clone()))
            .or_else(|| self.column(name))
    }
}

pub struct TableSchemaBuilder {
    schema: TableSchema,
}

impl TableSchemaBuilder {
    pub fn column(mut self, key: impl Into<String>) -> Self {
        self.schema.columns.push(ColumnDef { key: key.into(), declared_type: None });
        self
    }

    pub fn typed_column(mut self, key: impl Into<String>, declared_type: impl Into<String>) -> Self {
        self.schema
            .columns
            .push(ColumnDef { key: key.into(), declared_type: Some(declared_type.into()) });
        self
    }

    /// Attribute `name` mapped onto the column `key`.
    pub fn alias(mut self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.schema.attributes.push((name.into(), AttributeKind::Column { key: key.into() }));
        self
    }

    pub fn relationship(mut self, name: impl Into<String>) -> Self {
        self.schema.attributes.push((name.into(), AttributeKind::Relationship));
        self
    }

    pub fn computed(mut self, name: impl Into<String>) -> Self {
        self.schema.attributes.push((name.into(), AttributeKind::Computed));
        self
    }

    pub fn build(self) -> TableSchema {
        self.schema
    }
}

/// Values of one row keyed by column reference.
///
/// Setting the same reference twice keeps the last value. Two different references to the
/// same column are caught when the row is cleaned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    entries: Vec<(ColumnRef, SqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: impl Into<ColumnRef>, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<ColumnRef>, value: impl Into<SqlValue>) {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == column) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((column, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnRef, &SqlValue)> {
        self.entries.iter().map(|(column, value)| (column, value))
    }
}

impl<K: Into<ColumnRef>, V: Into<SqlValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}
