// public
pub mod config;
pub use config::{read_config, BulkConfig, ReadConfigError};

mod database;
pub use database::{
    batch_operations::{
        chunk_bounds, is_type_comparable, BatchOperationType, BULK_CHUNK_SIZE,
        DEFAULT_REFERENCE_KEY, NON_COMPARABLE_TYPES,
    },
    clean::{
        cast_row, clean_returning, clean_values, clean_values_cast, format_key_list,
        resolve_column, validate_reference_keys, CleanedRow, LiteralRow,
    },
    errors::BulkOperationError,
    postgres::{
        batch_operations::{
            format_table_name, insert, quote_identifier, render_chunk, render_statements,
            split_chunks, update, BulkExecutor, InsertStatement, RenderBundle, RenderedStatement,
            StatementTemplate, UpdateStatement,
        },
        client::{
            connection_string, PostgresClient, PostgresConnection, PostgresConnectionError,
            PostgresError,
        },
        connection::{collect_returned_rows, BulkConnection, ReturnedRow, ReturnedRowError},
        sql_literal::{quote_string, to_literal, to_literal_with, BooleanLiteral, LiteralError, SqlLiteral},
        type_registry::{column_types_sql, get_column_types, ColumnTypes, TypeRegistry},
    },
    schema::{AttributeKind, ColumnDef, ColumnHandle, ColumnRef, Row, TableSchema, TableSchemaBuilder},
    sql_value::{format_float, SqlValue},
};

mod logger;
pub use logger::{setup_info_logger, setup_logger};

mod macros;

// export 3rd party dependencies
pub use async_trait::async_trait;
pub use tokio_postgres;
