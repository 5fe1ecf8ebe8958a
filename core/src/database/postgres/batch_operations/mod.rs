//! PostgreSQL bulk INSERT and UPDATE built from literal SQL text.
//!
//! Rows are cleaned against a table schema, rendered into parameterless statements of at most
//! one chunk each and run in order on a single connection.

mod executor;
mod query_builder;
mod renderer;

pub use executor::{insert, update, BulkExecutor};
pub use query_builder::{
    format_table_name, quote_identifier, InsertStatement, StatementTemplate, UpdateStatement,
};
pub use renderer::{
    render_chunk, render_statements, split_chunks, RenderBundle, RenderedStatement,
};
