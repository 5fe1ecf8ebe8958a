pub mod batch_operations;
pub mod clean;
pub mod errors;
pub mod postgres;
pub mod schema;
pub mod sql_value;
