pub mod batch_operations;
pub mod client;
pub mod connection;
pub mod sql_literal;
pub mod type_registry;
