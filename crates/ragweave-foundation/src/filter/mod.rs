//! Metadata filter providers

pub mod parser;
pub mod sql;

pub use parser::{ParseError, parse_where_clause};
pub use sql::{ColumnDefinition, LanguageModelSqlFilterBuilder, TableDefinition};
