//! CLI command implementations

pub mod example;
pub mod index;
pub mod rag;
pub mod structured;
