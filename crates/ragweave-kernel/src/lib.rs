//! ragweave kernel
//!
//! Contracts of the retrieval-augmentation pipeline: data types, the filter
//! language, stage and collaborator traits, the orchestrator, errors and
//! configuration loading.

// error module
pub mod error;

// retrieval-augmentation contracts
pub mod rag;

// configuration loader
#[cfg(feature = "config")]
pub mod config;

pub use error::{RagError, RagResult};
pub use tokio_util::sync::CancellationToken;
