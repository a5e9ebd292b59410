//! Core types and trait definitions for the Augur snapshot pipeline.
//!
//! This crate knows nothing about save-file syntax, databases, or the file
//! system watcher. Every other crate depends on it.

pub mod error;
pub mod history;
pub mod ingest;
pub mod record;
pub mod store;

pub use error::{Error, Result};
