//! Core types and utilities for dbtflow.
//!
//! This crate provides the run parameters, pipeline step catalogue,
//! invocation options, error taxonomy and serialization framework shared
//! by the coordinator, the worker and the activities.

pub mod encoded;
pub mod error;
pub mod types;

pub use encoded::*;
pub use error::*;
pub use types::*;
