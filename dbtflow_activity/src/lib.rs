//! Activity authoring SDK for dbtflow.
//!
//! Activities receive an [`ActivityContext`] describing the invocation they
//! serve: which attempt this is, when it was scheduled, the deadline it must
//! finish by and the session it is pinned to.

pub mod context;

pub use context::*;
