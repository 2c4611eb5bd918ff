//! In-process worker for dbtflow.
//!
//! Hosts registered activities and executes them for the pipeline
//! coordinator with per-attempt timeouts, retries and session slots.

pub mod activities;
pub mod executor;
pub mod registry;
pub mod session;
pub mod worker;

pub use executor::LocalExecutor;
pub use registry::{
    activity_fn, Activity, ActivityRegistry, FnActivity, Registry, RegistryInfo,
};
pub use session::SessionManager;
pub use worker::{WorkerError, WorkerOptions};
