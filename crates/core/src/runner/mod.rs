//! Subprocess machinery.
//!
//! - [`subprocess`]: spawn one process, enforce its time budget, capture output.
//! - [`pipeline`]: stage a request in a scratch directory and drive the
//!   compile/run stages its language needs.
//! - [`venv`]: create, verify, and remove durable Python virtual environments.
//! - [`locks`]: per-environment serialization of installs and deletes.

pub mod locks;
pub mod pipeline;
pub mod subprocess;
pub mod venv;

pub use subprocess::{run_command, RunError, RunOptions, RunOutput};
