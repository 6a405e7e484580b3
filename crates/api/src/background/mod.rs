//! Background tasks.
//!
//! - [`install_supervisor`]: long-running consumer of install jobs, spawned
//!   via `tokio::spawn` and stopped with a [`CancellationToken`].
//! - [`startup_verifier`]: one-shot reconciliation run at boot.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod install_supervisor;
pub mod startup_verifier;
