//! coderun API server library.
//!
//! Exposes config, state, error handling, routes and the background
//! install machinery so integration tests and the binary entrypoint can
//! both access them.

pub mod background;
pub mod config;
pub mod error;
pub mod execution;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod state;
