//! Domain logic for the coderun execution service.
//!
//! Everything in this crate is free of storage and HTTP concerns: language
//! profiles, request validation rules, the environment install state
//! machine, and the subprocess machinery under [`runner`].

pub mod environment;
pub mod error;
pub mod execution;
pub mod language;
pub mod runner;
pub mod types;
