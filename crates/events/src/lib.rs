//! In-process event bus for environment lifecycle notifications.
//!
//! - [`EventBus`]: publish/subscribe hub backed by `tokio::sync::broadcast`.
//! - [`EnvironmentEvent`]: the event envelope published by the install
//!   supervisor.
//! - [`EventLogger`]: subscriber that writes each event to the log.

pub mod bus;
pub mod logger;

pub use bus::{EnvironmentEvent, EventBus};
pub use logger::EventLogger;
