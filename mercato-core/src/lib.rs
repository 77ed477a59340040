//! mercato-core
//!
//! Seams shared across the mercato resilience layer.
//!
//! - `store`: the `PersistentStore` trait with in-memory and file-backed stores.
//! - `probe`: the `HealthProbe` trait implemented by HTTP and mock probes.
//! - `events`: a typed broadcast `EventBus`.
//! - `task`: cancellable `PeriodicTask`s that never overlap their own runs.
//!
//! Async runtime (Tokio)
//! ---------------------
//! Periodic tasks and the event bus are built on Tokio primitives; code that
//! spawns tasks must run under a Tokio 1.x runtime.
#![warn(missing_docs)]

/// Typed publish/subscribe channel.
pub mod events;
/// Health probe trait.
pub mod probe;
/// Persistent key-value stores.
pub mod store;
/// Cancellable periodic jobs.
pub mod task;

pub use events::EventBus;
pub use probe::HealthProbe;
pub use store::{FileStore, MemoryStore, PersistentStore};
pub use task::{PeriodicTask, TaskHandle};

pub use mercato_types::*;
