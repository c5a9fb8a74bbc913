//! Extension server supervisor
//!
//! Spawns, observes and terminates operator-configured extension server
//! processes. Configurations persist in a JSON file; live instances exist only
//! for the lifetime of the owning [`application::Supervisor`].
//!
//! ## Layers
//!
//! - `domain`: value objects, entities, errors and the `ConfigRepository` port
//! - `infrastructure`: the JSON/in-memory config stores and the process instance
//! - `application`: the `Supervisor` that multiplexes instances

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::Supervisor;
pub use domain::{
    ConfigRepository, DomainError, ExtensionConfig, ExtensionKind, InstanceState, InstanceStatus,
    Result,
};
pub use infrastructure::{InMemoryConfigStore, JsonConfigStore};
