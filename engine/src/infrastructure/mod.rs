//! Infrastructure Layer
//!
//! Adapters implementing the domain ports, plus the process instance that owns
//! the OS-level child process.
//!
//! ## Adapters
//!
//! - `JsonConfigStore`: file-backed configuration store with atomic writes
//! - `InMemoryConfigStore`: volatile configuration store
//! - `ExtensionInstance`: one managed extension server process

pub mod extension_instance;
pub mod in_memory_config_store;
pub mod json_config_store;

pub use extension_instance::ExtensionInstance;
pub use in_memory_config_store::InMemoryConfigStore;
pub use json_config_store::JsonConfigStore;
