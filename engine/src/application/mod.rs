//! Application Layer
//!
//! Composition of the configuration store and the live extension instances.

pub mod supervisor;

pub use supervisor::Supervisor;
