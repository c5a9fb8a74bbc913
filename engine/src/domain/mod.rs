pub mod constants;
pub mod entities;
pub mod error;
pub mod ports;
pub mod value_objects;

pub use entities::{ExtensionConfig, InstanceStatus};
pub use error::{DomainError, Result};
pub use ports::ConfigRepository;
pub use value_objects::{ExtensionKind, InstanceState};
