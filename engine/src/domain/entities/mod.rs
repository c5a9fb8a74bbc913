pub mod extension_config;
pub mod instance_status;

pub use extension_config::ExtensionConfig;
pub use instance_status::InstanceStatus;
