pub mod extension_kind;
pub mod instance_state;

pub use extension_kind::ExtensionKind;
pub use instance_state::InstanceState;
