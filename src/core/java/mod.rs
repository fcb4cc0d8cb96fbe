pub mod runtime;

pub use runtime::RuntimeBinary;
pub use runtime::RuntimeProvisioner;
pub use runtime::SYSTEM_JAVA;
