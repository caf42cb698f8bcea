//! Local SDK discovery and the framework reference resolver.

pub mod discovery;
pub mod framework;

pub use discovery::{discover_sdk_root, SdkInstallation};
pub use framework::{FrameworkMode, FrameworkResolver};
