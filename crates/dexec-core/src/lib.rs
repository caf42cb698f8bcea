//! Value types for reference resolution: reference declarations, target
//! framework monikers, package versions and global configuration.
//!
//! Nothing in this crate performs network I/O or runs async code.

pub mod config;
pub mod framework;
pub mod reference;
pub mod version;

pub use framework::TargetFramework;
pub use reference::{FrameworkName, Reference, ReferenceKind};
pub use version::{NuGetVersion, VersionRange};
