//! Shared utilities for dexec.
//!
//! This crate provides cross-cutting concerns used by all other dexec crates:
//! the error taxonomy, cooperative cancellation, filesystem helpers,
//! hashing, process spawning, and terminal status output.

pub mod cancel;
pub mod errors;
pub mod fs;
pub mod hash;
pub mod process;
pub mod progress;

pub use fs::dirs_path;
