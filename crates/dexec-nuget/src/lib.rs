//! NuGet package access: v3 feed protocol, NuGet.config source discovery,
//! nuspec parsing, the local package cache, asset selection, and the
//! [`PackageClient`] that ties them together.

pub mod assets;
pub mod cache;
pub mod client;
pub mod download;
pub mod feed;
pub mod memory;
pub mod nuspec;
pub mod source_config;

pub use client::PackageClient;
pub use feed::{PackageFeed, SearchHit};
