use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all reference resolution operations.
#[derive(Debug, Error, Diagnostic)]
pub enum DexecError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The reference schema is not one of the known kinds.
    #[error("Unsupported reference kind '{schema}'")]
    #[diagnostic(help("Known schemas are: file, folder, nuget, framework, project"))]
    UnsupportedReferenceKind { schema: String },

    /// Malformed path, package id or payload.
    #[error("Invalid reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    /// No version of the package matched the prerelease filter.
    #[error("No versions found for package {package}")]
    NoVersionsFound { package: String },

    /// No configured feed has the requested package version.
    #[error("Package {package} {version} not found")]
    PackageNotFound { package: String, version: String },

    /// The package declares dependency groups, none usable by the framework.
    #[error("Package {package} has no dependency group compatible with {framework}")]
    NoSupportedFramework { package: String, framework: String },

    /// The package ships assets, none usable by the framework.
    #[error("Package {package} has no assets compatible with {framework}")]
    NoCompatibleFrameworkAsset { package: String, framework: String },

    /// The feed could not be reached or returned an unusable service index.
    #[error("Feed {feed} unavailable: {message}")]
    FeedUnavailable { feed: String, message: String },

    /// Network request or download failed.
    #[error("Network error: {message}")]
    Network { message: String },

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    OperationCancelled,

    /// Local SDK discovery failed.
    #[error("SDK error: {message}")]
    #[diagnostic(help("Set DOTNET_ROOT to the directory containing packs/ and shared/"))]
    Sdk { message: String },

    /// The external project build failed.
    #[error("Build failed: {message}")]
    Build { message: String },

    /// Invalid or unreadable configuration (config.toml, NuGet.config).
    #[error("Config error: {message}")]
    Config { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

impl DexecError {
    /// Whether the failure is worth retrying with the same parameters.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::FeedUnavailable { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::OperationCancelled)
    }
}

/// Convenience alias used by the engine crates.
pub type DexecResult<T> = std::result::Result<T, DexecError>;
