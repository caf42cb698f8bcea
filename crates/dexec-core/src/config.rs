use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use dexec_util::errors::{DexecError, DexecResult};
use dexec_util::fs::{dirs_path, home_dir};

/// Overrides the SDK installation root.
pub const ENV_SDK_ROOT: &str = "DOTNET_ROOT";
/// Overrides the local package cache root.
pub const ENV_PACKAGES_ROOT: &str = "NUGET_PACKAGES";
/// Selects the NuGet.config file that lists active feeds.
pub const ENV_NUGET_CONFIG: &str = "DEXEC_NUGET_CONFIG";

/// Feed used when no NuGet.config is selected.
pub const DEFAULT_FEED: &str = "https://api.nuget.org/v3/index.json";

/// Global user configuration loaded from `~/.dexec/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub nuget: NuGetConfig,

    #[serde(default)]
    pub resolve: ResolveConfig,

    #[serde(default)]
    pub sdk: SdkConfig,
}

/// Package feed settings from `[nuget]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NuGetConfig {
    #[serde(default, rename = "config-file")]
    pub config_file: Option<PathBuf>,
    #[serde(default, rename = "packages-dir")]
    pub packages_dir: Option<PathBuf>,
    #[serde(default, rename = "include-prerelease")]
    pub include_prerelease: bool,
}

/// Resolution settings from `[resolve]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_max_concurrency", rename = "max-concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_true")]
    pub cache: bool,
    #[serde(default, rename = "wide-references")]
    pub wide_references: bool,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            max_concurrency: default_max_concurrency(),
            cache: true,
            wide_references: false,
        }
    }
}

fn default_retries() -> u32 {
    5
}

fn default_max_concurrency() -> usize {
    8
}

fn default_true() -> bool {
    true
}

/// SDK settings from `[sdk]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SdkConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl GlobalConfig {
    /// Load the global configuration from `~/.dexec/config.toml`, or return
    /// defaults if the file doesn't exist.
    pub fn load() -> DexecResult<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load from an explicit path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> DexecResult<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| DexecError::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        toml::from_str(&content).map_err(|e| DexecError::Config {
            message: format!("Failed to parse {}: {e}", path.display()),
        })
    }

    /// Returns the default path to the global config file.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }

    /// Local package cache root: `NUGET_PACKAGES`, then `[nuget] packages-dir`,
    /// then `~/.nuget/packages`.
    pub fn packages_root(&self) -> PathBuf {
        env_path(ENV_PACKAGES_ROOT)
            .or_else(|| self.nuget.packages_dir.clone())
            .unwrap_or_else(|| home_dir().join(".nuget").join("packages"))
    }

    /// NuGet.config selecting active feeds: `DEXEC_NUGET_CONFIG`, then
    /// `[nuget] config-file`. `None` means the default feed only.
    pub fn nuget_config_file(&self) -> Option<PathBuf> {
        env_path(ENV_NUGET_CONFIG).or_else(|| self.nuget.config_file.clone())
    }

    /// Explicit SDK root: `DOTNET_ROOT`, then `[sdk] root`. Discovery through
    /// `PATH` happens in the SDK crate when both are absent.
    pub fn sdk_root_override(&self) -> Option<PathBuf> {
        env_path(ENV_SDK_ROOT).or_else(|| self.sdk.root.clone())
    }
}

/// A non-empty environment variable as a path.
pub fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
