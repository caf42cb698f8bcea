//! Long-lived state shared by every resolver of one invocation.

use std::sync::{Arc, OnceLock};

use dexec_core::config::GlobalConfig;
use dexec_nuget::PackageClient;
use dexec_sdk::{discover_sdk_root, SdkInstallation};
use dexec_util::errors::DexecResult;

/// Configuration, the package client and the lazily discovered SDK.
pub struct ResolverEnvironment {
    config: GlobalConfig,
    client: Arc<PackageClient>,
    sdk: OnceLock<Option<SdkInstallation>>,
}

impl ResolverEnvironment {
    pub fn from_config(config: GlobalConfig) -> DexecResult<Self> {
        let client = Arc::new(PackageClient::from_config(&config)?);
        Ok(Self {
            config,
            client,
            sdk: OnceLock::new(),
        })
    }

    /// An environment with a known SDK (or none), skipping discovery.
    pub fn with_parts(
        config: GlobalConfig,
        client: Arc<PackageClient>,
        sdk: Option<SdkInstallation>,
    ) -> Self {
        Self {
            config,
            client,
            sdk: OnceLock::from(sdk),
        }
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<PackageClient> {
        &self.client
    }

    /// The local SDK, discovered on first use. `None` when no installation
    /// was found; framework references then come from NuGet.
    pub fn sdk(&self) -> Option<&SdkInstallation> {
        self.sdk
            .get_or_init(|| {
                match discover_sdk_root(self.config.sdk_root_override().as_deref()) {
                    Ok(root) => Some(SdkInstallation::new(root)),
                    Err(e) => {
                        tracing::warn!("{e}; framework references will use NuGet packs");
                        None
                    }
                }
            })
            .as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexec_nuget::cache::PackageCache;

    fn client() -> Arc<PackageClient> {
        Arc::new(PackageClient::new(Vec::new(), PackageCache::new("/nonexistent/packages")))
    }

    #[test]
    fn given_sdk_skips_discovery() {
        let mut config = GlobalConfig::default();
        config.sdk.root = Some("/nonexistent/dotnet".into());
        let env = ResolverEnvironment::with_parts(
            config,
            client(),
            Some(SdkInstallation::new("/opt/dotnet")),
        );
        assert_eq!(env.sdk().map(|s| s.root().to_path_buf()), Some("/opt/dotnet".into()));
    }

    #[test]
    fn given_no_sdk_stays_none() {
        let env = ResolverEnvironment::with_parts(GlobalConfig::default(), client(), None);
        assert!(env.sdk().is_none());
    }
}
