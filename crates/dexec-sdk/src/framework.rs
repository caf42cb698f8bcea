//! Resolve platform framework references to assembly paths.
//!
//! Local installation first: `packs/<Name>.Ref/<ver>/ref/<tfm>/` for compile
//! mode, `shared/<Name>/<ver>/` for run mode. Without a matching local
//! version the NuGet packages are used instead: `<Name>.Ref` for compile mode
//! and the runtime pack `<Name>.Runtime.<rid>` for run mode.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dexec_core::framework::TargetFramework;
use dexec_core::reference::FrameworkName;
use dexec_core::version::NuGetVersion;
use dexec_nuget::assets;
use dexec_nuget::PackageClient;
use dexec_util::cancel::CancelToken;
use dexec_util::errors::DexecResult;
use dexec_util::fs::assemblies_in;

use crate::discovery::{runtime_identifier, select_version_dir, SdkInstallation};

/// Which assemblies a framework reference should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameworkMode {
    /// Reference assemblies for compilation.
    Compile,
    /// Implementation assemblies for loading at run time.
    Run,
}

impl FrameworkMode {
    pub fn from_compile_flag(compile: bool) -> Self {
        if compile {
            Self::Compile
        } else {
            Self::Run
        }
    }

    pub fn is_compile(self) -> bool {
        self == Self::Compile
    }
}

pub struct FrameworkResolver {
    sdk: Option<SdkInstallation>,
    client: Arc<PackageClient>,
    rid: String,
}

impl FrameworkResolver {
    /// `sdk` is `None` when discovery failed; resolution then goes straight
    /// to NuGet.
    pub fn new(sdk: Option<SdkInstallation>, client: Arc<PackageClient>) -> Self {
        Self {
            sdk,
            client,
            rid: runtime_identifier(),
        }
    }

    pub fn with_runtime_identifier(mut self, rid: impl Into<String>) -> Self {
        self.rid = rid.into();
        self
    }

    pub fn sdk(&self) -> Option<&SdkInstallation> {
        self.sdk.as_ref()
    }

    /// Assemblies of framework `name` for `framework`.
    ///
    /// Returns an empty list, with a warning, when neither the local
    /// installation nor NuGet has a matching version.
    pub async fn resolve(
        &self,
        name: FrameworkName,
        framework: &TargetFramework,
        mode: FrameworkMode,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<PathBuf>> {
        cancel.check()?;
        if let Some(local) = self.resolve_local(name, framework, mode)? {
            return Ok(local);
        }
        let resolved = match mode {
            FrameworkMode::Compile => self.resolve_ref_package(name, framework, cancel).await?,
            FrameworkMode::Run => self.resolve_runtime_package(name, framework, cancel).await?,
        };
        if resolved.is_empty() {
            tracing::warn!("No {name} framework assemblies found for {framework}");
        }
        Ok(resolved)
    }

    /// Only the local installation; `None` when it has no matching version.
    pub fn resolve_local(
        &self,
        name: FrameworkName,
        framework: &TargetFramework,
        mode: FrameworkMode,
    ) -> DexecResult<Option<Vec<PathBuf>>> {
        let Some(dir) = self.local_version_dir(name, framework, mode) else {
            return Ok(None);
        };
        let assembly_dir = match mode {
            FrameworkMode::Compile => dir.join("ref").join(moniker(framework)),
            FrameworkMode::Run => dir,
        };
        let found = assemblies_in(&assembly_dir)?;
        if found.is_empty() {
            tracing::debug!("{} has no assemblies", assembly_dir.display());
            return Ok(None);
        }
        tracing::debug!("{name} for {framework} from {}", assembly_dir.display());
        Ok(Some(found))
    }

    fn local_version_dir(
        &self,
        name: FrameworkName,
        framework: &TargetFramework,
        mode: FrameworkMode,
    ) -> Option<PathBuf> {
        let sdk = self.sdk.as_ref()?;
        let versions = sdk.framework_versions(name, mode.is_compile());
        let chosen = select_version_dir(&versions, &framework.version_prefix())?;
        Some(sdk.framework_dir(name, mode.is_compile()).join(chosen))
    }

    async fn resolve_ref_package(
        &self,
        name: FrameworkName,
        framework: &TargetFramework,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<PathBuf>> {
        let id = name.ref_pack_name();
        let Some(version) = self.pack_version(&id, framework, cancel).await? else {
            return Ok(Vec::new());
        };
        tracing::info!("Using {id} {version} from NuGet for {framework}");
        self.client
            .get_lib_or_ref_assemblies(&id, &version, &without_platform(framework), true, cancel)
            .await
    }

    async fn resolve_runtime_package(
        &self,
        name: FrameworkName,
        framework: &TargetFramework,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<PathBuf>> {
        let id = format!("{}.Runtime.{}", name.platform_name(), self.rid);
        let Some(version) = self.pack_version(&id, framework, cancel).await? else {
            return Ok(Vec::new());
        };
        tracing::info!("Using {id} {version} from NuGet for {framework}");
        self.client
            .get_runtime_assemblies(&id, &version, &without_platform(framework), &self.rid, cancel)
            .await
    }

    /// Highest version of a pack matching the moniker's major.minor; stable
    /// versions first, previews only when no stable one exists.
    async fn pack_version(
        &self,
        id: &str,
        framework: &TargetFramework,
        cancel: &CancelToken,
    ) -> DexecResult<Option<NuGetVersion>> {
        let versions = self.client.list_versions(id, true, cancel).await?;
        let matching = versions
            .into_iter()
            .filter(|v| v.matches_major_minor(framework.major.into(), framework.minor.into()));
        let (stable, preview): (Vec<_>, Vec<_>) = matching.partition(|v| !v.is_prerelease());
        Ok(stable.into_iter().max().or_else(|| preview.into_iter().max()))
    }

    /// Analyzers and source generators shipped in the framework's ref pack.
    pub async fn resolve_analyzers(
        &self,
        name: FrameworkName,
        framework: &TargetFramework,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<PathBuf>> {
        cancel.check()?;
        if let Some(dir) = self.local_version_dir(name, framework, FrameworkMode::Compile) {
            return local_analyzers(&dir);
        }
        let id = name.ref_pack_name();
        match self.pack_version(&id, framework, cancel).await? {
            Some(version) => self.client.get_analyzer_assemblies(&id, &version, cancel).await,
            None => Ok(Vec::new()),
        }
    }
}

fn local_analyzers(pack_version_dir: &Path) -> DexecResult<Vec<PathBuf>> {
    assets::analyzer_assemblies(pack_version_dir)
}

/// Folder name used for the moniker inside packs (`net8.0`).
fn moniker(framework: &TargetFramework) -> String {
    without_platform(framework).to_string()
}

fn without_platform(framework: &TargetFramework) -> TargetFramework {
    TargetFramework {
        platform: None,
        ..framework.clone()
    }
}
