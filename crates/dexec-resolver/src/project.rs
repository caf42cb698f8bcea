//! `project:` references: build the project, then reference its output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dexec_core::reference::{Reference, ReferenceKind};
use dexec_util::cancel::CancelToken;
use dexec_util::errors::{DexecError, DexecResult};
use dexec_util::fs::{assemblies_in, dirs_path, ensure_dir};
use dexec_util::hash::short_digest;
use dexec_util::process::CommandBuilder;

use crate::dispatch::{wrong_kind, ReferenceResolver};
use crate::outcome::{AssetMode, ResolveRequest, Resolved};

/// Builds a project and returns the directory holding its output.
#[async_trait]
pub trait ProjectBuilder: Send + Sync {
    async fn build(&self, project: &Path, cancel: &CancelToken) -> DexecResult<PathBuf>;
}

/// Runs `dotnet build -c Release -o <dir>`.
///
/// Each project gets its own output directory under `~/.dexec/builds`, keyed
/// by a hash of the project path, so rebuilds are incremental.
#[derive(Debug, Clone)]
pub struct DotnetBuilder {
    dotnet: PathBuf,
    output_root: PathBuf,
}

impl DotnetBuilder {
    /// Use `dotnet` from `sdk_root` when given, else from `PATH`.
    pub fn new(sdk_root: Option<&Path>) -> Self {
        let exe = if cfg!(windows) { "dotnet.exe" } else { "dotnet" };
        let dotnet = sdk_root
            .map(|root| root.join(exe))
            .filter(|p| p.is_file())
            .unwrap_or_else(|| PathBuf::from(exe));
        Self {
            dotnet,
            output_root: dirs_path().join("builds"),
        }
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    fn output_dir(&self, project: &Path) -> PathBuf {
        self.output_root
            .join(short_digest(project.to_string_lossy().as_bytes(), 16))
    }
}

#[async_trait]
impl ProjectBuilder for DotnetBuilder {
    async fn build(&self, project: &Path, cancel: &CancelToken) -> DexecResult<PathBuf> {
        let out = self.output_dir(project);
        ensure_dir(&out)?;
        tracing::info!("Building {}", project.display());
        CommandBuilder::new(self.dotnet.to_string_lossy())
            .arg("build")
            .arg(project.to_string_lossy())
            .args(["-c", "Release", "-o"])
            .arg(out.to_string_lossy())
            .arg("--nologo")
            .env("DOTNET_CLI_TELEMETRY_OPTOUT", "1")
            .exec_checked(cancel)
            .await?;
        Ok(out)
    }
}

pub struct ProjectResolver {
    builder: Arc<dyn ProjectBuilder>,
}

impl ProjectResolver {
    pub fn new(builder: Arc<dyn ProjectBuilder>) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl ReferenceResolver for ProjectResolver {
    fn kind(&self) -> ReferenceKind {
        ReferenceKind::Project
    }

    async fn resolve(
        &self,
        reference: &Reference,
        request: &ResolveRequest,
        cancel: &CancelToken,
    ) -> DexecResult<Resolved> {
        let Reference::ProjectReference { path } = reference else {
            return Err(wrong_kind(reference, self.kind()));
        };
        if request.mode == AssetMode::Analyzers {
            return Ok(Resolved::default());
        }
        let project = std::fs::canonicalize(path).map_err(|_| DexecError::InvalidReference {
            reference: reference.to_string(),
            message: "project file does not exist".to_string(),
        })?;
        let out = self.builder.build(&project, cancel).await?;
        let assemblies = assemblies_in(&out)?;
        tracing::debug!("{}: {} assemblies", project.display(), assemblies.len());
        Ok(Resolved::from_assemblies(assemblies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexec_core::framework::TargetFramework;

    struct PrebuiltOutput(PathBuf);

    #[async_trait]
    impl ProjectBuilder for PrebuiltOutput {
        async fn build(&self, _project: &Path, cancel: &CancelToken) -> DexecResult<PathBuf> {
            cancel.check()?;
            Ok(self.0.clone())
        }
    }

    #[test]
    fn output_dir_is_stable_per_project() {
        let builder = DotnetBuilder::new(None).with_output_root("/tmp/builds");
        let a = builder.output_dir(Path::new("/src/a/a.csproj"));
        assert_eq!(a, builder.output_dir(Path::new("/src/a/a.csproj")));
        assert_ne!(a, builder.output_dir(Path::new("/src/b/b.csproj")));
        assert!(a.starts_with("/tmp/builds"));
    }

    #[tokio::test]
    async fn collects_build_output() {
        let src = tempfile::tempdir().unwrap();
        let project = src.path().join("Lib.csproj");
        std::fs::write(&project, "<Project />").unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(out.path().join("Lib.dll"), b"MZ").unwrap();
        std::fs::write(out.path().join("Lib.pdb"), b"").unwrap();

        let resolver = ProjectResolver::new(Arc::new(PrebuiltOutput(out.path().to_path_buf())));
        let request = ResolveRequest::new(TargetFramework::net(8, 0), AssetMode::Compile);
        let resolved = resolver
            .resolve(
                &Reference::ProjectReference { path: project },
                &request,
                &CancelToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(resolved.assemblies.len(), 1);
        assert!(resolved.assemblies[0].ends_with("Lib.dll"));
    }

    #[tokio::test]
    async fn missing_project_is_invalid() {
        let resolver = ProjectResolver::new(Arc::new(PrebuiltOutput(PathBuf::from("/nowhere"))));
        let request = ResolveRequest::new(TargetFramework::net(8, 0), AssetMode::Compile);
        let err = resolver
            .resolve(
                &Reference::ProjectReference {
                    path: "/no/such/App.csproj".into(),
                },
                &request,
                &CancelToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DexecError::InvalidReference { .. }));
    }
}
