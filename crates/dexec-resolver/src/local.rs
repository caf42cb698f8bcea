//! `file:` and `folder:` references.

use async_trait::async_trait;
use dexec_core::reference::{Reference, ReferenceKind};
use dexec_util::cancel::CancelToken;
use dexec_util::errors::{DexecError, DexecResult};
use dexec_util::fs::assemblies_in;

use crate::dispatch::{wrong_kind, ReferenceResolver};
use crate::outcome::{AssetMode, ResolveRequest, Resolved};

/// A single assembly on disk. A missing file resolves to nothing.
#[derive(Debug, Default)]
pub struct FileResolver;

#[async_trait]
impl ReferenceResolver for FileResolver {
    fn kind(&self) -> ReferenceKind {
        ReferenceKind::File
    }

    async fn resolve(
        &self,
        reference: &Reference,
        request: &ResolveRequest,
        cancel: &CancelToken,
    ) -> DexecResult<Resolved> {
        let Reference::LocalFile { path } = reference else {
            return Err(wrong_kind(reference, self.kind()));
        };
        cancel.check()?;
        if request.mode == AssetMode::Analyzers {
            return Ok(Resolved::default());
        }
        match std::fs::canonicalize(path) {
            Ok(full) if full.is_file() => Ok(Resolved::from_assemblies(vec![full])),
            _ => {
                tracing::debug!("{} does not exist", path.display());
                Ok(Resolved::default())
            }
        }
    }
}

/// Every assembly directly inside a folder.
#[derive(Debug, Default)]
pub struct FolderResolver;

#[async_trait]
impl ReferenceResolver for FolderResolver {
    fn kind(&self) -> ReferenceKind {
        ReferenceKind::Folder
    }

    async fn resolve(
        &self,
        reference: &Reference,
        request: &ResolveRequest,
        cancel: &CancelToken,
    ) -> DexecResult<Resolved> {
        let Reference::LocalFolder { path } = reference else {
            return Err(wrong_kind(reference, self.kind()));
        };
        cancel.check()?;
        if !path.is_dir() {
            return Err(DexecError::InvalidReference {
                reference: reference.to_string(),
                message: "folder does not exist".to_string(),
            });
        }
        if request.mode == AssetMode::Analyzers {
            return Ok(Resolved::default());
        }
        let dir = std::fs::canonicalize(path)?;
        Ok(Resolved::from_assemblies(assemblies_in(&dir)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexec_core::framework::TargetFramework;

    fn request() -> ResolveRequest {
        ResolveRequest::new(TargetFramework::net(8, 0), AssetMode::Run)
    }

    #[tokio::test]
    async fn missing_file_is_empty_not_error() {
        let reference = Reference::file("/definitely/not/here/X.dll");
        let resolved = FileResolver
            .resolve(&reference, &request(), &CancelToken::new())
            .await
            .unwrap();
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn folder_is_not_recursive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A.dll"), b"MZ").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("B.dll"), b"MZ").unwrap();

        let reference = Reference::LocalFolder {
            path: dir.path().to_path_buf(),
        };
        let resolved = FolderResolver
            .resolve(&reference, &request(), &CancelToken::new())
            .await
            .unwrap();
        let names: Vec<String> = resolved
            .paths()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["A.dll"]);
    }

    #[tokio::test]
    async fn missing_folder_is_invalid() {
        let reference = Reference::LocalFolder {
            path: "/definitely/not/here".into(),
        };
        let err = FolderResolver
            .resolve(&reference, &request(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DexecError::InvalidReference { .. }));
    }

    #[tokio::test]
    async fn wrong_variant_is_rejected() {
        let reference = Reference::nuget("Foo", None);
        assert!(FileResolver
            .resolve(&reference, &request(), &CancelToken::new())
            .await
            .is_err());
    }
}
