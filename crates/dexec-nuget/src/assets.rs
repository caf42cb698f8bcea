//! Asset-group discovery inside an extracted package folder.

use std::path::{Path, PathBuf};

use dexec_core::framework::TargetFramework;
use dexec_util::errors::{DexecError, DexecResult};
use dexec_util::fs::{assemblies_in, subdirectory_names};

/// Which top-level asset folder to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// `lib/<tfm>/`: runtime implementation assemblies.
    Lib,
    /// `ref/<tfm>/`: compile-time reference assemblies.
    Ref,
}

impl AssetKind {
    fn folder(self) -> &'static str {
        match self {
            Self::Lib => "lib",
            Self::Ref => "ref",
        }
    }
}

/// The assemblies a package ships for one target framework.
#[derive(Debug, Clone)]
pub struct AssetGroup {
    pub framework: TargetFramework,
    pub dir: PathBuf,
    pub assemblies: Vec<PathBuf>,
}

/// Every `<kind>/<tfm>/` group, plus a framework-agnostic group for
/// assemblies placed directly in `lib/`.
pub fn asset_groups(package_dir: &Path, kind: AssetKind) -> DexecResult<Vec<AssetGroup>> {
    groups_under(&package_dir.join(kind.folder()), kind == AssetKind::Lib)
}

/// `runtimes/<rid>/lib/<tfm>/` groups for one runtime identifier.
pub fn runtime_groups(package_dir: &Path, rid: &str) -> DexecResult<Vec<AssetGroup>> {
    groups_under(&package_dir.join("runtimes").join(rid).join("lib"), false)
}

fn groups_under(base: &Path, bare_is_any: bool) -> DexecResult<Vec<AssetGroup>> {
    let mut groups = Vec::new();
    if bare_is_any {
        let bare = assemblies_in(base)?;
        if !bare.is_empty() {
            groups.push(AssetGroup {
                framework: TargetFramework::any(),
                dir: base.to_path_buf(),
                assemblies: bare,
            });
        }
    }
    for name in subdirectory_names(base) {
        let Ok(framework) = TargetFramework::parse(&name) else {
            tracing::debug!("Ignoring asset folder {name} under {}", base.display());
            continue;
        };
        let dir = base.join(&name);
        groups.push(AssetGroup {
            framework,
            assemblies: assemblies_in(&dir)?,
            dir,
        });
    }
    Ok(groups)
}

/// Pick the group nearest to `framework`.
///
/// No groups at all yields an empty list; groups that exist but are all
/// incompatible yield [`DexecError::NoCompatibleFrameworkAsset`].
pub fn select_nearest(
    package: &str,
    groups: &[AssetGroup],
    framework: &TargetFramework,
) -> DexecResult<Vec<PathBuf>> {
    if groups.is_empty() {
        return Ok(Vec::new());
    }
    framework
        .nearest_by(groups, |g| &g.framework)
        .map(|g| {
            tracing::debug!("{package}: using {} assets for {framework}", g.framework);
            g.assemblies.clone()
        })
        .ok_or_else(|| DexecError::NoCompatibleFrameworkAsset {
            package: package.to_string(),
            framework: framework.to_string(),
        })
}

/// Compile or runtime assemblies of an extracted package.
///
/// Compile mode prefers `ref/` and falls back to `lib/` for packages that
/// ship no reference assemblies.
pub fn lib_or_ref_assemblies(
    package: &str,
    package_dir: &Path,
    framework: &TargetFramework,
    want_ref: bool,
) -> DexecResult<Vec<PathBuf>> {
    if want_ref {
        let refs = asset_groups(package_dir, AssetKind::Ref)?;
        if !refs.is_empty() {
            return select_nearest(package, &refs, framework);
        }
    }
    let libs = asset_groups(package_dir, AssetKind::Lib)?;
    select_nearest(package, &libs, framework)
}

/// Analyzer and source-generator assemblies for C#.
///
/// Reads `analyzers/dotnet/cs/` and `analyzers/dotnet/`; when the package
/// ships `roslynX.Y/` variants only the highest one is used.
pub fn analyzer_assemblies(package_dir: &Path) -> DexecResult<Vec<PathBuf>> {
    let dotnet = package_dir.join("analyzers").join("dotnet");
    let mut found = Vec::new();

    let roslyn = subdirectory_names(&dotnet)
        .into_iter()
        .filter_map(|name| {
            let version = name.strip_prefix("roslyn")?;
            let key: Vec<u32> = version.split('.').map(|p| p.parse().ok()).collect::<Option<_>>()?;
            Some((key, name))
        })
        .max_by(|a, b| a.0.cmp(&b.0));

    let base = match roslyn {
        Some((_, name)) => dotnet.join(name),
        None => dotnet,
    };
    found.extend(assemblies_in(&base)?);
    found.extend(assemblies_in(&base.join("cs"))?);
    found.sort();
    Ok(found)
}
