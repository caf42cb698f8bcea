//! Local SDK discovery: find the installation root holding `packs/` and
//! `shared/`, and enumerate what it has installed.

use std::path::{Path, PathBuf};

use dexec_core::reference::FrameworkName;
use dexec_core::version::NuGetVersion;
use dexec_util::errors::{DexecError, DexecResult};
use dexec_util::fs::subdirectory_names;

const DOTNET_EXE: &str = if cfg!(windows) { "dotnet.exe" } else { "dotnet" };

/// Locate the SDK installation root.
///
/// Search order: explicit override (`DOTNET_ROOT` or `[sdk] root`) -> the
/// `dotnet` executable on `PATH`, resolved through symlinks -> common
/// install locations.
pub fn discover_sdk_root(explicit: Option<&Path>) -> DexecResult<PathBuf> {
    if let Some(root) = explicit {
        if root.is_dir() {
            tracing::debug!("SDK root from override: {}", root.display());
            return Ok(root.to_path_buf());
        }
        return Err(DexecError::Sdk {
            message: format!("Configured SDK root {} does not exist", root.display()),
        });
    }

    if let Some(root) = find_on_path(DOTNET_EXE).and_then(|exe| root_from_executable(&exe)) {
        tracing::debug!("SDK root from PATH: {}", root.display());
        return Ok(root);
    }

    for candidate in common_sdk_paths() {
        if is_sdk_root(&candidate) {
            tracing::debug!("SDK root from well-known location: {}", candidate.display());
            return Ok(candidate);
        }
    }

    Err(DexecError::Sdk {
        message: "No .NET installation found".to_string(),
    })
}

/// Search `PATH` for an executable.
pub fn find_on_path(exe: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(exe))
        .find(|candidate| candidate.is_file())
}

/// The directory containing the real `dotnet` binary, following symlinks
/// such as `/usr/bin/dotnet -> /usr/share/dotnet/dotnet`.
pub fn root_from_executable(exe: &Path) -> Option<PathBuf> {
    let real = std::fs::canonicalize(exe).ok()?;
    real.parent().map(Path::to_path_buf)
}

fn is_sdk_root(dir: &Path) -> bool {
    dir.join("shared").is_dir() || dir.join("packs").is_dir()
}

fn common_sdk_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if cfg!(windows) {
        paths.push(PathBuf::from(r"C:\Program Files\dotnet"));
    } else if cfg!(target_os = "macos") {
        paths.push(PathBuf::from("/usr/local/share/dotnet"));
    } else {
        paths.push(PathBuf::from("/usr/share/dotnet"));
        paths.push(PathBuf::from("/usr/lib/dotnet"));
        paths.push(PathBuf::from("/usr/local/share/dotnet"));
    }
    paths.push(dexec_util::fs::home_dir().join(".dotnet"));
    paths
}

/// Runtime identifier of the current platform (`linux-x64`, `osx-arm64`, ...).
pub fn runtime_identifier() -> String {
    let os = match std::env::consts::OS {
        "windows" => "win",
        "macos" => "osx",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "x86",
        "arm" => "arm",
        other => other,
    };
    format!("{os}-{arch}")
}

/// A discovered SDK installation.
#[derive(Debug, Clone)]
pub struct SdkInstallation {
    root: PathBuf,
}

impl SdkInstallation {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `packs/<Name>.Ref` (compile) or `shared/<Name>` (run).
    pub fn framework_dir(&self, name: FrameworkName, compile: bool) -> PathBuf {
        if compile {
            self.root.join("packs").join(name.ref_pack_name())
        } else {
            self.root.join("shared").join(name.platform_name())
        }
    }

    /// Installed version directory names, lowest first.
    pub fn framework_versions(&self, name: FrameworkName, compile: bool) -> Vec<String> {
        let mut names = subdirectory_names(&self.framework_dir(name, compile));
        names.sort_by(|a, b| version_order(a, b));
        names
    }

    /// Every installed `(shared framework, version)` pair.
    pub fn installed_runtimes(&self) -> Vec<(String, String)> {
        let shared = self.root.join("shared");
        let mut found = Vec::new();
        for framework in subdirectory_names(&shared) {
            let mut versions = subdirectory_names(&shared.join(&framework));
            versions.sort_by(|a, b| version_order(a, b));
            found.extend(versions.into_iter().map(|v| (framework.clone(), v)));
        }
        found
    }

    /// Installed SDK versions (`sdk/<version>`).
    pub fn installed_sdks(&self) -> Vec<String> {
        let mut versions = subdirectory_names(&self.root.join("sdk"));
        versions.retain(|v| NuGetVersion::parse(v).is_ok());
        versions.sort_by(|a, b| version_order(a, b));
        versions
    }
}

/// Pick the highest directory name belonging to `major.minor`.
///
/// `8.0` selects among `8.0`, `8.0.x` and `8.0.x-preview`, never `8.01` or
/// `9.0.x`. Names order by version, ties by text.
pub fn select_version_dir<'a>(names: &'a [String], major_minor: &str) -> Option<&'a String> {
    names
        .iter()
        .filter(|name| {
            name.strip_prefix(major_minor)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('.') || rest.starts_with('-'))
        })
        .max_by(|a, b| version_order(a, b))
}

fn version_order(a: &str, b: &str) -> std::cmp::Ordering {
    match (NuGetVersion::parse(a), NuGetVersion::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}
