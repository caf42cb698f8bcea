//! Global package cache mirroring the NuGet folder layout.
//!
//! `<root>/<id-lower>/<version-lower>/` holds the extracted package, its
//! `<id-lower>.nuspec`, and a `.nupkg.metadata` file. A package folder only
//! appears once extraction has finished, so its existence is the sole
//! "already downloaded" check.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use dexec_core::version::NuGetVersion;
use dexec_util::errors::{DexecError, DexecResult};
use serde::{Deserialize, Serialize};

use crate::nuspec::{self, Nuspec};

/// Name of the sidecar file written next to every extracted package.
pub const METADATA_FILE: &str = ".nupkg.metadata";

/// Zip entries that belong to the packaging format, not the package.
const PACKAGING_ENTRIES: [&str; 3] = ["[Content_Types].xml", "_rels/", "package/"];

/// Contents of `.nupkg.metadata`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageMetadata {
    pub version: u32,
    #[serde(rename = "contentHash")]
    pub content_hash: String,
    pub source: String,
}

/// Local package cache shared by every resolution in the process.
#[derive(Debug, Clone)]
pub struct PackageCache {
    root: PathBuf,
}

impl PackageCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic folder for a package version.
    pub fn package_dir(&self, id: &str, version: &NuGetVersion) -> PathBuf {
        self.root
            .join(id.to_ascii_lowercase())
            .join(version.normalized().to_ascii_lowercase())
    }

    pub fn nuspec_path(&self, id: &str, version: &NuGetVersion) -> PathBuf {
        self.package_dir(id, version)
            .join(format!("{}.nuspec", id.to_ascii_lowercase()))
    }

    pub fn is_downloaded(&self, id: &str, version: &NuGetVersion) -> bool {
        self.package_dir(id, version).is_dir()
    }

    /// Parsed nuspec of a downloaded package, `None` if it isn't cached.
    pub fn read_nuspec(&self, id: &str, version: &NuGetVersion) -> DexecResult<Option<Nuspec>> {
        let path = self.nuspec_path(id, version);
        if !path.is_file() {
            return Ok(None);
        }
        let xml = fs::read_to_string(&path)?;
        nuspec::parse_nuspec(&xml).map(Some)
    }

    pub fn read_metadata(&self, id: &str, version: &NuGetVersion) -> Option<PackageMetadata> {
        let path = self.package_dir(id, version).join(METADATA_FILE);
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Extract a downloaded `.nupkg` into its package folder.
    ///
    /// Extraction runs on the blocking pool into a temporary sibling folder
    /// that is renamed into place. Losing the rename to a concurrent extractor
    /// of the same package is not an error.
    pub async fn install_nupkg(
        &self,
        id: &str,
        version: &NuGetVersion,
        bytes: Vec<u8>,
        source: &str,
    ) -> DexecResult<PathBuf> {
        let dest = self.package_dir(id, version);
        if dest.is_dir() {
            return Ok(dest);
        }
        let id_lower = id.to_ascii_lowercase();
        let metadata = PackageMetadata {
            version: 2,
            content_hash: dexec_util::hash::sha256_hex(&bytes),
            source: source.to_string(),
        };
        let target = dest.clone();
        tokio::task::spawn_blocking(move || extract_into_place(&bytes, &target, &id_lower, &metadata))
            .await
            .map_err(|e| DexecError::Generic {
                message: format!("Extraction task failed: {e}"),
            })??;
        Ok(dest)
    }
}

fn extract_into_place(
    bytes: &[u8],
    dest: &Path,
    id_lower: &str,
    metadata: &PackageMetadata,
) -> DexecResult<()> {
    let parent = dest.parent().ok_or_else(|| DexecError::Generic {
        message: format!("Invalid package folder {}", dest.display()),
    })?;
    fs::create_dir_all(parent)?;
    let staging = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(parent)?;

    extract_nupkg(bytes, staging.path())?;
    normalize_nuspec_name(staging.path(), id_lower)?;
    let json = serde_json::to_string_pretty(metadata).map_err(|e| DexecError::Generic {
        message: format!("Failed to serialize package metadata: {e}"),
    })?;
    fs::write(staging.path().join(METADATA_FILE), json)?;

    match fs::rename(staging.path(), dest) {
        Ok(()) => {
            tracing::debug!("Extracted package into {}", dest.display());
            Ok(())
        }
        Err(_) if dest.is_dir() => {
            tracing::debug!("{} was extracted concurrently", dest.display());
            Ok(())
        }
        Err(e) => Err(DexecError::Io(e)),
    }
}

/// Unpack every package entry of a `.nupkg` under `dest`.
fn extract_nupkg(bytes: &[u8], dest: &Path) -> DexecResult<()> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| DexecError::Generic {
            message: format!("Failed to open package archive: {e}"),
        })?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| DexecError::Generic {
            message: format!("Package entry error: {e}"),
        })?;
        let name = entry.name().to_string();
        if PACKAGING_ENTRIES.iter().any(|p| name.starts_with(p)) || name.ends_with(".psmdcp") {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!("Skipping unsafe package entry {name}");
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        fs::write(&out_path, &buf)?;
    }
    Ok(())
}

/// Rename the root `<Id>.nuspec` to `<id-lower>.nuspec`.
fn normalize_nuspec_name(dir: &Path, id_lower: &str) -> DexecResult<()> {
    let wanted = format!("{id_lower}.nuspec");
    for path in dexec_util::fs::files_with_extension(dir, "nuspec")? {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        if name != wanted {
            fs::rename(&path, dir.join(&wanted))?;
        }
        break;
    }
    Ok(())
}
