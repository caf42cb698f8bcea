//! What a resolution produces: per-reference results and the session's
//! aggregate outcome.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use dexec_core::framework::TargetFramework;
use dexec_core::version::NuGetVersion;
use dexec_util::errors::DexecError;

/// Which kind of assets a resolution collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetMode {
    /// Reference assemblies to compile against.
    Compile,
    /// Implementation assemblies to load at run time.
    Run,
    /// Analyzers and source generators.
    Analyzers,
}

impl AssetMode {
    pub fn from_compile_flag(compile: bool) -> Self {
        if compile {
            Self::Compile
        } else {
            Self::Run
        }
    }
}

impl fmt::Display for AssetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compile => "compile",
            Self::Run => "run",
            Self::Analyzers => "analyzers",
        })
    }
}

/// Parameters shared by every reference in one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolveRequest {
    pub framework: TargetFramework,
    pub mode: AssetMode,
    pub include_prerelease: bool,
}

impl ResolveRequest {
    pub fn new(framework: TargetFramework, mode: AssetMode) -> Self {
        Self {
            framework,
            mode,
            include_prerelease: false,
        }
    }

    pub fn with_prerelease(mut self, include: bool) -> Self {
        self.include_prerelease = include;
        self
    }
}

/// Assemblies one package contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageAssets {
    pub id: String,
    pub version: NuGetVersion,
    pub assemblies: Vec<PathBuf>,
}

/// Result of resolving a single reference.
///
/// Package assemblies are kept apart so the session can unify versions
/// across references.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    pub assemblies: Vec<PathBuf>,
    pub packages: Vec<PackageAssets>,
}

impl Resolved {
    pub fn from_assemblies(assemblies: Vec<PathBuf>) -> Self {
        Self {
            assemblies,
            packages: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.assemblies.is_empty() && self.packages.iter().all(|p| p.assemblies.is_empty())
    }

    /// Every path, package assemblies included.
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.assemblies
            .iter()
            .chain(self.packages.iter().flat_map(|p| p.assemblies.iter()))
    }
}

/// Deduplicated, order-irrelevant set of absolute assembly paths.
///
/// Paths are canonicalized on insert so two spellings of one file collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedReferenceSet {
    paths: BTreeSet<PathBuf>,
}

impl ResolvedReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the path was already present.
    pub fn insert(&mut self, path: impl AsRef<Path>) -> bool {
        self.paths.insert(canonical(path.as_ref()))
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.paths.contains(&canonical(path.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }

    /// Sorted paths, for handing to a compiler or loader.
    pub fn to_paths(&self) -> Vec<PathBuf> {
        self.paths.iter().cloned().collect()
    }
}

impl<P: AsRef<Path>> Extend<P> for ResolvedReferenceSet {
    fn extend<T: IntoIterator<Item = P>>(&mut self, iter: T) {
        for path in iter {
            self.insert(path);
        }
    }
}

impl<P: AsRef<Path>> FromIterator<P> for ResolvedReferenceSet {
    fn from_iter<T: IntoIterator<Item = P>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl IntoIterator for ResolvedReferenceSet {
    type Item = PathBuf;
    type IntoIter = std::collections::btree_set::IntoIter<PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResolvedReferenceSet {
    type Item = &'a PathBuf;
    type IntoIter = std::collections::btree_set::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// A reference that could not be resolved.
#[derive(Debug)]
pub struct ReferenceFailure {
    /// Canonical text of the offending reference.
    pub reference: String,
    pub error: DexecError,
}

impl fmt::Display for ReferenceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reference, self.error)
    }
}

/// Aggregate result of a session call: what resolved, and what did not.
#[derive(Debug, Default)]
pub struct ResolutionOutcome {
    pub references: ResolvedReferenceSet,
    pub failures: Vec<ReferenceFailure>,
}

impl ResolutionOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.references.to_paths()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_collapses_equivalent_paths() {
        let dir = tempfile::tempdir().unwrap();
        let dll = dir.path().join("A.dll");
        std::fs::write(&dll, b"MZ").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let dotted = dir.path().join("sub").join("..").join("A.dll");

        let mut set = ResolvedReferenceSet::new();
        assert!(set.insert(&dll));
        assert!(!set.insert(&dotted));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&dotted));
    }

    #[test]
    fn resolved_paths_include_packages() {
        let resolved = Resolved {
            assemblies: vec![PathBuf::from("/a/System.dll")],
            packages: vec![PackageAssets {
                id: "Foo".to_string(),
                version: NuGetVersion::new(1, 0, 0),
                assemblies: vec![PathBuf::from("/p/foo/1.0.0/lib/net8.0/Foo.dll")],
            }],
        };
        assert_eq!(resolved.paths().count(), 2);
        assert!(!resolved.is_empty());
        assert!(Resolved::default().is_empty());
    }
}
