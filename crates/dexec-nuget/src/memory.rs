//! An in-process feed serving packages built in memory.
//!
//! Used to drive the client and resolver without network access. Every
//! remote call is counted so callers can assert on network behaviour.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use dexec_core::version::NuGetVersion;
use dexec_util::cancel::CancelToken;
use dexec_util::errors::{DexecError, DexecResult};

use crate::feed::{PackageFeed, SearchHit};

/// A package to publish into a [`MemoryFeed`].
#[derive(Debug, Clone)]
pub struct MemoryPackage {
    pub id: String,
    pub version: NuGetVersion,
    /// `(target framework or None for a flat list, [(dependency id, range)])`.
    pub groups: Vec<(Option<String>, Vec<(String, String)>)>,
    /// Archive entries besides the nuspec, e.g. `lib/net8.0/Foo.dll`.
    pub files: Vec<String>,
}

impl MemoryPackage {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            version: NuGetVersion::parse(version).unwrap_or_else(|_| NuGetVersion::new(0, 0, 0)),
            groups: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Add a dependency group.
    pub fn group(mut self, framework: &str, deps: &[(&str, &str)]) -> Self {
        self.groups.push((
            Some(framework.to_string()),
            deps.iter()
                .map(|(id, range)| (id.to_string(), range.to_string()))
                .collect(),
        ));
        self
    }

    /// Add an archive entry.
    pub fn file(mut self, path: &str) -> Self {
        self.files.push(path.to_string());
        self
    }

    /// Shorthand for `lib/<framework>/<id>.dll`.
    pub fn lib(self, framework: &str) -> Self {
        let path = format!("lib/{framework}/{}.dll", self.id);
        self.file(&path)
    }

    pub fn nuspec_xml(&self) -> String {
        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<package xmlns=\"http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd\">\n  <metadata>\n    <id>{}</id>\n    <version>{}</version>\n",
            self.id, self.version
        );
        if !self.groups.is_empty() {
            xml.push_str("    <dependencies>\n");
            for (framework, deps) in &self.groups {
                let open = match framework {
                    Some(f) => format!("      <group targetFramework=\"{f}\">\n"),
                    None => "      <group>\n".to_string(),
                };
                xml.push_str(&open);
                for (id, range) in deps {
                    xml.push_str(&format!(
                        "        <dependency id=\"{id}\" version=\"{range}\" />\n"
                    ));
                }
                xml.push_str("      </group>\n");
            }
            xml.push_str("    </dependencies>\n");
        }
        xml.push_str("  </metadata>\n</package>\n");
        xml
    }

    /// Build the `.nupkg` archive.
    pub fn to_nupkg(&self) -> DexecResult<Vec<u8>> {
        let zip_err = |e: zip::result::ZipError| DexecError::Generic {
            message: format!("Failed to build package archive: {e}"),
        };
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file(format!("{}.nuspec", self.id), options)
                .map_err(zip_err)?;
            zip.write_all(self.nuspec_xml().as_bytes())?;
            for file in &self.files {
                zip.start_file(file.as_str(), options).map_err(zip_err)?;
                zip.write_all(b"MZ")?;
            }
            zip.finish().map_err(zip_err)?;
        }
        Ok(buf.into_inner())
    }
}

/// Counters for each remote operation.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub list_versions: AtomicUsize,
    pub nuspec: AtomicUsize,
    pub nupkg: AtomicUsize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.list_versions.load(Ordering::SeqCst)
            + self.nuspec.load(Ordering::SeqCst)
            + self.nupkg.load(Ordering::SeqCst)
    }
}

/// In-memory [`PackageFeed`].
#[derive(Debug)]
pub struct MemoryFeed {
    name: String,
    packages: Mutex<BTreeMap<(String, NuGetVersion), MemoryPackage>>,
    pub calls: CallCounts,
}

impl MemoryFeed {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            packages: Mutex::new(BTreeMap::new()),
            calls: CallCounts::default(),
        }
    }

    pub fn publish(&self, package: MemoryPackage) -> &Self {
        if let Ok(mut packages) = self.packages.lock() {
            packages.insert(
                (package.id.to_ascii_lowercase(), package.version.clone()),
                package,
            );
        }
        self
    }

    fn find(&self, id: &str, version: &NuGetVersion) -> Option<MemoryPackage> {
        self.packages
            .lock()
            .ok()?
            .get(&(id.to_ascii_lowercase(), version.clone()))
            .cloned()
    }

    fn ids(&self) -> Vec<(String, NuGetVersion)> {
        self.packages
            .lock()
            .map(|p| {
                p.values()
                    .map(|pkg| (pkg.id.clone(), pkg.version.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl PackageFeed for MemoryFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_versions(&self, id: &str, cancel: &CancelToken) -> DexecResult<Vec<NuGetVersion>> {
        cancel.check()?;
        self.calls.list_versions.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .ids()
            .into_iter()
            .filter(|(pkg, _)| pkg.eq_ignore_ascii_case(id))
            .map(|(_, v)| v)
            .collect())
    }

    async fn nuspec(
        &self,
        id: &str,
        version: &NuGetVersion,
        cancel: &CancelToken,
    ) -> DexecResult<Option<String>> {
        cancel.check()?;
        self.calls.nuspec.fetch_add(1, Ordering::SeqCst);
        Ok(self.find(id, version).map(|p| p.nuspec_xml()))
    }

    async fn nupkg(
        &self,
        id: &str,
        version: &NuGetVersion,
        cancel: &CancelToken,
    ) -> DexecResult<Option<Vec<u8>>> {
        cancel.check()?;
        self.calls.nupkg.fetch_add(1, Ordering::SeqCst);
        self.find(id, version).map(|p| p.to_nupkg()).transpose()
    }

    async fn autocomplete(
        &self,
        prefix: &str,
        include_prerelease: bool,
        take: usize,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<String>> {
        cancel.check()?;
        let prefix = prefix.to_ascii_lowercase();
        let mut ids: Vec<String> = self
            .ids()
            .into_iter()
            .filter(|(_, v)| include_prerelease || !v.is_prerelease())
            .map(|(id, _)| id)
            .filter(|id| id.to_ascii_lowercase().starts_with(&prefix))
            .collect();
        ids.dedup();
        ids.truncate(take);
        Ok(ids)
    }

    async fn search(
        &self,
        query: &str,
        include_prerelease: bool,
        take: usize,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<SearchHit>> {
        cancel.check()?;
        let query = query.to_ascii_lowercase();
        let mut latest: BTreeMap<String, SearchHit> = BTreeMap::new();
        for (id, version) in self.ids() {
            if !id.to_ascii_lowercase().contains(&query)
                || (!include_prerelease && version.is_prerelease())
            {
                continue;
            }
            latest.insert(
                id.to_ascii_lowercase(),
                SearchHit {
                    id,
                    version: version.to_string(),
                    description: String::new(),
                },
            );
        }
        Ok(latest.into_values().take(take).collect())
    }
}
