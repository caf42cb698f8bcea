//! The package metadata client: feeds in front, the local cache behind.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dexec_core::config::GlobalConfig;
use dexec_core::framework::TargetFramework;
use dexec_core::version::NuGetVersion;
use dexec_util::cancel::CancelToken;
use dexec_util::errors::{DexecError, DexecResult};

use crate::assets;
use crate::cache::PackageCache;
use crate::download::{build_client, HttpFetcher};
use crate::feed::{PackageFeed, SearchHit, V3Feed};
use crate::nuspec::{self, DependencyGroup};
use crate::source_config;

type PackageKey = (String, NuGetVersion);

/// Lists, describes and downloads packages across every configured feed.
///
/// Feeds are queried in configuration order. The feed that served each
/// package version is remembered for diagnostics.
pub struct PackageClient {
    feeds: Vec<Arc<dyn PackageFeed>>,
    cache: PackageCache,
    provenance: Mutex<HashMap<PackageKey, String>>,
}

impl PackageClient {
    pub fn new(feeds: Vec<Arc<dyn PackageFeed>>, cache: PackageCache) -> Self {
        Self {
            feeds,
            cache,
            provenance: Mutex::new(HashMap::new()),
        }
    }

    /// Build the client from global configuration: NuGet.config feeds,
    /// retry budget and package cache root.
    pub fn from_config(config: &GlobalConfig) -> DexecResult<Self> {
        let sources = source_config::load_sources(config.nuget_config_file().as_deref())?;
        let http = HttpFetcher::new(build_client()?, config.resolve.retries);
        let feeds = sources
            .into_iter()
            .map(|source| {
                tracing::debug!("Using package source {} ({})", source.name, source.url);
                Arc::new(V3Feed::new(source, http.clone())) as Arc<dyn PackageFeed>
            })
            .collect();
        Ok(Self::new(feeds, PackageCache::new(config.packages_root())))
    }

    pub fn cache(&self) -> &PackageCache {
        &self.cache
    }

    pub fn feed_names(&self) -> Vec<String> {
        self.feeds.iter().map(|f| f.name().to_string()).collect()
    }

    /// The feed a package version was fetched from in this process.
    pub fn provenance(&self, id: &str, version: &NuGetVersion) -> Option<String> {
        self.provenance
            .lock()
            .ok()?
            .get(&key(id, version))
            .cloned()
    }

    fn record(&self, id: &str, version: &NuGetVersion, feed: &str) {
        if let Ok(mut map) = self.provenance.lock() {
            map.entry(key(id, version)).or_insert_with(|| feed.to_string());
        }
    }

    /// Versions across all feeds, ascending, prerelease filtered.
    ///
    /// A feed that fails is skipped as long as another one answers. When all
    /// fail, versions already in the local cache are used before giving up.
    pub async fn list_versions(
        &self,
        id: &str,
        include_prerelease: bool,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<NuGetVersion>> {
        let mut all = BTreeSet::new();
        let mut answered = self.feeds.is_empty();
        let mut last_err = None;
        for feed in &self.feeds {
            match feed.list_versions(id, cancel).await {
                Ok(versions) => {
                    answered = true;
                    all.extend(versions);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!("{}: listing versions of {id} failed: {e}", feed.name());
                    last_err = Some(e);
                }
            }
        }
        if !answered {
            let cached = self.cached_versions(id);
            match last_err {
                Some(e) if cached.is_empty() => return Err(e),
                _ => {
                    tracing::warn!("Using locally cached versions of {id}");
                    all.extend(cached);
                }
            }
        }
        Ok(all
            .into_iter()
            .filter(|v| include_prerelease || !v.is_prerelease())
            .collect())
    }

    fn cached_versions(&self, id: &str) -> Vec<NuGetVersion> {
        let dir = self.cache.root().join(id.to_ascii_lowercase());
        dexec_util::fs::subdirectory_names(&dir)
            .iter()
            .filter_map(|name| NuGetVersion::parse(name).ok())
            .filter(|v| self.cache.is_downloaded(id, v))
            .collect()
    }

    /// Dependency groups from the cached nuspec, else from the first feed
    /// that has the package.
    pub async fn get_dependency_groups(
        &self,
        id: &str,
        version: &NuGetVersion,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<DependencyGroup>> {
        if let Some(spec) = self.cache.read_nuspec(id, version)? {
            tracing::debug!("{id} {version}: dependency groups from local cache");
            return Ok(spec.dependency_groups);
        }
        let mut last_err = None;
        for feed in &self.feeds {
            match feed.nuspec(id, version, cancel).await {
                Ok(Some(xml)) => {
                    self.record(id, version, feed.name());
                    return Ok(nuspec::parse_nuspec(&xml)?.dependency_groups);
                }
                Ok(None) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!("{}: nuspec of {id} {version} failed: {e}", feed.name());
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| not_found(id, version)))
    }

    /// Ensure the package is extracted in the local cache and return its folder.
    ///
    /// An existing folder is returned without network access.
    pub async fn download_package(
        &self,
        id: &str,
        version: &NuGetVersion,
        cancel: &CancelToken,
    ) -> DexecResult<PathBuf> {
        if self.cache.is_downloaded(id, version) {
            tracing::debug!("{id} {version}: cache hit");
            return Ok(self.cache.package_dir(id, version));
        }
        let mut last_err = None;
        for feed in &self.feeds {
            match feed.nupkg(id, version, cancel).await {
                Ok(Some(bytes)) => {
                    tracing::info!("Downloaded {id} {version} from {}", feed.name());
                    self.record(id, version, feed.name());
                    cancel.check()?;
                    return self.cache.install_nupkg(id, version, bytes, feed.name()).await;
                }
                Ok(None) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!("{}: download of {id} {version} failed: {e}", feed.name());
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| not_found(id, version)))
    }

    /// `lib/` (or `ref/` when `want_ref`) assemblies nearest to `framework`.
    pub async fn get_lib_or_ref_assemblies(
        &self,
        id: &str,
        version: &NuGetVersion,
        framework: &TargetFramework,
        want_ref: bool,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<PathBuf>> {
        let dir = self.download_package(id, version, cancel).await?;
        assets::lib_or_ref_assemblies(id, &dir, framework, want_ref)
    }

    /// `runtimes/<rid>/lib/<tfm>/` assemblies of a runtime pack.
    pub async fn get_runtime_assemblies(
        &self,
        id: &str,
        version: &NuGetVersion,
        framework: &TargetFramework,
        rid: &str,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<PathBuf>> {
        let dir = self.download_package(id, version, cancel).await?;
        let groups = assets::runtime_groups(&dir, rid)?;
        assets::select_nearest(id, &groups, framework)
    }

    pub async fn get_analyzer_assemblies(
        &self,
        id: &str,
        version: &NuGetVersion,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<PathBuf>> {
        let dir = self.download_package(id, version, cancel).await?;
        assets::analyzer_assemblies(&dir)
    }

    /// Package ids starting with `prefix`, merged across feeds.
    pub async fn autocomplete(
        &self,
        prefix: &str,
        include_prerelease: bool,
        take: usize,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<String>> {
        let mut ids: Vec<String> = Vec::new();
        for feed in &self.feeds {
            for id in feed.autocomplete(prefix, include_prerelease, take, cancel).await? {
                if !ids.iter().any(|known| known.eq_ignore_ascii_case(&id)) {
                    ids.push(id);
                }
            }
        }
        ids.truncate(take);
        Ok(ids)
    }

    pub async fn search(
        &self,
        query: &str,
        include_prerelease: bool,
        take: usize,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<SearchHit>> {
        let mut hits: Vec<SearchHit> = Vec::new();
        for feed in &self.feeds {
            for hit in feed.search(query, include_prerelease, take, cancel).await? {
                if !hits.iter().any(|h| h.id.eq_ignore_ascii_case(&hit.id)) {
                    hits.push(hit);
                }
            }
        }
        hits.truncate(take);
        Ok(hits)
    }
}

fn key(id: &str, version: &NuGetVersion) -> PackageKey {
    (id.to_ascii_lowercase(), version.clone())
}

fn not_found(id: &str, version: &NuGetVersion) -> DexecError {
    DexecError::PackageNotFound {
        package: id.to_string(),
        version: version.to_string(),
    }
}
