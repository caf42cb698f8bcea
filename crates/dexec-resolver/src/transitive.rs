//! Transitive NuGet resolution: "highest version wins" merge.
//!
//! The closure is walked level by level. Each level's dependency groups are
//! prefetched in parallel, then merged sequentially into the graph, which
//! holds exactly one node per package id at the highest version any parent
//! asked for. A `(id, version)` pair is expanded at most once; a node raised
//! to a higher version is expanded again at that version.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dexec_core::framework::TargetFramework;
use dexec_core::reference::{Reference, ReferenceKind};
use dexec_core::version::{NuGetVersion, VersionRange};
use dexec_nuget::nuspec::DependencyGroup;
use dexec_nuget::PackageClient;
use dexec_util::cancel::CancelToken;
use dexec_util::errors::{DexecError, DexecResult};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::conflict::{ConflictReport, VersionConflict};
use crate::dispatch::{wrong_kind, ReferenceResolver};
use crate::graph::{DepEdge, PackageGraph, PackageNode};
use crate::outcome::{AssetMode, PackageAssets, ResolveRequest, Resolved};

pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

type PackageKey = (String, NuGetVersion);

/// The merged dependency map of one root package.
#[derive(Debug)]
pub struct DependencyClosure {
    pub root: PackageNode,
    pub graph: PackageGraph,
    pub conflicts: ConflictReport,
}

impl DependencyClosure {
    /// The root and every dependency at its final version.
    pub fn packages(&self) -> Vec<PackageNode> {
        self.graph.packages().into_iter().cloned().collect()
    }

    pub fn version_of(&self, id: &str) -> Option<&NuGetVersion> {
        self.graph.find(id).map(|idx| &self.graph.node(idx).version)
    }
}

/// Resolves `nuget:` references through a [`PackageClient`].
pub struct NuGetResolver {
    client: Arc<PackageClient>,
    max_concurrency: usize,
}

impl NuGetResolver {
    pub fn new(client: Arc<PackageClient>) -> Self {
        Self {
            client,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn client(&self) -> &Arc<PackageClient> {
        &self.client
    }

    /// The requested version, or the highest listed one when absent.
    pub async fn resolve_version(
        &self,
        id: &str,
        version: Option<&NuGetVersion>,
        include_prerelease: bool,
        cancel: &CancelToken,
    ) -> DexecResult<NuGetVersion> {
        if let Some(v) = version {
            return Ok(v.clone());
        }
        let versions = self.client.list_versions(id, include_prerelease, cancel).await?;
        let latest = versions
            .into_iter()
            .max()
            .ok_or_else(|| DexecError::NoVersionsFound {
                package: id.to_string(),
            })?;
        tracing::debug!("{id}: latest version is {latest}");
        Ok(latest)
    }

    /// Compute the merged dependency map of `id` `version` for `framework`.
    ///
    /// The root version is pinned: dependencies back onto the root id are
    /// ignored.
    pub async fn resolve_closure(
        &self,
        id: &str,
        version: &NuGetVersion,
        framework: &TargetFramework,
        include_prerelease: bool,
        cancel: &CancelToken,
    ) -> DexecResult<DependencyClosure> {
        let mut graph = PackageGraph::new();
        let mut conflicts = ConflictReport::new();
        let root_idx = graph.upsert(id, version);
        graph.set_root(root_idx);
        let root_key = id.to_ascii_lowercase();

        let mut groups_by_package: HashMap<PackageKey, Vec<DependencyGroup>> = HashMap::new();
        let mut expanded: HashSet<PackageKey> = HashSet::new();
        let mut listed: HashMap<String, Vec<NuGetVersion>> = HashMap::new();
        let mut level: Vec<(String, NuGetVersion)> = vec![(id.to_string(), version.clone())];
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        while !level.is_empty() {
            cancel.check()?;
            // Raised since it was queued; the higher version is queued separately.
            level.retain(|(pkg_id, pkg_version)| {
                graph
                    .find(pkg_id)
                    .is_some_and(|idx| graph.node(idx).version == *pkg_version)
            });
            self.prefetch_groups(&level, &mut groups_by_package, &semaphore, cancel)
                .await?;

            let mut next: Vec<(String, NuGetVersion)> = Vec::new();
            for (pkg_id, pkg_version) in level {
                let key = (pkg_id.to_ascii_lowercase(), pkg_version.clone());
                let Some(parent_idx) = graph.find(&pkg_id) else {
                    continue;
                };
                if graph.node(parent_idx).version != pkg_version || !expanded.insert(key.clone()) {
                    continue;
                }
                let is_root = key.0 == root_key;
                let groups = groups_by_package.get(&key).map(Vec::as_slice).unwrap_or(&[]);
                if groups.is_empty() {
                    continue;
                }
                let Some(group) = framework.nearest_by(groups, |g| &g.target_framework) else {
                    if is_root {
                        return Err(DexecError::NoSupportedFramework {
                            package: pkg_id,
                            framework: framework.to_string(),
                        });
                    }
                    tracing::debug!("{pkg_id} {pkg_version}: no dependency group for {framework}");
                    continue;
                };
                let parent_label = graph.node(parent_idx).to_string();

                for dep in &group.dependencies {
                    if dep.id.eq_ignore_ascii_case(&root_key) {
                        continue;
                    }
                    let required = self
                        .required_version(&dep.id, &dep.range, include_prerelease, &mut listed, cancel)
                        .await?;
                    let dep_idx = graph.upsert(&dep.id, &required);
                    graph.add_edge(
                        parent_idx,
                        dep_idx,
                        DepEdge {
                            range: dep.range.clone(),
                        },
                    );
                    let merged = graph.node(dep_idx).version.clone();
                    if merged != required {
                        tracing::debug!(
                            "{}: {parent_label} requires {required}, using {merged}",
                            dep.id
                        );
                    }
                    // Every request is kept; `settle` drops the ones that won.
                    conflicts.add(VersionConflict {
                        package: graph.node(dep_idx).id.clone(),
                        requested: required.clone(),
                        resolved: merged.clone(),
                        requested_by: parent_label.clone(),
                    });
                    if merged == required
                        && !expanded.contains(&(dep.id.to_ascii_lowercase(), required.clone()))
                    {
                        next.push((dep.id.clone(), required));
                    }
                }
            }
            next.sort();
            next.dedup_by(|a, b| a.0.eq_ignore_ascii_case(&b.0) && a.1 == b.1);
            level = next;
        }

        // Requests made by a version that was later superseded are moot.
        let live: HashSet<String> = graph.packages().iter().map(|n| n.to_string()).collect();
        conflicts.conflicts.retain(|c| live.contains(&c.requested_by));
        conflicts.settle(|pkg| graph.find(pkg).map(|idx| graph.node(idx).version.clone()));
        if !conflicts.is_empty() {
            tracing::debug!("{id} {version}: {conflicts}");
        }
        Ok(DependencyClosure {
            root: graph.node(root_idx).clone(),
            graph,
            conflicts,
        })
    }

    /// The version a dependency range contributes to the merge: its inclusive
    /// lower bound, else a listed version inside the range. Listings are
    /// fetched once per package id in `listed`.
    ///
    /// An exclusive lower bound contributes the lowest listed version above
    /// it; a range without a lower bound contributes the highest match.
    async fn required_version(
        &self,
        id: &str,
        range: &VersionRange,
        include_prerelease: bool,
        listed: &mut HashMap<String, Vec<NuGetVersion>>,
        cancel: &CancelToken,
    ) -> DexecResult<NuGetVersion> {
        if let Some(min) = range.min_version() {
            return Ok(min.clone());
        }
        let versions = match listed.entry(id.to_ascii_lowercase()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let versions = self.client.list_versions(id, include_prerelease, cancel).await?;
                entry.insert(versions)
            }
        };
        let picked = if range.has_lower_bound() {
            range.lowest_match(versions.iter())
        } else {
            range.best_match(versions.iter())
        };
        picked.cloned().ok_or_else(|| DexecError::NoVersionsFound {
            package: format!("{id} {range}"),
        })
    }

    async fn prefetch_groups(
        &self,
        level: &[(String, NuGetVersion)],
        groups_by_package: &mut HashMap<PackageKey, Vec<DependencyGroup>>,
        semaphore: &Arc<Semaphore>,
        cancel: &CancelToken,
    ) -> DexecResult<()> {
        let missing: HashMap<PackageKey, &str> = level
            .iter()
            .map(|(id, v)| ((id.to_ascii_lowercase(), v.clone()), id.as_str()))
            .filter(|(key, _)| !groups_by_package.contains_key(key))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let mut join_set = JoinSet::new();
        for ((_, version), id) in missing {
            let id = id.to_string();
            let client = self.client.clone();
            let sem = semaphore.clone();
            let cancel = cancel.clone();
            join_set.spawn(async move {
                let _permit = sem.acquire().await;
                let result = client.get_dependency_groups(&id, &version, &cancel).await;
                ((id.to_ascii_lowercase(), version), result)
            });
        }
        while let Some(joined) = join_set.join_next().await {
            let (key, result) = joined.map_err(join_error)?;
            groups_by_package.insert(key, result?);
        }
        Ok(())
    }

    /// Assemblies of every package in the closure for `mode`, fetched in
    /// parallel.
    ///
    /// A dependency without compatible assets contributes nothing; the root
    /// without compatible assets is an error.
    pub async fn collect_assets(
        &self,
        closure: &DependencyClosure,
        framework: &TargetFramework,
        mode: AssetMode,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<PackageAssets>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut join_set = JoinSet::new();
        for node in closure.packages() {
            let client = self.client.clone();
            let sem = semaphore.clone();
            let cancel = cancel.clone();
            let framework = framework.clone();
            join_set.spawn(async move {
                let _permit = sem.acquire().await;
                let result = package_assemblies(&client, &node, &framework, mode, &cancel).await;
                (node, result)
            });
        }

        let mut collected = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let (node, result) = joined.map_err(join_error)?;
            let assemblies = match result {
                Ok(paths) => paths,
                Err(e @ DexecError::NoCompatibleFrameworkAsset { .. })
                    if !node.id.eq_ignore_ascii_case(&closure.root.id) =>
                {
                    tracing::warn!("{e}; skipping its assemblies");
                    Vec::new()
                }
                Err(e) => return Err(e),
            };
            collected.push(PackageAssets {
                id: node.id,
                version: node.version,
                assemblies,
            });
        }
        collected.sort_by_key(|p| p.id.to_ascii_lowercase());
        Ok(collected)
    }

    /// Resolve a package and its closure to assemblies.
    pub async fn resolve_transitive(
        &self,
        id: &str,
        version: Option<&NuGetVersion>,
        request: &ResolveRequest,
        cancel: &CancelToken,
    ) -> DexecResult<Resolved> {
        let version = self
            .resolve_version(id, version, request.include_prerelease, cancel)
            .await?;
        let closure = self
            .resolve_closure(id, &version, &request.framework, request.include_prerelease, cancel)
            .await?;
        tracing::info!(
            "{id} {version}: {} package(s) for {}",
            closure.graph.len(),
            request.framework
        );
        let packages = self
            .collect_assets(&closure, &request.framework, request.mode, cancel)
            .await?;
        for package in &packages {
            if let Some(feed) = self.client.provenance(&package.id, &package.version) {
                tracing::debug!("{} {} from {feed}", package.id, package.version);
            }
        }
        Ok(Resolved {
            assemblies: Vec::new(),
            packages,
        })
    }
}

async fn package_assemblies(
    client: &PackageClient,
    node: &PackageNode,
    framework: &TargetFramework,
    mode: AssetMode,
    cancel: &CancelToken,
) -> DexecResult<Vec<PathBuf>> {
    match mode {
        AssetMode::Compile => {
            client
                .get_lib_or_ref_assemblies(&node.id, &node.version, framework, true, cancel)
                .await
        }
        AssetMode::Run => {
            client
                .get_lib_or_ref_assemblies(&node.id, &node.version, framework, false, cancel)
                .await
        }
        AssetMode::Analyzers => {
            client
                .get_analyzer_assemblies(&node.id, &node.version, cancel)
                .await
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> DexecError {
    DexecError::Generic {
        message: format!("Resolution task failed: {e}"),
    }
}

#[async_trait]
impl ReferenceResolver for NuGetResolver {
    fn kind(&self) -> ReferenceKind {
        ReferenceKind::NuGet
    }

    async fn resolve(
        &self,
        reference: &Reference,
        request: &ResolveRequest,
        cancel: &CancelToken,
    ) -> DexecResult<Resolved> {
        let Reference::NuGetPackage { id, version } = reference else {
            return Err(wrong_kind(reference, self.kind()));
        };
        self.resolve_transitive(id, version.as_ref(), request, cancel)
            .await
    }
}
