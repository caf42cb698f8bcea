//! The resolution facade used once per invocation.
//!
//! Every reference (and every implied framework) is resolved as its own task;
//! results are joined, unified across references and cached per request.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use dexec_core::config::GlobalConfig;
use dexec_core::framework::TargetFramework;
use dexec_core::reference::{FrameworkName, Reference, ReferenceKind};
use dexec_core::version::NuGetVersion;
use dexec_util::cancel::CancelToken;
use dexec_util::errors::{DexecError, DexecResult};
use tokio::sync::OnceCell;
use tokio::task::JoinSet;

use crate::dispatch::{ReferenceResolver, ResolverFactory};
use crate::environment::ResolverEnvironment;
use crate::outcome::{
    AssetMode, ReferenceFailure, ResolutionOutcome, ResolveRequest, Resolved, ResolvedReferenceSet,
};

/// Infrastructure assemblies added from the web framework with wide references.
pub const WIDE_REFERENCE_PREFIXES: &[&str] = &[
    "Microsoft.Extensions.DependencyInjection",
    "Microsoft.Extensions.Logging",
    "Microsoft.Extensions.Configuration",
    "Microsoft.Extensions.Options",
    "System.Text.Json",
];

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub framework: TargetFramework,
    pub include_prerelease: bool,
    pub wide_references: bool,
    /// Resolve the web framework even without a `framework: web` reference.
    pub include_web: bool,
    /// Off only for diagnostics: every call resolves from scratch.
    pub use_cache: bool,
}

impl SessionOptions {
    pub fn new(framework: TargetFramework) -> Self {
        Self {
            framework,
            include_prerelease: false,
            wide_references: false,
            include_web: false,
            use_cache: true,
        }
    }

    pub fn from_config(config: &GlobalConfig, framework: TargetFramework) -> Self {
        Self {
            include_prerelease: config.nuget.include_prerelease,
            wide_references: config.resolve.wide_references,
            use_cache: config.resolve.cache,
            ..Self::new(framework)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    mode: AssetMode,
    framework: TargetFramework,
    references: Vec<String>,
}

type CacheCell = Arc<OnceCell<Arc<ResolutionOutcome>>>;

/// One unit of concurrent work.
struct Unit {
    label: String,
    reference: Reference,
    resolver: Arc<dyn ReferenceResolver>,
    wide_only: bool,
}

pub struct ResolutionSession {
    factory: Arc<ResolverFactory>,
    options: SessionOptions,
    cache: Mutex<HashMap<CacheKey, CacheCell>>,
}

impl ResolutionSession {
    pub fn new(factory: Arc<ResolverFactory>, options: SessionOptions) -> Self {
        Self {
            factory,
            options,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// A session over the standard resolvers of `env`.
    pub fn from_environment(env: &ResolverEnvironment, framework: TargetFramework) -> Self {
        let options = SessionOptions::from_config(env.config(), framework);
        Self::new(Arc::new(ResolverFactory::from_environment(env)), options)
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Compile (`compile`) or run-time assemblies for `references` plus the
    /// implied frameworks.
    ///
    /// Per-reference failures are collected in the outcome. Only cancellation
    /// fails the call, and a cancelled result is never cached.
    pub async fn resolve_references<S: AsRef<str>>(
        &self,
        references: &[S],
        compile: bool,
        cancel: &CancelToken,
    ) -> DexecResult<Arc<ResolutionOutcome>> {
        self.cached(AssetMode::from_compile_flag(compile), references, cancel)
            .await
    }

    /// Analyzers and source generators for `references` plus the implied
    /// frameworks.
    pub async fn resolve_analyzer_references<S: AsRef<str>>(
        &self,
        references: &[S],
        cancel: &CancelToken,
    ) -> DexecResult<Arc<ResolutionOutcome>> {
        self.cached(AssetMode::Analyzers, references, cancel).await
    }

    async fn cached<S: AsRef<str>>(
        &self,
        mode: AssetMode,
        references: &[S],
        cancel: &CancelToken,
    ) -> DexecResult<Arc<ResolutionOutcome>> {
        let texts: Vec<String> = references
            .iter()
            .map(|r| r.as_ref().trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if !self.options.use_cache {
            return self.run(mode, &texts, cancel).await.map(Arc::new);
        }

        let mut sorted = texts.clone();
        sorted.sort();
        sorted.dedup();
        let key = CacheKey {
            mode,
            framework: self.options.framework.clone(),
            references: sorted,
        };
        let cell = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone();
        if cell.initialized() {
            tracing::debug!("{mode} references for {}: session cache hit", self.options.framework);
        }
        let outcome = cell
            .get_or_try_init(|| async { self.run(mode, &texts, cancel).await.map(Arc::new) })
            .await?;
        Ok(outcome.clone())
    }

    async fn run(
        &self,
        mode: AssetMode,
        references: &[String],
        cancel: &CancelToken,
    ) -> DexecResult<ResolutionOutcome> {
        cancel.check()?;
        let request = ResolveRequest::new(self.options.framework.clone(), mode)
            .with_prerelease(self.options.include_prerelease);
        let mut failures = Vec::new();
        let (units, frameworks) = self.plan(references, &mut failures);

        let mut join_set = JoinSet::new();
        for (i, unit) in units.iter().enumerate() {
            let resolver = unit.resolver.clone();
            let reference = unit.reference.clone();
            let request = request.clone();
            let cancel = cancel.clone();
            join_set.spawn(async move {
                let result = resolver.resolve(&reference, &request, &cancel).await;
                (i, result)
            });
        }

        let mut results: Vec<Resolved> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let (i, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    failures.push(ReferenceFailure {
                        reference: "<task>".to_string(),
                        error: DexecError::Generic {
                            message: format!("Resolution task failed: {e}"),
                        },
                    });
                    continue;
                }
            };
            let unit = &units[i];
            match result {
                Ok(mut resolved) => {
                    if unit.wide_only {
                        resolved.assemblies.retain(|p| is_wide_reference(p));
                    }
                    if resolved.is_empty() && mode != AssetMode::Analyzers {
                        if let Reference::FrameworkReference { name } = &unit.reference {
                            // Only fatal when it is the sole framework requested.
                            if frameworks == 1 && !unit.wide_only {
                                failures.push(ReferenceFailure {
                                    reference: unit.label.clone(),
                                    error: DexecError::NoCompatibleFrameworkAsset {
                                        package: name.platform_name().to_string(),
                                        framework: request.framework.to_string(),
                                    },
                                });
                            }
                        }
                    }
                    results.push(resolved);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!("{}: {e}", unit.label);
                    failures.push(ReferenceFailure {
                        reference: unit.label.clone(),
                        error: e,
                    });
                }
            }
        }
        cancel.check()?;

        let references = unify(&results);
        tracing::info!(
            "Resolved {} {mode} assemblies for {} ({} failure(s))",
            references.len(),
            request.framework,
            failures.len()
        );
        Ok(ResolutionOutcome {
            references,
            failures,
        })
    }

    /// Split the input into units of work. Framework references are folded
    /// into the implied framework set; unparseable text becomes a failure.
    fn plan(&self, references: &[String], failures: &mut Vec<ReferenceFailure>) -> (Vec<Unit>, usize) {
        let mut frameworks: BTreeSet<FrameworkName> = BTreeSet::new();
        frameworks.insert(FrameworkName::Default);
        if is_windows(&self.options.framework) {
            frameworks.insert(FrameworkName::Desktop);
        }
        if self.options.include_web {
            frameworks.insert(FrameworkName::Web);
        }

        let mut units = Vec::new();
        let mut seen = BTreeSet::new();
        for text in references {
            let dispatched = match self.factory.dispatch(text) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("{text}: {e}");
                    failures.push(ReferenceFailure {
                        reference: text.clone(),
                        error: e,
                    });
                    continue;
                }
            };
            match dispatched.reference {
                Reference::FrameworkReference { name } => {
                    frameworks.insert(name);
                }
                reference => {
                    if seen.insert(reference.clone()) {
                        units.push(Unit {
                            label: reference.to_string(),
                            reference,
                            resolver: dispatched.resolver,
                            wide_only: false,
                        });
                    }
                }
            }
        }

        let framework_resolver = match self.factory.resolver_for(ReferenceKind::Framework) {
            Ok(resolver) => resolver,
            Err(e) => {
                failures.push(ReferenceFailure {
                    reference: ReferenceKind::Framework.schema().to_string(),
                    error: e,
                });
                return (units, frameworks.len());
            }
        };
        let wide = self.options.wide_references && !frameworks.contains(&FrameworkName::Web);
        for name in &frameworks {
            units.push(framework_unit(*name, &framework_resolver, false));
        }
        if wide {
            units.push(framework_unit(FrameworkName::Web, &framework_resolver, true));
        }
        (units, frameworks.len())
    }
}

fn framework_unit(name: FrameworkName, resolver: &Arc<dyn ReferenceResolver>, wide_only: bool) -> Unit {
    let reference = Reference::framework(name);
    Unit {
        label: reference.to_string(),
        reference,
        resolver: resolver.clone(),
        wide_only,
    }
}

fn is_windows(framework: &TargetFramework) -> bool {
    framework
        .platform
        .as_deref()
        .is_some_and(|p| p.starts_with("windows"))
}

fn is_wide_reference(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .is_some_and(|name| WIDE_REFERENCE_PREFIXES.iter().any(|p| name.starts_with(p)))
}

/// Merge per-reference results, keeping only the highest version of each
/// package id across all references.
fn unify(results: &[Resolved]) -> ResolvedReferenceSet {
    let mut highest: HashMap<String, &NuGetVersion> = HashMap::new();
    for package in results.iter().flat_map(|r| r.packages.iter()) {
        highest
            .entry(package.id.to_ascii_lowercase())
            .and_modify(|v| {
                if package.version > **v {
                    *v = &package.version;
                }
            })
            .or_insert(&package.version);
    }

    let mut set = ResolvedReferenceSet::new();
    for resolved in results {
        set.extend(&resolved.assemblies);
        for package in &resolved.packages {
            match highest.get(&package.id.to_ascii_lowercase()) {
                Some(v) if **v == package.version => set.extend(&package.assemblies),
                Some(v) => {
                    tracing::debug!("Dropping {} {} in favor of {v}", package.id, package.version);
                }
                None => {}
            }
        }
    }
    set
}
