use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dexec_core::framework::TargetFramework;
use dexec_core::version::NuGetVersion;
use dexec_nuget::cache::PackageCache;
use dexec_nuget::memory::{MemoryFeed, MemoryPackage};
use dexec_nuget::{PackageClient, PackageFeed};
use dexec_resolver::{AssetMode, NuGetResolver, ResolveRequest};
use dexec_util::cancel::CancelToken;
use dexec_util::errors::DexecError;

fn v(s: &str) -> NuGetVersion {
    NuGetVersion::parse(s).unwrap()
}

fn resolver(feed: &Arc<MemoryFeed>, cache_root: &Path) -> NuGetResolver {
    let client = PackageClient::new(
        vec![feed.clone() as Arc<dyn PackageFeed>],
        PackageCache::new(cache_root),
    );
    NuGetResolver::new(Arc::new(client))
}

fn run_request() -> ResolveRequest {
    ResolveRequest::new(TargetFramework::net(8, 0), AssetMode::Run)
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    let mut names: Vec<String> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// Root -> A (B >= 1.0) and C (B >= 2.0).
fn diamond(feed: &MemoryFeed) {
    feed.publish(
        MemoryPackage::new("Root", "1.0.0")
            .group("net8.0", &[("A", "1.0.0"), ("C", "1.0.0")])
            .lib("net8.0"),
    )
    .publish(
        MemoryPackage::new("A", "1.0.0")
            .group("netstandard2.0", &[("B", "1.0.0")])
            .lib("netstandard2.0"),
    )
    .publish(
        MemoryPackage::new("C", "1.0.0")
            .group("netstandard2.0", &[("B", "2.0.0")])
            .lib("netstandard2.0"),
    )
    .publish(MemoryPackage::new("B", "1.0.0").lib("netstandard2.0"))
    .publish(MemoryPackage::new("B", "2.0.0").lib("netstandard2.0"));
}

#[tokio::test]
async fn test_highest_version_wins() {
    let cache = tempfile::tempdir().unwrap();
    let feed = Arc::new(MemoryFeed::new("mem"));
    diamond(&feed);
    let resolver = resolver(&feed, cache.path());

    let resolved = resolver
        .resolve_transitive("Root", Some(&v("1.0.0")), &run_request(), &CancelToken::new())
        .await
        .unwrap();

    let b: Vec<_> = resolved
        .packages
        .iter()
        .filter(|p| p.id.eq_ignore_ascii_case("B"))
        .collect();
    assert_eq!(b.len(), 1);
    assert_eq!(b[0].version, v("2.0.0"));

    let paths: Vec<PathBuf> = resolved.paths().cloned().collect();
    assert_eq!(file_names(&paths), vec!["A.dll", "B.dll", "C.dll", "Root.dll"]);
    let b_path = paths.iter().find(|p| p.ends_with("B.dll")).unwrap();
    assert!(b_path.to_string_lossy().contains("2.0.0"));
    assert!(!cache.path().join("b").join("1.0.0").exists());
}

#[tokio::test]
async fn test_conflicts_are_reported() {
    let cache = tempfile::tempdir().unwrap();
    let feed = Arc::new(MemoryFeed::new("mem"));
    diamond(&feed);
    let resolver = resolver(&feed, cache.path());

    let closure = resolver
        .resolve_closure("Root", &v("1.0.0"), &TargetFramework::net(8, 0), false, &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(closure.version_of("b"), Some(&v("2.0.0")));
    assert_eq!(closure.conflicts.len(), 1);
    let conflict = &closure.conflicts.conflicts[0];
    assert_eq!(conflict.requested, v("1.0.0"));
    assert_eq!(conflict.resolved, v("2.0.0"));

    let why: Vec<String> = closure
        .graph
        .find_path("B")
        .unwrap()
        .iter()
        .map(|n| n.id.clone())
        .collect();
    assert_eq!(why.first().map(String::as_str), Some("Root"));
    assert_eq!(why.last().map(String::as_str), Some("B"));
}

#[tokio::test]
async fn test_conflicts_reported_when_higher_request_merges_first() {
    let cache = tempfile::tempdir().unwrap();
    let feed = Arc::new(MemoryFeed::new("mem"));
    diamond(&feed);
    // Levels merge in id order; here the parent asking for B 2.0 sorts first.
    feed.publish(
        MemoryPackage::new("Root", "2.0.0")
            .group("net8.0", &[("Alpha", "1.0.0"), ("Zed", "1.0.0")])
            .lib("net8.0"),
    )
    .publish(
        MemoryPackage::new("Alpha", "1.0.0")
            .group("net8.0", &[("B", "2.0.0")])
            .lib("net8.0"),
    )
    .publish(
        MemoryPackage::new("Zed", "1.0.0")
            .group("net8.0", &[("B", "1.0.0")])
            .lib("net8.0"),
    );
    let resolver = resolver(&feed, cache.path());

    let closure = resolver
        .resolve_closure("Root", &v("2.0.0"), &TargetFramework::net(8, 0), false, &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(closure.version_of("B"), Some(&v("2.0.0")));
    assert_eq!(closure.conflicts.len(), 1);
    let conflict = &closure.conflicts.conflicts[0];
    assert_eq!(conflict.requested, v("1.0.0"));
    assert_eq!(conflict.resolved, v("2.0.0"));
    assert_eq!(conflict.requested_by, "Zed 1.0.0");
    assert!(closure.conflicts.to_string().contains("B requested 1.0.0 by Zed 1.0.0"));
}

#[tokio::test]
async fn test_exclusive_lower_bound_skips_the_bound() {
    let cache = tempfile::tempdir().unwrap();
    let feed = Arc::new(MemoryFeed::new("mem"));
    feed.publish(
        MemoryPackage::new("Root", "1.0.0")
            .group("net8.0", &[("B", "(1.0.0, )")])
            .lib("net8.0"),
    )
    .publish(MemoryPackage::new("B", "1.0.0").lib("net8.0"))
    .publish(MemoryPackage::new("B", "1.5.0").lib("net8.0"))
    .publish(MemoryPackage::new("B", "2.0.0").lib("net8.0"));
    let resolver = resolver(&feed, cache.path());

    let closure = resolver
        .resolve_closure("Root", &v("1.0.0"), &TargetFramework::net(8, 0), false, &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(closure.version_of("B"), Some(&v("1.5.0")));
}

#[tokio::test]
async fn test_unbounded_range_lists_versions_once() {
    let cache = tempfile::tempdir().unwrap();
    let feed = Arc::new(MemoryFeed::new("mem"));
    feed.publish(
        MemoryPackage::new("Root", "1.0.0")
            .group("net8.0", &[("A", "1.0.0"), ("C", "1.0.0")])
            .lib("net8.0"),
    )
    .publish(
        MemoryPackage::new("A", "1.0.0")
            .group("net8.0", &[("B", "(, 3.0.0)")])
            .lib("net8.0"),
    )
    .publish(
        MemoryPackage::new("C", "1.0.0")
            .group("net8.0", &[("B", "(, 3.0.0)")])
            .lib("net8.0"),
    )
    .publish(MemoryPackage::new("B", "1.0.0").lib("net8.0"))
    .publish(MemoryPackage::new("B", "2.0.0").lib("net8.0"))
    .publish(MemoryPackage::new("B", "3.0.0").lib("net8.0"));
    let resolver = resolver(&feed, cache.path());

    let closure = resolver
        .resolve_closure("Root", &v("1.0.0"), &TargetFramework::net(8, 0), false, &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(closure.version_of("B"), Some(&v("2.0.0")));
    assert!(closure.conflicts.is_empty());
    assert_eq!(feed.calls.list_versions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_package_without_dependencies() {
    let cache = tempfile::tempdir().unwrap();
    let feed = Arc::new(MemoryFeed::new("mem"));
    feed.publish(MemoryPackage::new("Solo", "3.1.0").lib("net6.0").lib("net462"));
    let resolver = resolver(&feed, cache.path());

    let resolved = resolver
        .resolve_transitive("Solo", Some(&v("3.1.0")), &run_request(), &CancelToken::new())
        .await
        .unwrap();
    let paths: Vec<PathBuf> = resolved.paths().cloned().collect();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].to_string_lossy().contains("net6.0"));
}

#[tokio::test]
async fn test_missing_version_picks_latest_stable() {
    let cache = tempfile::tempdir().unwrap();
    let feed = Arc::new(MemoryFeed::new("mem"));
    feed.publish(MemoryPackage::new("Foo", "1.0.0").lib("net8.0"))
        .publish(MemoryPackage::new("Foo", "1.2.0").lib("net8.0"))
        .publish(MemoryPackage::new("Foo", "2.0.0-preview.1").lib("net8.0"));
    let resolver = resolver(&feed, cache.path());
    let cancel = CancelToken::new();

    assert_eq!(
        resolver.resolve_version("Foo", None, false, &cancel).await.unwrap(),
        v("1.2.0")
    );
    assert_eq!(
        resolver.resolve_version("Foo", None, true, &cancel).await.unwrap(),
        v("2.0.0-preview.1")
    );
    let err = resolver
        .resolve_version("Nothing", None, false, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, DexecError::NoVersionsFound { .. }));
}

#[tokio::test]
async fn test_root_without_compatible_group() {
    let cache = tempfile::tempdir().unwrap();
    let feed = Arc::new(MemoryFeed::new("mem"));
    feed.publish(
        MemoryPackage::new("Legacy", "1.0.0")
            .group("net472", &[("Other", "1.0.0")])
            .lib("net472"),
    );
    let resolver = resolver(&feed, cache.path());

    let err = resolver
        .resolve_transitive("Legacy", Some(&v("1.0.0")), &run_request(), &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DexecError::NoSupportedFramework { .. }));
}

#[tokio::test]
async fn test_dependency_cycle_terminates() {
    let cache = tempfile::tempdir().unwrap();
    let feed = Arc::new(MemoryFeed::new("mem"));
    feed.publish(
        MemoryPackage::new("Root", "1.0.0")
            .group("net8.0", &[("A", "1.0.0")])
            .lib("net8.0"),
    )
    .publish(
        MemoryPackage::new("A", "1.0.0")
            .group("net8.0", &[("B", "1.0.0")])
            .lib("net8.0"),
    )
    .publish(
        MemoryPackage::new("B", "1.0.0")
            .group("net8.0", &[("A", "1.0.0"), ("Root", "0.5.0")])
            .lib("net8.0"),
    );
    let resolver = resolver(&feed, cache.path());

    let closure = resolver
        .resolve_closure("Root", &v("1.0.0"), &TargetFramework::net(8, 0), false, &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(closure.graph.len(), 3);
    assert_eq!(closure.version_of("Root"), Some(&v("1.0.0")));
    assert_eq!(feed.calls.nuspec.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_dependency_without_compatible_assets_is_skipped() {
    let cache = tempfile::tempdir().unwrap();
    let feed = Arc::new(MemoryFeed::new("mem"));
    feed.publish(
        MemoryPackage::new("Root", "1.0.0")
            .group("net8.0", &[("WinOnly", "1.0.0")])
            .lib("net8.0"),
    )
    .publish(MemoryPackage::new("WinOnly", "1.0.0").lib("net48"));
    let resolver = resolver(&feed, cache.path());

    let resolved = resolver
        .resolve_transitive("Root", Some(&v("1.0.0")), &run_request(), &CancelToken::new())
        .await
        .unwrap();
    let paths: Vec<PathBuf> = resolved.paths().cloned().collect();
    assert_eq!(file_names(&paths), vec!["Root.dll"]);
}

#[tokio::test]
async fn test_compile_mode_prefers_ref_assemblies() {
    let cache = tempfile::tempdir().unwrap();
    let feed = Arc::new(MemoryFeed::new("mem"));
    feed.publish(
        MemoryPackage::new("Split", "1.0.0")
            .file("lib/net8.0/Split.dll")
            .file("ref/net8.0/Split.dll"),
    );
    let resolver = resolver(&feed, cache.path());
    let request = ResolveRequest::new(TargetFramework::net(8, 0), AssetMode::Compile);

    let resolved = resolver
        .resolve_transitive("Split", Some(&v("1.0.0")), &request, &CancelToken::new())
        .await
        .unwrap();
    let paths: Vec<PathBuf> = resolved.paths().cloned().collect();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].to_string_lossy().contains("/ref/"));
}

#[tokio::test]
async fn test_second_resolution_hits_package_cache() {
    let cache = tempfile::tempdir().unwrap();
    let feed = Arc::new(MemoryFeed::new("mem"));
    diamond(&feed);
    let resolver = resolver(&feed, cache.path());
    let cancel = CancelToken::new();

    resolver
        .resolve_transitive("Root", Some(&v("1.0.0")), &run_request(), &cancel)
        .await
        .unwrap();
    assert_eq!(feed.calls.nupkg.load(Ordering::SeqCst), 4);
    let before = feed.calls.total();

    resolver
        .resolve_transitive("Root", Some(&v("1.0.0")), &run_request(), &cancel)
        .await
        .unwrap();
    assert_eq!(feed.calls.total(), before);
}

#[tokio::test]
async fn test_cancelled_resolution() {
    let cache = tempfile::tempdir().unwrap();
    let feed = Arc::new(MemoryFeed::new("mem"));
    diamond(&feed);
    let resolver = resolver(&feed, cache.path());
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = resolver
        .resolve_transitive("Root", Some(&v("1.0.0")), &run_request(), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}
