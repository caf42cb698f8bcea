use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Scratch home, fake SDK root, empty package cache and a NuGet.config
/// without sources, so nothing touches the network or the real machine.
struct Sandbox {
    home: TempDir,
    sdk: TempDir,
    packages: TempDir,
}

fn touch(root: &Path, rel: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"MZ").unwrap();
}

impl Sandbox {
    fn new() -> Self {
        let sdk = TempDir::new().unwrap();
        let root = sdk.path();
        touch(root, "sdk/8.0.100/dotnet.dll");
        touch(root, "shared/Microsoft.NETCore.App/8.0.5/System.Runtime.dll");
        touch(root, "shared/Microsoft.NETCore.App/8.0.5/System.Console.dll");
        touch(root, "shared/Microsoft.AspNetCore.App/8.0.5/Microsoft.AspNetCore.Mvc.dll");
        touch(root, "shared/Microsoft.AspNetCore.App/8.0.5/Microsoft.Extensions.Logging.dll");
        touch(root, "packs/Microsoft.NETCore.App.Ref/8.0.5/ref/net8.0/System.Runtime.dll");
        touch(
            root,
            "packs/Microsoft.NETCore.App.Ref/8.0.5/analyzers/dotnet/cs/System.Text.Json.SourceGeneration.dll",
        );

        let home = TempDir::new().unwrap();
        fs::write(
            home.path().join("NuGet.config"),
            "<configuration><packageSources><clear /></packageSources></configuration>",
        )
        .unwrap();

        Self {
            home,
            sdk,
            packages: TempDir::new().unwrap(),
        }
    }

    #[allow(deprecated)]
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("dexec").unwrap();
        cmd.env("HOME", self.home.path())
            .env("DOTNET_ROOT", self.sdk.path())
            .env("NUGET_PACKAGES", self.packages.path())
            .env("DEXEC_NUGET_CONFIG", self.home.path().join("NuGet.config"))
            .env_remove("DEXEC_CONFIG")
            .env_remove("RUST_LOG")
            .current_dir(self.home.path());
        cmd
    }
}

#[test]
fn test_help_lists_commands() {
    Sandbox::new()
        .cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("resolve"))
        .stdout(predicate::str::contains("analyzers"))
        .stdout(predicate::str::contains("versions"));
}

#[test]
fn test_resolve_without_references_prints_default_framework() {
    Sandbox::new()
        .cmd()
        .args(["resolve"])
        .assert()
        .success()
        .stdout(predicate::str::contains("System.Runtime.dll"))
        .stdout(predicate::str::contains("System.Console.dll"));
}

#[test]
fn test_resolve_compile_uses_reference_pack() {
    Sandbox::new()
        .cmd()
        .args(["resolve", "--compile"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Microsoft.NETCore.App.Ref"))
        .stdout(predicate::str::contains("System.Console.dll").not());
}

#[test]
fn test_resolve_relative_folder() {
    let sandbox = Sandbox::new();
    touch(sandbox.home.path(), "libs/Local.dll");

    sandbox
        .cmd()
        .args(["resolve", "folder: libs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Local.dll"));
}

#[test]
fn test_resolve_removal_token() {
    let sandbox = Sandbox::new();
    touch(sandbox.home.path(), "libs/Local.dll");

    sandbox
        .cmd()
        .args(["resolve", "--", "file: libs/Local.dll", "-file: libs/Local.dll"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Local.dll").not());
}

#[test]
fn test_resolve_unknown_schema_fails() {
    Sandbox::new()
        .cmd()
        .args(["resolve", "gem: rails"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("System.Runtime.dll"))
        .stderr(predicate::str::contains("Unsupported reference kind 'gem'"));
}

#[test]
fn test_resolve_missing_package_fails() {
    Sandbox::new()
        .cmd()
        .args(["resolve", "nuget: Not.On.Any.Feed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No versions found for package Not.On.Any.Feed"));
}

#[test]
fn test_resolve_rejects_non_net_framework() {
    Sandbox::new()
        .cmd()
        .args(["resolve", "-f", "banana"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a .NET target framework"));
}

#[test]
fn test_resolve_wide_references() {
    Sandbox::new()
        .cmd()
        .args(["resolve", "--wide"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Microsoft.Extensions.Logging.dll"))
        .stdout(predicate::str::contains("Microsoft.AspNetCore.Mvc.dll").not());
}

#[test]
fn test_resolve_web() {
    Sandbox::new()
        .cmd()
        .args(["resolve", "--web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Microsoft.AspNetCore.Mvc.dll"));
}

#[test]
fn test_analyzers() {
    Sandbox::new()
        .cmd()
        .args(["analyzers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("System.Text.Json.SourceGeneration.dll"));
}
