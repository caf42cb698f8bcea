//! Handler for `dexec tree`.

use std::sync::Arc;

use dexec_core::config::GlobalConfig;
use dexec_core::version::NuGetVersion;
use dexec_nuget::PackageClient;
use dexec_resolver::NuGetResolver;
use dexec_util::cancel::CancelToken;
use dexec_util::errors::DexecError;
use dexec_util::progress;
use miette::Result;

#[allow(clippy::too_many_arguments)]
pub async fn exec(
    config: GlobalConfig,
    package: &str,
    version: Option<&str>,
    framework: &str,
    prerelease: bool,
    depth: Option<usize>,
    why: Option<&str>,
    cancel: &CancelToken,
) -> Result<()> {
    let framework = super::parse_framework(framework)?;
    let version = version
        .map(|v| {
            NuGetVersion::parse(v).map_err(|e| DexecError::InvalidReference {
                reference: format!("{package} {v}"),
                message: e.to_string(),
            })
        })
        .transpose()?;
    let prerelease = prerelease || config.nuget.include_prerelease;
    let client = Arc::new(PackageClient::from_config(&config)?);
    let resolver = NuGetResolver::new(client).with_max_concurrency(config.resolve.max_concurrency);

    let spinner = progress::spinner(&format!("Resolving {package}"));
    let closure = async {
        let version = resolver
            .resolve_version(package, version.as_ref(), prerelease, cancel)
            .await?;
        resolver
            .resolve_closure(package, &version, &framework, prerelease, cancel)
            .await
    }
    .await;
    spinner.finish_and_clear();
    let closure = closure?;

    if let Some(target) = why {
        match closure.graph.find_path(target) {
            Some(path) => {
                let chain: Vec<String> = path.iter().map(|n| n.to_string()).collect();
                println!("{}", chain.join(" -> "));
            }
            None => println!("{target} is not a dependency of {}", closure.root),
        }
        return Ok(());
    }

    print!("{}", closure.graph.print_tree(depth));
    println!();
    println!("{}", closure.conflicts);
    Ok(())
}
