//! Handler for `dexec versions`.

use dexec_core::config::GlobalConfig;
use dexec_nuget::PackageClient;
use dexec_util::cancel::CancelToken;
use dexec_util::errors::DexecError;
use dexec_util::progress;
use miette::Result;

pub async fn exec(
    config: GlobalConfig,
    package: &str,
    prerelease: bool,
    cancel: &CancelToken,
) -> Result<()> {
    let client = PackageClient::from_config(&config)?;
    let versions = client
        .list_versions(package, prerelease || config.nuget.include_prerelease, cancel)
        .await?;
    if versions.is_empty() {
        return Err(DexecError::NoVersionsFound {
            package: package.to_string(),
        }
        .into());
    }
    for version in &versions {
        println!("{version}");
    }
    progress::status(
        "Listed",
        &format!("{} version(s) from {}", versions.len(), client.feed_names().join(", ")),
    );
    Ok(())
}
