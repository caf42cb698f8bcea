//! Handler for `dexec search`.

use dexec_core::config::GlobalConfig;
use dexec_nuget::PackageClient;
use dexec_util::cancel::CancelToken;
use miette::Result;

pub async fn exec(
    config: GlobalConfig,
    query: &str,
    take: usize,
    prerelease: bool,
    cancel: &CancelToken,
) -> Result<()> {
    let client = PackageClient::from_config(&config)?;
    let hits = client.search(query, prerelease, take, cancel).await?;
    if hits.is_empty() {
        println!("No packages match '{query}'.");
        return Ok(());
    }
    let width = hits.iter().map(|h| h.id.len()).max().unwrap_or(0);
    for hit in &hits {
        let description = hit.description.lines().next().unwrap_or_default();
        println!("{:<width$}  {:<12}  {description}", hit.id, hit.version);
    }
    Ok(())
}
