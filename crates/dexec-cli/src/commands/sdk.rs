//! Handler for `dexec sdk`.

use dexec_core::config::GlobalConfig;
use dexec_sdk::discovery::runtime_identifier;
use dexec_sdk::{discover_sdk_root, SdkInstallation};
use miette::Result;

pub fn exec(config: &GlobalConfig) -> Result<()> {
    let root = discover_sdk_root(config.sdk_root_override().as_deref())?;
    let sdk = SdkInstallation::new(root);

    println!("Root: {}", sdk.root().display());
    println!("Runtime identifier: {}", runtime_identifier());

    let sdks = sdk.installed_sdks();
    println!("SDKs ({}):", sdks.len());
    for version in &sdks {
        println!("  {version}");
    }

    let runtimes = sdk.installed_runtimes();
    println!("Runtimes ({}):", runtimes.len());
    for (framework, version) in &runtimes {
        println!("  {framework} {version}");
    }
    Ok(())
}
