//! Command dispatch and handler modules.

mod resolve;
mod sdk;
mod search;
mod tree;
mod versions;

use std::path::Path;

use dexec_core::config::GlobalConfig;
use dexec_core::framework::{FrameworkFamily, TargetFramework};
use dexec_util::cancel::CancelToken;
use dexec_util::errors::DexecError;
use miette::Result;

use crate::cli::{Cli, Command};

/// Route a parsed CLI invocation to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let cancel = cancel_on_ctrl_c();
    match cli.command {
        Command::Resolve {
            references,
            target,
            compile,
            wide,
            web,
            no_cache,
        } => {
            let opts = resolve::ResolveOptions {
                framework: target.framework,
                prerelease: target.prerelease,
                compile,
                wide,
                web,
                no_cache,
            };
            resolve::exec(config, &references, &opts, &cancel).await
        }
        Command::Analyzers { references, target } => {
            let opts = resolve::ResolveOptions {
                framework: target.framework,
                prerelease: target.prerelease,
                ..Default::default()
            };
            resolve::exec_analyzers(config, &references, &opts, &cancel).await
        }
        Command::Tree {
            package,
            version,
            target,
            depth,
            why,
        } => {
            tree::exec(
                config,
                &package,
                version.as_deref(),
                &target.framework,
                target.prerelease,
                depth,
                why.as_deref(),
                &cancel,
            )
            .await
        }
        Command::Versions { package, prerelease } => {
            versions::exec(config, &package, prerelease, &cancel).await
        }
        Command::Search {
            query,
            take,
            prerelease,
        } => search::exec(config, &query, take, prerelease, &cancel).await,
        Command::Sdk => sdk::exec(&config),
    }
}

fn load_config(path: Option<&Path>) -> Result<GlobalConfig> {
    let config = match path {
        Some(path) => GlobalConfig::load_from(path)?,
        None => GlobalConfig::load()?,
    };
    Ok(config)
}

/// A token cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupted");
            signal.cancel();
        }
    });
    cancel
}

/// Only `netX.Y` monikers (optionally with a platform) can be run.
fn parse_framework(moniker: &str) -> Result<TargetFramework> {
    let framework = TargetFramework::parse(moniker).map_err(|e| DexecError::Config {
        message: e.to_string(),
    })?;
    if framework.family != FrameworkFamily::NetCoreApp {
        return Err(DexecError::Config {
            message: format!("'{moniker}' is not a .NET target framework such as net8.0"),
        }
        .into());
    }
    Ok(framework)
}
