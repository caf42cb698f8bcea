//! Handlers for `dexec resolve` and `dexec analyzers`.

use std::sync::Arc;

use dexec_core::config::GlobalConfig;
use dexec_core::reference::{apply_removals, Reference};
use dexec_resolver::{ResolutionOutcome, ResolutionSession, ResolverEnvironment, ResolverFactory, SessionOptions};
use dexec_util::cancel::CancelToken;
use dexec_util::errors::DexecError;
use dexec_util::progress;
use miette::Result;

#[derive(Debug, Default)]
pub struct ResolveOptions {
    pub framework: String,
    pub prerelease: bool,
    pub compile: bool,
    pub wide: bool,
    pub web: bool,
    pub no_cache: bool,
}

pub async fn exec(
    config: GlobalConfig,
    references: &[String],
    opts: &ResolveOptions,
    cancel: &CancelToken,
) -> Result<()> {
    let (session, texts) = prepare(config, references, opts)?;
    let spinner = progress::spinner("Resolving references");
    let outcome = session.resolve_references(&texts, opts.compile, cancel).await;
    spinner.finish_and_clear();
    let outcome = outcome?;
    report(&outcome)
}

pub async fn exec_analyzers(
    config: GlobalConfig,
    references: &[String],
    opts: &ResolveOptions,
    cancel: &CancelToken,
) -> Result<()> {
    let (session, texts) = prepare(config, references, opts)?;
    let spinner = progress::spinner("Resolving analyzers");
    let outcome = session.resolve_analyzer_references(&texts, cancel).await;
    spinner.finish_and_clear();
    let outcome = outcome?;
    report(&outcome)
}

/// Build the session and the final reference list, with removals applied and
/// relative paths anchored at the working directory.
fn prepare(
    config: GlobalConfig,
    references: &[String],
    opts: &ResolveOptions,
) -> Result<(ResolutionSession, Vec<String>)> {
    let framework = super::parse_framework(&opts.framework)?;
    let cwd = std::env::current_dir().map_err(DexecError::Io)?;

    // Unparseable tokens are passed through so the session reports them
    // alongside the other failures.
    let (valid, invalid): (Vec<&str>, Vec<&str>) = references
        .iter()
        .map(String::as_str)
        .partition(|token| {
            let token = token.trim();
            Reference::parse(token.strip_prefix('-').unwrap_or(token)).is_ok()
        });
    let mut texts: Vec<String> = apply_removals(valid)?
        .into_iter()
        .map(|r| r.with_base_dir(&cwd).to_string())
        .collect();
    texts.extend(invalid.into_iter().map(str::to_string));

    let env = ResolverEnvironment::from_config(config)?;
    let mut options = SessionOptions::from_config(env.config(), framework);
    options.include_prerelease |= opts.prerelease;
    options.wide_references |= opts.wide;
    options.include_web = opts.web;
    if opts.no_cache {
        options.use_cache = false;
    }
    let session = ResolutionSession::new(Arc::new(ResolverFactory::from_environment(&env)), options);
    Ok((session, texts))
}

/// Paths go to stdout, one per line; failures to stderr.
fn report(outcome: &ResolutionOutcome) -> Result<()> {
    for path in outcome.references.iter() {
        println!("{}", path.display());
    }
    for failure in &outcome.failures {
        progress::status_error("error", &failure.to_string());
    }
    if outcome.is_success() {
        progress::status(
            "Resolved",
            &format!("{} assemblies", outcome.references.len()),
        );
        Ok(())
    } else {
        Err(DexecError::Generic {
            message: format!("{} reference(s) failed to resolve", outcome.failures.len()),
        }
        .into())
    }
}
