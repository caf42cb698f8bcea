//! Feed selection from a `NuGet.config` file.

use std::path::Path;

use dexec_core::config::DEFAULT_FEED;
use dexec_util::errors::{DexecError, DexecResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Key under which the default feed is registered.
pub const DEFAULT_FEED_KEY: &str = "nuget.org";

/// An active package source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSource {
    pub name: String,
    pub url: String,
}

impl PackageSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    pub fn nuget_org() -> Self {
        Self::new(DEFAULT_FEED_KEY, DEFAULT_FEED)
    }
}

/// Active sources from an optional config file; the default feed alone when
/// there is none.
pub fn load_sources(config_file: Option<&Path>) -> DexecResult<Vec<PackageSource>> {
    let Some(path) = config_file else {
        return Ok(vec![PackageSource::nuget_org()]);
    };
    let xml = std::fs::read_to_string(path).map_err(|e| DexecError::Config {
        message: format!("Failed to read {}: {e}", path.display()),
    })?;
    parse_sources(&xml).map_err(|e| DexecError::Config {
        message: format!("{}: {e}", path.display()),
    })
}

/// Parse `<packageSources>` and `<disabledPackageSources>`.
///
/// Without `<clear/>` the listed sources extend the default feed. Only v3
/// (`index.json`) sources are kept.
pub fn parse_sources(xml: &str) -> Result<Vec<PackageSource>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut sources = vec![PackageSource::nuget_org()];
    let mut disabled: Vec<String> = Vec::new();

    loop {
        let (e, empty) = match reader.read_event() {
            Ok(Event::Start(e)) => (e, false),
            Ok(Event::Empty(e)) => (e, true),
            Ok(Event::End(_)) => {
                path.pop();
                continue;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("invalid NuGet.config: {e}")),
            _ => continue,
        };
        path.push(String::from_utf8_lossy(e.local_name().as_ref()).to_string());
        match path.join(">").as_str() {
            "configuration>packageSources>clear" => sources.clear(),
            "configuration>packageSources>add" => {
                if let (Some(key), Some(value)) = (attr(&e, "key"), attr(&e, "value")) {
                    sources.retain(|s| !s.name.eq_ignore_ascii_case(&key));
                    sources.push(PackageSource::new(key, value));
                }
            }
            "configuration>disabledPackageSources>add" => {
                let is_disabled = attr(&e, "value").is_some_and(|v| v.eq_ignore_ascii_case("true"));
                if let (Some(key), true) = (attr(&e, "key"), is_disabled) {
                    disabled.push(key);
                }
            }
            _ => {}
        }
        if empty {
            path.pop();
        }
    }

    sources.retain(|s| {
        if disabled.iter().any(|d| d.eq_ignore_ascii_case(&s.name)) {
            tracing::debug!("Package source {} is disabled", s.name);
            return false;
        }
        if !is_v3(&s.url) {
            tracing::warn!("Skipping package source {} ({}): not a v3 feed", s.name, s.url);
            return false;
        }
        true
    });
    Ok(sources)
}

fn is_v3(url: &str) -> bool {
    (url.starts_with("https://") || url.starts_with("http://"))
        && url.trim_end_matches('/').ends_with("index.json")
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.trim().to_string()))
}
