//! Target framework monikers and the nearest-compatible framework reducer.
//!
//! Accepts both the short folder form used inside packages (`net8.0`,
//! `netstandard2.0`, `net472`, `net8.0-windows`) and the long form found in
//! nuspec dependency groups (`.NETStandard2.0`, `.NETCoreApp,Version=v3.1`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Framework family a moniker belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameworkFamily {
    /// `netcoreappX.Y` and `netX.Y` for X >= 5.
    NetCoreApp,
    NetStandard,
    /// The classic desktop framework (`net45`, `net472`, ...).
    NetFramework,
    /// Framework-agnostic assets (`any`, bare `lib/`).
    Any,
    /// A recognised-but-unsupported identifier (`portable-...`, `uap10.0`, ...).
    Other(String),
}

/// A parsed target framework.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetFramework {
    pub family: FrameworkFamily,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// OS platform suffix, lowercase and without its version (`windows`).
    pub platform: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid target framework")]
pub struct FrameworkParseError(pub String);

impl TargetFramework {
    pub fn net(major: u32, minor: u32) -> Self {
        Self {
            family: FrameworkFamily::NetCoreApp,
            major,
            minor,
            patch: 0,
            platform: None,
        }
    }

    pub fn net_standard(major: u32, minor: u32) -> Self {
        Self {
            family: FrameworkFamily::NetStandard,
            major,
            minor,
            patch: 0,
            platform: None,
        }
    }

    pub fn any() -> Self {
        Self {
            family: FrameworkFamily::Any,
            major: 0,
            minor: 0,
            patch: 0,
            platform: None,
        }
    }

    pub fn with_platform(mut self, platform: &str) -> Self {
        self.platform = Some(platform.to_ascii_lowercase());
        self
    }

    pub fn parse(input: &str) -> Result<Self, FrameworkParseError> {
        let err = || FrameworkParseError(input.to_string());
        let raw = input.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("any") || raw.eq_ignore_ascii_case("agnostic")
        {
            return Ok(Self::any());
        }

        let lower = raw.to_ascii_lowercase();
        let (body, platform) = match lower.split_once('-') {
            Some((b, p)) if !p.is_empty() => (b.to_string(), Some(strip_platform_version(p))),
            Some(_) => return Err(err()),
            None => (lower.clone(), None),
        };
        // `.NETCoreApp,Version=v3.1` -> `.netcoreapp3.1`
        let body = body.replace(",version=v", "").replace(",version=", "");

        let family_prefixes: [(&str, FrameworkFamily); 6] = [
            (".netcoreapp", FrameworkFamily::NetCoreApp),
            ("netcoreapp", FrameworkFamily::NetCoreApp),
            (".netstandard", FrameworkFamily::NetStandard),
            ("netstandard", FrameworkFamily::NetStandard),
            (".netframework", FrameworkFamily::NetFramework),
            ("net", FrameworkFamily::NetCoreApp),
        ];

        for (prefix, family) in family_prefixes {
            let Some(version) = body.strip_prefix(prefix) else {
                continue;
            };
            let Some((major, minor, patch)) = parse_framework_version(version) else {
                break;
            };
            let family = match family {
                // `net45`, `net472`, `net4.8` are the classic framework
                FrameworkFamily::NetCoreApp if prefix == "net" && major < 5 => {
                    FrameworkFamily::NetFramework
                }
                other => other,
            };
            return Ok(Self {
                family,
                major,
                minor,
                patch,
                platform,
            });
        }

        if body.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '+') {
            return Ok(Self {
                family: FrameworkFamily::Other(lower),
                major: 0,
                minor: 0,
                patch: 0,
                platform: None,
            });
        }
        Err(err())
    }

    /// `major.minor`, the only part of a moniker that participates in matching.
    pub fn version_prefix(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    fn version(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.patch)
    }

    /// Whether assets built for `candidate` can be consumed by `self`.
    pub fn is_compatible_with(&self, candidate: &TargetFramework) -> bool {
        compatibility_rank(self, candidate).is_some()
    }

    /// The nearest compatible framework among `candidates`.
    pub fn nearest<'a>(&self, candidates: &'a [TargetFramework]) -> Option<&'a TargetFramework> {
        self.nearest_by(candidates, |tfm| tfm)
    }

    /// Like [`TargetFramework::nearest`] for items carrying a framework.
    pub fn nearest_by<'a, T, F>(&self, items: &'a [T], framework_of: F) -> Option<&'a T>
    where
        F: Fn(&T) -> &TargetFramework,
    {
        items
            .iter()
            .filter_map(|item| compatibility_rank(self, framework_of(item)).map(|rank| (rank, item)))
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, item)| item)
    }
}

/// Ranking key for a compatible candidate; higher is nearer.
/// `(family preference, platform match, version)`.
fn compatibility_rank(
    requested: &TargetFramework,
    candidate: &TargetFramework,
) -> Option<(u8, bool, (u32, u32, u32))> {
    let platform_ok = match (&candidate.platform, &requested.platform) {
        (None, _) => true,
        (Some(c), Some(r)) => c == r,
        (Some(_), None) => false,
    };
    if !platform_ok {
        return None;
    }
    let platform_match = candidate.platform.is_some();

    use FrameworkFamily::*;
    let family_rank = match (&requested.family, &candidate.family) {
        (_, Any) => 0,
        (_, Other(_)) | (Other(_), _) => return None,
        (Any, _) => return None,
        (a, b) if a == b => {
            if candidate.version() > requested.version() {
                return None;
            }
            3
        }
        (NetCoreApp, NetStandard) => {
            if candidate.version() > max_netstandard_for_netcore(requested) {
                return None;
            }
            2
        }
        (NetFramework, NetStandard) => {
            let max = max_netstandard_for_netframework(requested)?;
            if candidate.version() > max {
                return None;
            }
            2
        }
        _ => return None,
    };
    Some((family_rank, platform_match, candidate.version()))
}

fn max_netstandard_for_netcore(requested: &TargetFramework) -> (u32, u32, u32) {
    match (requested.major, requested.minor) {
        (0..=1, _) => (1, 6, 0),
        (2, _) => (2, 0, 0),
        _ => (2, 1, 0),
    }
}

fn max_netstandard_for_netframework(requested: &TargetFramework) -> Option<(u32, u32, u32)> {
    match requested.version() {
        v if v >= (4, 6, 1) => Some((2, 0, 0)),
        v if v >= (4, 6, 0) => Some((1, 3, 0)),
        v if v >= (4, 5, 1) => Some((1, 2, 0)),
        v if v >= (4, 5, 0) => Some((1, 1, 0)),
        _ => None,
    }
}

/// `8.0` -> (8, 0, 0); `472` -> (4, 7, 2); `3.1` -> (3, 1, 0); `45` -> (4, 5, 0).
fn parse_framework_version(text: &str) -> Option<(u32, u32, u32)> {
    if text.is_empty() {
        return None;
    }
    let nums: Vec<u32> = if text.contains('.') {
        text.split('.')
            .map(|p| p.parse().ok())
            .collect::<Option<Vec<u32>>>()?
    } else {
        if !text.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // Compact form: every digit is a component, except `net10`-style
        // two digit majors which only appear with a dot.
        text.chars().filter_map(|c| c.to_digit(10)).collect()
    };
    Some((
        *nums.first()?,
        nums.get(1).copied().unwrap_or(0),
        nums.get(2).copied().unwrap_or(0),
    ))
}

/// `windows10.0.19041.0` -> `windows`
fn strip_platform_version(platform: &str) -> String {
    platform
        .trim_end_matches(|c: char| c.is_ascii_digit() || c == '.')
        .to_string()
}

impl fmt::Display for TargetFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.family {
            FrameworkFamily::NetCoreApp if self.major >= 5 => {
                write!(f, "net{}.{}", self.major, self.minor)?
            }
            FrameworkFamily::NetCoreApp => write!(f, "netcoreapp{}.{}", self.major, self.minor)?,
            FrameworkFamily::NetStandard => write!(f, "netstandard{}.{}", self.major, self.minor)?,
            FrameworkFamily::NetFramework => {
                write!(f, "net{}{}", self.major, self.minor)?;
                if self.patch > 0 {
                    write!(f, "{}", self.patch)?;
                }
            }
            FrameworkFamily::Any => f.write_str("any")?,
            FrameworkFamily::Other(name) => f.write_str(name)?,
        }
        if let Some(ref platform) = self.platform {
            write!(f, "-{platform}")?;
        }
        Ok(())
    }
}

impl FromStr for TargetFramework {
    type Err = FrameworkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TargetFramework {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TargetFramework {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
