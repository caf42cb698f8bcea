//! NuGet version parsing, comparison, and range matching.
//!
//! NuGet versions are SemVer 2.0 with an optional fourth `revision` part:
//! - Numeric parts compare as numbers; missing parts are `0`
//! - A release sorts above any prerelease of the same numbers
//! - Prerelease labels compare part by part: numeric parts numerically,
//!   text parts case-insensitively, numeric below text, shorter below longer
//! - Build metadata (`+...`) never participates in ordering

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A parsed NuGet package version.
#[derive(Debug, Clone)]
pub struct NuGetVersion {
    pub original: String,
    major: u64,
    minor: u64,
    patch: u64,
    revision: u64,
    release: Vec<String>,
    metadata: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid NuGet version")]
pub struct VersionParseError(pub String);

impl NuGetVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            original: format!("{major}.{minor}.{patch}"),
            major,
            minor,
            patch,
            revision: 0,
            release: Vec::new(),
            metadata: None,
        }
    }

    pub fn parse(version: &str) -> Result<Self, VersionParseError> {
        let err = || VersionParseError(version.to_string());
        let s = version.trim();
        if s.is_empty() {
            return Err(err());
        }

        let (rest, metadata) = match s.split_once('+') {
            Some((r, m)) if !m.is_empty() => (r, Some(m.to_string())),
            Some(_) => return Err(err()),
            None => (s, None),
        };
        let (numbers, release) = match rest.split_once('-') {
            Some((n, r)) => {
                let labels: Vec<String> = r.split('.').map(str::to_string).collect();
                if labels.iter().any(|l| l.is_empty() || !is_label(l)) {
                    return Err(err());
                }
                (n, labels)
            }
            None => (rest, Vec::new()),
        };

        let parts: Vec<&str> = numbers.split('.').collect();
        if parts.is_empty() || parts.len() > 4 {
            return Err(err());
        }
        let mut nums = [0u64; 4];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err());
            }
            *slot = part.parse().map_err(|_| err())?;
        }

        Ok(Self {
            original: s.to_string(),
            major: nums[0],
            minor: nums[1],
            patch: nums[2],
            revision: nums[3],
            release,
            metadata,
        })
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn is_prerelease(&self) -> bool {
        !self.release.is_empty()
    }

    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    /// Normalized form used for cache folders and feed URLs:
    /// three numeric parts (four when the revision is non-zero),
    /// prerelease labels kept, metadata dropped.
    pub fn normalized(&self) -> String {
        let mut s = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if self.revision > 0 {
            s.push_str(&format!(".{}", self.revision));
        }
        if !self.release.is_empty() {
            s.push('-');
            s.push_str(&self.release.join("."));
        }
        s
    }

    /// Whether `(major, minor)` equals the given pair.
    pub fn matches_major_minor(&self, major: u64, minor: u64) -> bool {
        self.major == major && self.minor == minor
    }
}

fn is_label(label: &str) -> bool {
    label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

impl fmt::Display for NuGetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

impl FromStr for NuGetVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for NuGetVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NuGetVersion {}

impl Hash for NuGetVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().to_ascii_lowercase().hash(state);
    }
}

impl Ord for NuGetVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch, self.revision)
            .cmp(&(other.major, other.minor, other.patch, other.revision))
            .then_with(|| compare_release(&self.release, &other.release))
    }
}

impl PartialOrd for NuGetVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_release(a: &[String], b: &[String]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    for (x, y) in a.iter().zip(b) {
        let ord = compare_label(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn compare_label(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()),
    }
}

impl Serialize for NuGetVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.normalized())
    }
}

impl<'de> Deserialize<'de> for NuGetVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A NuGet version range expression.
///
/// Supports: `1.0` (minimum, inclusive), `[1.0]` (exact), `[1.0,2.0)`,
/// `(,2.0]`, `[1.0, )`, and the floating form `1.*` (treated as `1.0`).
#[derive(Debug, Clone)]
pub struct VersionRange {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

#[derive(Debug, Clone)]
pub struct Bound {
    pub version: NuGetVersion,
    pub inclusive: bool,
}

impl VersionRange {
    /// Unbounded range; a dependency without a version attribute.
    pub fn all() -> Self {
        Self {
            lower: None,
            upper: None,
        }
    }

    /// Range with an inclusive minimum and no maximum.
    pub fn at_least(version: NuGetVersion) -> Self {
        Self {
            lower: Some(Bound {
                version,
                inclusive: true,
            }),
            upper: None,
        }
    }

    pub fn parse(spec: &str) -> Result<Self, VersionParseError> {
        let err = || VersionParseError(spec.to_string());
        let s = spec.trim();
        if s.is_empty() {
            return Err(err());
        }

        if !s.starts_with('[') && !s.starts_with('(') {
            let bare = if s.contains('*') {
                float_to_floor(s)
            } else {
                s.to_string()
            };
            return Ok(Self::at_least(NuGetVersion::parse(&bare)?));
        }

        let open_inclusive = s.starts_with('[');
        let close_inclusive = s.ends_with(']');
        if !(s.ends_with(']') || s.ends_with(')')) || s.len() < 2 {
            return Err(err());
        }
        let inner = &s[1..s.len() - 1];

        let bound = |text: &str, inclusive: bool| -> Result<Option<Bound>, VersionParseError> {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            Ok(Some(Bound {
                version: NuGetVersion::parse(text)?,
                inclusive,
            }))
        };

        match inner.split_once(',') {
            Some((lower, upper)) => Ok(Self {
                lower: bound(lower, open_inclusive)?,
                upper: bound(upper, close_inclusive)?,
            }),
            None => {
                // Exact version: [1.0] means exactly 1.0
                if !(open_inclusive && close_inclusive) {
                    return Err(err());
                }
                let v = NuGetVersion::parse(inner.trim())?;
                Ok(Self {
                    lower: Some(Bound {
                        version: v.clone(),
                        inclusive: true,
                    }),
                    upper: Some(Bound {
                        version: v,
                        inclusive: true,
                    }),
                })
            }
        }
    }

    /// The minimum version this range admits: an inclusive lower bound.
    ///
    /// `None` for ranges without a lower bound and for exclusive ones such as
    /// `(1.0, )`, whose bound is not itself a member.
    pub fn min_version(&self) -> Option<&NuGetVersion> {
        self.lower
            .as_ref()
            .filter(|b| b.inclusive)
            .map(|b| &b.version)
    }

    pub fn has_lower_bound(&self) -> bool {
        self.lower.is_some()
    }

    /// Check if a version satisfies this range.
    pub fn contains(&self, version: &NuGetVersion) -> bool {
        if let Some(ref lower) = self.lower {
            let cmp = version.cmp(&lower.version);
            if lower.inclusive {
                if cmp == Ordering::Less {
                    return false;
                }
            } else if cmp != Ordering::Greater {
                return false;
            }
        }
        if let Some(ref upper) = self.upper {
            let cmp = version.cmp(&upper.version);
            if upper.inclusive {
                if cmp == Ordering::Greater {
                    return false;
                }
            } else if cmp != Ordering::Less {
                return false;
            }
        }
        true
    }

    /// Highest of `candidates` satisfying the range.
    pub fn best_match<'a>(
        &self,
        candidates: impl IntoIterator<Item = &'a NuGetVersion>,
    ) -> Option<&'a NuGetVersion> {
        candidates.into_iter().filter(|v| self.contains(v)).max()
    }

    /// Lowest of `candidates` satisfying the range.
    pub fn lowest_match<'a>(
        &self,
        candidates: impl IntoIterator<Item = &'a NuGetVersion>,
    ) -> Option<&'a NuGetVersion> {
        candidates.into_iter().filter(|v| self.contains(v)).min()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.lower, &self.upper) {
            (Some(l), None) if l.inclusive => write!(f, "{}", l.version),
            (Some(l), Some(u)) if l.inclusive && u.inclusive && l.version == u.version => {
                write!(f, "[{}]", l.version)
            }
            (lower, upper) => {
                let open = if lower.as_ref().is_some_and(|b| b.inclusive) {
                    '['
                } else {
                    '('
                };
                let close = if upper.as_ref().is_some_and(|b| b.inclusive) {
                    ']'
                } else {
                    ')'
                };
                let lo = lower.as_ref().map(|b| b.version.to_string()).unwrap_or_default();
                let hi = upper.as_ref().map(|b| b.version.to_string()).unwrap_or_default();
                write!(f, "{open}{lo}, {hi}{close}")
            }
        }
    }
}

/// `1.*` -> `1.0`, `1.2.*` -> `1.2.0`, `*` -> `0.0`.
fn float_to_floor(spec: &str) -> String {
    let parts: Vec<&str> = spec
        .split('.')
        .map(|p| if p.contains('*') { "0" } else { p })
        .collect();
    let mut floor = parts.join(".");
    if !floor.contains('.') {
        floor.push_str(".0");
    }
    floor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> NuGetVersion {
        NuGetVersion::parse(s).unwrap()
    }

    #[test]
    fn basic_ordering() {
        assert!(v("1.0.0") < v("2.0.0"));
        assert!(v("1.0.0") < v("1.0.1"));
        assert!(v("1.0.1") < v("1.1.0"));
        assert!(v("13.0.1") < v("13.0.3"));
    }

    #[test]
    fn missing_parts_are_zero() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1.0.0.0"), v("1.0.0"));
        assert!(v("1.0.0.1") > v("1.0.0"));
    }

    #[test]
    fn prerelease_before_release() {
        assert!(v("1.0.0-beta") < v("1.0.0"));
        assert!(v("1.0.0-alpha") < v("1.0.0-beta"));
        assert!(v("1.0.0-rc.1") < v("1.0.0-rc.2"));
        assert!(v("1.0.0-rc.2") < v("1.0.0-rc.10"));
        assert!(v("1.0.0-rc") < v("1.0.0-rc.1"));
        assert!(v("1.0.0-1") < v("1.0.0-alpha"));
    }

    #[test]
    fn prerelease_labels_case_insensitive() {
        assert_eq!(v("1.0.0-Beta"), v("1.0.0-beta"));
    }

    #[test]
    fn metadata_ignored_for_ordering() {
        assert_eq!(v("1.0.0+abc"), v("1.0.0+def"));
        assert_eq!(v("1.0.0+abc").metadata(), Some("abc"));
    }

    #[test]
    fn normalized_form() {
        assert_eq!(v("1.0").normalized(), "1.0.0");
        assert_eq!(v("1.0.0.0").normalized(), "1.0.0");
        assert_eq!(v("1.2.3.4").normalized(), "1.2.3.4");
        assert_eq!(v("9.0.0-preview.7.24405.7+sha").normalized(), "9.0.0-preview.7.24405.7");
    }

    #[test]
    fn rejects_garbage() {
        assert!(NuGetVersion::parse("").is_err());
        assert!(NuGetVersion::parse("abc").is_err());
        assert!(NuGetVersion::parse("1.2.3.4.5").is_err());
        assert!(NuGetVersion::parse("1..2").is_err());
        assert!(NuGetVersion::parse("1.0-").is_err());
    }

    #[test]
    fn prerelease_flag() {
        assert!(v("8.0.0-rc.2.23479.6").is_prerelease());
        assert!(!v("8.0.0").is_prerelease());
    }

    #[test]
    fn bare_range_is_minimum() {
        let range = VersionRange::parse("1.0.72").unwrap();
        assert_eq!(range.min_version(), Some(&v("1.0.72")));
        assert!(range.contains(&v("2.0.0")));
        assert!(!range.contains(&v("1.0.71")));
    }

    #[test]
    fn open_upper_range() {
        let range = VersionRange::parse("[6.0.0, )").unwrap();
        assert!(range.contains(&v("6.0.0")));
        assert!(range.contains(&v("99.0.0")));
        assert!(!range.contains(&v("5.9.9")));
    }

    #[test]
    fn bounded_range() {
        let range = VersionRange::parse("[1.0,2.0)").unwrap();
        assert!(range.contains(&v("1.9.9")));
        assert!(!range.contains(&v("2.0")));
    }

    #[test]
    fn open_lower_range_has_no_minimum() {
        let range = VersionRange::parse("(,2.0]").unwrap();
        assert!(range.min_version().is_none());
        assert!(range.contains(&v("2.0")));
    }

    #[test]
    fn exact_range() {
        let range = VersionRange::parse("[1.5]").unwrap();
        assert!(range.contains(&v("1.5")));
        assert!(!range.contains(&v("1.6")));
        assert_eq!(range.to_string(), "[1.5.0]");
    }

    #[test]
    fn floating_range_floors() {
        let range = VersionRange::parse("1.*").unwrap();
        assert_eq!(range.min_version(), Some(&v("1.0.0")));
    }

    #[test]
    fn best_match_picks_highest_in_range() {
        let all = [v("1.0.0"), v("1.5.0"), v("2.0.0")];
        let range = VersionRange::parse("[1.0,2.0)").unwrap();
        assert_eq!(range.best_match(all.iter()), Some(&v("1.5.0")));
    }

    #[test]
    fn exclusive_lower_bound_is_not_a_minimum() {
        let range = VersionRange::parse("(1.0.0, )").unwrap();
        assert!(range.has_lower_bound());
        assert!(range.min_version().is_none());
        assert!(!range.contains(&v("1.0.0")));

        let all = [v("1.0.0"), v("1.5.0"), v("2.0.0")];
        assert_eq!(range.lowest_match(all.iter()), Some(&v("1.5.0")));
    }
}
