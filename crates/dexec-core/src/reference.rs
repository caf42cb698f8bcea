//! Reference declarations and their `"<schema>: <payload>"` text encoding.
//!
//! ```text
//! file: ./lib/Foo.dll
//! folder: /opt/plugins
//! nuget: Newtonsoft.Json, 13.0.3
//! framework: web
//! project: ../Shared/Shared.csproj
//! ```
//!
//! Text without a `:` is a file path. Whitespace around `:` and `,` is
//! insignificant.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use dexec_util::errors::DexecError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::version::NuGetVersion;

/// The closed set of reference variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferenceKind {
    File,
    Folder,
    NuGet,
    Framework,
    Project,
}

/// Fixed schema token for every kind. The only place schemas are spelled.
pub const SCHEMAS: [(ReferenceKind, &str); 5] = [
    (ReferenceKind::File, "file"),
    (ReferenceKind::Folder, "folder"),
    (ReferenceKind::NuGet, "nuget"),
    (ReferenceKind::Framework, "framework"),
    (ReferenceKind::Project, "project"),
];

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 5] = [
        ReferenceKind::File,
        ReferenceKind::Folder,
        ReferenceKind::NuGet,
        ReferenceKind::Framework,
        ReferenceKind::Project,
    ];

    pub fn schema(self) -> &'static str {
        SCHEMAS
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, schema)| *schema)
            .unwrap_or("file")
    }

    /// Look up a schema token, case-insensitively.
    pub fn from_schema(schema: &str) -> Option<Self> {
        let schema = schema.trim();
        SCHEMAS
            .iter()
            .find(|(_, s)| s.eq_ignore_ascii_case(schema))
            .map(|(kind, _)| *kind)
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.schema())
    }
}

/// Split reference text into `(kind, payload)` without interpreting the payload.
///
/// The text is split on the first `:` only. A single-letter schema followed
/// by a path separator is a Windows drive letter, not a schema.
pub fn split_schema(text: &str) -> Result<(ReferenceKind, &str), DexecError> {
    let text = text.trim();
    match text.split_once(':') {
        None => Ok((ReferenceKind::File, text)),
        Some((schema, rest)) if is_drive_letter(schema, rest) => Ok((ReferenceKind::File, text)),
        Some((schema, payload)) => {
            let kind = ReferenceKind::from_schema(schema).ok_or_else(|| {
                DexecError::UnsupportedReferenceKind {
                    schema: schema.trim().to_string(),
                }
            })?;
            Ok((kind, payload.trim()))
        }
    }
}

fn is_drive_letter(schema: &str, rest: &str) -> bool {
    schema.len() == 1
        && schema.chars().all(|c| c.is_ascii_alphabetic())
        && (rest.starts_with('\\') || rest.starts_with('/'))
}

/// Platform frameworks a `framework:` reference can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum FrameworkName {
    #[default]
    Default,
    Web,
    Desktop,
}

impl FrameworkName {
    pub const ALL: [FrameworkName; 3] = [Self::Default, Self::Web, Self::Desktop];

    /// Short name used in reference text.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Web => "web",
            Self::Desktop => "desktop",
        }
    }

    /// Shared framework name as installed by the SDK (`shared/<name>`).
    pub fn platform_name(self) -> &'static str {
        match self {
            Self::Default => "Microsoft.NETCore.App",
            Self::Web => "Microsoft.AspNetCore.App",
            Self::Desktop => "Microsoft.WindowsDesktop.App",
        }
    }

    /// Reference pack id, both as `packs/<id>` and as a NuGet package.
    pub fn ref_pack_name(self) -> String {
        format!("{}.Ref", self.platform_name())
    }

    /// Parse a framework name or one of its aliases. Empty means default.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "default" | "netcore" | "runtime" | "microsoft.netcore.app" => {
                Some(Self::Default)
            }
            "web" | "aspnetcore" | "aspnet" | "microsoft.aspnetcore.app" => Some(Self::Web),
            "desktop" | "windowsdesktop" | "winforms" | "wpf" | "microsoft.windowsdesktop.app" => {
                Some(Self::Desktop)
            }
            _ => None,
        }
    }
}

impl fmt::Display for FrameworkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reference declaration. Immutable for the invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reference {
    LocalFile { path: PathBuf },
    LocalFolder { path: PathBuf },
    NuGetPackage {
        id: String,
        version: Option<NuGetVersion>,
    },
    FrameworkReference { name: FrameworkName },
    ProjectReference { path: PathBuf },
}

impl Reference {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::LocalFile { path: path.into() }
    }

    pub fn nuget(id: impl Into<String>, version: Option<NuGetVersion>) -> Self {
        Self::NuGetPackage {
            id: id.into(),
            version,
        }
    }

    pub fn framework(name: FrameworkName) -> Self {
        Self::FrameworkReference { name }
    }

    pub fn kind(&self) -> ReferenceKind {
        match self {
            Self::LocalFile { .. } => ReferenceKind::File,
            Self::LocalFolder { .. } => ReferenceKind::Folder,
            Self::NuGetPackage { .. } => ReferenceKind::NuGet,
            Self::FrameworkReference { .. } => ReferenceKind::Framework,
            Self::ProjectReference { .. } => ReferenceKind::Project,
        }
    }

    /// Parse reference text (`"<schema>: <payload>"`).
    pub fn parse(text: &str) -> Result<Self, DexecError> {
        let (kind, payload) = split_schema(text)?;
        Self::from_payload(kind, payload).map_err(|message| DexecError::InvalidReference {
            reference: text.trim().to_string(),
            message,
        })
    }

    /// Build a reference of `kind` from an already stripped payload.
    pub fn from_payload(kind: ReferenceKind, payload: &str) -> Result<Self, String> {
        let payload = payload.trim();
        let require_path = |what: &str| -> Result<PathBuf, String> {
            if payload.is_empty() {
                Err(format!("{what} path is empty"))
            } else {
                Ok(PathBuf::from(payload))
            }
        };
        match kind {
            ReferenceKind::File => Ok(Self::LocalFile {
                path: require_path("file")?,
            }),
            ReferenceKind::Folder => Ok(Self::LocalFolder {
                path: require_path("folder")?,
            }),
            ReferenceKind::Project => Ok(Self::ProjectReference {
                path: require_path("project")?,
            }),
            ReferenceKind::Framework => FrameworkName::parse(payload)
                .map(|name| Self::FrameworkReference { name })
                .ok_or_else(|| format!("unknown framework '{payload}'")),
            ReferenceKind::NuGet => parse_nuget_payload(payload),
        }
    }

    /// Resolve a relative path payload against `base`. Package and framework
    /// references are returned unchanged.
    pub fn with_base_dir(self, base: &Path) -> Self {
        let absolutize = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };
        match self {
            Self::LocalFile { path } => Self::LocalFile {
                path: absolutize(path),
            },
            Self::LocalFolder { path } => Self::LocalFolder {
                path: absolutize(path),
            },
            Self::ProjectReference { path } => Self::ProjectReference {
                path: absolutize(path),
            },
            other => other,
        }
    }
}

fn parse_nuget_payload(payload: &str) -> Result<Reference, String> {
    let (id, version) = match payload.split_once(',') {
        Some((id, version)) => (id.trim(), Some(version.trim())),
        None => (payload, None),
    };
    if id.is_empty() {
        return Err("package id is empty".to_string());
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(format!("'{id}' is not a valid package id"));
    }
    let version = match version {
        None | Some("") => None,
        Some(v) => Some(NuGetVersion::parse(v).map_err(|e| e.to_string())?),
    };
    Ok(Reference::NuGetPackage {
        id: id.to_string(),
        version,
    })
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let schema = self.kind().schema();
        match self {
            Self::LocalFile { path } | Self::LocalFolder { path } | Self::ProjectReference { path } => {
                write!(f, "{schema}: {}", path.display())
            }
            Self::NuGetPackage { id, version: None } => write!(f, "{schema}: {id}"),
            Self::NuGetPackage {
                id,
                version: Some(v),
            } => write!(f, "{schema}: {id}, {v}"),
            Self::FrameworkReference { name } => write!(f, "{schema}: {name}"),
        }
    }
}

impl FromStr for Reference {
    type Err = DexecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Reference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Apply `-`-prefixed removal tokens to a list of reference texts.
///
/// `"-nuget: Foo"` removes any earlier reference equal to `nuget: Foo` once
/// both are parsed; tokens are processed in order so a later addition can
/// re-add a removed reference.
pub fn apply_removals<'a>(
    tokens: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<Reference>, DexecError> {
    let mut refs: Vec<Reference> = Vec::new();
    for token in tokens {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some(removed) = token.strip_prefix('-') {
            let removed = Reference::parse(removed)?;
            refs.retain(|r| !same_reference(r, &removed));
        } else {
            let added = Reference::parse(token)?;
            if !refs.contains(&added) {
                refs.push(added);
            }
        }
    }
    Ok(refs)
}

/// Removal of an unversioned package matches every version of that id.
fn same_reference(existing: &Reference, removed: &Reference) -> bool {
    match (existing, removed) {
        (
            Reference::NuGetPackage { id: a, .. },
            Reference::NuGetPackage {
                id: b,
                version: None,
            },
        ) => a.eq_ignore_ascii_case(b),
        _ => existing == removed,
    }
}
