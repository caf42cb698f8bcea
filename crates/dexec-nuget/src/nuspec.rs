//! `.nuspec` parsing: package identity and framework-specific dependency groups.

use dexec_core::framework::TargetFramework;
use dexec_core::version::{NuGetVersion, VersionRange};
use dexec_util::errors::{DexecError, DexecResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// The subset of a nuspec the resolver needs.
#[derive(Debug, Clone, Default)]
pub struct Nuspec {
    pub id: Option<String>,
    pub version: Option<NuGetVersion>,
    pub description: Option<String>,
    pub dependency_groups: Vec<DependencyGroup>,
}

/// Dependencies a package declares for one target framework.
#[derive(Debug, Clone)]
pub struct DependencyGroup {
    pub target_framework: TargetFramework,
    pub dependencies: Vec<PackageDependency>,
}

/// A single `<dependency id=".." version=".."/>`.
#[derive(Debug, Clone)]
pub struct PackageDependency {
    pub id: String,
    pub range: VersionRange,
}

impl Nuspec {
    /// The dependency group nearest-compatible with `framework`.
    pub fn nearest_group(&self, framework: &TargetFramework) -> Option<&DependencyGroup> {
        framework.nearest_by(&self.dependency_groups, |g| &g.target_framework)
    }
}

/// Parse a nuspec document.
///
/// A flat `<dependencies>` list without `<group>` children becomes a single
/// framework-agnostic group.
pub fn parse_nuspec(xml: &str) -> DexecResult<Nuspec> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut spec = Nuspec::default();
    let mut path: Vec<String> = Vec::new();
    let mut text_buf = String::new();
    let mut current_group: Option<DependencyGroup> = None;
    let mut flat_deps: Vec<PackageDependency> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                path.push(local_name(e));
                text_buf.clear();
                on_open(e, &path, &mut current_group, &mut flat_deps)?;
            }
            Ok(Event::Empty(ref e)) => {
                path.push(local_name(e));
                on_open(e, &path, &mut current_group, &mut flat_deps)?;
                on_close(&path, &mut current_group, &mut spec);
                path.pop();
            }
            Ok(Event::Text(ref e)) => {
                text_buf = e.unescape().unwrap_or_default().to_string();
            }
            Ok(Event::End(_)) => {
                match path.join(">").as_str() {
                    "package>metadata>id" => spec.id = Some(text_buf.trim().to_string()),
                    "package>metadata>version" => {
                        spec.version = NuGetVersion::parse(text_buf.trim()).ok();
                    }
                    "package>metadata>description" => {
                        spec.description = Some(text_buf.trim().to_string());
                    }
                    _ => on_close(&path, &mut current_group, &mut spec),
                }
                path.pop();
                text_buf.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DexecError::Generic {
                    message: format!("Failed to parse nuspec: {e}"),
                });
            }
            _ => {}
        }
    }

    if spec.dependency_groups.is_empty() && !flat_deps.is_empty() {
        spec.dependency_groups.push(DependencyGroup {
            target_framework: TargetFramework::any(),
            dependencies: flat_deps,
        });
    }
    Ok(spec)
}

fn on_open(
    e: &BytesStart<'_>,
    path: &[String],
    current_group: &mut Option<DependencyGroup>,
    flat_deps: &mut Vec<PackageDependency>,
) -> DexecResult<()> {
    match path.join(">").as_str() {
        "package>metadata>dependencies>group" => {
            let target_framework = match attr(e, "targetFramework") {
                Some(tfm) => TargetFramework::parse(&tfm).map_err(|e| DexecError::Generic {
                    message: format!("Failed to parse nuspec: {e}"),
                })?,
                None => TargetFramework::any(),
            };
            *current_group = Some(DependencyGroup {
                target_framework,
                dependencies: Vec::new(),
            });
        }
        "package>metadata>dependencies>group>dependency" => {
            if let (Some(group), Some(dep)) = (current_group.as_mut(), dependency(e)) {
                group.dependencies.push(dep);
            }
        }
        "package>metadata>dependencies>dependency" => {
            if let Some(dep) = dependency(e) {
                flat_deps.push(dep);
            }
        }
        _ => {}
    }
    Ok(())
}

fn on_close(path: &[String], current_group: &mut Option<DependencyGroup>, spec: &mut Nuspec) {
    if path.join(">") == "package>metadata>dependencies>group" {
        if let Some(group) = current_group.take() {
            spec.dependency_groups.push(group);
        }
    }
}

fn dependency(e: &BytesStart<'_>) -> Option<PackageDependency> {
    let id = attr(e, "id")?;
    let range = attr(e, "version")
        .and_then(|v| VersionRange::parse(&v).ok())
        .unwrap_or_else(VersionRange::all);
    Some(PackageDependency { id, range })
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.trim().to_string()))
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEWTONSOFT_LIKE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata minClientVersion="2.12">
    <id>WeihanLi.Common</id>
    <version>1.0.72</version>
    <description>common tools</description>
    <dependencies>
      <group targetFramework=".NETFramework4.7.2" />
      <group targetFramework=".NETStandard2.0">
        <dependency id="Newtonsoft.Json" version="13.0.3" exclude="Build,Analyzers" />
        <dependency id="System.Memory" version="[4.5.5, )" />
      </group>
      <group targetFramework="net8.0">
        <dependency id="Newtonsoft.Json" version="13.0.3" />
      </group>
    </dependencies>
  </metadata>
</package>"#;

    #[test]
    fn parses_identity_and_groups() {
        let spec = parse_nuspec(NEWTONSOFT_LIKE).unwrap();
        assert_eq!(spec.id.as_deref(), Some("WeihanLi.Common"));
        assert_eq!(spec.version, Some(NuGetVersion::new(1, 0, 72)));
        assert_eq!(spec.dependency_groups.len(), 3);
        assert!(spec.dependency_groups[0].dependencies.is_empty());
        assert_eq!(spec.dependency_groups[1].dependencies.len(), 2);
        assert_eq!(
            spec.dependency_groups[1].dependencies[1]
                .range
                .min_version()
                .map(|v| v.to_string()),
            Some("4.5.5".to_string())
        );
    }

    #[test]
    fn nearest_group_prefers_same_family() {
        let spec = parse_nuspec(NEWTONSOFT_LIKE).unwrap();
        let group = spec.nearest_group(&TargetFramework::net(8, 0)).unwrap();
        assert_eq!(group.target_framework, TargetFramework::net(8, 0));
        let group = spec.nearest_group(&TargetFramework::net(6, 0)).unwrap();
        assert_eq!(group.target_framework, TargetFramework::net_standard(2, 0));
    }

    #[test]
    fn flat_dependencies_become_any_group() {
        let xml = r#"<package><metadata><id>Old</id><version>1.0</version>
            <dependencies><dependency id="Dep" version="2.0"/></dependencies>
            </metadata></package>"#;
        let spec = parse_nuspec(xml).unwrap();
        assert_eq!(spec.dependency_groups.len(), 1);
        assert_eq!(spec.dependency_groups[0].target_framework, TargetFramework::any());
        assert_eq!(spec.dependency_groups[0].dependencies[0].id, "Dep");
    }

    #[test]
    fn no_dependencies_element() {
        let xml = r#"<package><metadata><id>Leaf</id><version>1.0.0</version></metadata></package>"#;
        let spec = parse_nuspec(xml).unwrap();
        assert!(spec.dependency_groups.is_empty());
    }

    #[test]
    fn missing_version_attribute_is_unbounded() {
        let xml = r#"<package><metadata><dependencies>
            <group><dependency id="Any"/></group>
            </dependencies></metadata></package>"#;
        let spec = parse_nuspec(xml).unwrap();
        let dep = &spec.dependency_groups[0].dependencies[0];
        assert!(dep.range.min_version().is_none());
    }
}
